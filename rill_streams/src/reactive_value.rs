use super::{Stream, StreamHost, Subscription};
use std::cell::RefCell;
use std::rc::Rc;

/// Trait that applies to both readonly and writeable reactive values.
pub trait ReactiveValue<T> {
    /// Returns the current value, or `None` if the underlying stream has not emitted yet.
    fn get(&self) -> Option<T>;

    /// Returns a Stream that represents the changing value over time.
    /// Use this function to subscribe to changes in the ReactiveValue.
    ///
    /// # Examples
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use rill_streams::{ReactiveValue, WriteableReactiveValue};
    ///
    /// let value = WriteableReactiveValue::new(4);
    ///
    /// let last_value = Rc::new(Cell::new(0_i32));
    /// let last_value_write = last_value.clone();
    ///
    /// let _subscription = value.as_stream().subscribe(move |val| last_value_write.set(val));
    ///
    /// value.set(1);
    /// assert_eq!(last_value.get(), 1);
    ///
    /// value.set(100);
    /// assert_eq!(last_value.get(), 100);
    /// ```
    fn as_stream(&self) -> Stream<T>;
}

// IMPLEMENTATIONS

struct ReadonlyReactiveValueImpl<T: 'static> {
    value: Rc<RefCell<Option<T>>>,
    subscription: Subscription<T>,
}

/// Holds the latest value emitted by a stream.
///
/// ReactiveValues stop their stream when the last clone is dropped, preventing the kinds of
/// memory leaks common in reactive programming.
///
/// # Examples
///
/// ```
/// use rill_streams::{ReactiveValue, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let reactive_value = stream_host.get_stream().map(|val| val * 100).to_reactive_value();
/// assert_eq!(reactive_value.get(), None);
///
/// stream_host.emit(1);
/// assert_eq!(reactive_value.get(), Some(100));
/// stream_host.emit(3);
/// assert_eq!(reactive_value.get(), Some(300));
/// ```
///
/// ```
/// use rill_streams::{ReactiveValue, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let reactive_value = stream_host
///     .get_stream()
///     .map(|val| val * 100)
///     .to_reactive_value_with_default(1000);
/// assert_eq!(reactive_value.get(), Some(1000));
///
/// stream_host.emit(100);
/// assert_eq!(reactive_value.get(), Some(10000));
/// ```
pub struct ReadonlyReactiveValue<T: 'static> {
    pointer: Rc<ReadonlyReactiveValueImpl<T>>,
}

impl<T: Clone + 'static> ReadonlyReactiveValue<T> {
    fn from_stream_with_initial(stream: Stream<T>, initial: Option<T>) -> ReadonlyReactiveValue<T> {
        let value = Rc::new(RefCell::new(initial));
        let value_write = Rc::clone(&value);
        let subscription = stream.subscribe(move |val| {
            *value_write.borrow_mut() = Some(val);
        });
        ReadonlyReactiveValue {
            pointer: Rc::new(ReadonlyReactiveValueImpl {
                value,
                subscription,
            }),
        }
    }

    /// True once the underlying stream ended. The value stays at the last emission.
    pub fn is_ended(&self) -> bool {
        self.pointer.subscription.is_ended()
    }
}

impl<T: Clone + 'static> ReactiveValue<T> for ReadonlyReactiveValue<T> {
    fn get(&self) -> Option<T> {
        self.pointer.value.borrow().clone()
    }

    fn as_stream(&self) -> Stream<T> {
        self.pointer.subscription.stream.clone()
    }
}

impl<T> Clone for ReadonlyReactiveValue<T> {
    fn clone(&self) -> Self {
        ReadonlyReactiveValue {
            pointer: Rc::clone(&self.pointer),
        }
    }
}

struct WriteableReactiveValueImpl<T> {
    value: RefCell<T>,
    host: StreamHost<T>,
}

/// Reactive value that is explicitly set, rather than being derived from a stream.
///
/// # Examples
/// ```
/// use rill_streams::{ReactiveValue, WriteableReactiveValue};
///
/// let writeable_value = WriteableReactiveValue::new(5);
/// assert_eq!(writeable_value.get(), Some(5));
///
/// writeable_value.set(50);
/// assert_eq!(writeable_value.get(), Some(50));
/// ```
pub struct WriteableReactiveValue<T> {
    pointer: Rc<WriteableReactiveValueImpl<T>>,
}

impl<T> Clone for WriteableReactiveValue<T> {
    fn clone(&self) -> Self {
        WriteableReactiveValue {
            pointer: Rc::clone(&self.pointer),
        }
    }
}

impl<T: Clone + 'static> WriteableReactiveValue<T> {
    pub fn new(initial_value: T) -> WriteableReactiveValue<T> {
        WriteableReactiveValue {
            pointer: Rc::new(WriteableReactiveValueImpl {
                value: RefCell::new(initial_value),
                host: StreamHost::new(),
            }),
        }
    }

    /// Sets the value and emits it to every started consumer of `as_stream`.
    pub fn set(&self, value: T) {
        *self.pointer.value.borrow_mut() = value.clone();
        self.pointer.host.emit(value)
    }

    /// Returns a ReadonlyReactiveValue whose value matches this one.
    /// This is helpful when exposing ReactiveValues to public APIs, so that
    /// the consumer cannot alter the state of your component.
    pub fn as_readonly(&self) -> ReadonlyReactiveValue<T> {
        let current = self.pointer.value.borrow().clone();
        self.as_stream().to_reactive_value_with_default(current)
    }
}

impl<T: Clone + 'static> ReactiveValue<T> for WriteableReactiveValue<T> {
    fn get(&self) -> Option<T> {
        Some(self.pointer.value.borrow().clone())
    }

    fn as_stream(&self) -> Stream<T> {
        self.pointer.host.get_stream()
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Creates a ReactiveValue holding the latest value of the stream. It reads `None` until
    /// the stream emits.
    pub fn to_reactive_value(self) -> ReadonlyReactiveValue<T> {
        ReadonlyReactiveValue::from_stream_with_initial(self, None)
    }

    /// See `to_reactive_value`.
    pub fn to_reactive_value_with_default(self, default: T) -> ReadonlyReactiveValue<T> {
        ReadonlyReactiveValue::from_stream_with_initial(self, Some(default))
    }
}

#[cfg(test)]
mod tests {
    use crate::{ReactiveValue, StreamHost, WriteableReactiveValue};

    #[test]
    fn dropping_the_value_stops_the_stream() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let value = stream_host.get_stream().to_reactive_value();
        let copy = value.clone();
        assert_eq!(stream_host.count_subscribers(), 1);

        drop(value);
        assert_eq!(stream_host.count_subscribers(), 1);
        drop(copy);
        assert_eq!(stream_host.count_subscribers(), 0);
    }

    #[test]
    fn readonly_view_follows_the_writeable_value() {
        let writeable = WriteableReactiveValue::new("Bread");
        let readonly = writeable.as_readonly();
        assert_eq!(readonly.get(), Some("Bread"));

        writeable.set("Cheese");
        assert_eq!(readonly.get(), Some("Cheese"));
        assert!(!readonly.is_ended());
    }
}
