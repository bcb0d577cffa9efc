use super::streams::ControlCell;
use super::{Consumer, Control, Error, Result, Stream};
use std::cell::Cell;
use std::rc::Rc;

pub(crate) type FilterMapFn<T, U> = Rc<dyn Fn(T) -> Result<Option<U>>>;

/// Adapter shared by `map`, `filter` and their fallible versions. A value mapped to `None` is
/// dropped and one more value is requested from upstream in its place.
struct FilterMapConsumer<T, U> {
    downstream: Rc<dyn Consumer<U>>,
    op: FilterMapFn<T, U>,
    upstream: ControlCell,
    failed: Cell<bool>,
}

impl<T, U> Consumer<T> for FilterMapConsumer<T, U> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(Rc::clone(&control));
        self.downstream.greet(control);
    }

    fn receive(&self, value: T) {
        if self.failed.get() {
            return;
        }
        match (self.op)(value) {
            Ok(Some(mapped)) => self.downstream.receive(mapped),
            Ok(None) => self.upstream.request(),
            Err(err) => {
                self.failed.set(true);
                self.upstream.stop(Some(err.clone()));
                self.downstream.end(Some(err));
            }
        }
    }

    fn end(&self, reason: Option<Error>) {
        if !self.failed.get() {
            self.downstream.end(reason);
        }
    }
}

pub(crate) fn filter_map_consumer<T: 'static, U: 'static>(
    downstream: Rc<dyn Consumer<U>>,
    op: FilterMapFn<T, U>,
) -> Rc<dyn Consumer<T>> {
    Rc::new(FilterMapConsumer {
        downstream,
        op,
        upstream: ControlCell::default(),
        failed: Cell::new(false),
    })
}

struct FinalizeConsumer<T> {
    downstream: Rc<dyn Consumer<T>>,
    op: Rc<dyn Fn(Option<&Error>)>,
}

impl<T> Consumer<T> for FinalizeConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.downstream.greet(control);
    }

    fn receive(&self, value: T) {
        self.downstream.receive(value);
    }

    fn end(&self, reason: Option<Error>) {
        (self.op)(reason.as_ref());
        self.downstream.end(reason);
    }
}

struct GreetConsumer<T> {
    downstream: Rc<dyn Consumer<T>>,
    op: Rc<dyn Fn(&Rc<dyn Control>)>,
}

impl<T> Consumer<T> for GreetConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        (self.op)(&control);
        self.downstream.greet(control);
    }

    fn receive(&self, value: T) {
        self.downstream.receive(value);
    }

    fn end(&self, reason: Option<Error>) {
        self.downstream.end(reason);
    }
}

impl<T: 'static> Stream<T> {
    /// Maps and filters in one step: values mapped to `None` are dropped (and replaced by a new
    /// request upstream, so pull consumers still get their value), an `Err` fails the stream.
    pub fn try_filter_map<U, F>(&self, op: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Result<Option<U>>,
        F: 'static,
    {
        let op: FilterMapFn<T, U> = Rc::new(op);
        self.create_derived_stream(move |downstream| filter_map_consumer(downstream, Rc::clone(&op)))
    }

    /// Returns a stream containing modified values from the original stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill_streams::{ReactiveValue, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let value = stream_host.get_stream().map(|val| val * 100).to_reactive_value();
    ///
    /// stream_host.emit(2);
    /// assert_eq!(value.get(), Some(200));
    ///
    /// stream_host.emit(3);
    /// assert_eq!(value.get(), Some(300));
    /// ```
    pub fn map<U, F>(&self, map_function: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> U,
        F: 'static,
    {
        self.try_filter_map(move |val| Ok(Some(map_function(val))))
    }

    /// Like `map`, but an `Err` returned by `map_function` ends the stream with that error and
    /// stops the upstream.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill_streams::{of, Error, ReactiveCache};
    ///
    /// let parsed = of(vec!["1", "2", "x", "4"])
    ///     .try_map(|val| val.parse::<i32>().map_err(Error::custom));
    /// let cache = ReactiveCache::from_stream(parsed);
    ///
    /// assert_eq!(cache.get_cloned(), vec![1, 2]);
    /// assert!(cache.error().is_some());
    /// ```
    pub fn try_map<U, F>(&self, map_function: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Result<U>,
        F: 'static,
    {
        self.try_filter_map(move |val| map_function(val).map(Some))
    }

    /// Returns a stream that emits only those values from the original stream that pass a test.
    /// Every rejected value is replaced by a fresh upstream `request`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill_streams::{from_iter, ReactiveCache};
    ///
    /// // Pull sources are asked for another value whenever one is rejected.
    /// let evens = from_iter(1..10).filter(|val| val % 2 == 0);
    /// let cache = ReactiveCache::from_stream(evens);
    ///
    /// assert_eq!(cache.get_cloned(), vec![2, 4, 6, 8]);
    /// ```
    pub fn filter<F>(&self, filter_function: F) -> Stream<T>
    where
        F: Fn(&T) -> bool,
        F: 'static,
    {
        self.try_filter_map(move |val| Ok(Some(val).filter(|val| filter_function(val))))
    }

    pub fn try_filter<F>(&self, filter_function: F) -> Stream<T>
    where
        F: Fn(&T) -> Result<bool>,
        F: 'static,
    {
        self.try_filter_map(move |val| Ok(if filter_function(&val)? { Some(val) } else { None }))
    }

    /// Runs `inspect_function` on every value passing through, without altering the stream.
    pub fn inspect<F>(&self, inspect_function: F) -> Stream<T>
    where
        F: Fn(&T),
        F: 'static,
    {
        self.map(move |val| {
            inspect_function(&val);
            val
        })
    }

    /// Runs `finalize_function` with the end reason (if any) right before the stream ends.
    pub fn finalize<F>(&self, finalize_function: F) -> Stream<T>
    where
        F: Fn(Option<&Error>),
        F: 'static,
    {
        let op: Rc<dyn Fn(Option<&Error>)> = Rc::new(finalize_function);
        self.create_derived_stream(move |downstream| {
            Rc::new(FinalizeConsumer {
                downstream,
                op: Rc::clone(&op),
            })
        })
    }

    /// Runs `greet_function` with the upstream control of every new connection, before the
    /// downstream consumer is greeted.
    pub fn on_greet<F>(&self, greet_function: F) -> Stream<T>
    where
        F: Fn(&Rc<dyn Control>),
        F: 'static,
    {
        let op: Rc<dyn Fn(&Rc<dyn Control>)> = Rc::new(greet_function);
        self.create_derived_stream(move |downstream| {
            Rc::new(GreetConsumer {
                downstream,
                op: Rc::clone(&op),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{of, Error, ReactiveCache, StreamHost};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn failing_filter_stops_upstream_with_the_error() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let cache = ReactiveCache::from_stream(stream_host.get_stream().try_filter(|val| {
            if *val < 0 {
                Err(Error::msg("negative"))
            } else {
                Ok(val % 2 == 0)
            }
        }));

        stream_host.emit(2);
        stream_host.emit(3);
        stream_host.emit(-1);
        stream_host.emit(4);

        assert_eq!(cache.get_cloned(), vec![2]);
        assert_eq!(cache.error().map(|err| err.to_string()), Some("negative".to_string()));
        assert_eq!(stream_host.count_subscribers(), 0);
    }

    #[test]
    fn finalize_sees_the_reason() {
        let seen = Rc::new(RefCell::new(vec![]));
        let seen_write = Rc::clone(&seen);
        let _cache = ReactiveCache::from_stream(
            of(vec![1, 2])
                .inspect({
                    let seen = Rc::clone(&seen);
                    move |val| seen.borrow_mut().push(format!("value {}", val))
                })
                .finalize(move |reason| {
                    seen_write.borrow_mut().push(format!("end {:?}", reason.is_some()))
                }),
        );
        assert_eq!(*seen.borrow(), vec!["value 1", "value 2", "end false"]);
    }
}
