use super::streams::ControlCell;
use super::{talkback, Consumer, Control, Error, Multiplexer, Producer, Stream};
use std::cell::Cell;
use std::rc::{Rc, Weak};

struct HostState<T> {
    mux: Multiplexer<T>,
    done: Cell<bool>,
    upstream: ControlCell,
}

/// A hot, multicast stream that values are pushed into by hand.
///
/// Consumers connected to the host's stream receive values only while started: `start` plugs a
/// consumer in, `stop` unplugs it again. Once the host has ended, new connections are greeted and
/// ended right away.
///
/// A host is also a Consumer, so it can be connected to another stream to multicast it.
///
/// # Examples
/// ```
/// use rill_streams::{ReactiveCache, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let stream = stream_host.get_stream();
///
/// let cache = ReactiveCache::from_stream(stream);
/// assert_eq!(stream_host.count_subscribers(), 1);
///
/// stream_host.emit(100);
/// stream_host.emit(200);
/// stream_host.end(None);
///
/// assert_eq!(cache.get_cloned(), vec![100, 200]);
/// assert!(cache.is_ended());
/// ```
pub struct StreamHost<T> {
    state: Rc<HostState<T>>,
}

impl<T> Clone for StreamHost<T> {
    fn clone(&self) -> Self {
        StreamHost {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static> Default for StreamHost<T> {
    fn default() -> Self {
        StreamHost::new()
    }
}

impl<T: Clone + 'static> StreamHost<T> {
    pub fn new() -> StreamHost<T> {
        StreamHost {
            state: Rc::new(HostState {
                mux: Multiplexer::new(),
                done: Cell::new(false),
                upstream: ControlCell::default(),
            }),
        }
    }

    pub fn get_stream(&self) -> Stream<T> {
        Stream::new(HostProducer {
            state: Rc::clone(&self.state),
        })
    }

    /// Sends a value to every started consumer.
    pub fn emit(&self, value: T) {
        if !self.state.done.get() {
            self.state.mux.send(value);
        }
    }

    /// Ends every consumer. Later calls to `emit` and `end` do nothing.
    pub fn end(&self, reason: Option<Error>) {
        if self.state.done.replace(true) {
            return;
        }
        self.state.mux.end(reason);
    }

    pub fn is_done(&self) -> bool {
        self.state.done.get()
    }

    pub fn count_subscribers(&self) -> usize {
        self.state.mux.len()
    }
}

impl<T: Clone + 'static> Consumer<T> for StreamHost<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.state.upstream.set_once(Rc::clone(&control)) {
            control.start();
        }
    }

    fn receive(&self, value: T) {
        self.emit(value);
    }

    fn end(&self, reason: Option<Error>) {
        self.state.upstream.take();
        StreamHost::end(self, reason);
    }
}

struct HostProducer<T> {
    state: Rc<HostState<T>>,
}

impl<T: Clone + 'static> Producer<T> for HostProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        if self.state.done.get() {
            consumer.greet(talkback().build());
            consumer.end(None);
            return;
        }
        consumer.greet(Rc::new(HostControl {
            host: Rc::downgrade(&self.state),
            consumer: Rc::clone(&consumer),
            key: Cell::new(None),
            missed_end: Cell::new(false),
        }));
    }
}

struct HostControl<T> {
    host: Weak<HostState<T>>,
    consumer: Rc<dyn Consumer<T>>,
    key: Cell<Option<usize>>,
    missed_end: Cell<bool>,
}

impl<T> Control for HostControl<T> {
    fn start(&self) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        if host.done.get() {
            // Consumers still plugged in when the host ended were ended by the multiplexer.
            if self.key.get().is_none() && !self.missed_end.replace(true) {
                self.consumer.end(None);
            }
            return;
        }
        if let Some(key) = self.key.get() {
            if host.mux.contains(key) {
                return;
            }
        }
        self.key.set(Some(host.mux.add(Rc::clone(&self.consumer))));
    }

    fn request(&self) {
        if let Some(host) = self.host.upgrade() {
            host.upstream.request();
        }
    }

    fn stop(&self, _reason: Option<Error>) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        if host.done.get() {
            return;
        }
        if let Some(key) = self.key.take() {
            host.mux.remove(key);
        }
    }
}
