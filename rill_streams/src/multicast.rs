use super::streams::ControlCell;
use super::{Consumer, Control, Error, Multiplexer, Producer, Stream};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct SharedState<T> {
    upstream: Stream<T>,
    mux: Multiplexer<T>,
    control: ControlCell,
    connected: Cell<bool>,
    started: Cell<bool>,
    /// Bumped each time the upstream ends; consumers plugged in an earlier generation have ended.
    generation: Cell<u64>,
}

impl<T: Clone + 'static> SharedState<T> {
    fn plug(self: &Rc<Self>, consumer: Rc<dyn Consumer<T>>) -> usize {
        let key = self.mux.add(consumer);
        if !self.connected.replace(true) {
            log::debug!("share: connecting upstream {:?}", self.upstream.id());
            self.upstream.connect(Rc::new(SharedConsumer {
                state: Rc::downgrade(self),
            }));
        }
        key
    }

    fn start(&self) {
        if !self.started.get() && self.control.is_set() {
            self.started.set(true);
            self.control.start();
        }
    }

    fn unplug(&self, key: usize) {
        self.mux.remove(key);
        if self.mux.is_empty() && self.started.replace(false) {
            log::debug!("share: last consumer left, pausing upstream {:?}", self.upstream.id());
            self.control.stop(None);
        }
    }
}

struct SharedProducer<T> {
    state: Rc<SharedState<T>>,
}

impl<T: Clone + 'static> Producer<T> for SharedProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        consumer.greet(Rc::new(SharedControl {
            state: Rc::downgrade(&self.state),
            consumer: Rc::clone(&consumer),
            key: Cell::new(None),
            generation: Cell::new(None),
        }));
    }
}

struct SharedControl<T> {
    state: Weak<SharedState<T>>,
    consumer: Rc<dyn Consumer<T>>,
    key: Cell<Option<usize>>,
    generation: Cell<Option<u64>>,
}

impl<T: Clone + 'static> Control for SharedControl<T> {
    fn start(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        match self.generation.get() {
            Some(generation) if generation != state.generation.get() => return,
            Some(_) => {}
            None => self.generation.set(Some(state.generation.get())),
        }
        let plugged = matches!(self.key.get(), Some(key) if state.mux.contains(key));
        if !plugged {
            self.key.set(Some(state.plug(Rc::clone(&self.consumer))));
        }
        state.start();
    }

    fn request(&self) {
        if let Some(state) = self.state.upgrade() {
            state.control.request();
        }
    }

    fn stop(&self, _reason: Option<Error>) {
        self.generation.set(None);
        if let (Some(state), Some(key)) = (self.state.upgrade(), self.key.take()) {
            state.unplug(key);
        }
    }
}

struct SharedConsumer<T> {
    state: Weak<SharedState<T>>,
}

impl<T: Clone + 'static> Consumer<T> for SharedConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if let Some(state) = self.state.upgrade() {
            state.control.set(control);
        }
    }

    fn receive(&self, value: T) {
        if let Some(state) = self.state.upgrade() {
            state.mux.send(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if let Some(state) = self.state.upgrade() {
            log::debug!("share: upstream {:?} ended", state.upstream.id());
            state.control.take();
            state.connected.set(false);
            state.started.set(false);
            state.generation.set(state.generation.get() + 1);
            state.mux.end(reason);
        }
    }
}

struct ReplayProducer<T> {
    upstream: Stream<T>,
    last: Rc<RefCell<Option<T>>>,
}

impl<T: Clone + 'static> Producer<T> for ReplayProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        self.upstream.connect(Rc::new_cyclic(|me| ReplayConsumer {
            me: me.clone(),
            downstream: consumer,
            last: Rc::clone(&self.last),
            upstream: ControlCell::default(),
            ended: Cell::new(false),
        }));
    }
}

struct ReplayConsumer<T> {
    me: Weak<ReplayConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    last: Rc<RefCell<Option<T>>>,
    upstream: ControlCell,
    ended: Cell<bool>,
}

impl<T: Clone + 'static> Consumer<T> for ReplayConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if self.ended.get() {
            return;
        }
        *self.last.borrow_mut() = Some(value.clone());
        self.downstream.receive(value);
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        self.upstream.take();
        self.downstream.end(reason);
    }
}

impl<T: Clone + 'static> Control for ReplayConsumer<T> {
    fn start(&self) {
        if self.ended.get() {
            return;
        }
        let last = self.last.borrow().clone();
        if let Some(last) = last {
            self.downstream.receive(last);
        }
        self.upstream.start();
    }

    fn request(&self) {
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.upstream.stop(reason);
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Shares one upstream connection between all consumers of the returned stream.
    ///
    /// The upstream is connected when the first consumer starts and paused when the last one
    /// stops. If the upstream ends, every consumer is ended and the next consumer to start
    /// connects again. Consumers joining late do not see earlier values (see `replay`).
    ///
    /// # Examples
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use rill_streams::{ReactiveCache, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let evaluations = Rc::new(Cell::new(0));
    ///
    /// let evaluations_write = evaluations.clone();
    /// let shared = stream_host
    ///     .get_stream()
    ///     .map(move |val| {
    ///         evaluations_write.set(evaluations_write.get() + 1);
    ///         val * 2
    ///     })
    ///     .share();
    ///
    /// let first = ReactiveCache::from_stream(shared.clone());
    /// let second = ReactiveCache::from_stream(shared);
    /// stream_host.emit(21);
    ///
    /// assert_eq!(first.get_cloned(), vec![42]);
    /// assert_eq!(second.get_cloned(), vec![42]);
    /// assert_eq!(evaluations.get(), 1);
    /// ```
    pub fn share(&self) -> Stream<T> {
        Stream::new(SharedProducer {
            state: Rc::new(SharedState {
                upstream: self.clone(),
                mux: Multiplexer::new(),
                control: ControlCell::default(),
                connected: Cell::new(false),
                started: Cell::new(false),
                generation: Cell::new(0),
            }),
        })
    }

    /// Remembers the last value that passed through any connection. A consumer that starts
    /// receives that value first, before anything new from upstream.
    ///
    /// Usually applied to a shared stream, so late subscribers catch up with the latest value.
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{ReactiveCache, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let replayed = stream_host.get_stream().share().replay();
    ///
    /// let early = ReactiveCache::from_stream(replayed.clone());
    /// stream_host.emit(1);
    /// stream_host.emit(2);
    ///
    /// let late = ReactiveCache::from_stream(replayed);
    /// stream_host.emit(3);
    ///
    /// assert_eq!(early.get_cloned(), vec![1, 2, 3]);
    /// assert_eq!(late.get_cloned(), vec![2, 3]);
    /// ```
    pub fn replay(&self) -> Stream<T> {
        Stream::new(ReplayProducer {
            upstream: self.clone(),
            last: Rc::new(RefCell::new(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{observe, Control, StreamHost};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn share_pauses_when_the_last_consumer_stops() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let shared = stream_host.get_stream().share();
        let first_seen = Rc::new(RefCell::new(vec![]));
        let second_seen = Rc::new(RefCell::new(vec![]));

        let (first_write, second_write) = (first_seen.clone(), second_seen.clone());
        let first = observe(&shared.inspect(move |val| first_write.borrow_mut().push(*val)));
        let second = observe(&shared.inspect(move |val| second_write.borrow_mut().push(*val)));
        assert_eq!(stream_host.count_subscribers(), 1);

        first.stop(None);
        stream_host.emit(1);
        assert_eq!(stream_host.count_subscribers(), 1);

        second.stop(None);
        assert_eq!(stream_host.count_subscribers(), 0);
        stream_host.emit(2);

        second.start();
        assert_eq!(stream_host.count_subscribers(), 1);
        stream_host.emit(3);

        assert!(first_seen.borrow().is_empty());
        assert_eq!(*second_seen.borrow(), vec![1, 3]);
    }
}
