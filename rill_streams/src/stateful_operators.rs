use super::stateless_operators::filter_map_consumer;
use super::streams::ControlCell;
use super::{empty, Consumer, Control, Error, Producer, Result, Stream};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

impl<T: 'static> Stream<T> {
    /// Similar to the `fold` method on iterators, but works iteratively and creates a stream
    /// that emits the latest accumulated value whenever the original stream emits.
    ///
    /// Every connection starts over from `initial_value`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill_streams::{ReactiveCache, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let stream = stream_host.get_stream();
    ///
    /// let cache = ReactiveCache::from_stream(stream.scan(
    ///     |acc: &Vec<i32>, val| {
    ///         let mut extended = acc.clone();
    ///         extended.push(val);
    ///         extended
    ///     },
    ///     vec![],
    /// ));
    ///
    /// stream_host.emit(2);
    /// stream_host.emit(3);
    /// assert_eq!(cache.get_cloned(), vec![vec![2], vec![2, 3]]);
    /// ```
    pub fn scan<U, F>(&self, scan_fn: F, initial_value: U) -> Stream<U>
    where
        F: Fn(&U, T) -> U,
        F: 'static,
        U: Clone,
        U: 'static,
    {
        self.try_scan(move |acc, val| Ok(scan_fn(acc, val)), initial_value)
    }

    /// Like `scan`, but an `Err` from `scan_fn` fails the stream.
    pub fn try_scan<U, F>(&self, scan_fn: F, initial_value: U) -> Stream<U>
    where
        F: Fn(&U, T) -> Result<U>,
        F: 'static,
        U: Clone,
        U: 'static,
    {
        let scan_fn = Rc::new(scan_fn);
        self.create_derived_stream(move |downstream| {
            let state = RefCell::new(initial_value.clone());
            let scan_fn = Rc::clone(&scan_fn);
            filter_map_consumer(
                downstream,
                Rc::new(move |val| {
                    let next = scan_fn(&state.borrow(), val)?;
                    *state.borrow_mut() = next.clone();
                    Ok(Some(next))
                }),
            )
        })
    }

    /// Creates a stream that counts the number of times the original stream emits.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill_streams::{ReactiveValue, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let count = stream_host.get_stream().count_values().to_reactive_value_with_default(0);
    ///
    /// stream_host.emit(2);
    /// stream_host.emit(3);
    /// assert_eq!(count.get(), Some(2));
    /// ```
    pub fn count_values(&self) -> Stream<u32> {
        self.scan(|acc, _| acc + 1, 0)
    }

    /// Creates a stream that filters out repeated values. So a stream that emits
    /// the sequence (1, 1, 2, 3) would be transformed into a stream that emits
    /// (1, 2, 3). Note that this does _not_ dedup the entire stream, it just prevents
    /// the same value from being emitted twice in a row. So (1, 1, 2, 1, 3) would
    /// turn into (1, 2, 1, 3), not (1, 2, 3).
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{of, ReactiveCache};
    ///
    /// let cache = ReactiveCache::from_stream(of(vec![1, 1, 2, 1, 3]).distinct());
    /// assert_eq!(cache.get_cloned(), vec![1, 2, 1, 3]);
    /// ```
    pub fn distinct(&self) -> Stream<T>
    where
        T: Clone,
        T: PartialEq,
    {
        self.distinct_by(|last, val| last == val)
    }

    /// Like `distinct`, with a custom equality.
    pub fn distinct_by<F>(&self, equals: F) -> Stream<T>
    where
        F: Fn(&T, &T) -> bool,
        F: 'static,
        T: Clone,
    {
        let equals = Rc::new(equals);
        self.create_derived_stream(move |downstream| {
            let last: RefCell<Option<T>> = RefCell::new(None);
            let equals = Rc::clone(&equals);
            filter_map_consumer(
                downstream,
                Rc::new(move |val: T| {
                    let repeated = match &*last.borrow() {
                        Some(last) => equals(last, &val),
                        None => false,
                    };
                    if repeated {
                        return Ok(None);
                    }
                    *last.borrow_mut() = Some(val.clone());
                    Ok(Some(val))
                }),
            )
        })
    }

    /// Emits at most `max` values, then ends the stream and stops the upstream. `take(0)` ends
    /// as soon as the stream is started.
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{from_iter, ReactiveCache};
    ///
    /// let cache = ReactiveCache::from_stream(from_iter(0..).take(3));
    /// assert_eq!(cache.get_cloned(), vec![0, 1, 2]);
    /// assert!(cache.is_ended());
    /// ```
    pub fn take(&self, max: usize) -> Stream<T> {
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| TakeConsumer {
                me: me.clone(),
                downstream,
                max,
                taken: Cell::new(0),
                ended: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Reconnects to the upstream whenever it fails, at most `max_retries` times (`None` retries
    /// forever). A graceful end is passed through.
    ///
    /// The downstream consumer is greeted once; every new upstream connection is started if the
    /// downstream had started and gets the request still outstanding, if any.
    pub fn retry(&self, max_retries: Option<usize>) -> Stream<T> {
        let upstream = self.clone();
        super::source(move |downstream: Rc<dyn Consumer<T>>| {
            let consumer = Rc::new_cyclic(|me: &Weak<RetryConsumer<T>>| RetryConsumer {
                me: me.clone(),
                upstream: upstream.clone(),
                downstream,
                remaining: Cell::new(max_retries),
                control: ControlCell::default(),
                greeted: Cell::new(false),
                started: Cell::new(false),
                requested: Cell::new(false),
            });
            upstream.connect(consumer);
        })
    }

    /// Emits `values` when started, then connects to this stream.
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{of, ReactiveCache};
    ///
    /// let cache = ReactiveCache::from_stream(of(vec![3, 4]).start_with(vec![1, 2]));
    /// assert_eq!(cache.get_cloned(), vec![1, 2, 3, 4]);
    /// ```
    pub fn start_with(&self, values: Vec<T>) -> Stream<T>
    where
        T: Clone,
    {
        let upstream = self.clone();
        let values = Rc::new(values);
        super::source(move |downstream: Rc<dyn Consumer<T>>| {
            let state = Rc::new_cyclic(|me: &Weak<StartWithState<T>>| StartWithState {
                me: me.clone(),
                upstream: upstream.clone(),
                values: Rc::clone(&values),
                cursor: Cell::new(0),
                downstream: Rc::clone(&downstream),
                control: ControlCell::default(),
                connected: Cell::new(false),
                disposed: Cell::new(false),
                requests: Cell::new(0),
            });
            downstream.greet(state);
        })
    }

    /// Emits all values of this stream, then those of every stream in `others`, in order.
    pub fn append(&self, others: Vec<Stream<T>>) -> Stream<T> {
        let mut streams = vec![self.clone()];
        streams.extend(others);
        concat(streams)
    }

    /// Emits all values of every stream in `others`, then those of this stream.
    pub fn prepend(&self, others: Vec<Stream<T>>) -> Stream<T> {
        let mut streams = others;
        streams.push(self.clone());
        concat(streams)
    }

    /// Forwards values until `gate` ends, then ends too (with the gate's reason) and stops the
    /// upstream. Values emitted by the gate are pulled and ignored.
    pub fn until<U: 'static>(&self, gate: &Stream<U>) -> Stream<T> {
        let gate = gate.map(|_| ());
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| UntilConsumer {
                me: me.clone(),
                downstream,
                gate_stream: gate.clone(),
                upstream: ControlCell::default(),
                gate: ControlCell::default(),
                gate_should_start: Cell::new(false),
                disposed: Cell::new(false),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Holds values that arrive while no request is outstanding and hands them out on later
    /// requests, oldest first. At most `max` values are held; beyond that the oldest is dropped.
    /// A graceful end is delayed until the buffer has drained.
    pub fn buffer(&self, max: usize) -> Stream<T> {
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| BufferConsumer {
                me: me.clone(),
                downstream,
                max,
                buffer: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                done: Cell::new(false),
                requested: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Turns a push stream into a pull stream: an unrequested value pauses the upstream and is
    /// kept until the next request, which also resumes the upstream.
    pub fn backpress(&self) -> Stream<T> {
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| BackpressConsumer {
                me: me.clone(),
                downstream,
                stopped: Cell::new(true),
                requested: Cell::new(false),
                ended: Cell::new(false),
                leakage: RefCell::new(None),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Requests a value right after greeting and again after every value, which drives a pull
    /// stream for consumers that only `start`.
    pub fn auto_request(&self) -> Stream<T> {
        self.create_derived_stream(move |downstream| {
            Rc::new(AutoRequestConsumer {
                downstream,
                upstream: ControlCell::default(),
                ended: Cell::new(false),
            }) as Rc<dyn Consumer<T>>
        })
    }
}

/// Emits all values of the first stream, then of the second one, and so on. A failure of any
/// stream ends the result right away.
///
/// # Examples
/// ```
/// use rill_streams::{concat, from_iter, of, ReactiveCache};
///
/// let cache = ReactiveCache::from_stream(concat(vec![of(vec![1, 2]), from_iter(3..5)]));
/// assert_eq!(cache.get_cloned(), vec![1, 2, 3, 4]);
/// assert!(cache.is_ended());
/// ```
pub fn concat<T: 'static>(streams: Vec<Stream<T>>) -> Stream<T> {
    let streams = Rc::new(streams);
    super::source(move |downstream: Rc<dyn Consumer<T>>| {
        let mut pending: VecDeque<Stream<T>> = streams.iter().cloned().collect();
        let Some(first) = pending.pop_front() else {
            empty().connect(downstream);
            return;
        };
        let consumer = Rc::new_cyclic(|me: &Weak<ConcatConsumer<T>>| ConcatConsumer {
            me: me.clone(),
            downstream,
            pending: RefCell::new(pending),
            initial: Cell::new(true),
            started: Cell::new(false),
            requested: Cell::new(false),
            upstream: ControlCell::default(),
        });
        first.connect(consumer);
    })
}

struct TakeConsumer<T> {
    me: Weak<TakeConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    max: usize,
    taken: Cell<usize>,
    ended: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> TakeConsumer<T> {
    fn finish(&self) {
        if !self.ended.replace(true) {
            self.upstream.stop(None);
            self.downstream.end(None);
        }
    }
}

impl<T: 'static> Consumer<T> for TakeConsumer<T> {
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
        self.taken.set(self.taken.get() + 1);
        self.downstream.receive(value);
        if self.taken.get() >= self.max {
            self.finish();
        }
    }

    fn end(&self, reason: Option<Error>) {
        if !self.ended.replace(true) {
            self.upstream.take();
            self.downstream.end(reason);
        }
    }
}

impl<T: 'static> Control for TakeConsumer<T> {
    fn start(&self) {
        if self.taken.get() < self.max {
            self.upstream.start();
        } else {
            self.finish();
        }
    }

    fn request(&self) {
        if self.taken.get() < self.max {
            self.upstream.request();
        }
    }

    fn stop(&self, reason: Option<Error>) {
        self.upstream.stop(reason);
    }
}

struct RetryConsumer<T> {
    me: Weak<RetryConsumer<T>>,
    upstream: Stream<T>,
    downstream: Rc<dyn Consumer<T>>,
    remaining: Cell<Option<usize>>,
    control: ControlCell,
    greeted: Cell<bool>,
    started: Cell<bool>,
    requested: Cell<bool>,
}

impl<T: 'static> RetryConsumer<T> {
    fn take_attempt(&self) -> bool {
        match self.remaining.get() {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                self.remaining.set(Some(remaining - 1));
                true
            }
        }
    }
}

impl<T: 'static> Consumer<T> for RetryConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.control.set(Rc::clone(&control));
        if !self.greeted.replace(true) {
            self.downstream.greet(Rc::new(RetryControl {
                consumer: self.me.clone(),
            }));
            return;
        }
        if self.started.get() {
            control.start();
        }
        if self.requested.get() {
            control.request();
        }
    }

    fn receive(&self, value: T) {
        self.requested.set(false);
        self.downstream.receive(value);
    }

    fn end(&self, reason: Option<Error>) {
        match reason {
            Some(err) if self.take_attempt() => {
                log::debug!("retry: reconnecting after failure: {}", err);
                self.control.take();
                if let Some(me) = self.me.upgrade() {
                    self.upstream.connect(me);
                }
            }
            reason => {
                self.control.take();
                self.downstream.end(reason);
            }
        }
    }
}

struct RetryControl<T> {
    consumer: Weak<RetryConsumer<T>>,
}

impl<T: 'static> Control for RetryControl<T> {
    fn start(&self) {
        if let Some(consumer) = self.consumer.upgrade() {
            consumer.started.set(true);
            consumer.control.start();
        }
    }

    fn request(&self) {
        if let Some(consumer) = self.consumer.upgrade() {
            consumer.requested.set(true);
            consumer.control.request();
        }
    }

    fn stop(&self, reason: Option<Error>) {
        if let Some(consumer) = self.consumer.upgrade() {
            consumer.started.set(false);
            consumer.control.stop(reason);
        }
    }
}

struct StartWithState<T> {
    me: Weak<StartWithState<T>>,
    upstream: Stream<T>,
    values: Rc<Vec<T>>,
    cursor: Cell<usize>,
    downstream: Rc<dyn Consumer<T>>,
    control: ControlCell,
    connected: Cell<bool>,
    disposed: Cell<bool>,
    requests: Cell<usize>,
}

impl<T: Clone + 'static> Control for StartWithState<T> {
    fn start(&self) {
        self.disposed.set(false);
        while let Some(value) = self.values.get(self.cursor.get()) {
            if self.disposed.get() {
                return;
            }
            self.cursor.set(self.cursor.get() + 1);
            self.downstream.receive(value.clone());
        }
        if self.disposed.get() {
            return;
        }
        if self.connected.replace(true) {
            self.control.start();
        } else {
            self.upstream.connect(Rc::new(StartWithConsumer {
                state: self.me.clone(),
            }));
        }
    }

    fn request(&self) {
        if self.control.is_set() {
            self.control.request();
        } else {
            self.requests.set(self.requests.get() + 1);
        }
    }

    fn stop(&self, reason: Option<Error>) {
        self.disposed.set(true);
        self.control.stop(reason);
    }
}

struct StartWithConsumer<T> {
    state: Weak<StartWithState<T>>,
}

impl<T: Clone + 'static> Consumer<T> for StartWithConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        state.control.set(Rc::clone(&control));
        control.start();
        for _ in 0..state.requests.replace(0) {
            control.request();
        }
    }

    fn receive(&self, value: T) {
        if let Some(state) = self.state.upgrade() {
            state.downstream.receive(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if let Some(state) = self.state.upgrade() {
            state.control.take();
            state.downstream.end(reason);
        }
    }
}

struct ConcatConsumer<T> {
    me: Weak<ConcatConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    pending: RefCell<VecDeque<Stream<T>>>,
    initial: Cell<bool>,
    started: Cell<bool>,
    requested: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> Consumer<T> for ConcatConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(Rc::clone(&control));
        if self.initial.replace(false) {
            if let Some(me) = self.me.upgrade() {
                self.downstream.greet(me);
            }
            return;
        }
        if self.started.get() {
            control.start();
        }
        if self.requested.get() {
            control.request();
        }
    }

    fn receive(&self, value: T) {
        self.requested.set(false);
        self.downstream.receive(value);
    }

    fn end(&self, reason: Option<Error>) {
        self.upstream.take();
        if reason.is_some() {
            self.downstream.end(reason);
            return;
        }
        let next = self.pending.borrow_mut().pop_front();
        match (next, self.me.upgrade()) {
            (Some(next), Some(me)) => next.connect(me),
            _ => self.downstream.end(None),
        }
    }
}

impl<T: 'static> Control for ConcatConsumer<T> {
    fn start(&self) {
        self.started.set(true);
        self.upstream.start();
    }

    fn request(&self) {
        self.requested.set(true);
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.started.set(false);
        self.upstream.stop(reason);
    }
}

struct UntilConsumer<T> {
    me: Weak<UntilConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    gate_stream: Stream<()>,
    upstream: ControlCell,
    gate: ControlCell,
    gate_should_start: Cell<bool>,
    disposed: Cell<bool>,
}

impl<T: 'static> UntilConsumer<T> {
    fn start_gate(&self) {
        match self.gate.get() {
            Some(gate) => {
                self.gate_should_start.set(false);
                gate.start();
                gate.request();
            }
            None => self.gate_should_start.set(true),
        }
    }

    fn dispose(&self, reason: Option<Error>, from_gate: bool) {
        if self.disposed.replace(true) {
            return;
        }
        if from_gate {
            self.gate.take();
            self.upstream.stop(None);
        } else {
            self.gate.stop(None);
        }
        self.downstream.end(reason);
    }
}

impl<T: 'static> Consumer<T> for UntilConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        self.gate_stream.connect(Rc::new(GateConsumer {
            main: self.me.clone(),
        }));
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if !self.disposed.get() {
            self.downstream.receive(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        self.dispose(reason, false);
    }
}

impl<T: 'static> Control for UntilConsumer<T> {
    fn start(&self) {
        if self.disposed.get() {
            return;
        }
        self.start_gate();
        self.upstream.start();
    }

    fn request(&self) {
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.upstream.stop(reason.clone());
        self.gate_should_start.set(false);
        self.gate.stop(reason);
    }
}

struct GateConsumer<T> {
    main: Weak<UntilConsumer<T>>,
}

impl<T: 'static> Consumer<()> for GateConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if let Some(main) = self.main.upgrade() {
            main.gate.set(control);
            if main.gate_should_start.get() {
                main.start_gate();
            }
        }
    }

    fn receive(&self, _value: ()) {
        if let Some(main) = self.main.upgrade() {
            main.gate.request();
        }
    }

    fn end(&self, reason: Option<Error>) {
        if let Some(main) = self.main.upgrade() {
            main.dispose(reason, true);
        }
    }
}

struct BufferConsumer<T> {
    me: Weak<BufferConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    max: usize,
    buffer: RefCell<VecDeque<T>>,
    /// Upstream ended while values were still buffered.
    draining: Cell<bool>,
    done: Cell<bool>,
    requested: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> BufferConsumer<T> {
    /// Serves the oldest buffered value, if there is one.
    fn pull(&self) -> bool {
        let next = self.buffer.borrow_mut().pop_front();
        let Some(value) = next else {
            return false;
        };
        self.downstream.receive(value);
        if self.draining.get() && self.buffer.borrow().is_empty() {
            self.finish(None);
        }
        true
    }

    fn finish(&self, reason: Option<Error>) {
        if !self.done.replace(true) {
            self.buffer.borrow_mut().clear();
            self.downstream.end(reason);
        }
    }
}

impl<T: 'static> Consumer<T> for BufferConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if self.done.get() || self.draining.get() {
            return;
        }
        if self.requested.replace(false) {
            self.downstream.receive(value);
            return;
        }
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_back(value);
        if buffer.len() > self.max {
            buffer.pop_front();
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.done.get() {
            return;
        }
        self.upstream.take();
        if reason.is_none() && !self.buffer.borrow().is_empty() {
            self.draining.set(true);
        } else {
            self.finish(reason);
        }
    }
}

impl<T: 'static> Control for BufferConsumer<T> {
    fn start(&self) {
        self.upstream.start();
    }

    fn request(&self) {
        if self.done.get() || self.pull() {
            return;
        }
        self.requested.set(true);
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.upstream.stop(reason);
    }
}

struct BackpressConsumer<T> {
    me: Weak<BackpressConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    stopped: Cell<bool>,
    requested: Cell<bool>,
    ended: Cell<bool>,
    leakage: RefCell<Option<T>>,
    upstream: ControlCell,
}

impl<T: 'static> Consumer<T> for BackpressConsumer<T> {
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
        if self.requested.replace(false) {
            self.downstream.receive(value);
        } else {
            self.stop(None);
            *self.leakage.borrow_mut() = Some(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        self.upstream.take();
        self.leakage.borrow_mut().take();
        self.downstream.end(reason);
    }
}

impl<T: 'static> Control for BackpressConsumer<T> {
    fn start(&self) {
        self.stopped.set(false);
        self.upstream.start();
    }

    fn request(&self) {
        if self.ended.get() {
            return;
        }
        let leaked = self.leakage.borrow_mut().take();
        if let Some(value) = leaked {
            self.downstream.receive(value);
            return;
        }
        self.requested.set(true);
        if self.stopped.get() {
            self.start();
        }
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.stopped.set(true);
        self.upstream.stop(reason);
    }
}

struct AutoRequestConsumer<T> {
    downstream: Rc<dyn Consumer<T>>,
    upstream: ControlCell,
    ended: Cell<bool>,
}

impl<T> Consumer<T> for AutoRequestConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(Rc::clone(&control));
        self.downstream.greet(control);
        if !self.ended.get() {
            self.upstream.request();
        }
    }

    fn receive(&self, value: T) {
        if self.ended.get() {
            return;
        }
        self.downstream.receive(value);
        if !self.ended.get() {
            self.upstream.request();
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        self.upstream.take();
        self.downstream.end(reason);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        concat, fail, from_iter, of, sink, source, talkback, Consumer, Control, Error,
        ReactiveCache, Stream, StreamHost,
    };
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Counts raw protocol calls, without the guards of the sink builder.
    #[derive(Default)]
    struct CallCounter {
        values: RefCell<Vec<i32>>,
        ends: Cell<usize>,
    }

    impl Consumer<i32> for CallCounter {
        fn greet(&self, control: Rc<dyn Control>) {
            control.start();
        }

        fn receive(&self, value: i32) {
            self.values.borrow_mut().push(value);
        }

        fn end(&self, _reason: Option<Error>) {
            self.ends.set(self.ends.get() + 1);
        }
    }

    /// Keeps emitting and ending after it already ended.
    fn unruly() -> Stream<i32> {
        source(|consumer: Rc<dyn Consumer<i32>>| {
            let target = Rc::clone(&consumer);
            consumer.greet(
                talkback()
                    .on_start(move || {
                        target.receive(1);
                        target.end(None);
                        target.receive(2);
                        target.end(None);
                    })
                    .build(),
            );
        })
    }

    /// A consumer that starts its stream but only requests when told to.
    struct Recorder<T> {
        control: Rc<RefCell<Option<Rc<dyn Control>>>>,
        seen: Rc<RefCell<Vec<T>>>,
        ended: Rc<Cell<bool>>,
    }

    impl<T: Clone + 'static> Recorder<T> {
        fn start(stream: &Stream<T>) -> Recorder<T> {
            let recorder = Recorder {
                control: Rc::default(),
                seen: Rc::default(),
                ended: Rc::default(),
            };
            let (control, seen, ended) = (
                recorder.control.clone(),
                recorder.seen.clone(),
                recorder.ended.clone(),
            );
            stream.connect(
                sink()
                    .on_greet(move |greeted: Rc<dyn Control>| {
                        *control.borrow_mut() = Some(Rc::clone(&greeted));
                        greeted.start();
                    })
                    .on_receive(move |val| seen.borrow_mut().push(val))
                    .on_end(move |_| ended.set(true))
                    .build(),
            );
            recorder
        }

        fn request(&self) {
            let control = self.control.borrow().clone();
            if let Some(control) = control {
                control.request();
            }
        }

        fn values(&self) -> Vec<T> {
            self.seen.borrow().clone()
        }
    }

    #[test]
    fn take_zero_ends_on_start() {
        let stopped = Rc::new(Cell::new(false));
        let stopped_write = Rc::clone(&stopped);
        let stream = source(move |consumer: Rc<dyn Consumer<i32>>| {
            let stopped = Rc::clone(&stopped_write);
            consumer.greet(talkback().on_stop(move |_| stopped.set(true)).build());
        });
        let cache = ReactiveCache::from_stream(stream.take(0));
        assert!(cache.is_ended());
        assert!(cache.get_cloned().is_empty());
        assert!(stopped.get());
    }

    #[test]
    fn retry_reconnects_until_budget_is_spent() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_write = Rc::clone(&attempts);
        let flaky = source(move |consumer: Rc<dyn Consumer<i32>>| {
            attempts_write.set(attempts_write.get() + 1);
            let attempt = attempts_write.get();
            let target = Rc::clone(&consumer);
            consumer.greet(
                talkback()
                    .on_start(move || {
                        target.receive(attempt);
                        target.end(Some(Error::msg("flaky")));
                    })
                    .build(),
            );
        });

        let cache = ReactiveCache::from_stream(flaky.retry(Some(2)));
        assert_eq!(cache.get_cloned(), vec![1, 2, 3]);
        assert_eq!(attempts.get(), 3);
        assert_eq!(cache.error().map(|err| err.to_string()), Some("flaky".into()));
    }

    #[test]
    fn start_with_replays_early_requests_to_pull_sources() {
        let cache = ReactiveCache::from_stream(from_iter(vec![3, 4]).start_with(vec![1, 2]));
        assert_eq!(cache.get_cloned(), vec![1, 2, 3, 4]);
        assert!(cache.is_ended());
    }

    #[test]
    fn until_ends_with_the_gate() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let gate: StreamHost<()> = StreamHost::new();
        let cache = ReactiveCache::from_stream(stream_host.get_stream().until(&gate.get_stream()));

        stream_host.emit(1);
        gate.emit(());
        stream_host.emit(2);
        gate.end(None);
        stream_host.emit(3);

        assert_eq!(cache.get_cloned(), vec![1, 2]);
        assert!(cache.is_ended());
        assert_eq!(stream_host.count_subscribers(), 0);
    }

    #[test]
    fn prepend_runs_others_first() {
        let cache = ReactiveCache::from_stream(of(vec![3]).prepend(vec![of(vec![1]), of(vec![2])]));
        assert_eq!(cache.get_cloned(), vec![1, 2, 3]);
    }

    #[test]
    fn try_scan_fails_on_error() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let cache = ReactiveCache::from_stream(stream_host.get_stream().try_scan(
            |acc: &i32, val| {
                if val < 0 {
                    Err(Error::msg("negative"))
                } else {
                    Ok(acc + val)
                }
            },
            0,
        ));

        for val in [1, 2, -1, 5] {
            stream_host.emit(val);
        }

        assert_eq!(cache.get_cloned(), vec![1, 3]);
        assert_eq!(cache.error().map(|err| err.to_string()), Some("negative".into()));
        assert_eq!(stream_host.count_subscribers(), 0);
    }

    #[test]
    fn append_runs_streams_in_order() {
        let cache = ReactiveCache::from_stream(
            of(vec![1, 2]).append(vec![from_iter(3..5), of(vec![5])]),
        );
        assert_eq!(cache.get_cloned(), vec![1, 2, 3, 4, 5]);
        assert!(cache.is_ended());
    }

    #[test]
    fn concat_stops_at_the_first_failure() {
        let cache = ReactiveCache::from_stream(concat(vec![
            of(vec![1]),
            fail(Error::msg("broken")),
            of(vec![2]),
        ]));
        assert_eq!(cache.get_cloned(), vec![1]);
        assert_eq!(cache.error().map(|err| err.to_string()), Some("broken".into()));
    }

    #[test]
    fn buffer_serves_held_values_on_request() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let recorder = Recorder::start(&stream_host.get_stream().buffer(2));

        stream_host.emit(1);
        stream_host.emit(2);
        stream_host.emit(3);
        assert!(recorder.values().is_empty());

        recorder.request();
        recorder.request();
        assert_eq!(recorder.values(), vec![2, 3]);

        // Nothing held, so the next value goes straight through.
        recorder.request();
        stream_host.emit(4);
        assert_eq!(recorder.values(), vec![2, 3, 4]);

        stream_host.emit(5);
        stream_host.emit(6);
        stream_host.end(None);
        assert!(!recorder.ended.get());

        recorder.request();
        recorder.request();
        assert_eq!(recorder.values(), vec![2, 3, 4, 5, 6]);
        assert!(recorder.ended.get());
    }

    #[test]
    fn backpress_pauses_on_unrequested_values() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let recorder = Recorder::start(&stream_host.get_stream().backpress());

        stream_host.emit(1);
        assert_eq!(stream_host.count_subscribers(), 0);
        stream_host.emit(2);
        assert!(recorder.values().is_empty());

        recorder.request();
        assert_eq!(recorder.values(), vec![1]);

        recorder.request();
        assert_eq!(stream_host.count_subscribers(), 1);
        stream_host.emit(3);
        assert_eq!(recorder.values(), vec![1, 3]);
    }

    #[test]
    fn auto_request_drives_a_pull_source() {
        let plain = Recorder::start(&from_iter(1..4));
        assert!(plain.values().is_empty());

        let driven = Recorder::start(&from_iter(1..4).auto_request());
        assert_eq!(driven.values(), vec![1, 2, 3]);
        assert!(driven.ended.get());
    }

    #[test]
    fn auto_request_ignores_calls_after_end() {
        let counter = Rc::new(CallCounter::default());
        unruly().auto_request().connect(counter.clone());
        assert_eq!(*counter.values.borrow(), vec![1]);
        assert_eq!(counter.ends.get(), 1);
    }
}
