use super::{talkback, Clock, Consumer, Control, Deferred, Error, Producer, Result, Stream, TimerId};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

struct OfProducer<T> {
    values: Rc<Vec<T>>,
}

impl<T: Clone + 'static> Producer<T> for OfProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        consumer.greet(Rc::new(OfControl {
            consumer: Rc::clone(&consumer),
            values: RefCell::new(self.values.iter().cloned().collect()),
            disposed: Cell::new(false),
            ended: Cell::new(false),
        }));
    }
}

struct OfControl<T> {
    consumer: Rc<dyn Consumer<T>>,
    values: RefCell<VecDeque<T>>,
    disposed: Cell<bool>,
    ended: Cell<bool>,
}

impl<T> Control for OfControl<T> {
    fn start(&self) {
        self.disposed.set(false);
        while !self.disposed.get() {
            let next = self.values.borrow_mut().pop_front();
            match next {
                Some(value) => self.consumer.receive(value),
                None => break,
            }
        }
        if !self.disposed.get() && self.values.borrow().is_empty() && !self.ended.replace(true) {
            self.consumer.end(None);
        }
    }

    fn request(&self) {}

    fn stop(&self, _reason: Option<Error>) {
        self.disposed.set(true);
    }
}

/// A push stream that emits `values` synchronously when started, then ends. Stopping it in the
/// middle keeps its place: the next `start` continues with the remaining values.
///
/// # Examples
/// ```
/// use rill_streams::{of, ReactiveCache};
///
/// let cache = ReactiveCache::from_stream(of(vec!["a", "b"]));
/// assert_eq!(cache.get_cloned(), vec!["a", "b"]);
/// assert!(cache.is_ended());
/// ```
pub fn of<T: Clone + 'static>(values: Vec<T>) -> Stream<T> {
    Stream::new(OfProducer {
        values: Rc::new(values),
    })
}

struct IterProducer<I> {
    iterable: I,
}

impl<I> Producer<I::Item> for IterProducer<I>
where
    I: IntoIterator + Clone,
    I::IntoIter: 'static,
    I::Item: 'static,
{
    fn connect(&self, consumer: Rc<dyn Consumer<I::Item>>) {
        consumer.greet(Rc::new(IterControl {
            consumer: Rc::clone(&consumer),
            iter: RefCell::new(self.iterable.clone().into_iter()),
            in_loop: Cell::new(false),
            got: Cell::new(false),
            done: Cell::new(false),
            disposed: Cell::new(false),
        }));
    }
}

struct IterControl<It: Iterator> {
    consumer: Rc<dyn Consumer<It::Item>>,
    iter: RefCell<It>,
    in_loop: Cell<bool>,
    got: Cell<bool>,
    done: Cell<bool>,
    disposed: Cell<bool>,
}

impl<It: Iterator> IterControl<It> {
    /// Serves requests one value at a time. Requests made from inside `receive` are folded into
    /// the running loop instead of recursing.
    fn drain(&self) {
        self.in_loop.set(true);
        while self.got.get() && !self.disposed.get() {
            self.got.set(false);
            let next = self.iter.borrow_mut().next();
            match next {
                Some(value) => self.consumer.receive(value),
                None => {
                    self.done.set(true);
                    self.consumer.end(None);
                    break;
                }
            }
        }
        self.in_loop.set(false);
    }
}

impl<It: Iterator> Control for IterControl<It> {
    fn start(&self) {
        self.disposed.set(false);
    }

    fn request(&self) {
        self.got.set(true);
        if !self.in_loop.get() && !self.done.get() {
            self.drain();
        }
    }

    fn stop(&self, _reason: Option<Error>) {
        self.disposed.set(true);
    }
}

/// A pull stream over an iterable: every `request` yields exactly one item, and the stream ends
/// when the iterator is exhausted. Each connection iterates over its own clone of `iterable`.
///
/// # Examples
/// ```
/// use rill_streams::{from_iter, ReactiveCache};
///
/// let cache = ReactiveCache::from_stream(from_iter(vec![1, 2, 3]));
/// assert_eq!(cache.get_cloned(), vec![1, 2, 3]);
/// ```
pub fn from_iter<I>(iterable: I) -> Stream<I::Item>
where
    I: IntoIterator + Clone + 'static,
    I::IntoIter: 'static,
    I::Item: 'static,
{
    Stream::new(IterProducer { iterable })
}

/// Ends (optionally with a reason) as soon as it is started or pulled.
struct TerminalControl<T> {
    consumer: Rc<dyn Consumer<T>>,
    reason: Option<Error>,
    ended: Cell<bool>,
}

impl<T> TerminalControl<T> {
    fn finish(&self) {
        if !self.ended.replace(true) {
            self.consumer.end(self.reason.clone());
        }
    }
}

impl<T> Control for TerminalControl<T> {
    fn start(&self) {
        self.finish();
    }

    fn request(&self) {
        self.finish();
    }

    fn stop(&self, _reason: Option<Error>) {}
}

struct TerminalProducer {
    reason: Option<Error>,
}

impl<T: 'static> Producer<T> for TerminalProducer {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        consumer.greet(Rc::new(TerminalControl {
            consumer: Rc::clone(&consumer),
            reason: self.reason.clone(),
            ended: Cell::new(false),
        }));
    }
}

/// A stream that ends without emitting.
pub fn empty<T: 'static>() -> Stream<T> {
    Stream::new(TerminalProducer { reason: None })
}

/// A stream that fails with `error` without emitting.
pub fn fail<T: 'static>(error: Error) -> Stream<T> {
    Stream::new(TerminalProducer {
        reason: Some(error),
    })
}

/// A stream that never emits and never ends.
pub fn never<T: 'static>() -> Stream<T> {
    super::source(|consumer: Rc<dyn Consumer<T>>| consumer.greet(talkback().build()))
}

struct IntervalProducer {
    clock: Clock,
    period: Duration,
}

impl Producer<u64> for IntervalProducer {
    fn connect(&self, consumer: Rc<dyn Consumer<u64>>) {
        let control = Rc::new_cyclic(|me| IntervalControl {
            me: me.clone(),
            consumer: Rc::clone(&consumer),
            clock: self.clock.clone(),
            period: self.period,
            count: Cell::new(0),
            interval: Cell::new(None),
            leftover: Cell::new(None),
            run_flag: Cell::new(Duration::ZERO),
            start_flag: Cell::new(Duration::ZERO),
            remainder: Cell::new(Duration::ZERO),
            stopped: Cell::new(true),
        });
        consumer.greet(control);
    }
}

struct IntervalControl {
    me: Weak<IntervalControl>,
    consumer: Rc<dyn Consumer<u64>>,
    clock: Clock,
    period: Duration,
    count: Cell<u64>,
    interval: Cell<Option<TimerId>>,
    leftover: Cell<Option<TimerId>>,
    run_flag: Cell<Duration>,
    start_flag: Cell<Duration>,
    remainder: Cell<Duration>,
    stopped: Cell<bool>,
}

impl IntervalControl {
    fn step(&self) {
        let count = self.count.get();
        self.count.set(count + 1);
        self.consumer.receive(count);
    }

    fn run(&self) {
        if self.stopped.get() {
            return;
        }
        self.run_flag.set(self.clock.now());
        self.leftover.set(None);
        if self.interval.get().is_none() {
            let me = self.me.clone();
            self.interval.set(Some(self.clock.set_interval(self.period, move || {
                if let Some(me) = me.upgrade() {
                    me.step();
                }
            })));
        }
    }
}

impl Control for IntervalControl {
    fn start(&self) {
        if !self.stopped.replace(false) {
            return;
        }
        self.start_flag.set(self.clock.now());
        let remainder = self.remainder.get();
        if remainder.is_zero() {
            self.run();
            return;
        }
        log::trace!("interval: resuming with {:?} left of the current period", remainder);
        let me = self.me.clone();
        self.leftover.set(Some(self.clock.set_timeout(remainder, move || {
            if let Some(me) = me.upgrade() {
                me.leftover.set(None);
                me.step();
                me.run();
            }
        })));
    }

    fn request(&self) {}

    fn stop(&self, _reason: Option<Error>) {
        if self.stopped.replace(true) {
            return;
        }
        let now = self.clock.now();
        if let Some(interval) = self.interval.take() {
            self.clock.clear(interval);
            let period = self.period.as_nanos();
            let elapsed = (now - self.run_flag.get()).as_nanos();
            let remainder = (period - elapsed % period) % period;
            self.remainder.set(Duration::from_nanos(remainder as u64));
        }
        if let Some(leftover) = self.leftover.take() {
            self.clock.clear(leftover);
            let waited = now - self.start_flag.get();
            self.remainder.set(self.remainder.get().saturating_sub(waited));
        }
        log::trace!("interval: paused with {:?} left of the current period", self.remainder.get());
    }
}

/// Emits 0, 1, 2, ... every `period` of `clock` while started.
///
/// Pausing keeps the phase: after `stop` and a later `start`, the next value arrives once the
/// rest of the interrupted period has elapsed, no matter how long the pause lasted.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use rill_streams::{interval, Clock, ReactiveCache};
///
/// let clock = Clock::new();
/// let cache = ReactiveCache::from_stream(interval(&clock, Duration::from_millis(100)));
///
/// clock.advance(Duration::from_millis(350));
/// assert_eq!(cache.get_cloned(), vec![0, 1, 2]);
/// ```
pub fn interval(clock: &Clock, period: Duration) -> Stream<u64> {
    Stream::new(IntervalProducer {
        clock: clock.clone(),
        period: period.max(Duration::from_millis(1)),
    })
}

struct DeferredProducer<T> {
    deferred: Deferred<Result<T>>,
}

impl<T: Clone + 'static> Producer<T> for DeferredProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        let control = Rc::new_cyclic(|me| DeferredControl {
            me: me.clone(),
            consumer: Rc::clone(&consumer),
            deferred: self.deferred.clone(),
            subscribed: Cell::new(false),
            disposed: Cell::new(false),
            delivered: Cell::new(false),
        });
        consumer.greet(control);
    }
}

struct DeferredControl<T> {
    me: Weak<DeferredControl<T>>,
    consumer: Rc<dyn Consumer<T>>,
    deferred: Deferred<Result<T>>,
    subscribed: Cell<bool>,
    disposed: Cell<bool>,
    delivered: Cell<bool>,
}

impl<T: Clone + 'static> DeferredControl<T> {
    fn deliver(&self, settled: Result<T>) {
        if self.disposed.get() || self.delivered.replace(true) {
            return;
        }
        match settled {
            Ok(value) => {
                self.consumer.receive(value);
                self.consumer.end(None);
            }
            Err(err) => self.consumer.end(Some(err)),
        }
    }
}

impl<T: Clone + 'static> Control for DeferredControl<T> {
    fn start(&self) {
        self.disposed.set(false);
        if let Some(settled) = self.deferred.value() {
            self.deliver(settled);
            return;
        }
        if !self.subscribed.replace(true) {
            let me = self.me.clone();
            self.deferred.then(move |settled| {
                if let Some(me) = me.upgrade() {
                    me.deliver(settled);
                }
            });
        }
    }

    fn request(&self) {}

    fn stop(&self, _reason: Option<Error>) {
        self.disposed.set(true);
    }
}

/// Emits the value of `deferred` once it settles and ends, or fails with its error.
///
/// # Examples
/// ```
/// use rill_streams::{from_deferred, Deferred, ReactiveCache};
///
/// let deferred = Deferred::new();
/// let cache = ReactiveCache::from_stream(from_deferred(&deferred));
///
/// deferred.resolve(Ok(7));
/// assert_eq!(cache.get_cloned(), vec![7]);
/// assert!(cache.is_ended());
/// ```
pub fn from_deferred<T: Clone + 'static>(deferred: &Deferred<Result<T>>) -> Stream<T> {
    Stream::new(DeferredProducer {
        deferred: deferred.clone(),
    })
}

#[cfg(test)]
mod tests {
    use crate::{empty, fail, from_deferred, from_iter, never, of, sink, Control, Deferred, Error, ReactiveCache};
    use std::cell::RefCell;
    use std::rc::Rc;

    type ControlSlot = Rc<RefCell<Option<Rc<dyn Control>>>>;

    fn control_of(slot: &ControlSlot) -> Rc<dyn Control> {
        slot.borrow().clone().expect("greeted")
    }

    #[test]
    fn of_resumes_where_it_stopped() {
        let seen = Rc::new(RefCell::new(vec![]));
        let slot: ControlSlot = Rc::new(RefCell::new(None));

        let (slot_write, slot_read, seen_write) = (slot.clone(), slot.clone(), seen.clone());
        of(vec![1, 2, 3, 4]).connect(
            sink()
                .on_greet(move |control| *slot_write.borrow_mut() = Some(control))
                .on_receive(move |val: i32| {
                    seen_write.borrow_mut().push(val);
                    if val == 2 {
                        control_of(&slot_read).stop(None);
                    }
                })
                .build(),
        );

        control_of(&slot).start();
        assert_eq!(*seen.borrow(), vec![1, 2]);

        control_of(&slot).start();
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn from_iter_only_emits_on_request() {
        let seen = Rc::new(RefCell::new(vec![]));
        let slot: ControlSlot = Rc::new(RefCell::new(None));

        let (slot_write, seen_write) = (slot.clone(), seen.clone());
        from_iter(1..).connect(
            sink()
                .on_greet(move |control| *slot_write.borrow_mut() = Some(control))
                .on_receive(move |val: i32| seen_write.borrow_mut().push(val))
                .build(),
        );

        control_of(&slot).start();
        assert!(seen.borrow().is_empty());

        control_of(&slot).request();
        control_of(&slot).request();
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn terminal_sources() {
        let ended = ReactiveCache::from_stream(empty::<i32>());
        assert!(ended.is_ended());
        assert!(ended.error().is_none());

        let failed = ReactiveCache::from_stream(fail::<i32>(Error::msg("nope")));
        assert!(failed.is_ended());
        assert!(failed.error().is_some());

        let silent = ReactiveCache::from_stream(never::<i32>());
        assert!(!silent.is_ended());
        assert!(silent.get_cloned().is_empty());
    }

    #[test]
    fn from_deferred_forwards_failures() {
        let deferred: Deferred<crate::Result<i32>> = Deferred::new();
        let cache = ReactiveCache::from_stream(from_deferred(&deferred));
        assert!(!cache.is_ended());

        deferred.resolve(Err(Error::msg("refused")));
        assert!(cache.get_cloned().is_empty());
        assert_eq!(cache.error().map(|err| err.to_string()), Some("refused".to_string()));
    }
}
