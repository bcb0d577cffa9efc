use super::streams::ControlCell;
use super::{wait, Consumer, Control, Error, Producer, Result, Stream, Wait, WaitSpec, Waiting};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Slot for the wait an operator is currently blocked on.
#[derive(Default)]
struct PendingWait {
    waiting: RefCell<Option<Waiting>>,
}

impl PendingWait {
    fn set(&self, waiting: Waiting) {
        let previous = self.waiting.borrow_mut().replace(waiting);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn reset(&self) {
        let waiting = self.waiting.borrow_mut().take();
        if let Some(waiting) = waiting {
            waiting.cancel();
        }
    }

    fn is_pending(&self) -> bool {
        self.waiting
            .borrow()
            .as_ref()
            .map_or(false, |waiting| waiting.is_pending())
    }
}

struct DebounceConsumer<T> {
    me: Weak<DebounceConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    spec: WaitSpec<T>,
    pending: PendingWait,
    should_terminate: Cell<bool>,
    disposed: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> DebounceConsumer<T> {
    fn bleed(&self, value: T) {
        if self.disposed.get() {
            return;
        }
        self.pending.reset();
        self.downstream.receive(value);
        if self.should_terminate.get() && !self.disposed.replace(true) {
            self.downstream.end(None);
        }
    }

    fn fail(&self, err: Error) {
        self.disposed.set(true);
        self.pending.reset();
        self.upstream.stop(Some(err.clone()));
        self.downstream.end(Some(err));
    }
}

impl<T: 'static> Consumer<T> for DebounceConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if self.disposed.get() {
            return;
        }
        self.pending.reset();
        match self.spec.resolve(&value) {
            Ok(notifier) => {
                let me = self.me.clone();
                let waiting = wait(&notifier, move || {
                    if let Some(me) = me.upgrade() {
                        me.bleed(value);
                    }
                });
                if waiting.is_pending() {
                    self.pending.set(waiting);
                }
            }
            Err(err) => self.fail(err),
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.disposed.get() {
            return;
        }
        if reason.is_none() && self.pending.is_pending() {
            self.should_terminate.set(true);
            self.upstream.take();
        } else {
            self.disposed.set(true);
            self.pending.reset();
            self.upstream.take();
            self.downstream.end(reason);
        }
    }
}

impl<T: 'static> Control for DebounceConsumer<T> {
    fn start(&self) {
        self.upstream.start();
    }

    fn request(&self) {
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.pending.reset();
        self.upstream.stop(reason);
    }
}

struct ThrottleConsumer<T> {
    me: Weak<ThrottleConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    spec: WaitSpec<T>,
    pending: PendingWait,
    disposed: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> Consumer<T> for ThrottleConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if self.disposed.get() || self.pending.is_pending() {
            return;
        }
        let notifier = match self.spec.resolve(&value) {
            Ok(notifier) => notifier,
            Err(err) => {
                self.disposed.set(true);
                self.upstream.stop(Some(err.clone()));
                self.downstream.end(Some(err));
                return;
            }
        };
        self.downstream.receive(value);
        if self.disposed.get() {
            return;
        }
        let me = self.me.clone();
        let waiting = wait(&notifier, move || {
            if let Some(me) = me.upgrade() {
                me.pending.reset();
            }
        });
        if waiting.is_pending() {
            self.pending.set(waiting);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.disposed.replace(true) {
            return;
        }
        self.pending.reset();
        self.upstream.take();
        self.downstream.end(reason);
    }
}

impl<T: 'static> Control for ThrottleConsumer<T> {
    fn start(&self) {
        self.upstream.start();
    }

    fn request(&self) {
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.pending.reset();
        self.upstream.stop(reason);
    }
}

struct PullAfterConsumer<T> {
    me: Weak<PullAfterConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    task: Rc<dyn Fn(&T) -> Result<Option<Wait>>>,
    pending: PendingWait,
    disposed: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> PullAfterConsumer<T> {
    fn pull(&self) {
        if !self.disposed.get() {
            self.upstream.request();
        }
    }
}

impl<T: 'static> Consumer<T> for PullAfterConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
        self.pull();
    }

    fn receive(&self, value: T) {
        if self.disposed.get() {
            return;
        }
        let outcome = (self.task)(&value);
        self.downstream.receive(value);
        if self.disposed.get() {
            return;
        }
        match outcome {
            Ok(Some(notifier)) => {
                let me = self.me.clone();
                let waiting = wait(&notifier, move || {
                    if let Some(me) = me.upgrade() {
                        me.pull();
                    }
                });
                if waiting.is_pending() {
                    self.pending.set(waiting);
                }
            }
            Ok(None) => self.pull(),
            Err(err) => {
                self.disposed.set(true);
                self.pending.reset();
                self.upstream.stop(Some(err.clone()));
                self.downstream.end(Some(err));
            }
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.disposed.replace(true) {
            return;
        }
        self.pending.reset();
        self.upstream.take();
        self.downstream.end(reason);
    }
}

impl<T: 'static> Control for PullAfterConsumer<T> {
    fn start(&self) {
        self.upstream.start();
    }

    fn request(&self) {
        self.upstream.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.pending.reset();
        self.upstream.stop(reason);
    }
}

struct PullrateConsumer<T> {
    me: Weak<PullrateConsumer<T>>,
    downstream: Rc<dyn Consumer<T>>,
    rate: Wait,
    pending: PendingWait,
    ended: Cell<bool>,
    upstream: ControlCell,
}

impl<T: 'static> Consumer<T> for PullrateConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.upstream.set(control);
        if let Some(me) = self.me.upgrade() {
            self.downstream.greet(me);
        }
    }

    fn receive(&self, value: T) {
        if !self.ended.get() {
            self.downstream.receive(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        self.pending.reset();
        self.upstream.take();
        self.downstream.end(reason);
    }
}

impl<T: 'static> Control for PullrateConsumer<T> {
    fn start(&self) {
        self.upstream.start();
    }

    fn request(&self) {
        self.pending.reset();
        if self.ended.get() || !self.upstream.is_set() {
            return;
        }
        let me = self.me.clone();
        let waiting = wait(&self.rate, move || {
            if let Some(me) = me.upgrade() {
                me.pending.reset();
                me.upstream.request();
            }
        });
        if waiting.is_pending() {
            self.pending.set(waiting);
        }
    }

    fn stop(&self, reason: Option<Error>) {
        self.pending.reset();
        self.upstream.stop(reason);
    }
}

struct ConnectRateProducer<T> {
    upstream: Stream<T>,
    rate: Wait,
    initial: Cell<bool>,
}

impl<T: 'static> Producer<T> for ConnectRateProducer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        if self.initial.replace(false) {
            self.upstream.connect(consumer);
            return;
        }
        let upstream = self.upstream.clone();
        wait(&self.rate, move || upstream.connect(consumer));
    }
}

impl<T: 'static> Stream<T> {
    /// Emits a value only once `notifier` has passed without a newer value arriving. A graceful
    /// end while a value is pending is delayed until that value is flushed.
    ///
    /// `notifier` is either a fixed `Wait` or a `WaitSpec::indicator` computing the wait from the
    /// value. Stopping the returned stream drops the pending value.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use rill_streams::{Clock, ReactiveCache, StreamHost, Wait};
    ///
    /// let clock = Clock::new();
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let cache = ReactiveCache::from_stream(
    ///     stream_host.get_stream().debounce(Wait::delay(&clock, Duration::from_millis(10))),
    /// );
    ///
    /// stream_host.emit(1);
    /// clock.advance(Duration::from_millis(5));
    /// stream_host.emit(2);
    /// clock.advance(Duration::from_millis(5));
    /// assert!(cache.get_cloned().is_empty());
    ///
    /// clock.advance(Duration::from_millis(5));
    /// assert_eq!(cache.get_cloned(), vec![2]);
    /// ```
    pub fn debounce<W: Into<WaitSpec<T>>>(&self, notifier: W) -> Stream<T> {
        let spec = notifier.into();
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| DebounceConsumer {
                me: me.clone(),
                downstream,
                spec: spec.clone(),
                pending: PendingWait::default(),
                should_terminate: Cell::new(false),
                disposed: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Emits the first value right away, then drops every value until `notifier` has passed.
    pub fn throttle<W: Into<WaitSpec<T>>>(&self, notifier: W) -> Stream<T> {
        let spec = notifier.into();
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| ThrottleConsumer {
                me: me.clone(),
                downstream,
                spec: spec.clone(),
                pending: PendingWait::default(),
                disposed: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Pulls right after greeting and again after every value, once the wait returned by `task`
    /// for that value is done. `Ok(None)` pulls immediately; an `Err` fails the stream and stops
    /// the upstream.
    pub fn pull_after<F>(&self, task: F) -> Stream<T>
    where
        F: Fn(&T) -> Result<Option<Wait>> + 'static,
    {
        let task: Rc<dyn Fn(&T) -> Result<Option<Wait>>> = Rc::new(task);
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| PullAfterConsumer {
                me: me.clone(),
                downstream,
                task: Rc::clone(&task),
                pending: PendingWait::default(),
                disposed: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Delays every `request` by `rate`. A new request while one is delayed replaces it.
    pub fn pullrate(&self, rate: Wait) -> Stream<T> {
        self.create_derived_stream(move |downstream| {
            Rc::new_cyclic(|me| PullrateConsumer {
                me: me.clone(),
                downstream,
                rate: rate.clone(),
                pending: PendingWait::default(),
                ended: Cell::new(false),
                upstream: ControlCell::default(),
            }) as Rc<dyn Consumer<T>>
        })
    }

    /// Connects the first consumer right away and every later one after `rate`. Meant to space
    /// out reconnections, for example in front of `retry`.
    pub fn connect_rate(&self, rate: Wait) -> Stream<T> {
        Stream::new(ConnectRateProducer {
            upstream: self.clone(),
            rate,
            initial: Cell::new(true),
        })
    }
}
