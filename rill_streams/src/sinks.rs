use super::streams::ControlCell;
use super::{Consumer, Control, Deferred, Error, Result, Stream};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A consumer that drives a push stream and ignores its values. Use `inspect` or `finalize`
/// upstream to react to what flows through it.
///
/// The observation is also the control of its connection: `stop` pauses the stream and `start`
/// resumes it. Repeated `start` calls are ignored while running.
pub struct Observation<T> {
    control: ControlCell,
    autostart: bool,
    started: Cell<bool>,
    ended: Cell<bool>,
    reason: RefCell<Option<Error>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Observation<T> {
    fn new(autostart: bool) -> Observation<T> {
        Observation {
            control: ControlCell::default(),
            autostart,
            started: Cell::new(false),
            ended: Cell::new(false),
            reason: RefCell::new(None),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    /// The reason the observed stream failed with, if it did.
    pub fn error(&self) -> Option<Error> {
        self.reason.borrow().clone()
    }
}

impl<T> Consumer<T> for Observation<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(control) && self.autostart {
            Control::start(self);
        }
    }

    fn receive(&self, _value: T) {}

    fn end(&self, reason: Option<Error>) {
        self.ended.set(true);
        self.started.set(false);
        self.control.take();
        *self.reason.borrow_mut() = reason;
    }
}

impl<T> Control for Observation<T> {
    fn start(&self) {
        if !self.started.get() && self.control.is_set() {
            self.started.set(true);
            self.control.start();
        }
    }

    fn request(&self) {
        self.control.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.started.set(false);
        self.control.stop(reason);
    }
}

/// Connects to `stream` and starts it right away.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use rill_streams::{observe, Control, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let total = Rc::new(Cell::new(0));
///
/// let total_write = total.clone();
/// let observation = observe(
///     &stream_host.get_stream().inspect(move |val| total_write.set(total_write.get() + val)),
/// );
///
/// stream_host.emit(1);
/// observation.stop(None);
/// stream_host.emit(10);
/// observation.start();
/// stream_host.emit(100);
///
/// assert_eq!(total.get(), 101);
/// ```
pub fn observe<T: 'static>(stream: &Stream<T>) -> Rc<Observation<T>> {
    let observation = Rc::new(Observation::new(true));
    stream.connect(observation.clone());
    observation
}

/// Connects to `stream` without starting it. Call `start` on the observation when ready.
pub fn observe_later<T: 'static>(stream: &Stream<T>) -> Rc<Observation<T>> {
    let observation = Rc::new(Observation::new(false));
    stream.connect(observation.clone());
    observation
}

/// A consumer that pulls a stream one value at a time, requesting the next value as soon as the
/// previous one arrived.
pub struct Iteration<T> {
    control: ControlCell,
    autostart: bool,
    started: Cell<bool>,
    ended: Cell<bool>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Iteration<T> {
    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }
}

impl<T> Consumer<T> for Iteration<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(control) && self.autostart {
            Control::start(self);
        }
    }

    fn receive(&self, _value: T) {
        self.control.request();
    }

    fn end(&self, _reason: Option<Error>) {
        self.ended.set(true);
        self.control.take();
    }
}

impl<T> Control for Iteration<T> {
    fn start(&self) {
        if !self.started.get() && self.control.is_set() {
            self.started.set(true);
            self.control.start();
            self.control.request();
        }
    }

    fn request(&self) {
        self.control.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.control.stop(reason);
    }
}

fn iteration<T: 'static>(stream: &Stream<T>, autostart: bool) -> Rc<Iteration<T>> {
    let iteration = Rc::new(Iteration {
        control: ControlCell::default(),
        autostart,
        started: Cell::new(false),
        ended: Cell::new(false),
        _marker: std::marker::PhantomData,
    });
    stream.connect(iteration.clone());
    iteration
}

/// Connects to `stream`, starts it and pulls it until it ends.
///
/// # Examples
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use rill_streams::{from_iter, iterate};
///
/// let seen = Rc::new(RefCell::new(vec![]));
/// let seen_write = seen.clone();
/// let iteration = iterate(&from_iter(1..4).inspect(move |val| seen_write.borrow_mut().push(*val)));
///
/// assert_eq!(*seen.borrow(), vec![1, 2, 3]);
/// assert!(iteration.is_ended());
/// ```
pub fn iterate<T: 'static>(stream: &Stream<T>) -> Rc<Iteration<T>> {
    iteration(stream, true)
}

/// Connects to `stream` without pulling. The first `start` begins the iteration.
pub fn iterate_later<T: 'static>(stream: &Stream<T>) -> Rc<Iteration<T>> {
    iteration(stream, false)
}

/// Calls its handler with the first value of a stream, then disconnects.
pub struct Notification<T> {
    control: ControlCell,
    handler: Box<dyn Fn(T)>,
    notified: Cell<bool>,
}

impl<T> Notification<T> {
    pub fn is_notified(&self) -> bool {
        self.notified.get()
    }
}

impl<T> Consumer<T> for Notification<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(Rc::clone(&control)) {
            control.start();
            self.control.request();
        }
    }

    fn receive(&self, value: T) {
        if self.notified.replace(true) {
            return;
        }
        (self.handler)(value);
        if let Some(control) = self.control.take() {
            control.stop(None);
        }
    }

    fn end(&self, _reason: Option<Error>) {
        self.control.take();
    }
}

impl<T> Control for Notification<T> {
    fn start(&self) {}

    fn request(&self) {
        self.control.request();
    }

    fn stop(&self, reason: Option<Error>) {
        self.control.stop(reason);
    }
}

/// Calls `handler` with the next value of `stream`.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use rill_streams::{notify, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let last = Rc::new(Cell::new(0));
///
/// let last_write = last.clone();
/// notify(&stream_host.get_stream(), move |val| last_write.set(val));
///
/// stream_host.emit(1);
/// stream_host.emit(2);
/// assert_eq!(last.get(), 1);
/// assert_eq!(stream_host.count_subscribers(), 0);
/// ```
pub fn notify<T, F>(stream: &Stream<T>, handler: F) -> Rc<Notification<T>>
where
    T: 'static,
    F: Fn(T) + 'static,
{
    let notification = Rc::new(Notification {
        control: ControlCell::default(),
        handler: Box::new(handler),
        notified: Cell::new(false),
    });
    stream.connect(notification.clone());
    notification
}

struct Subscriber<T> {
    control: ControlCell,
    handler: Box<dyn Fn(T)>,
    ended: Cell<bool>,
    reason: RefCell<Option<Error>>,
}

impl<T> Consumer<T> for Subscriber<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(Rc::clone(&control)) {
            control.start();
            self.control.request();
        }
    }

    fn receive(&self, value: T) {
        if self.ended.get() {
            return;
        }
        (self.handler)(value);
        self.control.request();
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        self.control.take();
        *self.reason.borrow_mut() = reason;
    }
}

/// A running connection that hands every value of a stream to a callback. The stream is pulled
/// after each value, so pull sources are drained as well.
///
/// Dropping the subscription stops the stream.
pub struct Subscription<T> {
    pub(crate) stream: Stream<T>,
    subscriber: Rc<Subscriber<T>>,
}

impl<T> Subscription<T> {
    pub fn is_ended(&self) -> bool {
        self.subscriber.ended.get()
    }

    /// The reason the stream failed with, if it did.
    pub fn error(&self) -> Option<Error> {
        self.subscriber.reason.borrow().clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(control) = self.subscriber.control.take() {
            control.stop(None);
        }
    }
}

/// Settles a deferred value with the value at a 1-based position, or with the last value when
/// `target` is `None`.
struct NthConsumer<T> {
    control: ControlCell,
    target: Option<usize>,
    index: Cell<usize>,
    last: RefCell<Option<T>>,
    deferred: Deferred<Result<T>>,
}

impl<T: Clone + 'static> Consumer<T> for NthConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(Rc::clone(&control)) {
            control.start();
            self.control.request();
        }
    }

    fn receive(&self, value: T) {
        if self.deferred.is_settled() {
            return;
        }
        let index = self.index.get() + 1;
        self.index.set(index);
        if self.target == Some(index) {
            if let Some(control) = self.control.take() {
                control.stop(None);
            }
            self.deferred.resolve(Ok(value));
        } else {
            *self.last.borrow_mut() = Some(value);
            self.control.request();
        }
    }

    fn end(&self, reason: Option<Error>) {
        self.control.take();
        if self.deferred.is_settled() {
            return;
        }
        let last = self.last.borrow_mut().take();
        let settled = match (reason, self.target, last) {
            (Some(err), _, _) => Err(err),
            (None, None, Some(last)) => Ok(last),
            (None, target, _) => Err(Error::NotEnoughEmissions {
                expected: target.unwrap_or(1).max(1),
                actual: self.index.get(),
            }),
        };
        self.deferred.resolve(settled);
    }
}

fn settle_nth<T: Clone + 'static>(stream: &Stream<T>, target: Option<usize>) -> Deferred<Result<T>> {
    let deferred = Deferred::new();
    stream.connect(Rc::new(NthConsumer {
        control: ControlCell::default(),
        target,
        index: Cell::new(0),
        last: RefCell::new(None),
        deferred: deferred.clone(),
    }));
    deferred
}

/// The first value of `stream`. Fails with `Error::NotEnoughEmissions` if the stream ends
/// without emitting.
///
/// # Examples
/// ```
/// use rill_streams::{first, of};
///
/// let value = first(&of(vec![4, 5, 6]));
/// assert_eq!(value.value().map(|res| res.ok()), Some(Some(4)));
/// ```
pub fn first<T: Clone + 'static>(stream: &Stream<T>) -> Deferred<Result<T>> {
    settle_nth(stream, Some(1))
}

/// The last value of `stream`, available once it ends.
pub fn last<T: Clone + 'static>(stream: &Stream<T>) -> Deferred<Result<T>> {
    settle_nth(stream, None)
}

/// The `target`-th value of `stream`, counting from 1.
pub fn nth<T: Clone + 'static>(stream: &Stream<T>, target: usize) -> Deferred<Result<T>> {
    settle_nth(stream, Some(target))
}

impl<T: 'static> Stream<T> {
    /// Connects to the stream and calls `handler` with every value until the returned
    /// `Subscription` is dropped.
    ///
    /// # Examples
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use rill_streams::StreamHost;
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let last_value = Rc::new(Cell::new(0));
    ///
    /// let last_value_write = last_value.clone();
    /// let subscription = stream_host.get_stream().subscribe(move |val| last_value_write.set(val));
    ///
    /// stream_host.emit(1);
    /// assert_eq!(last_value.get(), 1);
    ///
    /// drop(subscription);
    /// stream_host.emit(100);
    /// assert_eq!(last_value.get(), 1);
    /// ```
    pub fn subscribe<F: Fn(T) + 'static>(&self, handler: F) -> Subscription<T> {
        let subscriber = Rc::new(Subscriber {
            control: ControlCell::default(),
            handler: Box::new(handler),
            ended: Cell::new(false),
            reason: RefCell::new(None),
        });
        self.connect(subscriber.clone());
        Subscription {
            stream: self.clone(),
            subscriber,
        }
    }

    pub fn observe(&self) -> Rc<Observation<T>> {
        observe(self)
    }

    pub fn iterate(&self) -> Rc<Iteration<T>> {
        iterate(self)
    }

    pub fn notify<F: Fn(T) + 'static>(&self, handler: F) -> Rc<Notification<T>> {
        notify(self, handler)
    }
}

impl<T: Clone + 'static> Stream<T> {
    pub fn first(&self) -> Deferred<Result<T>> {
        first(self)
    }

    pub fn last(&self) -> Deferred<Result<T>> {
        last(self)
    }

    pub fn nth(&self, target: usize) -> Deferred<Result<T>> {
        nth(self, target)
    }
}

#[cfg(test)]
mod tests {
    use crate::{first, from_iter, iterate_later, last, notify, nth, of, Control, Error, StreamHost};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn nth_fails_when_the_stream_is_too_short() {
        let third = nth(&of(vec![1, 2]), 3);
        match third.value() {
            Some(Err(Error::NotEnoughEmissions { expected, actual })) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            _ => panic!("expected a NotEnoughEmissions error"),
        }
    }

    #[test]
    fn last_waits_for_the_end() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let value = last(&stream_host.get_stream());

        stream_host.emit(1);
        stream_host.emit(2);
        assert!(!value.is_settled());

        stream_host.end(None);
        assert_eq!(value.value().and_then(|res| res.ok()), Some(2));
    }

    #[test]
    fn first_forwards_failures() {
        let stream_host: StreamHost<i32> = StreamHost::new();
        let value = first(&stream_host.get_stream());

        stream_host.end(Some(Error::msg("gone")));
        assert_eq!(
            value.value().and_then(|res| res.err()).map(|err| err.to_string()),
            Some("gone".to_string())
        );
    }

    #[test]
    fn iterate_later_waits_for_start() {
        let stream = of(vec![1, 2, 3]);
        let iteration = iterate_later(&stream);
        assert!(!iteration.is_ended());

        iteration.start();
        assert!(iteration.is_ended());
    }

    #[test]
    fn notify_pulls_one_value_then_stops() {
        let seen = Rc::new(RefCell::new(vec![]));
        let seen_write = seen.clone();
        let notification = notify(&from_iter(5..), move |val| seen_write.borrow_mut().push(val));
        assert_eq!(*seen.borrow(), vec![5]);

        notification.request();
        assert_eq!(*seen.borrow(), vec![5]);
    }
}
