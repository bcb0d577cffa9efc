use super::{Consumer, Control, Error, Producer, Stream};
use std::cell::Cell;
use std::rc::Rc;

struct HandlerSource<F>(F);

impl<T, F> Producer<T> for HandlerSource<F>
where
    F: Fn(Rc<dyn Consumer<T>>),
{
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        (self.0)(consumer)
    }
}

/// Creates a stream from a connect handler. The handler is called once per connection and
/// must greet the consumer it is handed.
///
/// # Examples
/// ```
/// use rill_streams::{source, talkback, ReactiveCache};
///
/// let stream = source(|consumer| {
///     let target = consumer.clone();
///     consumer.greet(
///         talkback()
///             .on_start(move || {
///                 target.receive(42);
///                 target.end(None);
///             })
///             .build(),
///     );
/// });
///
/// let cache = ReactiveCache::from_stream(stream);
/// assert_eq!(cache.get_cloned(), vec![42]);
/// ```
pub fn source<T, F>(handler: F) -> Stream<T>
where
    F: Fn(Rc<dyn Consumer<T>>),
    F: 'static,
    T: 'static,
{
    Stream::new(HandlerSource(handler))
}

/// Consumer assembled from optional callbacks. Redundant greets are ignored and nothing is
/// delivered after `end`.
pub struct CustomSink<T> {
    greet: Option<Box<dyn Fn(Rc<dyn Control>)>>,
    receive: Option<Box<dyn Fn(T)>>,
    end: Option<Box<dyn Fn(Option<Error>)>>,
    greeted: Cell<bool>,
    ended: Cell<bool>,
}

pub fn sink<T>() -> CustomSink<T> {
    CustomSink {
        greet: None,
        receive: None,
        end: None,
        greeted: Cell::new(false),
        ended: Cell::new(false),
    }
}

impl<T: 'static> CustomSink<T> {
    pub fn on_greet<F: Fn(Rc<dyn Control>) + 'static>(mut self, handler: F) -> Self {
        self.greet = Some(Box::new(handler));
        self
    }

    pub fn on_receive<F: Fn(T) + 'static>(mut self, handler: F) -> Self {
        self.receive = Some(Box::new(handler));
        self
    }

    pub fn on_end<F: Fn(Option<Error>) + 'static>(mut self, handler: F) -> Self {
        self.end = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Rc<dyn Consumer<T>> {
        Rc::new(self)
    }
}

impl<T> Consumer<T> for CustomSink<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.greeted.replace(true) {
            return;
        }
        if let Some(handler) = &self.greet {
            handler(control);
        }
    }

    fn receive(&self, value: T) {
        if self.ended.get() {
            return;
        }
        if let Some(handler) = &self.receive {
            handler(value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.ended.replace(true) {
            return;
        }
        if let Some(handler) = &self.end {
            handler(reason);
        }
    }
}

/// Control assembled from optional callbacks.
#[derive(Default)]
pub struct CustomControl {
    start: Option<Box<dyn Fn()>>,
    request: Option<Box<dyn Fn()>>,
    stop: Option<Box<dyn Fn(Option<Error>)>>,
}

pub fn talkback() -> CustomControl {
    CustomControl::default()
}

impl CustomControl {
    pub fn on_start<F: Fn() + 'static>(mut self, handler: F) -> Self {
        self.start = Some(Box::new(handler));
        self
    }

    pub fn on_request<F: Fn() + 'static>(mut self, handler: F) -> Self {
        self.request = Some(Box::new(handler));
        self
    }

    pub fn on_stop<F: Fn(Option<Error>) + 'static>(mut self, handler: F) -> Self {
        self.stop = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Rc<dyn Control> {
        Rc::new(self)
    }
}

impl Control for CustomControl {
    fn start(&self) {
        if let Some(handler) = &self.start {
            handler();
        }
    }

    fn request(&self) {
        if let Some(handler) = &self.request {
            handler();
        }
    }

    fn stop(&self, reason: Option<Error>) {
        if let Some(handler) = &self.stop {
            handler(reason);
        }
    }
}
