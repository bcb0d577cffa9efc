use super::Error;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The receiving end of one connection.
///
/// Per connection a Consumer sees `greet` exactly once, then any number of `receive` calls, then
/// at most one `end`. `end(None)` is a graceful completion, `end(Some(reason))` a failure. After
/// `end` the connection is over: no more calls arrive and the Consumer must not touch the
/// Control it was greeted with.
pub trait Consumer<T> {
    fn greet(&self, control: Rc<dyn Control>);
    fn receive(&self, value: T);
    fn end(&self, reason: Option<Error>);
}

/// The command channel a Producer hands to its Consumer (a.k.a. talkback).
///
/// `start` arms a push connection, `request` asks a pull connection for exactly one more value,
/// and `stop` pauses or cancels. `stop` is idempotent and safe to call after `end`; a connection
/// that supports pausing resumes on the next `start`.
pub trait Control {
    fn start(&self);
    fn request(&self);
    fn stop(&self, reason: Option<Error>);
}

/// A stateless description of a sequence of values. Every `connect` is an independent
/// subscription unless the Producer is explicitly shared.
pub trait Producer<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>);
}

/// Identity of a stream. Clones of a `Stream` share their id, distinct constructions never do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

thread_local! {
    static NEXT_STREAM_ID: Cell<u64> = Cell::new(0);
}

impl StreamId {
    fn next() -> StreamId {
        NEXT_STREAM_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            StreamId(id)
        })
    }
}

/// Streams are handles to Producers. Like iterators they describe a sequence of values and can
/// be transformed with operators such as `map` and `filter`, but a stream may be push driven
/// (values arrive on the producer's schedule once started) or pull driven (one value per
/// `request`), and the same operators work for both.
///
/// Connecting to a stream does nothing until the consumer calls `start` (push) or `request`
/// (pull) on the control it was greeted with.
///
/// # Examples
///
/// ```
/// use rill_streams::{of, ReactiveCache};
///
/// let doubled = of(vec![1, 2, 3]).map(|val| val * 2);
/// let cache = ReactiveCache::from_stream(doubled);
///
/// assert_eq!(cache.get_cloned(), vec![2, 4, 6]);
/// assert!(cache.is_ended());
/// ```
pub struct Stream<T> {
    id: StreamId,
    pub(crate) pointer: Rc<dyn Producer<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Stream {
            id: self.id,
            pointer: Rc::clone(&self.pointer),
        }
    }
}

impl<T> Producer<T> for Stream<T> {
    fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        self.pointer.connect(consumer)
    }
}

impl<T: 'static> Stream<T> {
    /// Wraps a Producer implementation into a new stream with a fresh identity.
    pub fn new<P>(producer: P) -> Stream<T>
    where
        P: Producer<T>,
        P: 'static,
    {
        Stream::from_rc(Rc::new(producer))
    }

    pub fn from_rc(pointer: Rc<dyn Producer<T>>) -> Stream<T> {
        Stream {
            id: StreamId::next(),
            pointer,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Connects a consumer. The consumer is greeted synchronously, before this call returns.
    pub fn connect(&self, consumer: Rc<dyn Consumer<T>>) {
        self.pointer.connect(consumer)
    }

    // PRIVATE FUNCTIONS

    /// Builds a derived stream whose every connection wraps the downstream consumer in an
    /// adapter consumer produced by `adapt`, then connects the adapter to this stream.
    pub(crate) fn create_derived_stream<U, F>(&self, adapt: F) -> Stream<U>
    where
        F: Fn(Rc<dyn Consumer<U>>) -> Rc<dyn Consumer<T>>,
        F: 'static,
        U: 'static,
    {
        let upstream = self.clone();
        super::source(move |downstream| upstream.connect(adapt(downstream)))
    }
}

/// Holds the Control an adapter was greeted with. Every call goes through here, so a missing
/// Control is a no-op and no borrow is held while the Control runs (it may re-enter).
#[derive(Default)]
pub(crate) struct ControlCell {
    control: RefCell<Option<Rc<dyn Control>>>,
}

impl ControlCell {
    pub(crate) fn set(&self, control: Rc<dyn Control>) {
        *self.control.borrow_mut() = Some(control);
    }

    /// Stores the control unless one is already present. Returns false for redundant greets.
    pub(crate) fn set_once(&self, control: Rc<dyn Control>) -> bool {
        let mut slot = self.control.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(control);
        true
    }

    pub(crate) fn get(&self) -> Option<Rc<dyn Control>> {
        self.control.borrow().clone()
    }

    pub(crate) fn take(&self) -> Option<Rc<dyn Control>> {
        self.control.borrow_mut().take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.control.borrow().is_some()
    }

    pub(crate) fn start(&self) {
        if let Some(control) = self.get() {
            control.start();
        }
    }

    pub(crate) fn request(&self) {
        if let Some(control) = self.get() {
            control.request();
        }
    }

    pub(crate) fn stop(&self, reason: Option<Error>) {
        if let Some(control) = self.get() {
            control.stop(reason);
        }
    }
}
