use super::{Error, Stream, Subscription};
use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Stores the last N values emitted by a stream. It is similar to ReactiveValue (which
/// stores the most recent value emitted by a stream), but also remembers whether the stream
/// ended and why.
///
/// ReactiveCache has some practical uses in reactive implementations, but is especially
/// helpful inside unit tests to monitor streams. It pulls after every value, so it drains pull
/// sources as well as push sources.
///
/// # Examples
/// ```
/// use rill_streams::{ReactiveCache, StreamHost};
///
/// let stream_host: StreamHost<i32> = StreamHost::new();
/// let stream = stream_host.get_stream();
///
/// let cache = ReactiveCache::from_stream(stream);
/// assert_eq!(cache.get().len(), 0);
///
/// stream_host.emit(100);
/// assert_eq!(cache.get().len(), 1);
/// assert_eq!(cache.get()[0], 100);
///
/// stream_host.end(None);
/// assert!(cache.is_ended());
/// ```
pub struct ReactiveCache<T: 'static> {
    cache: Rc<RefCell<VecDeque<T>>>,
    subscription: Subscription<T>,
}

impl<T: 'static> ReactiveCache<T> {
    /// Constructs a new infinite-size ReactiveCache from a stream. This cache will
    /// store all items emitted by the stream until explicitly cleared.
    pub fn from_stream(stream: Stream<T>) -> ReactiveCache<T> {
        ReactiveCache::from_stream_with_max_size_option(stream, None)
    }

    /// Constructs a new finite-size ReactiveCache from a stream. This cache will hold
    /// at most the most recent `size` values emitted by the stream.
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{ReactiveCache, StreamHost};
    ///
    /// let stream_host: StreamHost<i32> = StreamHost::new();
    /// let cache = ReactiveCache::from_stream_with_size(stream_host.get_stream(), 2);
    ///
    /// stream_host.emit(100);
    /// stream_host.emit(200);
    /// stream_host.emit(300);
    /// assert_eq!(cache.get_cloned(), vec![200, 300]);
    /// ```
    pub fn from_stream_with_size(stream: Stream<T>, size: usize) -> ReactiveCache<T> {
        ReactiveCache::from_stream_with_max_size_option(stream, Some(size))
    }

    fn from_stream_with_max_size_option(
        stream: Stream<T>,
        max_size: Option<usize>,
    ) -> ReactiveCache<T> {
        let cache = Rc::new(RefCell::new(match max_size {
            Some(size) => VecDeque::with_capacity(size),
            None => VecDeque::new(),
        }));

        let subscription_cache = Rc::clone(&cache);
        let subscription = stream.subscribe(move |val| {
            let mut cache = subscription_cache.borrow_mut();
            if let Some(size) = max_size {
                if cache.len() >= size {
                    cache.pop_front();
                }
            }
            cache.push_back(val);
        });

        ReactiveCache {
            cache,
            subscription,
        }
    }

    /// Returns a VecDeque containing recent values emitted by the stream, ordered such that
    /// the newest values are at the back of the queue.
    pub fn get(&self) -> Ref<VecDeque<T>> {
        self.cache.borrow()
    }

    /// Similar to `get()`, but clones the values out of the cache, for easier testing.
    pub fn get_cloned(&self) -> VecDeque<T>
    where
        T: Clone,
    {
        self.get().clone()
    }

    /// Removes all values from the queue, freeing memory.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear()
    }

    pub fn is_ended(&self) -> bool {
        self.subscription.is_ended()
    }

    /// The reason the stream ended with, if it failed.
    pub fn error(&self) -> Option<Error> {
        self.subscription.error()
    }
}
