use super::{Consumer, Control, Error, Producer, Stream};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// What a fan-in connection does with a value arriving on one of its indices.
trait Relay<T, O> {
    fn relay(&self, index: usize, value: T) -> Option<O>;

    /// Value emitted when there are no sources at all.
    fn on_empty(&self) -> Option<O>;
}

struct MergeRelay;

impl<T> Relay<T, T> for MergeRelay {
    fn relay(&self, _index: usize, value: T) -> Option<T> {
        Some(value)
    }

    fn on_empty(&self) -> Option<T> {
        None
    }
}

struct CombineRelay<T> {
    buffer: RefCell<Vec<Option<T>>>,
}

impl<T: Clone> Relay<T, Vec<T>> for CombineRelay<T> {
    fn relay(&self, index: usize, value: T) -> Option<Vec<T>> {
        let mut buffer = self.buffer.borrow_mut();
        buffer[index] = Some(value);
        buffer.iter().cloned().collect()
    }

    fn on_empty(&self) -> Option<Vec<T>> {
        Some(vec![])
    }
}

#[derive(Clone)]
enum Slot {
    Idle,
    Connected(Rc<dyn Control>),
    Ended,
}

struct FanIn<T, O> {
    me: Weak<FanIn<T, O>>,
    sources: Rc<Vec<Stream<T>>>,
    downstream: Rc<dyn Consumer<O>>,
    relay: Box<dyn Relay<T, O>>,
    slots: RefCell<Vec<Slot>>,
    end_count: Cell<usize>,
    disposed: Cell<bool>,
    ended: Cell<bool>,
}

impl<T: 'static, O: 'static> FanIn<T, O> {
    fn slot(&self, index: usize) -> Slot {
        self.slots.borrow()[index].clone()
    }

    fn finish(&self, reason: Option<Error>) {
        if !self.ended.replace(true) {
            self.downstream.end(reason);
        }
    }

    /// Stops every connected index except `exempt`.
    fn dispose(&self, reason: Option<Error>, exempt: Option<usize>) {
        self.disposed.set(true);
        for index in 0..self.sources.len() {
            if Some(index) == exempt {
                continue;
            }
            if let Slot::Connected(control) = self.slot(index) {
                control.stop(reason.clone());
            }
        }
    }

    fn index_greeted(&self, index: usize, control: Rc<dyn Control>) {
        self.slots.borrow_mut()[index] = Slot::Connected(Rc::clone(&control));
        if !self.disposed.get() {
            control.start();
        }
    }

    fn index_received(&self, index: usize, value: T) {
        if self.ended.get() {
            return;
        }
        if let Some(output) = self.relay.relay(index, value) {
            self.downstream.receive(output);
        }
    }

    fn index_ended(&self, index: usize, reason: Option<Error>) {
        self.slots.borrow_mut()[index] = Slot::Ended;
        if self.ended.get() {
            return;
        }
        match reason {
            Some(err) => {
                log::debug!("fan-in: source {} failed: {}", index, err);
                self.dispose(Some(err.clone()), Some(index));
                self.finish(Some(err));
            }
            None => {
                self.end_count.set(self.end_count.get() + 1);
                if self.end_count.get() == self.sources.len() {
                    self.finish(None);
                }
            }
        }
    }
}

impl<T: 'static, O: 'static> Control for FanIn<T, O> {
    fn start(&self) {
        if self.ended.get() {
            return;
        }
        if self.sources.is_empty() {
            if let Some(output) = self.relay.on_empty() {
                self.downstream.receive(output);
            }
            self.finish(None);
            return;
        }

        self.disposed.set(false);
        for index in 0..self.sources.len() {
            if self.disposed.get() {
                break;
            }
            match self.slot(index) {
                Slot::Idle => self.sources[index].connect(Rc::new(IndexConsumer {
                    fan_in: self.me.clone(),
                    index,
                })),
                Slot::Connected(control) => control.start(),
                Slot::Ended => {}
            }
        }
    }

    fn request(&self) {
        for index in 0..self.sources.len() {
            if let Slot::Connected(control) = self.slot(index) {
                control.request();
            }
        }
    }

    fn stop(&self, reason: Option<Error>) {
        self.dispose(reason, None);
    }
}

struct IndexConsumer<T, O> {
    fan_in: Weak<FanIn<T, O>>,
    index: usize,
}

impl<T: 'static, O: 'static> Consumer<T> for IndexConsumer<T, O> {
    fn greet(&self, control: Rc<dyn Control>) {
        if let Some(fan_in) = self.fan_in.upgrade() {
            fan_in.index_greeted(self.index, control);
        }
    }

    fn receive(&self, value: T) {
        if let Some(fan_in) = self.fan_in.upgrade() {
            fan_in.index_received(self.index, value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if let Some(fan_in) = self.fan_in.upgrade() {
            fan_in.index_ended(self.index, reason);
        }
    }
}

struct FanInProducer<T, O> {
    sources: Rc<Vec<Stream<T>>>,
    make_relay: fn(usize) -> Box<dyn Relay<T, O>>,
}

impl<T: 'static, O: 'static> Producer<O> for FanInProducer<T, O> {
    fn connect(&self, consumer: Rc<dyn Consumer<O>>) {
        let count = self.sources.len();
        let fan_in = Rc::new_cyclic(|me| FanIn {
            me: me.clone(),
            sources: Rc::clone(&self.sources),
            downstream: Rc::clone(&consumer),
            relay: (self.make_relay)(count),
            slots: RefCell::new(vec![Slot::Idle; count]),
            end_count: Cell::new(0),
            disposed: Cell::new(false),
            ended: Cell::new(false),
        });
        consumer.greet(fan_in);
    }
}

/// Combines all values emitted from a list of same-typed streams into one single stream.
///
/// The merged stream ends once every source has ended, and fails (stopping the other sources)
/// as soon as one source fails. Merging no streams at all gives a stream that ends when started.
///
/// # Examples
/// ```
/// use rill_streams::{ReactiveValue, StreamHost};
///
/// let stream_host_1: StreamHost<i32> = StreamHost::new();
/// let stream_1 = stream_host_1.get_stream();
///
/// let stream_host_2: StreamHost<i32> = StreamHost::new();
/// let stream_2 = stream_host_2.get_stream();
///
/// let merged = rill_streams::merge(vec![stream_1, stream_2]);
/// let merged_value = merged.clone().to_reactive_value();
/// let emit_count = merged.count_values().to_reactive_value();
///
/// stream_host_1.emit(10);
/// assert_eq!(merged_value.get(), Some(10));
///
/// stream_host_2.emit(15);
/// assert_eq!(merged_value.get(), Some(15));
///
/// stream_host_2.emit(16);
/// stream_host_1.emit(17);
/// assert_eq!(merged_value.get(), Some(17));
/// assert_eq!(emit_count.get(), Some(4));
/// ```
pub fn merge<T: 'static>(streams: Vec<Stream<T>>) -> Stream<T> {
    Stream::new(FanInProducer {
        sources: Rc::new(streams),
        make_relay: |_| Box::new(MergeRelay),
    })
}

/// Combines the latest values of several streams into a vector.
///
/// Nothing is emitted until every source has emitted at least once; after that every new value
/// of any source emits a fresh vector holding the latest value of each source, in source order.
/// Combining no streams at all emits one empty vector and ends.
///
/// # Examples
/// ```
/// use rill_streams::{combine, ReactiveCache, StreamHost};
///
/// let a: StreamHost<i32> = StreamHost::new();
/// let b: StreamHost<i32> = StreamHost::new();
/// let cache = ReactiveCache::from_stream(combine(vec![a.get_stream(), b.get_stream()]));
///
/// a.emit(1);
/// assert!(cache.get_cloned().is_empty());
///
/// b.emit(2);
/// a.emit(3);
/// assert_eq!(cache.get_cloned(), vec![vec![1, 2], vec![3, 2]]);
/// ```
pub fn combine<T: Clone + 'static>(streams: Vec<Stream<T>>) -> Stream<Vec<T>> {
    Stream::new(FanInProducer {
        sources: Rc::new(streams),
        make_relay: |count| {
            Box::new(CombineRelay {
                buffer: RefCell::new(vec![None; count]),
            })
        },
    })
}

#[derive(Clone)]
enum Part<A, B, C> {
    First(A),
    Second(B),
    Third(C),
}

/// `combine` for two streams of different types.
pub fn combine2<A, B>(a: &Stream<A>, b: &Stream<B>) -> Stream<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    combine(vec![a.map(Part::<A, B, ()>::First), b.map(Part::Second)]).try_filter_map(|parts| {
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next()) {
            (Some(Part::First(a)), Some(Part::Second(b))) => Ok(Some((a, b))),
            _ => Ok(None),
        }
    })
}

/// `combine` for three streams of different types.
pub fn combine3<A, B, C>(a: &Stream<A>, b: &Stream<B>, c: &Stream<C>) -> Stream<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    combine(vec![
        a.map(Part::<A, B, C>::First),
        b.map(Part::Second),
        c.map(Part::Third),
    ])
    .try_filter_map(|parts| {
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Part::First(a)), Some(Part::Second(b)), Some(Part::Third(c))) => {
                Ok(Some((a, b, c)))
            }
            _ => Ok(None),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{of, source, talkback, ReactiveCache, StreamHost};

    type ConsumerSlot = Rc<RefCell<Option<Rc<dyn Consumer<i32>>>>>;

    /// A source that exposes its consumer and records whether it was stopped.
    fn probe() -> (Stream<i32>, ConsumerSlot, Rc<Cell<bool>>) {
        let slot: ConsumerSlot = Rc::new(RefCell::new(None));
        let stopped = Rc::new(Cell::new(false));
        let slot_write = Rc::clone(&slot);
        let stopped_write = Rc::clone(&stopped);
        let stream = source(move |consumer: Rc<dyn Consumer<i32>>| {
            *slot_write.borrow_mut() = Some(Rc::clone(&consumer));
            let stopped = Rc::clone(&stopped_write);
            consumer.greet(talkback().on_stop(move |_| stopped.set(true)).build());
        });
        (stream, slot, stopped)
    }

    fn fail(slot: &ConsumerSlot) {
        let consumer = slot.borrow().clone();
        if let Some(consumer) = consumer {
            consumer.end(Some(Error::msg("boom")));
        }
    }

    #[test]
    fn zero_sources() {
        let combined = ReactiveCache::from_stream(combine::<i32>(vec![]));
        assert_eq!(combined.get_cloned(), vec![Vec::<i32>::new()]);
        assert!(combined.is_ended());

        let merged = ReactiveCache::from_stream(merge::<i32>(vec![]));
        assert!(merged.get_cloned().is_empty());
        assert!(merged.is_ended());
    }

    #[test]
    fn combine_failure_stops_every_other_source() {
        let probes: Vec<_> = (0..3).map(|_| probe()).collect();
        let cache = ReactiveCache::from_stream(combine(
            probes.iter().map(|(stream, _, _)| stream.clone()).collect(),
        ));

        fail(&probes[1].1);

        assert_eq!(cache.error().map(|err| err.to_string()), Some("boom".into()));
        assert!(probes[0].2.get());
        assert!(!probes[1].2.get());
        assert!(probes[2].2.get());
    }

    #[test]
    fn merge_failure_stops_every_other_source() {
        let probes: Vec<_> = (0..3).map(|_| probe()).collect();
        let cache = ReactiveCache::from_stream(merge(
            probes.iter().map(|(stream, _, _)| stream.clone()).collect(),
        ));

        fail(&probes[2].1);

        assert_eq!(cache.error().map(|err| err.to_string()), Some("boom".into()));
        assert!(probes[0].2.get());
        assert!(probes[1].2.get());
        assert!(!probes[2].2.get());
    }

    #[test]
    fn merge_ends_after_every_source_ended() {
        let host: StreamHost<i32> = StreamHost::new();
        let cache = ReactiveCache::from_stream(merge(vec![of(vec![1, 2]), host.get_stream()]));
        assert_eq!(cache.get_cloned(), vec![1, 2]);
        assert!(!cache.is_ended());

        host.emit(3);
        host.end(None);
        assert_eq!(cache.get_cloned(), vec![1, 2, 3]);
        assert!(cache.is_ended());
    }

    #[test]
    fn combine_tuples() {
        let numbers: StreamHost<i32> = StreamHost::new();
        let names: StreamHost<&str> = StreamHost::new();
        let cache = ReactiveCache::from_stream(combine2(&numbers.get_stream(), &names.get_stream()));

        numbers.emit(1);
        names.emit("one");
        numbers.emit(2);
        assert_eq!(cache.get_cloned(), vec![(1, "one"), (2, "one")]);
    }
}
