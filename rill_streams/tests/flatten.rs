use rill_streams::{empty, from_iter, iterate, observe, of, ReactiveCache, Stream, StreamHost};
use std::cell::Cell;
use std::rc::Rc;

/// An outer pull stream of empty inner streams, counting how often the outer stream was pulled.
fn counted_empties(pulls: &Rc<Cell<usize>>) -> Stream<i32> {
    let pulls = Rc::clone(pulls);
    from_iter(0..5)
        .inspect(move |_| pulls.set(pulls.get() + 1))
        .map(|_| empty::<i32>())
        .flatten()
}

#[test]
fn flatten_does_not_pull_without_demand() {
    let pulls = Rc::new(Cell::new(0));
    let observation = observe(&counted_empties(&pulls));

    assert_eq!(pulls.get(), 0);
    assert!(!observation.is_ended());
}

#[test]
fn flatten_pulls_past_empty_inner_streams_while_demand_is_outstanding() {
    let pulls = Rc::new(Cell::new(0));
    let iteration = iterate(&counted_empties(&pulls));

    assert_eq!(pulls.get(), 5);
    assert!(iteration.is_ended());
}

#[test]
fn switch_map_follows_the_latest_inner_stream() {
    let outer: StreamHost<i32> = StreamHost::new();
    let first: StreamHost<i32> = StreamHost::new();
    let second: StreamHost<i32> = StreamHost::new();
    let inners = vec![first.get_stream(), second.get_stream()];

    let cache = ReactiveCache::from_stream(
        outer
            .get_stream()
            .switch_map(move |index| inners[index as usize].clone()),
    );

    outer.emit(0);
    first.emit(1);
    outer.emit(1);
    first.emit(2);
    second.emit(3);

    assert_eq!(cache.get_cloned(), vec![1, 3]);
    assert_eq!(first.count_subscribers(), 0);
}

#[test]
fn flatten_waits_for_the_current_inner_stream_before_ending() {
    let outer: StreamHost<Stream<i32>> = StreamHost::new();
    let inner: StreamHost<i32> = StreamHost::new();
    let cache = ReactiveCache::from_stream(outer.get_stream().flatten());

    outer.emit(inner.get_stream());
    outer.end(None);
    assert!(!cache.is_ended());

    inner.emit(7);
    inner.end(None);
    assert_eq!(cache.get_cloned(), vec![7]);
    assert!(cache.is_ended());
}

#[test]
fn inner_failures_end_the_flattened_stream() {
    let outer: StreamHost<i32> = StreamHost::new();
    let cache = ReactiveCache::from_stream(outer.get_stream().switch_map(|val| {
        of(vec![val]).try_map(|val| {
            if val < 0 {
                Err(rill_streams::Error::msg("negative"))
            } else {
                Ok(val)
            }
        })
    }));

    outer.emit(1);
    outer.emit(-1);
    outer.emit(2);

    assert_eq!(cache.get_cloned(), vec![1]);
    assert!(cache.error().is_some());
    assert_eq!(outer.count_subscribers(), 0);
}
