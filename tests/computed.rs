use rill::{computed, ReactiveCache, StreamHost};

#[test]
fn locals_are_not_tracked() {
    let host: StreamHost<i32> = StreamHost::new();
    let x = host.get_stream();
    let cache = ReactiveCache::from_stream(computed! {
        let y = 3;
        x + y
    });

    host.emit(1);
    host.emit(10);
    assert_eq!(cache.get_cloned(), vec![4, 13]);
}

#[test]
fn waits_for_every_stream_to_emit() {
    let names: StreamHost<String> = StreamHost::new();
    let counts: StreamHost<usize> = StreamHost::new();
    let (name, count) = (names.get_stream(), counts.get_stream());
    let cache = ReactiveCache::from_stream(computed! {
        name.repeat(count)
    });

    names.emit("ab".to_string());
    assert!(cache.get_cloned().is_empty());

    counts.emit(2);
    names.emit("c".to_string());
    assert_eq!(cache.get_cloned(), vec!["abab".to_string(), "cc".to_string()]);
}

#[test]
fn streams_stay_usable_after_the_macro() {
    let host: StreamHost<i32> = StreamHost::new();
    let x = host.get_stream();
    let doubled = ReactiveCache::from_stream(computed! { x * 2 });
    let plain = ReactiveCache::from_stream(x);

    host.emit(4);
    assert_eq!(doubled.get_cloned(), vec![8]);
    assert_eq!(plain.get_cloned(), vec![4]);
}
