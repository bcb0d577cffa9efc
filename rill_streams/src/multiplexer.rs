use super::{Consumer, Error};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Broadcasts values and termination to a changing set of consumers.
///
/// Every broadcast iterates over a snapshot of the recipients and re-checks membership before
/// each call, so a consumer that unplugs itself (or another consumer) from inside `receive`
/// is never called again afterwards.
pub struct Multiplexer<T> {
    entries: RefCell<Vec<(usize, Rc<dyn Consumer<T>>)>>,
    next_key: Cell<usize>,
}

impl<T> Default for Multiplexer<T> {
    fn default() -> Self {
        Multiplexer {
            entries: RefCell::new(vec![]),
            next_key: Cell::new(0),
        }
    }
}

impl<T> Multiplexer<T> {
    pub fn new() -> Multiplexer<T> {
        Multiplexer::default()
    }

    /// Plugs a consumer in and returns the key that unplugs it.
    pub fn add(&self, consumer: Rc<dyn Consumer<T>>) -> usize {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.entries.borrow_mut().push((key, consumer));
        key
    }

    pub fn remove(&self, key: usize) {
        self.entries.borrow_mut().retain(|(k, _)| *k != key);
    }

    pub fn contains(&self, key: usize) -> bool {
        self.entries.borrow().iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn snapshot(&self) -> Vec<(usize, Rc<dyn Consumer<T>>)> {
        self.entries.borrow().clone()
    }

    /// Sends `end` to every plugged consumer and unplugs all of them.
    pub fn end(&self, reason: Option<Error>) {
        let recipients = self.snapshot();
        for (key, consumer) in recipients {
            if !self.contains(key) {
                continue;
            }
            self.remove(key);
            consumer.end(reason.clone());
        }
        self.entries.borrow_mut().clear();
    }
}

impl<T: Clone> Multiplexer<T> {
    pub fn send(&self, value: T) {
        let recipients = self.snapshot();
        for (key, consumer) in recipients {
            if self.contains(key) {
                consumer.receive(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink;

    #[test]
    fn removal_during_broadcast_skips_removed_consumer() {
        let mux: Rc<Multiplexer<i32>> = Rc::new(Multiplexer::new());
        let seen = Rc::new(RefCell::new(vec![]));
        let second_key = Rc::new(Cell::new(0));

        let mux_ref = Rc::clone(&mux);
        let key_ref = Rc::clone(&second_key);
        let seen_first = Rc::clone(&seen);
        mux.add(
            sink()
                .on_receive(move |val: i32| {
                    seen_first.borrow_mut().push(("first", val));
                    mux_ref.remove(key_ref.get());
                })
                .build(),
        );
        let seen_second = Rc::clone(&seen);
        second_key.set(
            mux.add(
                sink()
                    .on_receive(move |val: i32| seen_second.borrow_mut().push(("second", val)))
                    .build(),
            ),
        );

        mux.send(1);
        mux.send(2);
        assert_eq!(*seen.borrow(), vec![("first", 1), ("first", 2)]);
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn end_unplugs_everyone() {
        let mux: Multiplexer<i32> = Multiplexer::new();
        let ended = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let ended = Rc::clone(&ended);
            mux.add(sink().on_end(move |_| ended.set(ended.get() + 1)).build());
        }
        mux.end(None);
        mux.end(None);
        assert_eq!(ended.get(), 3);
        assert!(mux.is_empty());
    }
}
