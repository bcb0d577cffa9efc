use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<V> = Box<dyn FnOnce(V)>;

struct DeferredState<V> {
    value: Option<V>,
    next_key: usize,
    callbacks: Vec<(usize, Callback<V>)>,
}

/// A value that becomes available once, later.
///
/// `Deferred` is the single-threaded counterpart of a promise: the producer side calls `resolve`
/// exactly once (later calls are ignored) and every callback registered with `then` runs with a
/// clone of the value. Callbacks registered after settlement run immediately.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use rill_streams::Deferred;
///
/// let deferred = Deferred::new();
/// let seen = Rc::new(Cell::new(0));
///
/// let seen_write = seen.clone();
/// let _handle = deferred.then(move |val| seen_write.set(val));
///
/// deferred.resolve(5);
/// deferred.resolve(6);
/// assert_eq!(seen.get(), 5);
/// assert_eq!(deferred.value(), Some(5));
/// ```
pub struct Deferred<V> {
    state: Rc<RefCell<DeferredState<V>>>,
}

impl<V> Clone for Deferred<V> {
    fn clone(&self) -> Self {
        Deferred {
            state: Rc::clone(&self.state),
        }
    }
}

impl<V: Clone + 'static> Default for Deferred<V> {
    fn default() -> Self {
        Deferred::new()
    }
}

impl<V: Clone + 'static> Deferred<V> {
    pub fn new() -> Deferred<V> {
        Deferred {
            state: Rc::new(RefCell::new(DeferredState {
                value: None,
                next_key: 0,
                callbacks: vec![],
            })),
        }
    }

    pub fn resolved(value: V) -> Deferred<V> {
        let deferred = Deferred::new();
        deferred.resolve(value);
        deferred
    }

    pub fn is_settled(&self) -> bool {
        self.state.borrow().value.is_some()
    }

    pub fn value(&self) -> Option<V> {
        self.state.borrow().value.clone()
    }

    /// Settles the deferred value. Only the first call has an effect.
    pub fn resolve(&self, value: V) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.value.is_some() {
                return;
            }
            state.value = Some(value.clone());
            std::mem::take(&mut state.callbacks)
        };
        for (_, callback) in callbacks {
            callback(value.clone());
        }
    }

    /// Registers a callback for the settled value. Dropping the returned handle does not cancel
    /// the callback; call `cancel` for that.
    pub fn then<F: FnOnce(V) + 'static>(&self, callback: F) -> DeferredHandle {
        let settled = self.value();
        if let Some(value) = settled {
            callback(value);
            return DeferredHandle { cancel: None };
        }

        let key = {
            let mut state = self.state.borrow_mut();
            let key = state.next_key;
            state.next_key += 1;
            state.callbacks.push((key, Box::new(callback)));
            key
        };
        let weak_state: Weak<RefCell<DeferredState<V>>> = Rc::downgrade(&self.state);
        DeferredHandle {
            cancel: Some(Box::new(move || {
                if let Some(state) = weak_state.upgrade() {
                    state.borrow_mut().callbacks.retain(|(k, _)| *k != key);
                }
            })),
        }
    }
}

/// Cancels a pending `Deferred::then` registration.
pub struct DeferredHandle {
    cancel: Option<Box<dyn Fn()>>,
}

impl DeferredHandle {
    pub fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn cancelled_callbacks_never_run() {
        let deferred: Deferred<i32> = Deferred::new();
        let seen = Rc::new(Cell::new(0));
        let seen_write = Rc::clone(&seen);
        let handle = deferred.then(move |val| seen_write.set(val));
        handle.cancel();
        deferred.resolve(3);
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn late_callbacks_run_immediately() {
        let deferred = Deferred::resolved("done");
        let seen = Rc::new(Cell::new(""));
        let seen_write = Rc::clone(&seen);
        deferred.then(move |val| seen_write.set(val));
        assert_eq!(seen.get(), "done");
    }
}
