use super::streams::ControlCell;
use super::{sink, Clock, Deferred, Result, Stream};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Something to wait for: a duration on a clock, the next value of a stream, or the settlement
/// of a deferred value.
#[derive(Clone)]
pub enum Wait {
    Delay(Clock, Duration),
    Emission(Stream<()>),
    Settle(Deferred<()>),
}

impl Wait {
    pub fn delay(clock: &Clock, duration: Duration) -> Wait {
        Wait::Delay(clock.clone(), duration)
    }

    /// Waits for the next value of any stream.
    pub fn emission<U: 'static>(stream: &Stream<U>) -> Wait {
        Wait::Emission(stream.map(|_| ()))
    }

    pub fn settle<V: Clone + 'static>(deferred: &Deferred<V>) -> Wait {
        let settled = Deferred::new();
        let settled_write = settled.clone();
        deferred.then(move |_| settled_write.resolve(()));
        Wait::Settle(settled)
    }
}

/// How long an operator waits, either fixed or computed from the value being gated.
pub enum WaitSpec<T> {
    Fixed(Wait),
    Indicator(Rc<dyn Fn(&T) -> Result<Wait>>),
}

impl<T> Clone for WaitSpec<T> {
    fn clone(&self) -> Self {
        match self {
            WaitSpec::Fixed(wait) => WaitSpec::Fixed(wait.clone()),
            WaitSpec::Indicator(indicator) => WaitSpec::Indicator(Rc::clone(indicator)),
        }
    }
}

impl<T> From<Wait> for WaitSpec<T> {
    fn from(wait: Wait) -> Self {
        WaitSpec::Fixed(wait)
    }
}

impl<T> WaitSpec<T> {
    /// Builds a spec that decides the wait per value. An `Err` fails the gated stream.
    pub fn indicator<F>(indicator: F) -> WaitSpec<T>
    where
        F: Fn(&T) -> Result<Wait>,
        F: 'static,
    {
        WaitSpec::Indicator(Rc::new(indicator))
    }

    pub fn resolve(&self, value: &T) -> Result<Wait> {
        match self {
            WaitSpec::Fixed(wait) => Ok(wait.clone()),
            WaitSpec::Indicator(indicator) => indicator(value),
        }
    }
}

/// A pending wait. The callback handed to `wait` runs at most once, and never after `cancel`.
pub struct Waiting {
    pending: Rc<Cell<bool>>,
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Waiting {
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Cancels the wait and releases its timer or subscription. Idempotent.
    pub fn cancel(&self) {
        self.pending.set(false);
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

/// Calls `callback` once `notifier` is done.
///
/// Waiting for an emission connects to the stream, starts it and requests one value; the
/// connection is stopped once that value arrives. A stream that ends without emitting never
/// fires the callback.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use rill_streams::{wait, Clock, Wait};
///
/// let clock = Clock::new();
/// let fired = Rc::new(Cell::new(false));
///
/// let fired_write = fired.clone();
/// let waiting = wait(&Wait::delay(&clock, Duration::from_millis(50)), move || fired_write.set(true));
///
/// clock.advance(Duration::from_millis(49));
/// assert!(waiting.is_pending());
/// clock.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// assert!(!waiting.is_pending());
/// ```
pub fn wait<F>(notifier: &Wait, callback: F) -> Waiting
where
    F: FnOnce(),
    F: 'static,
{
    let pending = Rc::new(Cell::new(true));
    let callback = RefCell::new(Some(callback));
    let fire_pending = Rc::clone(&pending);
    let fire = move || {
        if fire_pending.replace(false) {
            let callback = callback.borrow_mut().take();
            if let Some(callback) = callback {
                callback();
            }
        }
    };

    let cancel: Box<dyn FnOnce()> = match notifier {
        Wait::Delay(clock, duration) => {
            let id = clock.set_timeout(*duration, fire);
            let clock = clock.clone();
            Box::new(move || clock.clear(id))
        }
        Wait::Emission(stream) => {
            let control = Rc::new(ControlCell::default());
            let greet_control = Rc::clone(&control);
            let receive_control = Rc::clone(&control);
            stream.connect(
                sink()
                    .on_greet(move |upstream| {
                        greet_control.set(Rc::clone(&upstream));
                        upstream.start();
                        upstream.request();
                    })
                    .on_receive(move |()| {
                        fire();
                        if let Some(upstream) = receive_control.take() {
                            upstream.stop(None);
                        }
                    })
                    .build(),
            );
            Box::new(move || {
                if let Some(upstream) = control.take() {
                    upstream.stop(None);
                }
            })
        }
        Wait::Settle(deferred) => {
            let handle = deferred.then(move |()| fire());
            Box::new(move || handle.cancel())
        }
    };

    Waiting {
        pending,
        cancel: RefCell::new(Some(cancel)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamHost;

    #[test]
    fn cancelled_delay_never_fires() {
        let clock = Clock::new();
        let fired = Rc::new(Cell::new(false));
        let fired_write = Rc::clone(&fired);
        let waiting = wait(&Wait::delay(&clock, Duration::from_millis(10)), move || {
            fired_write.set(true)
        });
        waiting.cancel();
        clock.advance(Duration::from_millis(20));
        assert!(!fired.get());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn emission_fires_once_and_unsubscribes() {
        let host: StreamHost<i32> = StreamHost::new();
        let count = Rc::new(Cell::new(0));
        let count_write = Rc::clone(&count);
        let waiting = wait(&Wait::emission(&host.get_stream()), move || {
            count_write.set(count_write.get() + 1)
        });
        assert_eq!(host.count_subscribers(), 1);

        host.emit(1);
        host.emit(2);
        assert_eq!(count.get(), 1);
        assert!(!waiting.is_pending());
        assert_eq!(host.count_subscribers(), 0);
    }

    #[test]
    fn settle_fires_when_resolved() {
        let deferred: Deferred<&str> = Deferred::new();
        let fired = Rc::new(Cell::new(false));
        let fired_write = Rc::clone(&fired);
        let waiting = wait(&Wait::settle(&deferred), move || fired_write.set(true));
        assert!(waiting.is_pending());
        deferred.resolve("now");
        assert!(fired.get());
    }
}
