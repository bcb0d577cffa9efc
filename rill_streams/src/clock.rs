use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

/// Handle of a scheduled timer, used to clear it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    key: (Duration, u64),
    period: Option<Duration>,
    callback: Rc<dyn Fn()>,
}

#[derive(Default)]
struct ClockState {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    queue: RefCell<BTreeMap<(Duration, u64), TimerId>>,
    timers: RefCell<HashMap<TimerId, Timer>>,
}

/// A single-threaded timer queue driven explicitly through `advance`.
///
/// Every time-based operator schedules its work on a `Clock` instead of a process-level timer.
/// An application drives the clock from its event loop; tests drive it deterministically.
/// Timers due at the same instant fire in the order they were scheduled.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use rill_streams::Clock;
///
/// let clock = Clock::new();
/// let fired = Rc::new(Cell::new(0));
///
/// let fired_write = fired.clone();
/// clock.set_interval(Duration::from_millis(10), move || fired_write.set(fired_write.get() + 1));
///
/// clock.advance(Duration::from_millis(25));
/// assert_eq!(fired.get(), 2);
/// assert_eq!(clock.now(), Duration::from_millis(25));
/// ```
#[derive(Clone, Default)]
pub struct Clock {
    state: Rc<ClockState>,
}

impl Clock {
    pub fn new() -> Clock {
        Clock::default()
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.state.now.get()
    }

    pub fn set_timeout<F: Fn() + 'static>(&self, delay: Duration, callback: F) -> TimerId {
        self.schedule(delay, None, Rc::new(callback))
    }

    /// Schedules `callback` every `period`. A zero period is treated as one millisecond.
    pub fn set_interval<F: Fn() + 'static>(&self, period: Duration, callback: F) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.schedule(period, Some(period), Rc::new(callback))
    }

    /// Cancels a timer. Clearing an unknown or already fired timer does nothing.
    pub fn clear(&self, id: TimerId) {
        if let Some(timer) = self.state.timers.borrow_mut().remove(&id) {
            self.state.queue.borrow_mut().remove(&timer.key);
        }
    }

    /// Number of timers still scheduled.
    pub fn pending(&self) -> usize {
        self.state.timers.borrow().len()
    }

    /// Moves time forward by `by`, firing every timer that falls due on the way.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while let Some((id, due, callback)) = self.pop_due(target) {
            self.state.now.set(due);
            log::trace!("clock: firing timer {:?} at {:?}", id, due);
            callback();
        }
        self.state.now.set(target);
    }

    fn next_key(&self, due: Duration) -> (Duration, u64) {
        let seq = self.state.next_seq.get();
        self.state.next_seq.set(seq + 1);
        (due, seq)
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, callback: Rc<dyn Fn()>) -> TimerId {
        let key = self.next_key(self.now() + delay);
        let id = TimerId(key.1);
        self.state.queue.borrow_mut().insert(key, id);
        self.state.timers.borrow_mut().insert(
            id,
            Timer {
                key,
                period,
                callback,
            },
        );
        id
    }

    /// Removes the earliest timer due at or before `target`. Periodic timers are scheduled
    /// again before their callback runs, so the callback may clear them.
    fn pop_due(&self, target: Duration) -> Option<(TimerId, Duration, Rc<dyn Fn()>)> {
        let (key, id) = {
            let queue = self.state.queue.borrow();
            let (key, id) = queue.iter().next()?;
            if key.0 > target {
                return None;
            }
            (*key, *id)
        };
        self.state.queue.borrow_mut().remove(&key);

        let mut timers = self.state.timers.borrow_mut();
        let period = timers.get(&id)?.period;
        match period {
            Some(period) => {
                let next = self.next_key(key.0 + period);
                let timer = timers.get_mut(&id)?;
                timer.key = next;
                self.state.queue.borrow_mut().insert(next, id);
                Some((id, key.0, Rc::clone(&timer.callback)))
            }
            None => {
                let timer = timers.remove(&id)?;
                Some((id, key.0, timer.callback))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn timeouts_fire_in_due_then_schedule_order() {
        let clock = Clock::new();
        let order = Rc::new(RefCell::new(vec![]));
        for (label, delay) in [("b", 20), ("a", 10), ("c", 20)] {
            let order = Rc::clone(&order);
            clock.set_timeout(ms(delay), move || order.borrow_mut().push(label));
        }
        clock.advance(ms(15));
        assert_eq!(*order.borrow(), vec!["a"]);
        clock.advance(ms(5));
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn interval_can_clear_itself() {
        let clock = Clock::new();
        let count = Rc::new(Cell::new(0));
        let id = Rc::new(Cell::new(None));

        let count_write = Rc::clone(&count);
        let id_read = Rc::clone(&id);
        let clock_ref = clock.clone();
        id.set(Some(clock.set_interval(ms(10), move || {
            count_write.set(count_write.get() + 1);
            if count_write.get() == 3 {
                if let Some(id) = id_read.get() {
                    clock_ref.clear(id);
                }
            }
        })));

        clock.advance(ms(100));
        assert_eq!(count.get(), 3);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn callbacks_see_their_due_time() {
        let clock = Clock::new();
        let seen = Rc::new(Cell::new(Duration::ZERO));
        let seen_write = Rc::clone(&seen);
        let clock_ref = clock.clone();
        clock.set_timeout(ms(30), move || seen_write.set(clock_ref.now()));
        clock.advance(ms(50));
        assert_eq!(seen.get(), ms(30));
        assert_eq!(clock.now(), ms(50));
    }
}
