use rill_streams::{interval, observe, Clock, Control};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn observed_interval(clock: &Clock, period: u64) -> (Rc<RefCell<Vec<u64>>>, Rc<dyn Control>) {
    let values = Rc::new(RefCell::new(vec![]));
    let values_write = values.clone();
    let observation: Rc<dyn Control> = observe(
        &interval(clock, ms(period)).inspect(move |val| values_write.borrow_mut().push(*val)),
    );
    (values, observation)
}

#[test]
fn emits_a_count_every_period() {
    let clock = Clock::new();
    let (values, _observation) = observed_interval(&clock, 100);

    clock.advance(ms(99));
    assert!(values.borrow().is_empty());

    clock.advance(ms(1));
    assert_eq!(*values.borrow(), vec![0]);

    clock.advance(ms(300));
    assert_eq!(*values.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn pauses_and_resumes_on_a_period_boundary() {
    let clock = Clock::new();
    let (values, observation) = observed_interval(&clock, 100);

    clock.advance(ms(200));
    assert_eq!(*values.borrow(), vec![0, 1]);

    observation.stop(None);
    clock.advance(ms(1000));
    assert_eq!(values.borrow().len(), 2);

    observation.start();
    clock.advance(ms(1000));
    assert_eq!(*values.borrow(), (0..12).collect::<Vec<_>>());
}

#[test]
fn resumes_with_the_remaining_phase() {
    let clock = Clock::new();
    let (values, observation) = observed_interval(&clock, 100);

    clock.advance(ms(100));
    assert_eq!(*values.borrow(), vec![0]);

    clock.advance(ms(62));
    observation.stop(None);
    clock.advance(ms(1713));
    observation.start();

    clock.advance(ms(37));
    assert_eq!(*values.borrow(), vec![0]);
    clock.advance(ms(1));
    assert_eq!(*values.borrow(), vec![0, 1]);
    clock.advance(ms(100));
    assert_eq!(*values.borrow(), vec![0, 1, 2]);

    // Pausing while waiting out a leftover period keeps what is left of it.
    clock.advance(ms(10));
    observation.stop(None);
    clock.advance(ms(7140));
    observation.start();
    clock.advance(ms(30));
    observation.stop(None);
    assert_eq!(values.borrow().len(), 3);

    clock.advance(ms(112));
    observation.start();
    clock.advance(ms(50));
    assert_eq!(values.borrow().len(), 3);
    clock.advance(ms(10));
    assert_eq!(values.borrow().len(), 4);
    clock.advance(ms(50));
    assert_eq!(values.borrow().len(), 4);
    clock.advance(ms(50));
    assert_eq!(values.borrow().len(), 5);
}

#[test]
fn redundant_start_and_stop_are_ignored() {
    let clock = Clock::new();
    let (values, observation) = observed_interval(&clock, 100);

    observation.start();
    observation.start();
    clock.advance(ms(100));
    assert_eq!(*values.borrow(), vec![0]);

    observation.stop(None);
    observation.stop(None);
    assert_eq!(clock.pending(), 0);

    observation.start();
    observation.start();
    clock.advance(ms(100));
    assert_eq!(*values.borrow(), vec![0, 1]);
    assert_eq!(clock.pending(), 1);
}
