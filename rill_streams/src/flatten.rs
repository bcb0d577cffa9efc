use super::streams::ControlCell;
use super::{Consumer, Control, Error, Stream};
use std::cell::Cell;
use std::rc::{Rc, Weak};

/// Shared state of one flatten connection. Acts as the consumer of the outer stream.
struct FlattenState<T> {
    me: Weak<FlattenState<T>>,
    downstream: Rc<dyn Consumer<T>>,
    outer: ControlCell,
    inner: ControlCell,
    generation: Cell<u64>,
    outer_ended: Cell<bool>,
    requested: Cell<bool>,
    started: Cell<bool>,
    disposed: Cell<bool>,
}

impl<T: 'static> FlattenState<T> {
    fn is_current(&self, generation: u64) -> bool {
        !self.disposed.get() && self.generation.get() == generation
    }

    fn finish(&self, reason: Option<Error>) {
        if !self.disposed.replace(true) {
            self.downstream.end(reason);
        }
    }

    fn inner_greeted(&self, generation: u64, control: Rc<dyn Control>) {
        if !self.is_current(generation) {
            control.stop(None);
            return;
        }
        self.inner.set(Rc::clone(&control));
        if self.started.get() {
            control.start();
        }
        // Starting may already have run the inner stream to its end.
        if self.requested.get() && self.is_current(generation) && self.inner.is_set() {
            control.request();
        }
    }

    fn inner_received(&self, generation: u64, value: T) {
        if self.is_current(generation) {
            self.requested.set(false);
            self.downstream.receive(value);
        }
    }

    fn inner_ended(&self, generation: u64, reason: Option<Error>) {
        if !self.is_current(generation) {
            return;
        }
        self.inner.take();
        match reason {
            Some(err) => {
                if let Some(outer) = self.outer.take() {
                    outer.stop(Some(err.clone()));
                }
                self.finish(Some(err));
            }
            None if self.outer_ended.get() => self.finish(None),
            None => {
                // Pull the next inner stream only while a request is outstanding.
                if self.requested.get() {
                    self.outer.request();
                }
            }
        }
    }
}

impl<T: 'static> Consumer<Stream<T>> for FlattenState<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        self.outer.set(control);
        self.downstream.greet(Rc::new(FlattenControl {
            state: self.me.clone(),
        }));
    }

    fn receive(&self, inner: Stream<T>) {
        if self.disposed.get() {
            return;
        }
        if let Some(previous) = self.inner.take() {
            previous.stop(None);
        }
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        inner.connect(Rc::new(InnerConsumer {
            state: self.me.clone(),
            generation,
        }));
    }

    fn end(&self, reason: Option<Error>) {
        if self.disposed.get() {
            return;
        }
        self.outer.take();
        match reason {
            Some(err) => {
                if let Some(inner) = self.inner.take() {
                    inner.stop(Some(err.clone()));
                }
                self.finish(Some(err));
            }
            None if self.inner.is_set() => self.outer_ended.set(true),
            None => self.finish(None),
        }
    }
}

struct InnerConsumer<T> {
    state: Weak<FlattenState<T>>,
    generation: u64,
}

impl<T: 'static> Consumer<T> for InnerConsumer<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        match self.state.upgrade() {
            Some(state) => state.inner_greeted(self.generation, control),
            None => control.stop(None),
        }
    }

    fn receive(&self, value: T) {
        if let Some(state) = self.state.upgrade() {
            state.inner_received(self.generation, value);
        }
    }

    fn end(&self, reason: Option<Error>) {
        if let Some(state) = self.state.upgrade() {
            state.inner_ended(self.generation, reason);
        }
    }
}

struct FlattenControl<T> {
    state: Weak<FlattenState<T>>,
}

impl<T: 'static> Control for FlattenControl<T> {
    fn start(&self) {
        if let Some(state) = self.state.upgrade() {
            state.started.set(true);
            state.inner.start();
            state.outer.start();
        }
    }

    fn request(&self) {
        if let Some(state) = self.state.upgrade() {
            state.requested.set(true);
            match state.inner.get() {
                Some(inner) => inner.request(),
                None => state.outer.request(),
            }
        }
    }

    fn stop(&self, reason: Option<Error>) {
        if let Some(state) = self.state.upgrade() {
            state.started.set(false);
            state.inner.stop(reason.clone());
            state.outer.stop(reason);
        }
    }
}

impl<T: 'static> Stream<Stream<T>> {
    /// Flattens a stream of streams, following only the most recent inner stream.
    ///
    /// A new inner stream stops the previous one. The result ends once the outer stream and the
    /// current inner stream have both ended, and fails as soon as either fails. When an inner
    /// stream ends, the next one is pulled from the outer stream only if a request is still
    /// outstanding, so exhausted pull sources are never pulled in a loop.
    ///
    /// # Examples
    /// ```
    /// use rill_streams::{of, ReactiveCache, StreamHost};
    ///
    /// let outer: StreamHost<i32> = StreamHost::new();
    /// let flattened = outer.get_stream().map(|val| of(vec![val, val * 10])).flatten();
    /// let cache = ReactiveCache::from_stream(flattened);
    ///
    /// outer.emit(1);
    /// outer.emit(2);
    /// assert_eq!(cache.get_cloned(), vec![1, 10, 2, 20]);
    /// ```
    pub fn flatten(&self) -> Stream<T> {
        let outer = self.clone();
        super::source(move |downstream: Rc<dyn Consumer<T>>| {
            let state = Rc::new_cyclic(|me: &Weak<FlattenState<T>>| FlattenState {
                me: me.clone(),
                downstream,
                outer: ControlCell::default(),
                inner: ControlCell::default(),
                generation: Cell::new(0),
                outer_ended: Cell::new(false),
                requested: Cell::new(false),
                started: Cell::new(false),
                disposed: Cell::new(false),
            });
            outer.connect(state);
        })
    }
}

impl<T: 'static> Stream<T> {
    /// Maps every value to a stream and flattens the result, following the latest one.
    pub fn switch_map<U, F>(&self, map_function: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Stream<U>,
        F: 'static,
    {
        self.map(map_function).flatten()
    }
}
