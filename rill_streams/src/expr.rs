//! Reactive expressions: streams computed from a closure that reads other streams.
//!
//! Every stream the closure reads through its `Tracker` is connected on first use and cached per
//! connection of the expression, keyed by `StreamId`. Reading with `get` tracks the stream
//! actively (its emissions re-run the closure), reading with `peek` tracks it passively (its
//! latest value is available, but it never triggers a run on its own).

use super::streams::ControlCell;
use super::{Consumer, Control, Deferred, DeferredHandle, Error, Producer, Stream, StreamId};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Why an expression run produced no value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Halt {
    /// A stream read with `get` or `peek` has not emitted yet. The run is dropped silently.
    #[error("a tracked stream has not emitted yet")]
    NotReady,

    /// The expression chose not to emit for this run.
    #[error("the expression skipped this run")]
    Skip,

    /// The expression failed. This ends the expression stream with the error.
    #[error(transparent)]
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(error: Error) -> Self {
        Halt::Failed(error)
    }
}

/// The outcome of one run of an expression.
pub type Eval<R> = std::result::Result<R, Halt>;

/// The callbacks a tracking node uses to reach its expression.
trait ExprHost {
    fn run(&self, trigger: Option<usize>);
    fn fail(&self, error: Error, trigger: Option<usize>);
    fn end_check(&self);
}

/// Type-erased view of a tracking node, for the operations that apply to every node.
trait Tracked {
    fn mask(&self);
    fn is_seen(&self) -> bool;
    fn is_disposed(&self) -> bool;
    fn start(&self);
    fn request(&self);
    fn stop(&self);
}

type SameFn<T> = fn(&T, &T) -> bool;

struct TrackNode<T> {
    host: Weak<dyn ExprHost>,
    index: usize,
    active: bool,
    same: Option<SameFn<T>>,
    value: RefCell<Option<T>>,
    seen: Cell<bool>,
    disposed: Cell<bool>,
    control: ControlCell,
}

impl<T> TrackNode<T> {
    fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// True if `value` would not change what this node holds. Only actively tracked nodes of
    /// memo expressions compare.
    fn is_unchanged(&self, value: &T) -> bool {
        match (self.same, self.value.borrow().as_ref()) {
            (Some(same), Some(current)) if self.active => same(current, value),
            _ => false,
        }
    }
}

impl<T> Consumer<T> for TrackNode<T> {
    fn greet(&self, control: Rc<dyn Control>) {
        if self.control.set_once(Rc::clone(&control)) {
            control.start();
        }
    }

    fn receive(&self, value: T) {
        if self.disposed.get() || self.is_unchanged(&value) {
            return;
        }
        *self.value.borrow_mut() = Some(value);
        if self.active {
            if let Some(host) = self.host.upgrade() {
                host.run(Some(self.index));
            }
        }
    }

    fn end(&self, reason: Option<Error>) {
        if self.disposed.replace(true) {
            return;
        }
        self.control.take();
        if let Some(host) = self.host.upgrade() {
            match reason {
                Some(err) => host.fail(err, Some(self.index)),
                None => host.end_check(),
            }
        }
    }
}

impl<T> Tracked for TrackNode<T> {
    fn mask(&self) {
        self.seen.set(false);
    }

    fn is_seen(&self) -> bool {
        self.seen.get()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn start(&self) {
        if !self.disposed.get() {
            self.control.start();
        }
    }

    fn request(&self) {
        if !self.disposed.get() {
            self.control.request();
        }
    }

    fn stop(&self) {
        if !self.disposed.get() {
            self.control.stop(None);
        }
    }
}

/// The tracking nodes of one expression connection.
struct Arena {
    host: Weak<dyn ExprHost>,
    nodes: RefCell<Vec<Rc<dyn Tracked>>>,
    typed: RefCell<Vec<Rc<dyn Any>>>,
    index: RefCell<HashMap<StreamId, usize>>,
    default_active: Cell<bool>,
    disposed: Cell<bool>,
}

impl Arena {
    fn new(host: Weak<dyn ExprHost>) -> Arena {
        Arena {
            host,
            nodes: RefCell::new(vec![]),
            typed: RefCell::new(vec![]),
            index: RefCell::new(HashMap::new()),
            default_active: Cell::new(true),
            disposed: Cell::new(false),
        }
    }

    fn snapshot(&self) -> Vec<Rc<dyn Tracked>> {
        self.nodes.borrow().clone()
    }

    fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn is_seen(&self, index: usize) -> bool {
        self.nodes
            .borrow()
            .get(index)
            .map_or(false, |node| node.is_seen())
    }

    fn clear(&self) {
        self.nodes.borrow_mut().clear();
        self.typed.borrow_mut().clear();
        self.index.borrow_mut().clear();
    }

    /// Finds the node tracking `stream`, connecting a new one on first use, and marks it seen.
    fn track<T: 'static>(
        &self,
        stream: &Stream<T>,
        active: bool,
        same: Option<SameFn<T>>,
    ) -> Eval<Rc<TrackNode<T>>> {
        if self.disposed.get() {
            return Err(Halt::NotReady);
        }
        let existing = self
            .index
            .borrow()
            .get(&stream.id())
            .and_then(|index| self.typed.borrow().get(*index).cloned());
        let node = match existing {
            Some(any) => any
                .downcast::<TrackNode<T>>()
                .map_err(|_| Error::msg(format!("stream {:?} tracked with two types", stream.id())))?,
            None => {
                let node = Rc::new(TrackNode {
                    host: self.host.clone(),
                    index: self.len(),
                    active,
                    same,
                    value: RefCell::new(None),
                    seen: Cell::new(true),
                    disposed: Cell::new(false),
                    control: ControlCell::default(),
                });
                self.nodes.borrow_mut().push(node.clone());
                self.typed.borrow_mut().push(node.clone());
                self.index.borrow_mut().insert(stream.id(), node.index);
                stream.connect(node.clone());
                node
            }
        };
        node.seen.set(true);
        Ok(node)
    }
}

/// Read access to other streams from inside an expression.
#[derive(Clone, Copy)]
pub struct Tracker<'a> {
    arena: &'a Arena,
}

impl<'a> Tracker<'a> {
    fn read<T: Clone + 'static>(
        &self,
        stream: &Stream<T>,
        active: bool,
        same: Option<SameFn<T>>,
    ) -> Eval<Option<T>> {
        let node = self.arena.track(stream, active, same)?;
        let value = node.value.borrow().clone();
        Ok(value)
    }

    /// The latest value of `stream`, tracked actively: its emissions re-run the expression.
    /// Aborts the run if the stream has not emitted yet.
    ///
    /// After the first call to `on`, `get` tracks passively like `peek`.
    pub fn get<T: Clone + 'static>(&self, stream: &Stream<T>) -> Eval<T> {
        self.read(stream, self.arena.default_active.get(), None)?
            .ok_or(Halt::NotReady)
    }

    /// The latest value of `stream`, tracked passively.
    pub fn peek<T: Clone + 'static>(&self, stream: &Stream<T>) -> Eval<T> {
        self.read(stream, false, None)?.ok_or(Halt::NotReady)
    }

    /// Like `get`, but gives `fallback` instead of aborting when the stream has not emitted.
    pub fn get_or<T: Clone + 'static>(&self, stream: &Stream<T>, fallback: T) -> Eval<T> {
        Ok(self
            .read(stream, self.arena.default_active.get(), None)?
            .unwrap_or(fallback))
    }

    /// Like `peek`, but gives `fallback` instead of aborting when the stream has not emitted.
    pub fn peek_or<T: Clone + 'static>(&self, stream: &Stream<T>, fallback: T) -> Eval<T> {
        Ok(self.read(stream, false, None)?.unwrap_or(fallback))
    }

    /// Tracks `stream` actively without reading it. From then on, `get` is passive, so only
    /// the streams named with `on` trigger runs.
    pub fn on<T: 'static>(&self, stream: &Stream<T>) -> Eval<()> {
        self.arena.default_active.set(false);
        let node = self.arena.track(stream, true, None)?;
        if node.has_value() {
            Ok(())
        } else {
            Err(Halt::NotReady)
        }
    }
}

fn same<T: PartialEq>(left: &T, right: &T) -> bool {
    left == right
}

/// The `Tracker` of memo expressions. Actively tracked streams only re-run the expression when
/// their value actually changed.
#[derive(Clone, Copy)]
pub struct MemoTracker<'a> {
    tracker: Tracker<'a>,
}

impl<'a> MemoTracker<'a> {
    pub fn get<T: Clone + PartialEq + 'static>(&self, stream: &Stream<T>) -> Eval<T> {
        self.tracker
            .read(stream, self.tracker.arena.default_active.get(), Some(same::<T>))?
            .ok_or(Halt::NotReady)
    }

    pub fn peek<T: Clone + PartialEq + 'static>(&self, stream: &Stream<T>) -> Eval<T> {
        self.tracker
            .read(stream, false, Some(same::<T>))?
            .ok_or(Halt::NotReady)
    }

    pub fn get_or<T: Clone + PartialEq + 'static>(&self, stream: &Stream<T>, fallback: T) -> Eval<T> {
        Ok(self
            .tracker
            .read(stream, self.tracker.arena.default_active.get(), Some(same::<T>))?
            .unwrap_or(fallback))
    }

    pub fn peek_or<T: Clone + PartialEq + 'static>(&self, stream: &Stream<T>, fallback: T) -> Eval<T> {
        Ok(self
            .tracker
            .read(stream, false, Some(same::<T>))?
            .unwrap_or(fallback))
    }

    pub fn on<T: 'static>(&self, stream: &Stream<T>) -> Eval<()> {
        self.tracker.on(stream)
    }
}

type SyncBody<R> = Rc<dyn Fn(&Tracker) -> Eval<R>>;
type DeferredBody<R> = Rc<dyn Fn(&Tracker) -> Eval<Deferred<Eval<R>>>>;

enum Body<R> {
    Sync(SyncBody<R>),
    Deferred(DeferredBody<R>),
}

fn sync_body<R, F>(body: F) -> SyncBody<R>
where
    F: Fn(&Tracker) -> Eval<R> + 'static,
{
    Rc::new(body)
}

fn deferred_body<R, F>(body: F) -> DeferredBody<R>
where
    F: Fn(&Tracker) -> Eval<Deferred<Eval<R>>> + 'static,
{
    Rc::new(body)
}

impl<R> Clone for Body<R> {
    fn clone(&self) -> Self {
        match self {
            Body::Sync(body) => Body::Sync(Rc::clone(body)),
            Body::Deferred(body) => Body::Deferred(Rc::clone(body)),
        }
    }
}

/// Decides, per connection, whether a computed value is emitted.
type EmitFilter<R> = Box<dyn Fn(&R) -> bool>;

fn changed_values<R: Clone + PartialEq + 'static>() -> EmitFilter<R> {
    let last: RefCell<Option<R>> = RefCell::new(None);
    Box::new(move |value| {
        let mut last = last.borrow_mut();
        if last.as_ref() == Some(value) {
            return false;
        }
        *last = Some(value.clone());
        true
    })
}

/// One connection of an expression stream. Consumer of nothing, control of its downstream.
struct ExprCore<R> {
    me: Weak<ExprCore<R>>,
    downstream: Rc<dyn Consumer<R>>,
    body: Body<R>,
    filter: Option<EmitFilter<R>>,
    arena: Arena,
    initial: Cell<bool>,
    mid_initial_run: Cell<bool>,
    running: Cell<bool>,
    end_after_run: Cell<bool>,
    run_token: Cell<u64>,
    pending: RefCell<Option<DeferredHandle>>,
    end_count: Cell<usize>,
}

impl<R: Clone + 'static> ExprCore<R> {
    fn next_token(&self) -> u64 {
        let token = self.run_token.get() + 1;
        self.run_token.set(token);
        token
    }

    fn settle(&self, token: u64, trigger: Option<usize>, result: Eval<R>) {
        if self.arena.disposed.get() || self.run_token.get() != token {
            return;
        }
        match result {
            Ok(value) => {
                // Streams read only on branches the last run did not take do not emit.
                if trigger.map_or(true, |index| self.arena.is_seen(index)) {
                    self.delegate(value);
                }
            }
            Err(Halt::NotReady) | Err(Halt::Skip) => {}
            Err(Halt::Failed(err)) => self.fail(err, None),
        }
    }

    fn delegate(&self, value: R) {
        if let Some(filter) = &self.filter {
            if !filter(&value) {
                return;
            }
        }
        self.downstream.receive(value);
    }

    fn finish(&self) {
        if self.dispose() {
            log::debug!("expr: all {} tracked streams ended", self.end_count.get());
            self.arena.clear();
            self.downstream.end(None);
        }
    }

    fn dispose(&self) -> bool {
        if self.arena.disposed.replace(true) {
            return false;
        }
        if let Some(pending) = self.pending.borrow_mut().take() {
            pending.cancel();
        }
        true
    }

    fn run_deferred(&self, trigger: Option<usize>, body: &DeferredBody<R>) {
        let result = body(&Tracker { arena: &self.arena });
        let token = self.next_token();
        match result {
            Ok(deferred) => {
                let me = self.me.clone();
                let handle = deferred.then(move |settled| {
                    if let Some(me) = me.upgrade() {
                        me.settle(token, trigger, settled);
                    }
                });
                let previous = self.pending.borrow_mut().replace(handle);
                if let Some(previous) = previous {
                    previous.cancel();
                }
            }
            Err(Halt::Failed(err)) => self.fail(err, trigger),
            Err(halt) => self.settle(token, trigger, Err(halt)),
        }
    }
}

impl<R: Clone + 'static> ExprHost for ExprCore<R> {
    fn run(&self, trigger: Option<usize>) {
        if self.arena.disposed.get() {
            return;
        }
        match trigger {
            None => self.mid_initial_run.set(true),
            Some(_) if self.mid_initial_run.get() => return,
            Some(_) => {}
        }

        for node in self.arena.snapshot() {
            node.mask();
        }

        let nested = self.running.replace(true);
        match self.body.clone() {
            Body::Sync(body) => {
                let result = body(&Tracker { arena: &self.arena });
                let token = self.next_token();
                match result {
                    // The stream that triggered a failing run is not stopped.
                    Err(Halt::Failed(err)) => self.fail(err, trigger),
                    result => self.settle(token, trigger, result),
                }
            }
            Body::Deferred(body) => self.run_deferred(trigger, &body),
        }
        self.running.set(nested);

        if trigger.is_none() {
            self.mid_initial_run.set(false);
        }
        // Reads later in the run may have tracked streams that are still live.
        if !nested && self.end_after_run.replace(false) && self.end_count.get() >= self.arena.len() {
            self.finish();
        }
    }

    fn fail(&self, error: Error, trigger: Option<usize>) {
        if !self.dispose() {
            return;
        }
        log::debug!("expr: failed, stopping {} tracked streams: {}", self.arena.len(), error);
        for (index, node) in self.arena.snapshot().into_iter().enumerate() {
            if Some(index) != trigger {
                node.stop();
            }
        }
        self.arena.clear();
        self.downstream.end(Some(error));
    }

    fn end_check(&self) {
        if self.arena.disposed.get() {
            return;
        }
        let ended = self.end_count.get() + 1;
        self.end_count.set(ended);
        if ended < self.arena.len() {
            return;
        }
        // Tracked streams may end while the run reading them is still going.
        if self.running.get() {
            self.end_after_run.set(true);
        } else {
            self.finish();
        }
    }
}

impl<R: Clone + 'static> Control for ExprCore<R> {
    fn start(&self) {
        if self.initial.replace(false) {
            self.run(None);
        } else {
            for node in self.arena.snapshot() {
                node.start();
            }
        }
    }

    fn request(&self) {
        for node in self.arena.snapshot() {
            node.request();
        }
    }

    fn stop(&self, _reason: Option<Error>) {
        for node in self.arena.snapshot() {
            if !node.is_disposed() {
                node.stop();
            }
        }
    }
}

struct ExprProducer<R> {
    body: Body<R>,
    filter: Option<fn() -> EmitFilter<R>>,
}

impl<R: Clone + 'static> Producer<R> for ExprProducer<R> {
    fn connect(&self, consumer: Rc<dyn Consumer<R>>) {
        let core = Rc::new_cyclic(|me: &Weak<ExprCore<R>>| {
            let host: Weak<dyn ExprHost> = me.clone();
            ExprCore {
                me: me.clone(),
                downstream: Rc::clone(&consumer),
                body: self.body.clone(),
                filter: self.filter.map(|make| make()),
                arena: Arena::new(host),
                initial: Cell::new(true),
                mid_initial_run: Cell::new(false),
                running: Cell::new(false),
                end_after_run: Cell::new(false),
                run_token: Cell::new(0),
                pending: RefCell::new(None),
                end_count: Cell::new(0),
            }
        });
        consumer.greet(core);
    }
}

/// A stream computed from other streams.
///
/// `body` runs when the stream is started and again whenever an actively tracked stream emits.
/// Each successful run emits its result. A run returning `Err(Halt::NotReady)` or
/// `Err(Halt::Skip)` emits nothing, and `Err(Halt::Failed(_))` ends the stream with the error and
/// stops every tracked stream. The expression ends once every tracked stream has ended.
///
/// # Examples
/// ```
/// use rill_streams::{expr, ReactiveCache, StreamHost};
///
/// let a: StreamHost<i32> = StreamHost::new();
/// let b: StreamHost<i32> = StreamHost::new();
/// let (stream_a, stream_b) = (a.get_stream(), b.get_stream());
///
/// let sum = expr(move |t| Ok(t.get(&stream_a)? + t.get(&stream_b)?));
/// let cache = ReactiveCache::from_stream(sum);
///
/// a.emit(1);
/// b.emit(2);
/// a.emit(5);
/// assert_eq!(cache.get_cloned(), vec![3, 7]);
/// ```
pub fn expr<R, F>(body: F) -> Stream<R>
where
    R: Clone + 'static,
    F: Fn(&Tracker) -> Eval<R> + 'static,
{
    Stream::new(ExprProducer {
        body: Body::Sync(sync_body(body)),
        filter: None,
    })
}

/// An expression whose result becomes available later. A run's result is dropped if a newer
/// run started before it settled.
pub fn expr_deferred<R, F>(body: F) -> Stream<R>
where
    R: Clone + 'static,
    F: Fn(&Tracker) -> Eval<Deferred<Eval<R>>> + 'static,
{
    Stream::new(ExprProducer {
        body: Body::Deferred(deferred_body(body)),
        filter: None,
    })
}

/// Like `expr`, but never emits the same value twice in a row, and actively tracked streams
/// only trigger a run when their value changed.
///
/// # Examples
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use rill_streams::{memo, ReactiveCache, StreamHost};
///
/// let a: StreamHost<i32> = StreamHost::new();
/// let runs = Rc::new(Cell::new(0));
///
/// let (stream_a, runs_write) = (a.get_stream(), runs.clone());
/// let parity = memo(move |t| {
///     runs_write.set(runs_write.get() + 1);
///     Ok(t.get(&stream_a)? % 2)
/// });
/// let cache = ReactiveCache::from_stream(parity);
///
/// a.emit(1);
/// a.emit(1);
/// a.emit(3);
/// a.emit(4);
/// assert_eq!(cache.get_cloned(), vec![1, 0]);
/// assert_eq!(runs.get(), 4);
/// ```
pub fn memo<R, F>(body: F) -> Stream<R>
where
    R: Clone + PartialEq + 'static,
    F: Fn(&MemoTracker) -> Eval<R> + 'static,
{
    Stream::new(ExprProducer {
        body: Body::Sync(sync_body(move |tracker| {
            body(&MemoTracker { tracker: *tracker })
        })),
        filter: Some(changed_values::<R>),
    })
}

/// The deferred counterpart of `memo`.
pub fn memo_deferred<R, F>(body: F) -> Stream<R>
where
    R: Clone + PartialEq + 'static,
    F: Fn(&MemoTracker) -> Eval<Deferred<Eval<R>>> + 'static,
{
    Stream::new(ExprProducer {
        body: Body::Deferred(deferred_body(move |tracker| {
            body(&MemoTracker { tracker: *tracker })
        })),
        filter: Some(changed_values::<R>),
    })
}

#[cfg(test)]
mod tests {
    use crate::{expr, memo_deferred, of, Deferred, Error, Halt, ReactiveCache, StreamHost};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn passive_reads_do_not_trigger() {
        let a: StreamHost<i32> = StreamHost::new();
        let b: StreamHost<i32> = StreamHost::new();
        let (stream_a, stream_b) = (a.get_stream(), b.get_stream());
        let cache = ReactiveCache::from_stream(expr(move |t| {
            let (a, b) = (t.get(&stream_a), t.peek(&stream_b));
            Ok(a? + b?)
        }));

        b.emit(2);
        assert!(cache.get_cloned().is_empty());

        a.emit(1);
        assert_eq!(cache.get_cloned(), vec![3]);

        b.emit(10);
        assert_eq!(cache.get_cloned(), vec![3]);
    }

    #[test]
    fn untaken_branches_do_not_emit() {
        let flag: StreamHost<bool> = StreamHost::new();
        let left: StreamHost<i32> = StreamHost::new();
        let right: StreamHost<i32> = StreamHost::new();
        let (flag_stream, left_stream, right_stream) =
            (flag.get_stream(), left.get_stream(), right.get_stream());
        let cache = ReactiveCache::from_stream(expr(move |t| {
            if t.get(&flag_stream)? {
                t.get(&left_stream)
            } else {
                t.get(&right_stream)
            }
        }));

        flag.emit(false);
        right.emit(2);
        flag.emit(true);
        left.emit(4);
        assert_eq!(cache.get_cloned(), vec![2, 4]);

        // `right` is still tracked, but the last run did not read it.
        right.emit(3);
        assert_eq!(cache.get_cloned(), vec![2, 4]);

        left.emit(5);
        assert_eq!(cache.get_cloned(), vec![2, 4, 5]);
    }

    #[test]
    fn synchronous_sources_run_once_initially() {
        let runs = Rc::new(Cell::new(0));
        let numbers = of(vec![1, 2, 3]);
        let runs_write = runs.clone();
        let cache = ReactiveCache::from_stream(expr(move |t| {
            runs_write.set(runs_write.get() + 1);
            Ok(t.get(&numbers)? * 10)
        }));

        assert_eq!(runs.get(), 1);
        assert_eq!(cache.get_cloned(), vec![30]);
        assert!(cache.is_ended());
    }

    #[test]
    fn failures_stop_every_source_but_the_trigger() {
        let a: StreamHost<i32> = StreamHost::new();
        let b: StreamHost<i32> = StreamHost::new();
        let (stream_a, stream_b) = (a.get_stream(), b.get_stream());
        let cache = ReactiveCache::from_stream(expr(move |t| {
            let total = t.get(&stream_a)? + t.get_or(&stream_b, 0)?;
            if total > 10 {
                return Err(Halt::Failed(Error::msg("too big")));
            }
            Ok(total)
        }));

        a.emit(5);
        b.emit(20);

        assert_eq!(cache.get_cloned(), vec![5]);
        assert!(cache.error().is_some());
        assert_eq!(a.count_subscribers(), 0);
        // `b` emitted the value that failed the run.
        assert_eq!(b.count_subscribers(), 1);

        b.emit(1);
        assert_eq!(cache.get_cloned(), vec![5]);
    }

    #[test]
    fn ends_once_every_tracked_stream_ended() {
        let a: StreamHost<i32> = StreamHost::new();
        let b: StreamHost<i32> = StreamHost::new();
        let (stream_a, stream_b) = (a.get_stream(), b.get_stream());
        let cache = ReactiveCache::from_stream(expr(move |t| {
            Ok(t.get_or(&stream_a, 0)? + t.get_or(&stream_b, 0)?)
        }));

        a.end(None);
        assert!(!cache.is_ended());
        b.end(None);
        assert!(cache.is_ended());
    }

    #[test]
    fn a_stream_ending_mid_run_waits_for_streams_read_later() {
        let done = of(vec![1]);
        let live: StreamHost<i32> = StreamHost::new();
        let live_stream = live.get_stream();
        let cache = ReactiveCache::from_stream(expr(move |t| {
            Ok(t.get(&done)? + t.get_or(&live_stream, 0)?)
        }));

        assert_eq!(cache.get_cloned(), vec![1]);
        assert!(!cache.is_ended());
        assert_eq!(live.count_subscribers(), 1);

        live.emit(2);
        assert_eq!(cache.get_cloned(), vec![1, 3]);

        live.end(None);
        assert!(cache.is_ended());
    }

    #[test]
    fn peek_or_reads_a_fallback_without_tracking() {
        let a: StreamHost<i32> = StreamHost::new();
        let b: StreamHost<i32> = StreamHost::new();
        let (stream_a, stream_b) = (a.get_stream(), b.get_stream());
        let cache = ReactiveCache::from_stream(expr(move |t| {
            Ok(t.get(&stream_a)? + t.peek_or(&stream_b, 100)?)
        }));

        a.emit(1);
        b.emit(5);
        assert_eq!(cache.get_cloned(), vec![101]);

        a.emit(2);
        assert_eq!(cache.get_cloned(), vec![101, 7]);
    }

    #[test]
    fn memo_deferred_drops_repeated_results() {
        let a: StreamHost<i32> = StreamHost::new();
        let stream_a = a.get_stream();
        let cache = ReactiveCache::from_stream(memo_deferred(move |t| {
            let tens = t.get(&stream_a)? / 10;
            Ok(Deferred::resolved(Ok(tens)))
        }));

        for val in [1, 5, 12, 18, 30] {
            a.emit(val);
        }
        assert_eq!(cache.get_cloned(), vec![0, 1, 3]);
    }
}
