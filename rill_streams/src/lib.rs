#[macro_use]
mod pipe;

mod builders;
mod clock;
mod deferred;
mod error;
mod expr;
mod flatten;
mod multicast;
mod multiplexer;
pub mod ops;
mod reactive_cache;
mod reactive_value;
mod sinks;
mod sources;
mod stateful_operators;
mod stateless_operators;
mod stream_combinators;
mod stream_host;
mod streams;
mod timing_operators;
mod wait;

pub use builders::{sink, source, talkback, CustomControl, CustomSink};
pub use clock::{Clock, TimerId};
pub use deferred::{Deferred, DeferredHandle};
pub use error::{Error, Result};
pub use expr::{expr, expr_deferred, memo, memo_deferred, Eval, Halt, MemoTracker, Tracker};
pub use multiplexer::Multiplexer;
pub use pipe::Pipe;
pub use reactive_cache::ReactiveCache;
pub use reactive_value::{ReactiveValue, ReadonlyReactiveValue, WriteableReactiveValue};
pub use sinks::{
    first, iterate, iterate_later, last, notify, nth, observe, observe_later, Iteration,
    Notification, Observation, Subscription,
};
pub use sources::{empty, fail, from_deferred, from_iter, interval, never, of};
pub use stateful_operators::concat;
pub use stream_combinators::{combine, combine2, combine3, merge};
pub use stream_host::StreamHost;
pub use streams::{Consumer, Control, Producer, Stream, StreamId};
pub use wait::{wait, Wait, WaitSpec, Waiting};
