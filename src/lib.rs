//! Composable push/pull streams built on a three-party handshake between producers, consumers
//! and the controls that connect them, plus reactive expressions computed from other streams.
//!
//! # Examples
//! ```
//! use rill::{computed, ReactiveCache, StreamHost};
//!
//! let width: StreamHost<u32> = StreamHost::new();
//! let height: StreamHost<u32> = StreamHost::new();
//! let (w, h) = (width.get_stream(), height.get_stream());
//!
//! let area = computed! { w * h };
//! let cache = ReactiveCache::from_stream(area);
//!
//! width.emit(2);
//! height.emit(3);
//! width.emit(5);
//! assert_eq!(cache.get_cloned(), vec![6, 15]);
//! ```

pub use rill_streams::*;

/// Builds an expression stream from a block. Every free variable of the block must be a
/// `Stream` in scope; inside the block it stands for that stream's latest value, and the block
/// re-runs whenever any of them emits.
pub use rill_macros::computed;
