//! Facility ACS Environment Abstraction Layer
//!
//! This crate provides the execution context the facility engines run in:
//! - Time (`now()`, `sleep()`) behind [`AcsContext`]
//! - A bounded [`WorkerPool`] for fire-and-forget work
//! - Cancellable fixed-interval clock loops ([`Ticker`])
//! - Queue transport ([`MessageSource`]) with an in-memory implementation
//!
//! Nothing here is global: the top-level assembly builds one context and one
//! pool and hands clones to every component.
//!
//! # Example
//!
//! ```ignore
//! use acs_env::{AcsContext, Ticker, TokioContext, WorkerPool};
//!
//! let ctx = TokioContext::shared(42);
//! let pool = WorkerPool::new(16);
//! let ticker = Ticker::spawn(ctx, "generator", Duration::from_secs(1), move |_| {
//!     let _ = pool.submit("tick", async { /* work */ });
//! });
//! ```

mod context;
mod error;
mod pool;
mod queue;
mod ticker;
mod tokio_impl;
mod types;

pub use context::AcsContext;
pub use error::EnvError;
pub use pool::{PoolStats, WorkerPool};
pub use queue::{MemoryQueue, MessageSource, QueueSettings};
pub use ticker::Ticker;
pub use tokio_impl::TokioContext;
pub use types::{EventId, QueueMessage};
