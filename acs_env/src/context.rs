//! Core environment context trait for the facility engines.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The central interface for time and entropy.
///
/// This trait abstracts the "real world" so that the clock loops, the
/// dispatcher journeys and the generation strategies never reach for a global
/// clock or a global RNG. The top-level assembly constructs one context and
/// passes it down.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Tests**: the same `TokioContext` under a paused tokio clock
#[async_trait]
pub trait AcsContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used as the ordering key for scheduled events.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for status reports.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// This is the only suspension point used by clock loops and journeys.
    async fn sleep(&self, duration: Duration);

    /// Returns the master seed that strategy noise is derived from.
    fn seed(&self) -> u64;

    /// Derives a reproducible sub-seed for one consumer of randomness.
    ///
    /// `master XOR (index * prime)` mixing keeps consumers isolated: adding a
    /// strategy does not shift the noise of the others.
    fn derive_seed(&self, index: u64) -> u64 {
        self.seed()
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(index.wrapping_mul(0x517cc1b727220a95))
    }
}
