//! Production implementation of AcsContext using Tokio.

use crate::AcsContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Production context backed by the Tokio clock.
///
/// Time is measured with `tokio::time::Instant`, so a paused test runtime
/// (`start_paused = true`) sees virtual time advance only through sleeps.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Master seed for strategy noise
    seed: u64,
}

impl TokioContext {
    /// Creates a new TokioContext with a random seed.
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Creates a context with a fixed seed for reproducible noise.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed,
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::with_seed(seed))
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcsContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
