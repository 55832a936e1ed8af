//! Periodic property generation.
//!
//! The [`PropertyGenerator`] owns a registry of [`GenerationStrategy`]
//! instances and, on every tick of its clock, submits each strategy's tick to
//! the shared worker pool without waiting for it.
//!
//! # Registration
//!
//! Strategies are snapshotted when the generator starts. `push_strategy`
//! while the generator runs is rejected with `InvalidState` instead of being
//! silently ignored. After `stop` the generator can be started again and
//! takes a fresh snapshot.
//!
//! # Isolation
//!
//! A strategy returning an error (or panicking) is logged and counted; the
//! other strategies on the same tick and all later ticks run normally. Each
//! strategy sits behind its own lock, so a slow strategy whose tick `n` is
//! still running makes tick `n + 1` wait rather than run concurrently.

mod strategies;

pub use strategies::{strategies_for_cell, CellHealthStrategy, DefaultGenerationStrategy};

use crate::error::{AcsError, AcsResult};
use acs_env::{AcsContext, Ticker, WorkerPool};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

/// A named per-tick state update bound to one subsystem instance.
pub trait GenerationStrategy: Send + 'static {
    fn name(&self) -> &str;

    /// Computes and writes the next state of the bound subsystem.
    fn tick(&mut self) -> AcsResult<()>;
}

type SharedStrategy = Arc<Mutex<Box<dyn GenerationStrategy>>>;

/// Counters kept across ticks.
#[derive(Debug, Default)]
pub struct GeneratorStats {
    ticks: AtomicU64,
    strategy_runs: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl GeneratorStats {
    /// Clock ticks fired.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Strategy ticks that completed successfully.
    pub fn strategy_runs(&self) -> u64 {
        self.strategy_runs.load(Ordering::SeqCst)
    }

    /// Strategy ticks that returned an error or panicked.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Strategy ticks the pool refused.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Registry of strategies driven by a fixed-interval clock.
pub struct PropertyGenerator {
    strategies: Vec<(String, SharedStrategy)>,
    ticker: Option<Ticker>,
    stats: Arc<GeneratorStats>,
}

impl PropertyGenerator {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            ticker: None,
            stats: Arc::new(GeneratorStats::default()),
        }
    }

    /// Registers a strategy. Not valid while the generator runs.
    pub fn push_strategy(&mut self, strategy: Box<dyn GenerationStrategy>) -> AcsResult<()> {
        let name = strategy.name().to_string();
        if self.is_running() {
            return Err(AcsError::invalid_state(format!(
                "generator running, strategy '{}' not registered",
                name
            )));
        }
        debug!("Registered strategy '{}'", name);
        self.strategies.push((name, Arc::new(Mutex::new(strategy))));
        Ok(())
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .as_ref()
            .map(|ticker| !ticker.is_stopped())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> &GeneratorStats {
        &self.stats
    }

    /// Starts the repeating tick: every `interval`, every registered strategy
    /// is submitted to `pool`.
    pub fn start(
        &mut self,
        ctx: Arc<dyn AcsContext>,
        interval: Duration,
        pool: WorkerPool,
    ) -> AcsResult<()> {
        if self.is_running() {
            return Err(AcsError::invalid_state("generator already running"));
        }

        let strategies: Arc<[(String, SharedStrategy)]> = self.strategies.clone().into();
        let stats = Arc::clone(&self.stats);
        info!(
            "Starting property generator with {} strategies (interval {:?})",
            strategies.len(),
            interval
        );

        let ticker = Ticker::spawn(ctx, "property-generator", interval, move |_| {
            stats.ticks.fetch_add(1, Ordering::SeqCst);
            for (name, strategy) in strategies.iter() {
                let strategy = Arc::clone(strategy);
                let task_stats = Arc::clone(&stats);
                let task_name = name.clone();
                let submitted = pool.submit(name, async move {
                    run_strategy(&task_name, &strategy, &task_stats);
                });
                if submitted.is_err() {
                    stats.dropped.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        self.ticker = Some(ticker);
        Ok(())
    }

    /// Runs every strategy once on the calling thread.
    ///
    /// Returns the number of strategies that failed.
    pub fn tick_now(&self) -> usize {
        self.stats.ticks.fetch_add(1, Ordering::SeqCst);
        self.strategies
            .iter()
            .filter(|(name, strategy)| !run_strategy(name, strategy, &self.stats))
            .count()
    }

    /// Halts further scheduling. In-flight ticks keep running.
    pub fn stop(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.stop();
        }
    }
}

impl Default for PropertyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn run_strategy(name: &str, strategy: &Mutex<Box<dyn GenerationStrategy>>, stats: &GeneratorStats) -> bool {
    let mut strategy = strategy.lock().unwrap_or_else(PoisonError::into_inner);
    let outcome = catch_unwind(AssertUnwindSafe(|| strategy.tick()))
        .unwrap_or_else(|_| Err(AcsError::strategy(name, "panicked")));
    match outcome {
        Ok(()) => {
            stats.strategy_runs.fetch_add(1, Ordering::SeqCst);
            true
        }
        Err(err) => {
            stats.failures.fetch_add(1, Ordering::SeqCst);
            error!("Strategy '{}' tick failed: {}", name, err);
            false
        }
    }
}
