//! Cancellable fixed-interval clock loop.

use crate::AcsContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Handle to a running clock loop.
///
/// Dropping the handle stops the loop as well.
pub struct Ticker {
    name: String,
    stop_tx: watch::Sender<bool>,
    ticks: Arc<AtomicU64>,
}

impl Ticker {
    /// Spawns a loop that sleeps `interval` on the context clock and then
    /// calls `on_tick` with the tick number, until stopped.
    ///
    /// The stop signal is checked on every iteration, including while
    /// sleeping. `on_tick` runs on the clock task itself, so it should only
    /// submit work, not do it.
    pub fn spawn<Ctx, F>(ctx: Arc<Ctx>, name: &str, interval: Duration, mut on_tick: F) -> Self
    where
        Ctx: AcsContext + ?Sized,
        F: FnMut(u64) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let ticks = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&ticks);
        let loop_name = name.to_string();
        tokio::spawn(async move {
            info!("Clock '{}' started (interval {:?})", loop_name, interval);
            loop {
                tokio::select! {
                    _ = ctx.sleep(interval) => {}
                    changed = stop_rx.changed() => {
                        // A closed channel means every handle is gone.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
                if *stop_rx.borrow() {
                    break;
                }
                let tick = counter.fetch_add(1, Ordering::SeqCst) + 1;
                on_tick(tick);
            }
            info!("Clock '{}' stopped", loop_name);
        });

        Self {
            name: name.to_string(),
            stop_tx,
            ticks,
        }
    }

    /// Prevents further ticks. Work already submitted keeps running.
    pub fn stop(&self) {
        debug!("Stopping clock '{}'", self.name);
        self.stop_tx.send_replace(true);
    }

    /// Returns true once `stop` was called.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Number of ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokioContext;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_on_interval() {
        let ctx = TokioContext::shared(7);
        let ticker = Ticker::spawn(ctx, "test", Duration::from_millis(100), |_| {});

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticker.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stop_halts_ticks() {
        let ctx = TokioContext::shared(7);
        let ticker = Ticker::spawn(ctx, "test", Duration::from_millis(100), |_| {});

        tokio::time::sleep(Duration::from_millis(250)).await;
        ticker.stop();
        let at_stop = ticker.ticks();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(ticker.is_stopped());
        assert_eq!(ticker.ticks(), at_stop);
    }
}
