//! Drives the active scenario on the worker pool.

use super::{ActionPhase, Scenario, StepOutcome};
use crate::error::{AcsError, AcsResult};
use crate::events::EventExecutor;
use crate::model::Model;
use acs_env::{AcsContext, Ticker, WorkerPool};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Read-only view of the active scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStatus {
    pub name: String,
    pub cursor: usize,
    pub action_count: usize,
    pub current_action: Option<String>,
    pub phase: ActionPhase,
    pub is_win: bool,
    pub is_end: bool,
}

/// Owner of the active scenario.
#[derive(Clone)]
pub struct Scenarist {
    inner: Arc<ScenaristInner>,
}

struct ScenaristInner {
    ctx: Arc<dyn AcsContext>,
    model: Model,
    events: EventExecutor,
    scenario: Mutex<Option<Scenario>>,
    ticker: Mutex<Option<Ticker>>,
}

impl Scenarist {
    pub fn new(ctx: Arc<dyn AcsContext>, model: Model, events: EventExecutor) -> Self {
        Self {
            inner: Arc::new(ScenaristInner {
                ctx,
                model,
                events,
                scenario: Mutex::new(None),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Replaces the active scenario wholesale.
    pub fn set_scenario(&self, scenario: Scenario) {
        info!("Active scenario set to '{}'", scenario.name());
        *lock(&self.inner.scenario) = Some(scenario);
    }

    /// Runs one driving step of the active scenario on the calling thread.
    ///
    /// Returns `None` when no scenario is set.
    pub fn step(&self) -> Option<StepOutcome> {
        let now = self.inner.ctx.now();
        let mut scenario = lock(&self.inner.scenario);
        scenario
            .as_mut()
            .map(|s| s.step(&self.inner.model, &self.inner.events, now))
    }

    /// Starts the driving loop: every `interval`, one step is submitted to
    /// `pool`.
    pub fn start(&self, interval: Duration, pool: WorkerPool) -> AcsResult<()> {
        let mut ticker = lock(&self.inner.ticker);
        if ticker.as_ref().map(|t| !t.is_stopped()).unwrap_or(false) {
            return Err(AcsError::invalid_state("scenarist already running"));
        }

        let scenarist = self.clone();
        *ticker = Some(Ticker::spawn(
            Arc::clone(&self.inner.ctx),
            "scenarist",
            interval,
            move |_| {
                let step = scenarist.clone();
                // Saturation is logged by the pool; the next tick retries.
                let _ = pool.submit("scenario-step", async move {
                    if let Some(outcome) = step.step() {
                        debug!("Scenario step: {:?}", outcome);
                    }
                });
            },
        ));
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(ticker) = lock(&self.inner.ticker).as_ref() {
            ticker.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.ticker)
            .as_ref()
            .map(|ticker| !ticker.is_stopped())
            .unwrap_or(false)
    }

    pub fn is_win(&self) -> bool {
        lock(&self.inner.scenario).as_ref().map(Scenario::is_win).unwrap_or(false)
    }

    pub fn is_end(&self) -> bool {
        lock(&self.inner.scenario).as_ref().map(Scenario::is_end).unwrap_or(false)
    }

    pub fn status(&self) -> Option<ScenarioStatus> {
        lock(&self.inner.scenario).as_ref().map(|s| ScenarioStatus {
            name: s.name().to_string(),
            cursor: s.cursor(),
            action_count: s.len(),
            current_action: s.current_action().map(str::to_string),
            phase: s.phase(),
            is_win: s.is_win(),
            is_end: s.is_end(),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::FnAction;
    use acs_env::TokioContext;

    fn scenarist() -> (Scenarist, Model) {
        let ctx: Arc<dyn AcsContext> = TokioContext::shared(1);
        let model = Model::new(["cell-1"], ["T1"]);
        let events = EventExecutor::new(Arc::clone(&ctx), Duration::from_millis(100));
        (Scenarist::new(ctx, model.clone(), events), model)
    }

    #[test]
    fn test_no_scenario() {
        let (scenarist, _) = scenarist();
        assert!(scenarist.step().is_none());
        assert!(!scenarist.is_end());
        assert!(scenarist.status().is_none());
    }

    #[test]
    fn test_set_scenario_replaces() {
        let (scenarist, _) = scenarist();
        scenarist.set_scenario(
            Scenario::new("first").with_action(FnAction::new("a").complete_when(|_| false)),
        );
        scenarist.step();
        assert_eq!(scenarist.status().unwrap().phase, ActionPhase::Running);

        scenarist.set_scenario(Scenario::new("second").with_action(FnAction::new("b")));
        let status = scenarist.status().unwrap();
        assert_eq!(status.name, "second");
        assert_eq!(status.phase, ActionPhase::Pending);
        assert_eq!(status.cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driving_loop_reaches_end() {
        let (scenarist, model) = scenarist();
        scenarist.set_scenario(
            Scenario::new("loop")
                .with_action(FnAction::new("a"))
                .with_action(FnAction::new("b").complete_when(|cx| cx.model.any_cell(|c| c.alarm())))
                .with_action(FnAction::new("c")),
        );
        scenarist
            .start(Duration::from_millis(500), WorkerPool::new(4))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!scenarist.is_end());
        assert_eq!(scenarist.status().unwrap().cursor, 1);

        model.cell("cell-1").unwrap().with(|c| c.raise_alarm());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(scenarist.is_end());
        assert!(scenarist.is_win());
        scenarist.stop();
    }
}
