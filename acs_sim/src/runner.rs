//! Scenario runner - drives an assembled facility through one scenario.

use crate::error::{SimError, SimResult};
use crate::scenarios::ScenarioId;
use acs_core::{Event, EventKind, Facility, FacilityConfig, TeamState};
use acs_env::{AcsContext, MemoryQueue, TokioContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the harness looks for alarmed cells.
const DISPATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Scenario reached its last action
    pub is_end: bool,

    /// Win condition held at the end
    pub is_win: bool,

    /// Ended and won
    pub passed: bool,

    /// Facility clock when the run stopped
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Counters collected during the run
    pub metrics: RunMetrics,

    /// State of every cell when the run stopped
    pub cells: Vec<CellSummary>,
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Crews sent by the harness
    pub dispatches: u64,

    /// Repairs applied by crews
    pub repairs: u64,

    /// Events pushed to the notify observer, by kind
    pub events: BTreeMap<String, u64>,

    /// Strategy ticks that failed
    pub strategy_failures: u64,

    /// Tasks the worker pool refused
    pub pool_dropped: u64,

    /// Queue messages dropped as malformed
    pub malformed_messages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSummary {
    pub name: String,
    pub is_on: bool,
    pub alarm: bool,
    pub durability: f64,
}

/// Runs facility scenarios.
pub struct SimRunner {
    /// Facility configuration, seed included
    config: FacilityConfig,

    /// Maximum facility time per run
    max_duration: Duration,
}

impl SimRunner {
    /// Creates a new runner.
    pub fn new(config: FacilityConfig) -> Self {
        Self {
            config,
            max_duration: Duration::from_secs(60),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    pub fn config(&self) -> &FacilityConfig {
        &self.config
    }

    /// Runs a scenario until it ends or the duration runs out.
    ///
    /// Alarmed cells get an idle crew, a couple of queue messages (one of
    /// them malformed) exercise ingestion, and every delivered event is
    /// logged as the push channel would send it.
    pub async fn run(&self, scenario: ScenarioId) -> SimResult<RunResult> {
        let target = self
            .config
            .cells
            .first()
            .cloned()
            .ok_or_else(|| SimError::InvalidConfig("no power cells configured".to_string()))?;
        if self.config.teams.is_empty() {
            return Err(SimError::InvalidConfig("no repair teams configured".to_string()));
        }
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let ctx: Arc<dyn AcsContext> = TokioContext::shared(self.config.seed);
        let mut facility = Facility::new(self.config.clone(), Arc::clone(&ctx))?;
        facility.set_scenario(scenario.build(&target));

        let pushed: Arc<Mutex<BTreeMap<String, u64>>> = Arc::default();
        let sink = Arc::clone(&pushed);
        facility.start(move |event: &Event| {
            debug!("push {} {:?} {}", event.id, event.kind, event.payload);
            let mut counts = sink.lock().unwrap_or_else(PoisonError::into_inner);
            *counts.entry(kind_name(&event.kind)).or_default() += 1;
            Ok(())
        })?;

        let queue = MemoryQueue::new(self.config.queue.queue_name.clone());
        for message in control_messages(&self.config.cells) {
            if let Err(err) = queue.publish(message) {
                warn!("Could not publish control message: {}", err);
            }
        }
        facility.start_ingest(Arc::new(queue))?;

        let mut dispatches = 0;
        while ctx.now() < self.max_duration && !facility.scenarist().is_end() {
            ctx.sleep(DISPATCH_INTERVAL).await;
            dispatches += dispatch_crews(&facility);
        }
        // Let the event clock deliver what the last step emitted.
        ctx.sleep(self.config.event_tick * 2).await;
        facility.stop();

        Ok(self.summarize(&facility, scenario, dispatches, &pushed))
    }

    fn summarize(
        &self,
        facility: &Facility,
        scenario: ScenarioId,
        dispatches: u64,
        pushed: &Mutex<BTreeMap<String, u64>>,
    ) -> RunResult {
        let scenarist = facility.scenarist();
        let (is_end, is_win) = (scenarist.is_end(), scenarist.is_win());
        let failure_reason = match (is_end, is_win) {
            (true, true) => None,
            (true, false) => Some("win condition failed".to_string()),
            (false, _) => Some(match scenarist.status().and_then(|s| s.current_action) {
                Some(action) => format!("timed out in action '{}'", action),
                None => "timed out".to_string(),
            }),
        };

        let events = pushed.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let metrics = RunMetrics {
            dispatches,
            repairs: events.get(&kind_name(&EventKind::RepairApplied)).copied().unwrap_or(0),
            events,
            strategy_failures: facility.generator().stats().failures(),
            pool_dropped: facility.pool().stats().dropped(),
            malformed_messages: facility.ingestor().stats().malformed(),
        };

        let cells = facility
            .energy()
            .cell_list()
            .into_values()
            .map(|cell| CellSummary {
                name: cell.name().to_string(),
                is_on: cell.is_on(),
                alarm: cell.alarm(),
                durability: cell.durability(),
            })
            .collect();

        RunResult {
            scenario,
            seed: self.config.seed,
            is_end,
            is_win,
            passed: is_end && is_win,
            final_time_secs: facility.context().now().as_secs_f64(),
            failure_reason,
            metrics,
            cells,
        }
    }
}

/// Sends one idle crew to every alarmed cell nobody is heading to.
///
/// Returns the number of crews sent.
fn dispatch_crews(facility: &Facility) -> u64 {
    let dispatcher = facility.dispatcher();
    let teams = dispatcher.team_list();
    let covered: Vec<&str> = teams
        .values()
        .filter(|team| team.state == TeamState::EnRoute)
        .filter_map(|team| team.assigned_location.as_deref())
        .collect();
    let mut idle = teams
        .iter()
        .filter(|(_, team)| team.state == TeamState::Idle)
        .map(|(name, _)| name);

    let mut sent = 0;
    for cell in facility.model().alarmed_cells() {
        if covered.contains(&cell.as_str()) {
            continue;
        }
        let Some(team) = idle.next() else {
            debug!("No idle crew for '{}'", cell);
            break;
        };
        match dispatcher.send_team(team, &cell) {
            Ok(()) => sent += 1,
            Err(err) => warn!("Could not send '{}' to '{}': {}", team, cell, err),
        }
    }
    sent
}

/// Startup traffic for the queue: a malformed body, then a start command
/// per cell.
fn control_messages(cells: &[String]) -> Vec<String> {
    let mut messages = vec!["not-json".to_string()];
    messages.extend(
        cells
            .iter()
            .map(|cell| serde_json::json!({ "cell": cell, "command": "start" }).to_string()),
    );
    messages
}

fn kind_name(kind: &EventKind) -> String {
    match kind {
        EventKind::Custom(name) => name.clone(),
        other => serde_json::to_value(other)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> SimRunner {
        SimRunner::new(FacilityConfig::default()).with_duration(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_run_passes() {
        let result = runner().run(ScenarioId::Battery).await.unwrap();

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.dispatches >= 1);
        assert!(result.metrics.repairs >= 1);
        assert_eq!(result.metrics.malformed_messages, 1);
        assert_eq!(result.metrics.pool_dropped, 0);
        assert_eq!(result.cells.len(), 3);
        assert!(result.cells.iter().all(|c| c.is_on && !c.alarm));
    }

    #[tokio::test(start_paused = true)]
    async fn test_magnet_quench_run_passes() {
        let result = runner().run(ScenarioId::MagnetQuench).await.unwrap();
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.events.contains_key("scenario_ended"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_run_times_out() {
        let result = runner()
            .with_duration(Duration::from_secs(1))
            .run(ScenarioId::Battery)
            .await
            .unwrap();

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().starts_with("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_config_rejected() {
        let config = FacilityConfig {
            cells: Vec::new(),
            ..FacilityConfig::default()
        };
        let err = SimRunner::new(config).run(ScenarioId::Battery).await.unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(kind_name(&EventKind::RepairApplied), "repair_applied");
        assert_eq!(kind_name(&EventKind::Custom("x".to_string())), "x");
    }
}
