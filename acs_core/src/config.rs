//! Facility configuration.

use acs_env::QueueSettings;
use std::time::Duration;

/// Configuration for a facility run.
#[derive(Debug, Clone)]
pub struct FacilityConfig {
    /// Master seed for strategy noise
    pub seed: u64,

    /// Power cell names, created at startup
    pub cells: Vec<String>,

    /// Repair team names, created at startup
    pub teams: Vec<String>,

    /// Maximum number of tasks in flight on the shared worker pool.
    ///
    /// Must cover strategies + teams + one scenario step, since a stuck
    /// task holds its slot indefinitely.
    pub pool_size: usize,

    /// Property generator interval
    pub generator_interval: Duration,

    /// Event executor tick
    pub event_tick: Duration,

    /// Scenario driving interval
    pub scenario_interval: Duration,

    /// Repair crew journey durations
    pub journey: JourneyTimings,

    /// Cell durability below which the health strategy raises the alarm
    pub alarm_threshold: f64,

    /// Multiplier on subsystem wear per tick
    pub wear_scale: f64,

    /// Expose scenario flags on the status report
    pub debug: bool,

    /// Queue broker settings for ingestion
    pub queue: QueueSettings,
}

impl FacilityConfig {
    /// Builds `n` names of the form `<prefix><i>`, starting at 1.
    pub fn numbered(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    /// Worker-pool size that fits every long-running task at once.
    pub fn minimum_pool_size(&self) -> usize {
        // Five subsystem strategies and one health strategy per cell.
        self.cells.len() * 6 + self.teams.len() + 1
    }
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cells: Self::numbered("cell-", 3),
            teams: Self::numbered("T", 3),
            pool_size: 64,
            generator_interval: Duration::from_secs(1),
            event_tick: Duration::from_millis(100),
            scenario_interval: Duration::from_millis(500),
            journey: JourneyTimings::default(),
            alarm_threshold: 40.0,
            wear_scale: 1.0,
            debug: false,
            queue: QueueSettings::default(),
        }
    }
}

/// Simulated durations of a repair journey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyTimings {
    /// One-way travel between base and a cell
    pub travel: Duration,

    /// Time spent working on site
    pub work: Duration,
}

impl Default for JourneyTimings {
    fn default() -> Self {
        Self {
            travel: Duration::from_secs(3),
            work: Duration::from_secs(5),
        }
    }
}

/// `DEBUG` set to a non-empty value turns debug mode on.
pub fn debug_from_env() -> bool {
    std::env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false)
}
