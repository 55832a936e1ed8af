//! Facility ACS Simulation Harness
//!
//! Assembles a [`acs_core::Facility`], plays a scripted scenario against it
//! and reports how the run went. Under a paused tokio clock the whole run
//! takes virtual time only, so a 60 second scenario finishes in
//! milliseconds and is reproducible per seed.
//!
//! # Usage
//!
//! ```ignore
//! use acs_core::FacilityConfig;
//! use acs_sim::{ScenarioId, SimRunner};
//!
//! let runner = SimRunner::new(FacilityConfig::default());
//! let result = runner.run(ScenarioId::Battery).await?;
//! assert!(result.passed);
//! ```

mod error;
mod runner;
pub mod scenarios;

pub use error::{SimError, SimResult};
pub use runner::{CellSummary, RunMetrics, RunResult, SimRunner};
pub use scenarios::ScenarioId;
