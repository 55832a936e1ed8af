//! Facility automated control system core.
//!
//! This crate holds the facility model and the engines that run it:
//!
//! - [`generator`]: the [`PropertyGenerator`] clock and its per-subsystem
//!   [`GenerationStrategy`] instances
//! - [`events`]: the [`EventExecutor`], the ordered event clock observers
//!   subscribe to
//! - [`scenario`]: scripted [`Scenario`]s driven by the [`Scenarist`]
//! - [`repair`]: the [`RepairTeamDispatcher`] and its journey state machine
//! - [`energy`], [`ingest`], [`status`]: what an API layer or a queue
//!   consumer talks to
//!
//! [`Facility`] wires them together around one context and one worker pool.
//!
//! # Example
//!
//! ```ignore
//! use acs_core::{battery_scenario, Facility, FacilityConfig};
//! use acs_env::TokioContext;
//!
//! let ctx = TokioContext::shared(42);
//! let mut facility = Facility::new(FacilityConfig::default(), ctx)?;
//! facility.set_scenario(battery_scenario("cell-1"));
//! facility.start(|event| {
//!     println!("{:?}", event.kind);
//!     Ok(())
//! })?;
//! ```

pub mod config;
pub mod energy;
pub mod error;
pub mod events;
pub mod facility;
pub mod generator;
pub mod ingest;
pub mod model;
pub mod repair;
pub mod scenario;
pub mod status;

pub use config::{debug_from_env, FacilityConfig, JourneyTimings};
pub use energy::EnergySystem;
pub use error::{AcsError, AcsResult};
pub use events::{Event, EventExecutor, EventKind};
pub use facility::Facility;
pub use generator::{GenerationStrategy, PropertyGenerator};
pub use ingest::{ControlMessageConsumer, MessageConsumer, QueueIngestor};
pub use model::{Model, PowerCell, RepairTeam, SubsystemKind, TeamState};
pub use repair::{RepairTeamDispatcher, SendTeamRequest, SendTeamResponse, TeamStateView};
pub use scenario::{battery_scenario, Action, ActionContext, FnAction, Scenario, Scenarist};
pub use status::StatusReport;
