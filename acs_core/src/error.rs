//! Error types for the facility core.

use acs_env::EnvError;
use thiserror::Error;

/// Errors raised by the facility engines and managers.
///
/// `TeamNotFound`, `CellNotFound`, `AlreadyAssigned`, `NotDispatched` and
/// `InvalidState` surface to callers. `StrategyFailure`, `ObserverFailure`
/// and `MalformedMessage` are contained inside the engine that produced them
/// and only ever reach a log record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcsError {
    #[error("Repair team not found: {0}")]
    TeamNotFound(String),

    #[error("Power cell not found: {0}")]
    CellNotFound(String),

    #[error("Unknown subsystem: {0}")]
    SubsystemNotFound(String),

    /// A team may not be double-booked
    #[error("Team '{team}' is already assigned to '{location}' ({state})")]
    AlreadyAssigned {
        team: String,
        location: String,
        state: String,
    },

    /// Recall of a team that has nothing to be recalled from
    #[error("Team '{team}' is not dispatched ({state})")]
    NotDispatched { team: String, state: String },

    /// Operation not valid in the current state machine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Strategy '{strategy}' failed: {reason}")]
    StrategyFailure { strategy: String, reason: String },

    #[error("Observer '{observer}' failed: {reason}")]
    ObserverFailure { observer: String, reason: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl AcsError {
    pub fn team_not_found(name: impl Into<String>) -> Self {
        Self::TeamNotFound(name.into())
    }

    pub fn cell_not_found(name: impl Into<String>) -> Self {
        Self::CellNotFound(name.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn strategy(strategy: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StrategyFailure {
            strategy: strategy.into(),
            reason: reason.to_string(),
        }
    }

    pub fn observer(observer: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ObserverFailure {
            observer: observer.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the kinds a boundary layer reports as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TeamNotFound(_) | Self::CellNotFound(_) | Self::SubsystemNotFound(_)
        )
    }

    /// True for the kinds a boundary layer reports as a rejected request.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::AlreadyAssigned { .. } | Self::NotDispatched { .. } | Self::InvalidState(_)
        )
    }
}

pub type AcsResult<T> = Result<T, AcsError>;
