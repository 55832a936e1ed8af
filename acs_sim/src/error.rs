//! Errors surfaced by the harness.

use acs_core::AcsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Facility(#[from] AcsError),
}

pub type SimResult<T> = Result<T, SimError>;
