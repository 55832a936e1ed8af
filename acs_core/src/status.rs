//! Root status report.

use crate::scenario::Scenarist;
use acs_env::AcsContext;
use serde::{Deserialize, Serialize};
use std::time::UNIX_EPOCH;

/// Body of the root status endpoint.
///
/// The scenario flags are only exposed in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub debug_mode: bool,

    /// Wall-clock time, seconds since the unix epoch
    pub time: f64,

    /// Time since the facility clock started
    pub uptime_secs: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_win: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_end: Option<bool>,
}

impl StatusReport {
    pub fn collect(ctx: &dyn AcsContext, scenarist: &Scenarist, debug_mode: bool) -> Self {
        let time = ctx
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let (is_win, is_end) = if debug_mode {
            (Some(scenarist.is_win()), Some(scenarist.is_end()))
        } else {
            (None, None)
        };

        Self {
            debug_mode,
            time,
            uptime_secs: ctx.now().as_secs_f64(),
            is_win,
            is_end,
        }
    }
}
