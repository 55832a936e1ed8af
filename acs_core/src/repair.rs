//! Repair-team dispatch.
//!
//! A dispatched crew walks `Idle -> EnRoute -> Working -> Returning -> Idle`.
//! The first edge happens synchronously in [`RepairTeamDispatcher::send_team`];
//! the rest of the journey runs as one task on the worker pool, suspending on
//! the context clock between legs. Different teams travel in parallel, one
//! team never runs two transitions at once.

use crate::config::JourneyTimings;
use crate::error::{AcsError, AcsResult};
use crate::events::{EventExecutor, EventKind};
use crate::model::{Model, TeamHandle, TeamState};
use acs_env::{AcsContext, WorkerPool};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Body of `POST /start` and `POST /stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTeamRequest {
    pub team_name: String,
    pub location: String,
}

/// Reply to `POST /start` and `POST /stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTeamResponse {
    /// Whether the requested transition was accepted
    pub execution_status: bool,
}

/// A team as the API exposes it, without its own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStateView {
    pub state: TeamState,
    pub assigned_location: Option<String>,
}

/// Owns every repair-team state change.
#[derive(Clone)]
pub struct RepairTeamDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    ctx: Arc<dyn AcsContext>,
    model: Model,
    events: EventExecutor,
    pool: WorkerPool,
    timings: JourneyTimings,
}

impl RepairTeamDispatcher {
    pub fn new(
        ctx: Arc<dyn AcsContext>,
        model: Model,
        events: EventExecutor,
        pool: WorkerPool,
        timings: JourneyTimings,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                ctx,
                model,
                events,
                pool,
                timings,
            }),
        }
    }

    pub fn timings(&self) -> JourneyTimings {
        self.inner.timings
    }

    /// Every team keyed by name.
    pub fn team_list(&self) -> BTreeMap<String, TeamStateView> {
        self.inner
            .model
            .repair_teams
            .iter()
            .map(|(name, team)| (name.clone(), view(team)))
            .collect()
    }

    pub fn team_info(&self, name: &str) -> AcsResult<TeamStateView> {
        self.inner.team(name).map(view)
    }

    /// Sends an idle team to `location`.
    ///
    /// Fails with `TeamNotFound`/`CellNotFound` for unknown names and with
    /// `AlreadyAssigned` if the team is busy, leaving it untouched. If the
    /// pool refuses the journey the team is put back to `Idle` and no
    /// `TeamDispatched` event is emitted.
    pub fn send_team(&self, team_name: &str, location: &str) -> AcsResult<()> {
        let inner = &self.inner;
        let team = inner.team(team_name)?;
        if inner.model.cell(location).is_none() {
            return Err(AcsError::cell_not_found(location));
        }

        let assignment = team.with(|team| team.dispatch(location))?;

        let journey = journey(Arc::clone(inner), team_name.to_string(), assignment);
        if let Err(err) = inner.pool.submit(&format!("journey-{}", team_name), journey) {
            team.with(|team| {
                if team.assignment() == assignment && team.state() == TeamState::EnRoute {
                    // EnRoute -> Returning -> Idle are both allowed edges.
                    let _ = team.transition(TeamState::Returning);
                    let _ = team.transition(TeamState::Idle);
                }
            });
            warn!("Dispatch of '{}' rolled back: {}", team_name, err);
            return Err(err.into());
        }

        info!("Team '{}' dispatched to '{}'", team_name, location);
        inner.events.trigger(
            EventKind::TeamDispatched,
            json!({ "team": team_name, "location": location, "assignment": assignment }),
        );
        Ok(())
    }

    /// Turns an `EnRoute` or `Working` team around.
    ///
    /// A repair that was not applied yet is never applied. The running
    /// journey brings the team home.
    pub fn recall_team(&self, team_name: &str) -> AcsResult<()> {
        let team = self.inner.team(team_name)?;
        let location = team.with(|team| match team.state() {
            TeamState::EnRoute | TeamState::Working => {
                let location = team.assigned_location().unwrap_or_default().to_string();
                team.transition(TeamState::Returning).map(|_| location)
            }
            state => Err(AcsError::NotDispatched {
                team: team_name.to_string(),
                state: state.to_string(),
            }),
        })?;

        info!("Team '{}' recalled from '{}'", team_name, location);
        self.inner.events.trigger(
            EventKind::TeamRecalled,
            json!({ "team": team_name, "location": location }),
        );
        Ok(())
    }

    /// `POST /start`: rejections become `execution_status = false`, unknown
    /// names stay errors.
    pub fn handle_start(&self, request: &SendTeamRequest) -> AcsResult<SendTeamResponse> {
        respond(self.send_team(&request.team_name, &request.location))
    }

    /// `POST /stop`.
    pub fn handle_stop(&self, request: &SendTeamRequest) -> AcsResult<SendTeamResponse> {
        respond(self.recall_team(&request.team_name))
    }
}

impl DispatcherInner {
    fn team(&self, name: &str) -> AcsResult<&TeamHandle> {
        self.model
            .team(name)
            .ok_or_else(|| AcsError::team_not_found(name))
    }

    /// Moves `team` from `from` to `to` if it is still on `assignment` and in
    /// `from`. Entering `Working` applies the repair, once.
    fn advance(&self, team_name: &str, assignment: u64, from: TeamState, to: TeamState) -> bool {
        let Ok(handle) = self.team(team_name) else {
            return false;
        };
        let moved = handle.with(|team| {
            if team.assignment() != assignment || team.state() != from {
                return None;
            }
            let location = team.assigned_location().map(str::to_string);
            team.transition(to).ok()?;

            if to == TeamState::Working && !team.repair_applied() {
                if let Some(cell_name) = location.as_deref() {
                    if let Some(cell) = self.model.cell(cell_name) {
                        cell.with(|cell| cell.apply_repair());
                        info!("Team '{}' repaired '{}'", team_name, cell_name);
                    }
                }
                team.mark_repair_applied();
            }
            Some(location)
        });

        let Some(location) = moved else {
            return false;
        };
        debug!("Team '{}': {} -> {}", team_name, from, to);
        self.events.trigger(
            EventKind::TeamStateChanged,
            json!({ "team": team_name, "from": from, "to": to, "location": location }),
        );
        if to == TeamState::Working {
            self.events.trigger(
                EventKind::RepairApplied,
                json!({ "team": team_name, "location": location }),
            );
        }
        true
    }

    fn state_of(&self, team_name: &str, assignment: u64) -> Option<TeamState> {
        let handle = self.team(team_name).ok()?;
        let team = handle.lock();
        (team.assignment() == assignment).then_some(team.state())
    }
}

/// Remainder of one assignment, from `EnRoute` back to `Idle`.
async fn journey(inner: Arc<DispatcherInner>, team_name: String, assignment: u64) {
    let timings = inner.timings;
    loop {
        let Some(state) = inner.state_of(&team_name, assignment) else {
            return;
        };
        match state {
            TeamState::EnRoute => {
                inner.ctx.sleep(timings.travel).await;
                inner.advance(&team_name, assignment, TeamState::EnRoute, TeamState::Working);
            }
            TeamState::Working => {
                inner.ctx.sleep(timings.work).await;
                inner.advance(&team_name, assignment, TeamState::Working, TeamState::Returning);
            }
            TeamState::Returning => {
                inner.ctx.sleep(timings.travel).await;
                if inner.advance(&team_name, assignment, TeamState::Returning, TeamState::Idle) {
                    info!("Team '{}' back at base", team_name);
                    return;
                }
            }
            TeamState::Idle => return,
        }
    }
}

fn view(team: &TeamHandle) -> TeamStateView {
    let team = team.lock();
    TeamStateView {
        state: team.state(),
        assigned_location: team.assigned_location().map(str::to_string),
    }
}

fn respond(result: AcsResult<()>) -> AcsResult<SendTeamResponse> {
    match result {
        Ok(()) => Ok(SendTeamResponse {
            execution_status: true,
        }),
        Err(err) if err.is_invalid_state() => {
            warn!("Request rejected: {}", err);
            Ok(SendTeamResponse {
                execution_status: false,
            })
        }
        Err(err) => Err(err),
    }
}
