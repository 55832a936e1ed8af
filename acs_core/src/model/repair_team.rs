//! Repair crews and their assignment state machine.

use crate::error::{AcsError, AcsResult};
use serde::{Deserialize, Serialize};

/// Where a crew is in its current assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamState {
    Idle,
    EnRoute,
    Working,
    Returning,
}

impl TeamState {
    /// Returns true if `self -> next` is an allowed edge.
    ///
    /// The journey is `Idle -> EnRoute -> Working -> Returning -> Idle`;
    /// a recall may also cut `EnRoute -> Returning`.
    pub fn can_transition_to(self, next: TeamState) -> bool {
        matches!(
            (self, next),
            (TeamState::Idle, TeamState::EnRoute)
                | (TeamState::EnRoute, TeamState::Working)
                | (TeamState::EnRoute, TeamState::Returning)
                | (TeamState::Working, TeamState::Returning)
                | (TeamState::Returning, TeamState::Idle)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TeamState::Idle => "IDLE",
            TeamState::EnRoute => "EN_ROUTE",
            TeamState::Working => "WORKING",
            TeamState::Returning => "RETURNING",
        }
    }
}

impl std::fmt::Display for TeamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A dispatchable repair crew.
///
/// Invariant: `assigned_location` is set if and only if `state != Idle`.
/// Only the dispatcher mutates a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTeam {
    name: String,
    state: TeamState,
    assigned_location: Option<String>,

    /// Assignment counter, bumped on every dispatch
    #[serde(skip)]
    assignment: u64,

    /// Whether the current assignment already applied its repair
    #[serde(skip)]
    repair_applied: bool,
}

impl RepairTeam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TeamState::Idle,
            assigned_location: None,
            assignment: 0,
            repair_applied: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TeamState {
        self.state
    }

    pub fn assigned_location(&self) -> Option<&str> {
        self.assigned_location.as_deref()
    }

    pub fn assignment(&self) -> u64 {
        self.assignment
    }

    pub fn repair_applied(&self) -> bool {
        self.repair_applied
    }

    pub fn is_idle(&self) -> bool {
        self.state == TeamState::Idle
    }

    /// Starts a new assignment: `Idle -> EnRoute` and records the location.
    ///
    /// Returns the new assignment number.
    pub fn dispatch(&mut self, location: &str) -> AcsResult<u64> {
        if !self.is_idle() {
            return Err(AcsError::AlreadyAssigned {
                team: self.name.clone(),
                location: self.assigned_location.clone().unwrap_or_default(),
                state: self.state.to_string(),
            });
        }
        self.state = TeamState::EnRoute;
        self.assigned_location = Some(location.to_string());
        self.assignment += 1;
        self.repair_applied = false;
        Ok(self.assignment)
    }

    /// Moves along one allowed edge. Leaving `Idle` goes through `dispatch`.
    pub fn transition(&mut self, next: TeamState) -> AcsResult<()> {
        if next == TeamState::EnRoute || !self.state.can_transition_to(next) {
            return Err(AcsError::invalid_state(format!(
                "team '{}' cannot go {} -> {}",
                self.name, self.state, next
            )));
        }
        self.state = next;
        if next == TeamState::Idle {
            self.assigned_location = None;
        }
        Ok(())
    }

    pub(crate) fn mark_repair_applied(&mut self) {
        self.repair_applied = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_journey() {
        let mut team = RepairTeam::new("T1");
        assert_eq!(team.dispatch("cell-1").unwrap(), 1);
        assert_eq!(team.assigned_location(), Some("cell-1"));

        team.transition(TeamState::Working).unwrap();
        team.transition(TeamState::Returning).unwrap();
        assert_eq!(team.assigned_location(), Some("cell-1"));

        team.transition(TeamState::Idle).unwrap();
        assert!(team.is_idle());
        assert_eq!(team.assigned_location(), None);
    }

    #[test]
    fn test_double_dispatch_rejected() {
        let mut team = RepairTeam::new("T1");
        team.dispatch("cell-1").unwrap();

        let err = team.dispatch("cell-2").unwrap_err();
        assert!(matches!(err, AcsError::AlreadyAssigned { .. }));
        assert_eq!(team.state(), TeamState::EnRoute);
        assert_eq!(team.assigned_location(), Some("cell-1"));
    }

    fn any_state() -> impl Strategy<Value = TeamState> {
        prop_oneof![
            Just(TeamState::Idle),
            Just(TeamState::EnRoute),
            Just(TeamState::Working),
            Just(TeamState::Returning),
        ]
    }

    proptest! {
        #[test]
        fn prop_location_set_iff_not_idle(steps in proptest::collection::vec(any_state(), 0..40)) {
            let mut team = RepairTeam::new("T");
            for next in steps {
                let before = team.state();
                let result = if before == TeamState::Idle && next == TeamState::EnRoute {
                    team.dispatch("cell").map(|_| ())
                } else {
                    team.transition(next)
                };
                if result.is_ok() {
                    prop_assert!(before.can_transition_to(next));
                } else {
                    prop_assert_eq!(team.state(), before);
                }
                prop_assert_eq!(team.assigned_location().is_some(), !team.is_idle());
            }
        }
    }
}
