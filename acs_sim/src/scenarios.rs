//! Scenarios the harness can run.

use acs_core::scenario::{
    battery_scenario, DebugBreakAction, FirstActAction, FnAction, Scenario, ThirdActAction,
};
use acs_core::SubsystemKind;
use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Three acts: power up, cooling fault on the first cell, full recovery
    Battery,

    /// A magnet quench on the first cell that a crew has to fix
    MagnetQuench,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Battery, ScenarioId::MagnetQuench]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Battery => "battery",
            ScenarioId::MagnetQuench => "magnet_quench",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Battery => "Power up, trip cooling on one cell, recover every cell",
            ScenarioId::MagnetQuench => "Power up, quench one magnet, wait for the alarm, recover",
        }
    }

    /// Builds the scenario against `target_cell`.
    pub fn build(&self, target_cell: &str) -> Scenario {
        match self {
            ScenarioId::Battery => battery_scenario(target_cell),
            ScenarioId::MagnetQuench => Scenario::new(self.name())
                .with_win_condition(|model| model.all_cells(|cell| cell.durability() > 0.0))
                .with_action(FirstActAction::new("Power Up"))
                .with_action(DebugBreakAction::new(
                    "Quench",
                    target_cell,
                    SubsystemKind::Magnet,
                    10.0,
                ))
                .with_action(
                    FnAction::new("Alarm").complete_when(|cx| cx.model.any_cell(|cell| cell.alarm())),
                )
                .with_action(ThirdActAction::new("Recovery")),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "battery" => Ok(ScenarioId::Battery),
            "magnet_quench" | "quench" => Ok(ScenarioId::MagnetQuench),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
