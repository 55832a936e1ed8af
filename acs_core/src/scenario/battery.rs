//! The stock three-act battery scenario.
//!
//! 1. Every cell is brought online.
//! 2. The target cell's cooling trips and its alarm goes off; the act ends
//!    once a repair crew has cleared the alarm and cooling runs again.
//! 3. The facility must get every cell back to a healthy state.
//!
//! The operators win if no cell has burned out by the end.

use super::{Action, ActionContext, Scenario};
use crate::error::{AcsError, AcsResult};
use crate::events::EventKind;
use crate::model::{Subsystem, SubsystemKind};
use serde_json::json;
use tracing::warn;

/// Durability a cell needs to count as healthy in the final act.
pub const HEALTHY_DURABILITY: f64 = 50.0;

/// Builds the battery scenario against `target_cell`.
pub fn battery_scenario(target_cell: &str) -> Scenario {
    Scenario::new("battery")
        .with_win_condition(|model| model.all_cells(|cell| cell.durability() > 0.0))
        .with_action(FirstActAction::new("First Act Action"))
        .with_action(SecondActAction::new("Second Act Action", target_cell))
        .with_action(ThirdActAction::new("Third Act Action"))
}

/// Starts every cell; done once all of them report on.
pub struct FirstActAction {
    name: String,
}

impl FirstActAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Action for FirstActAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, cx: &ActionContext<'_>) -> AcsResult<()> {
        for cell in cx.model.power_cells.values() {
            cell.with(|cell| cell.start());
        }
        Ok(())
    }

    fn is_complete(&self, cx: &ActionContext<'_>) -> bool {
        cx.model.all_cells(|cell| cell.is_on())
    }
}

/// Trips the target cell's cooling; done once the crew fixed it.
pub struct SecondActAction {
    name: String,
    target: String,
}

impl SecondActAction {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

impl Action for SecondActAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, cx: &ActionContext<'_>) -> AcsResult<()> {
        let cell = cx
            .model
            .cell(&self.target)
            .ok_or_else(|| AcsError::cell_not_found(&self.target))?;
        cell.with(|cell| {
            cell.cooling_system.stop();
            cell.raise_alarm();
        });
        warn!("Cooling failure on '{}'", self.target);
        cx.events.trigger(
            EventKind::CellAlarm,
            json!({ "cell": self.target, "subsystem": SubsystemKind::Cooling }),
        );
        Ok(())
    }

    fn is_complete(&self, cx: &ActionContext<'_>) -> bool {
        cx.model
            .cell(&self.target)
            .map(|cell| {
                let cell = cell.lock();
                !cell.alarm() && cell.cooling_system.is_on()
            })
            .unwrap_or(false)
    }
}

/// Done once every cell is healthy.
pub struct ThirdActAction {
    name: String,
}

impl ThirdActAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Action for ThirdActAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_complete(&self, cx: &ActionContext<'_>) -> bool {
        cx.model.all_cells(|cell| cell.is_healthy(HEALTHY_DURABILITY))
    }
}

/// Scripting aid: knocks one subsystem of a cell down to `durability` and
/// recomputes the cell's durability from it.
pub struct DebugBreakAction {
    name: String,
    target: String,
    kind: SubsystemKind,
    durability: f64,
}

impl DebugBreakAction {
    pub fn new(name: impl Into<String>, target: impl Into<String>, kind: SubsystemKind, durability: f64) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            durability,
        }
    }
}

impl Action for DebugBreakAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, cx: &ActionContext<'_>) -> AcsResult<()> {
        let cell = cx
            .model
            .cell(&self.target)
            .ok_or_else(|| AcsError::cell_not_found(&self.target))?;
        cell.with(|cell| {
            cell.subsystem_mut(self.kind).set_durability(self.durability);
            let durability = cell.subsystem_durability();
            cell.set_durability(durability);
        });
        Ok(())
    }

    fn is_complete(&self, _cx: &ActionContext<'_>) -> bool {
        true
    }
}
