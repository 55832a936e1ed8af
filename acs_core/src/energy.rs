//! Energy-system manager: read access and control flags for power cells.
//!
//! Every read is a snapshot taken under the cell's guard, so a query never
//! observes a strategy tick or a repair half-way.

use crate::error::{AcsError, AcsResult};
use crate::model::{CellHandle, Model, PowerCell, Subsystem, SubsystemKind};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Clone)]
pub struct EnergySystem {
    model: Model,
}

impl EnergySystem {
    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn cell_names(&self) -> Vec<String> {
        self.model.power_cells.keys().cloned().collect()
    }

    /// Snapshot of every cell keyed by name.
    pub fn cell_list(&self) -> BTreeMap<String, PowerCell> {
        self.model
            .power_cells
            .iter()
            .map(|(name, cell)| (name.clone(), cell.snapshot()))
            .collect()
    }

    pub fn cell_info(&self, name: &str) -> AcsResult<PowerCell> {
        self.cell(name).map(CellHandle::snapshot)
    }

    /// Switches a cell and all its subsystems on.
    pub fn start_cell(&self, name: &str) -> AcsResult<()> {
        self.cell(name)?.with(|cell| cell.start());
        info!("Power cell '{}' started", name);
        Ok(())
    }

    /// Switches a cell and all its subsystems off.
    pub fn stop_cell(&self, name: &str) -> AcsResult<()> {
        self.cell(name)?.with(|cell| cell.stop());
        info!("Power cell '{}' stopped", name);
        Ok(())
    }

    /// Switches one subsystem of a cell.
    pub fn set_subsystem(&self, name: &str, kind: SubsystemKind, on: bool) -> AcsResult<()> {
        self.cell(name)?.with(|cell| {
            let subsystem = cell.subsystem_mut(kind);
            if on {
                subsystem.start();
            } else {
                subsystem.stop();
            }
        });
        info!("Subsystem {} of '{}' switched {}", kind, name, if on { "on" } else { "off" });
        Ok(())
    }

    /// Like [`EnergySystem::set_subsystem`], with the kind given by name.
    pub fn set_subsystem_named(&self, name: &str, kind: &str, on: bool) -> AcsResult<()> {
        let kind = kind
            .parse::<SubsystemKind>()
            .map_err(|_| AcsError::SubsystemNotFound(kind.to_string()))?;
        self.set_subsystem(name, kind, on)
    }

    pub fn alarmed_cells(&self) -> Vec<String> {
        self.model.alarmed_cells()
    }

    fn cell(&self, name: &str) -> AcsResult<&CellHandle> {
        self.model
            .cell(name)
            .ok_or_else(|| AcsError::cell_not_found(name))
    }
}
