//! The facility model: power cells and repair teams.
//!
//! Every entity lives behind a [`Guarded`] handle. A strategy tick, a repair
//! effect and a query each take the entity's lock for the whole operation,
//! so no reader ever sees a half-applied write.

mod power_cell;
mod repair_team;
mod subsystems;

pub use power_cell::PowerCell;
pub use repair_team::{RepairTeam, TeamState};
pub use subsystems::{
    clamp_to, Battery, Capacitor, CoolingSystem, LiquidStorage, MagnetSystem, PlasmaHeater,
    Subsystem, SubsystemKind, VacuumVessel, CHARGE_RANGE, DURABILITY_RANGE,
};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Shared, single-owner-at-a-time handle to a model entity.
pub struct Guarded<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Guarded<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Takes the entity lock. A lock poisoned by a panicking writer is
    /// recovered; setters clamp, so the value is still in range.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering poisoned model lock");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Runs `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<T: Clone> Guarded<T> {
    /// Consistent copy taken under the lock.
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}

pub type CellHandle = Guarded<PowerCell>;
pub type TeamHandle = Guarded<RepairTeam>;

/// Aggregate of power cells and repair teams.
///
/// Cloning is cheap and shares the underlying entities. Cells and teams are
/// created once and never removed.
#[derive(Clone, Default)]
pub struct Model {
    pub power_cells: BTreeMap<String, CellHandle>,
    pub repair_teams: BTreeMap<String, TeamHandle>,
}

impl Model {
    pub fn new<C, T>(cells: C, teams: T) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let power_cells = cells
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), Guarded::new(PowerCell::new(name)))
            })
            .collect();
        let repair_teams = teams
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), Guarded::new(RepairTeam::new(name)))
            })
            .collect();

        Self {
            power_cells,
            repair_teams,
        }
    }

    pub fn cell(&self, name: &str) -> Option<&CellHandle> {
        self.power_cells.get(name)
    }

    pub fn team(&self, name: &str) -> Option<&TeamHandle> {
        self.repair_teams.get(name)
    }

    /// Returns true if `pred` holds for every cell.
    pub fn all_cells(&self, pred: impl Fn(&PowerCell) -> bool) -> bool {
        self.power_cells.values().all(|cell| pred(&cell.lock()))
    }

    /// Returns true if `pred` holds for at least one cell.
    pub fn any_cell(&self, pred: impl Fn(&PowerCell) -> bool) -> bool {
        self.power_cells.values().any(|cell| pred(&cell.lock()))
    }

    /// Names of cells currently in alarm.
    pub fn alarmed_cells(&self) -> Vec<String> {
        self.power_cells
            .iter()
            .filter(|(_, cell)| cell.lock().alarm())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_creation() {
        let model = Model::new(["cell-1", "cell-2"], ["T1"]);
        assert_eq!(model.power_cells.len(), 2);
        assert_eq!(model.repair_teams.len(), 1);
        assert!(model.cell("cell-1").is_some());
        assert!(model.team("T2").is_none());
    }

    #[test]
    fn test_clone_shares_entities() {
        let model = Model::new(["cell-1"], Vec::<String>::new());
        let copy = model.clone();

        copy.cell("cell-1").unwrap().with(|cell| cell.raise_alarm());

        assert!(model.cell("cell-1").unwrap().snapshot().alarm());
        assert_eq!(model.alarmed_cells(), vec!["cell-1".to_string()]);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let model = Model::new(["cell-1"], Vec::<String>::new());
        let cell = model.cell("cell-1").unwrap().clone();

        let writer = cell.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.lock();
            panic!("writer died");
        })
        .join();

        assert_eq!(cell.snapshot().durability(), 100.0);
    }
}
