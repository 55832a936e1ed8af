//! Power cell aggregate.

use super::subsystems::{
    clamp_to, mean, Battery, CoolingSystem, LiquidStorage, MagnetSystem, PlasmaHeater,
    Subsystem, SubsystemKind, VacuumVessel, DURABILITY_RANGE,
};
use serde::{Deserialize, Serialize};

/// One energy-generation unit and the subsystems it owns.
///
/// `is_on` and `alarm` are control flags: only explicit control operations,
/// the cell-health strategy and the repair effect write them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerCell {
    name: String,

    is_on: bool,
    alarm: bool,
    durability: f64,

    pub cooling_system: CoolingSystem,
    pub magnet_system: MagnetSystem,
    pub plasma_heater: PlasmaHeater,
    pub vacuum_vessel: VacuumVessel,
    pub fuel_storage: LiquidStorage,
    pub battery: Battery,
}

impl PowerCell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_on: false,
            alarm: false,
            durability: 100.0,
            cooling_system: CoolingSystem::new(),
            magnet_system: MagnetSystem::new(),
            plasma_heater: PlasmaHeater::new(),
            vacuum_vessel: VacuumVessel::new(),
            fuel_storage: LiquidStorage::default(),
            battery: Battery::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn alarm(&self) -> bool {
        self.alarm
    }

    pub fn durability(&self) -> f64 {
        self.durability
    }

    pub fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }

    pub fn raise_alarm(&mut self) {
        self.alarm = true;
    }

    pub fn clear_alarm(&mut self) {
        self.alarm = false;
    }

    /// Switches the cell and every subsystem on.
    pub fn start(&mut self) {
        self.is_on = true;
        for kind in SubsystemKind::all() {
            self.subsystem_mut(kind).start();
        }
    }

    /// Switches the cell and every subsystem off.
    pub fn stop(&mut self) {
        self.is_on = false;
        for kind in SubsystemKind::all() {
            self.subsystem_mut(kind).stop();
        }
    }

    pub fn subsystem(&self, kind: SubsystemKind) -> &dyn Subsystem {
        match kind {
            SubsystemKind::Cooling => &self.cooling_system,
            SubsystemKind::Magnet => &self.magnet_system,
            SubsystemKind::PlasmaHeater => &self.plasma_heater,
            SubsystemKind::VacuumVessel => &self.vacuum_vessel,
            SubsystemKind::Battery => &self.battery,
        }
    }

    pub fn subsystem_mut(&mut self, kind: SubsystemKind) -> &mut dyn Subsystem {
        match kind {
            SubsystemKind::Cooling => &mut self.cooling_system,
            SubsystemKind::Magnet => &mut self.magnet_system,
            SubsystemKind::PlasmaHeater => &mut self.plasma_heater,
            SubsystemKind::VacuumVessel => &mut self.vacuum_vessel,
            SubsystemKind::Battery => &mut self.battery,
        }
    }

    /// Mean durability over all subsystems.
    pub fn subsystem_durability(&self) -> f64 {
        mean(SubsystemKind::all().iter().map(|k| self.subsystem(*k).durability()))
    }

    /// Lowest subsystem durability.
    pub fn weakest_subsystem(&self) -> (SubsystemKind, f64) {
        SubsystemKind::all()
            .iter()
            .map(|k| (*k, self.subsystem(*k).durability()))
            .fold((SubsystemKind::Cooling, f64::INFINITY), |acc, cur| {
                if cur.1 < acc.1 {
                    cur
                } else {
                    acc
                }
            })
    }

    /// Effect of a repair crew working on the cell: durability restored on
    /// the cell and every subsystem, alarm cleared, and on a running cell
    /// any tripped subsystem switched back on.
    pub fn apply_repair(&mut self) {
        let restart = self.is_on;
        for kind in SubsystemKind::all() {
            let subsystem = self.subsystem_mut(kind);
            subsystem.set_durability(*DURABILITY_RANGE.end());
            if restart {
                subsystem.start();
            }
        }
        self.durability = *DURABILITY_RANGE.end();
        self.alarm = false;
    }

    /// Durability at or above `threshold` and no alarm.
    pub fn is_healthy(&self, threshold: f64) -> bool {
        !self.alarm && self.durability >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cell_defaults() {
        let cell = PowerCell::new("cell-1");
        assert_eq!(cell.name(), "cell-1");
        assert!(!cell.is_on());
        assert!(!cell.alarm());
        assert_eq!(cell.durability(), 100.0);
    }

    #[test]
    fn test_start_switches_subsystems() {
        let mut cell = PowerCell::new("cell-1");
        cell.start();
        assert!(SubsystemKind::all().iter().all(|k| cell.subsystem(*k).is_on()));

        cell.stop();
        assert!(SubsystemKind::all().iter().all(|k| !cell.subsystem(*k).is_on()));
    }

    #[test]
    fn test_repair_restores_everything() {
        let mut cell = PowerCell::new("cell-1");
        cell.set_durability(12.0);
        cell.magnet_system.set_durability(3.0);
        cell.raise_alarm();
        cell.start();
        cell.cooling_system.stop();

        cell.apply_repair();

        assert!(cell.cooling_system.is_on());
        assert_eq!(cell.durability(), 100.0);
        assert_eq!(cell.magnet_system.durability(), 100.0);
        assert!(!cell.alarm());
    }

    #[test]
    fn test_weakest_subsystem() {
        let mut cell = PowerCell::new("cell-1");
        cell.vacuum_vessel.set_durability(30.0);
        let (kind, value) = cell.weakest_subsystem();
        assert_eq!(kind, SubsystemKind::VacuumVessel);
        assert_eq!(value, 30.0);
    }
}
