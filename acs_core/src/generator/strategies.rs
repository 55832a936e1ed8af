//! Default generation strategies.
//!
//! Running subsystems wear down with noise and settle toward their operating
//! point; stopped ones relax toward rest values. Every write goes through a
//! clamping setter.

use super::GenerationStrategy;
use crate::error::AcsResult;
use crate::model::{
    CellHandle, CoolingSystem, MagnetSystem, PlasmaHeater, PowerCell, Subsystem, SubsystemKind,
    VacuumVessel,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Base wear per tick for a running subsystem, in durability points.
const BASE_WEAR: f64 = 0.05;

/// Subsystem durability below which the cell alarm is raised.
const SUBSYSTEM_ALARM_LEVEL: f64 = 20.0;

/// Fuel burned per tick for each unit of heater power.
const FUEL_PER_POWER: f64 = 0.01;

/// Seeded Gaussian noise source.
struct Noise {
    rng: ChaCha8Rng,
    std_dev: f64,
}

impl Noise {
    fn new(seed: u64, std_dev: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            std_dev,
        }
    }

    fn sample(&mut self) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * self.std_dev
    }

    /// Non-negative wear jitter.
    fn wear(&mut self) -> f64 {
        self.sample().abs()
    }
}

/// Moves `current` a `rate` fraction of the way toward `target`.
fn approach(current: f64, target: f64, rate: f64) -> f64 {
    current + (target - current) * rate
}

/// Stock strategy for one subsystem of one cell.
pub struct DefaultGenerationStrategy {
    name: String,
    kind: SubsystemKind,
    cell: CellHandle,
    noise: Noise,
    wear_scale: f64,
}

impl DefaultGenerationStrategy {
    pub fn new(name: impl Into<String>, kind: SubsystemKind, cell: CellHandle, seed: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            cell,
            noise: Noise::new(seed, 1.0),
            wear_scale: 1.0,
        }
    }

    /// Multiplies the per-tick wear (e.g. to age a cell faster in a demo).
    pub fn with_wear_scale(mut self, scale: f64) -> Self {
        self.wear_scale = scale.max(0.0);
        self
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    fn wear(&mut self, extra: f64) -> f64 {
        (BASE_WEAR + extra + 0.02 * self.noise.wear()) * self.wear_scale
    }
}

impl GenerationStrategy for DefaultGenerationStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> AcsResult<()> {
        let cell = self.cell.clone();
        let mut cell = cell.lock();
        match self.kind {
            SubsystemKind::Cooling => self.step_cooling(&mut cell),
            SubsystemKind::Magnet => self.step_magnet(&mut cell),
            SubsystemKind::PlasmaHeater => self.step_plasma_heater(&mut cell),
            SubsystemKind::VacuumVessel => self.step_vacuum_vessel(&mut cell),
            SubsystemKind::Battery => self.step_battery(&mut cell),
        }
        Ok(())
    }
}

impl DefaultGenerationStrategy {
    fn step_cooling(&mut self, cell: &mut PowerCell) {
        let heat_load = cell.plasma_heater.power();
        let noise = self.noise.sample();
        let cooling = &cell.cooling_system;

        if cooling.is_on() {
            let flow = approach(cooling.flow_rate(), 100.0, 0.3) + noise;
            // Weaker pumps and lower flow let the loop run hot.
            let efficiency = (flow / 100.0) * (cooling.durability() / 100.0);
            let target = CoolingSystem::AMBIENT_TEMPERATURE + heat_load * 8.0 * (1.0 - 0.8 * efficiency);
            let temperature = approach(cooling.coolant_temperature(), target, 0.2) + noise;
            let overheat = ((temperature - 600.0) / 1000.0).max(0.0);
            let durability = cooling.durability() - self.wear(overheat);

            let cooling = &mut cell.cooling_system;
            cooling.set_flow_rate(flow);
            cooling.set_coolant_temperature(temperature);
            cooling.set_durability(durability);
        } else {
            let target = CoolingSystem::AMBIENT_TEMPERATURE + heat_load * 8.0;
            let cooling = &mut cell.cooling_system;
            cooling.set_flow_rate(approach(cooling.flow_rate(), 0.0, 0.5));
            cooling.set_coolant_temperature(approach(cooling.coolant_temperature(), target, 0.1));
        }
    }

    fn step_magnet(&mut self, cell: &mut PowerCell) {
        let cooled = cell.cooling_system.is_on();
        let noise = self.noise.sample();
        let magnet = &cell.magnet_system;

        if magnet.is_on() {
            let field = approach(magnet.field_strength(), MagnetSystem::NOMINAL_FIELD, 0.25) + 0.05 * noise;
            let temperature = if cooled {
                approach(magnet.temperature(), MagnetSystem::COIL_TEMPERATURE, 0.3)
            } else {
                magnet.temperature() + 5.0 + noise.abs()
            };
            let quench = ((temperature - 90.0) / 100.0).max(0.0);
            let durability = magnet.durability() - self.wear(quench);

            let magnet = &mut cell.magnet_system;
            magnet.set_field_strength(field);
            magnet.set_temperature(temperature);
            magnet.set_durability(durability);
        } else {
            let magnet = &mut cell.magnet_system;
            magnet.set_field_strength(approach(magnet.field_strength(), 0.0, 0.5));
            let rest = if cooled { MagnetSystem::COIL_TEMPERATURE } else { 293.0 };
            magnet.set_temperature(approach(magnet.temperature(), rest, 0.1));
        }
    }

    fn step_plasma_heater(&mut self, cell: &mut PowerCell) {
        let confined = cell.magnet_system.field_strength() > 5.0;
        let noise = self.noise.sample();
        let heater = &cell.plasma_heater;

        if heater.is_on() {
            // An empty tank starves the heater.
            let fuel = cell.fuel_storage.level();
            let nominal = if fuel > 0.0 { PlasmaHeater::NOMINAL_POWER } else { 0.0 };
            let power = approach(heater.power(), nominal, 0.3) + noise;
            // Without confinement the plasma dumps its heat immediately.
            let target = if confined { power * 3.0 } else { 0.0 };
            let plasma = approach(heater.plasma_temperature(), target, 0.2);
            let durability = heater.durability() - self.wear(if confined { 0.0 } else { 0.1 });

            let heater = &mut cell.plasma_heater;
            heater.set_power(power);
            heater.set_plasma_temperature(plasma);
            heater.set_durability(durability);
            cell.fuel_storage
                .set_level(fuel - cell.plasma_heater.power() * FUEL_PER_POWER);
        } else {
            let heater = &mut cell.plasma_heater;
            heater.set_power(approach(heater.power(), 0.0, 0.5));
            heater.set_plasma_temperature(approach(heater.plasma_temperature(), 0.0, 0.3));
        }
    }

    fn step_vacuum_vessel(&mut self, cell: &mut PowerCell) {
        let noise = self.noise.sample();
        let vessel = &cell.vacuum_vessel;

        if vessel.is_on() {
            // Leak rate grows as the seals wear.
            let leak = (100.0 - vessel.durability()) * 0.01;
            let pressure = approach(vessel.pressure(), VacuumVessel::OPERATING_PRESSURE, 0.5)
                + leak
                + 1.0e-4 * noise.abs();
            let durability = vessel.durability() - 0.5 * self.wear(0.0);

            let vessel = &mut cell.vacuum_vessel;
            vessel.set_pressure(pressure);
            vessel.set_durability(durability);
        } else {
            let vessel = &mut cell.vacuum_vessel;
            vessel.set_pressure(approach(vessel.pressure(), VacuumVessel::ATMOSPHERIC_PRESSURE, 0.05));
        }
    }

    fn step_battery(&mut self, cell: &mut PowerCell) {
        let generating = cell.is_on() && cell.plasma_heater.is_on();
        let battery_on = cell.battery.is_on();
        let wear_scale = self.wear_scale;

        for capacitor in cell.battery.capacitors_mut() {
            if !battery_on || !capacitor.is_on() {
                // Self-discharge.
                capacitor.set_charge_level(capacitor.charge_level() - 0.01);
                continue;
            }
            let noise = self.noise.sample();
            let delta = if generating { 1.5 } else { -0.8 };
            capacitor.set_charge_level(capacitor.charge_level() + delta + 0.2 * noise);
            capacitor.set_rated_voltage(400.0 * capacitor.charge_level() / 100.0);
            let wear = (0.5 * BASE_WEAR + 0.01 * noise.abs()) * wear_scale;
            capacitor.set_durability(capacitor.durability() - wear);
        }
    }
}

/// Derives cell durability from its subsystems and raises the alarm.
///
/// The alarm is only ever raised here; clearing it is the repair crew's job.
pub struct CellHealthStrategy {
    name: String,
    cell: CellHandle,
    alarm_threshold: f64,
}

impl CellHealthStrategy {
    pub fn new(name: impl Into<String>, cell: CellHandle, alarm_threshold: f64) -> Self {
        Self {
            name: name.into(),
            cell,
            alarm_threshold,
        }
    }
}

impl GenerationStrategy for CellHealthStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> AcsResult<()> {
        let mut cell = self.cell.lock();
        let durability = cell.subsystem_durability();
        cell.set_durability(durability);

        let (_, weakest) = cell.weakest_subsystem();
        if !cell.alarm() && (durability < self.alarm_threshold || weakest < SUBSYSTEM_ALARM_LEVEL) {
            tracing::warn!(
                "Cell '{}' alarm: durability {:.1}, weakest subsystem {:.1}",
                cell.name(),
                durability,
                weakest
            );
            cell.raise_alarm();
        }
        Ok(())
    }
}

/// Builds the stock strategy set for one cell.
///
/// Names follow `<kind>_generator-<cell>`; `seed_base` is mixed with the
/// strategy's position so every strategy draws independent noise.
pub fn strategies_for_cell(
    cell_name: &str,
    cell: &CellHandle,
    seed_for: impl Fn(u64) -> u64,
    seed_base: u64,
    alarm_threshold: f64,
    wear_scale: f64,
) -> Vec<Box<dyn GenerationStrategy>> {
    let mut strategies: Vec<Box<dyn GenerationStrategy>> = SubsystemKind::all()
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let strategy = DefaultGenerationStrategy::new(
                format!("{}_generator-{}", kind, cell_name),
                *kind,
                cell.clone(),
                seed_for(seed_base + i as u64),
            )
            .with_wear_scale(wear_scale);
            Box::new(strategy) as Box<dyn GenerationStrategy>
        })
        .collect();

    strategies.push(Box::new(CellHealthStrategy::new(
        format!("health_generator-{}", cell_name),
        cell.clone(),
        alarm_threshold,
    )));
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Guarded, CHARGE_RANGE, DURABILITY_RANGE};
    use proptest::prelude::*;

    fn running_cell() -> CellHandle {
        let cell = Guarded::new(PowerCell::new("cell-1"));
        cell.with(|c| c.start());
        cell
    }

    fn within(value: f64, range: &std::ops::RangeInclusive<f64>) -> bool {
        range.contains(&value)
    }

    fn assert_in_bounds(cell: &PowerCell) {
        assert!(within(cell.durability(), &DURABILITY_RANGE));
        for kind in SubsystemKind::all() {
            assert!(within(cell.subsystem(kind).durability(), &DURABILITY_RANGE));
        }
        assert!(within(cell.cooling_system.coolant_temperature(), &CoolingSystem::TEMPERATURE_RANGE));
        assert!(within(cell.magnet_system.field_strength(), &MagnetSystem::FIELD_RANGE));
        assert!(within(cell.plasma_heater.plasma_temperature(), &PlasmaHeater::PLASMA_TEMPERATURE_RANGE));
        assert!(within(cell.vacuum_vessel.pressure(), &VacuumVessel::PRESSURE_RANGE));
        assert!(within(cell.fuel_storage.level(), &(0.0..=cell.fuel_storage.capacity())));
        for capacitor in cell.battery.capacitors() {
            assert!(within(capacitor.charge_level(), &CHARGE_RANGE));
        }
    }

    #[test]
    fn test_running_subsystems_wear() {
        let cell = running_cell();
        let mut strategies = strategies_for_cell("cell-1", &cell, |i| i, 0, 40.0, 1.0);

        for _ in 0..100 {
            for strategy in strategies.iter_mut() {
                strategy.tick().unwrap();
            }
        }

        let snapshot = cell.snapshot();
        assert!(snapshot.cooling_system.durability() < 100.0);
        assert!(snapshot.durability() < 100.0);
        assert!(snapshot.vacuum_vessel.pressure() < VacuumVessel::ATMOSPHERIC_PRESSURE);
    }

    #[test]
    fn test_stopped_subsystem_does_not_wear() {
        let cell = Guarded::new(PowerCell::new("cell-1"));
        let mut strategy =
            DefaultGenerationStrategy::new("cooling_generator-cell-1", SubsystemKind::Cooling, cell.clone(), 3);

        for _ in 0..50 {
            strategy.tick().unwrap();
        }

        assert_eq!(cell.snapshot().cooling_system.durability(), 100.0);
    }

    #[test]
    fn test_running_heater_burns_fuel() {
        let cell = running_cell();
        let mut heater = DefaultGenerationStrategy::new("heater", SubsystemKind::PlasmaHeater, cell.clone(), 5);

        for _ in 0..20 {
            heater.tick().unwrap();
        }
        let burning = cell.snapshot();
        assert!(burning.fuel_storage.level() < burning.fuel_storage.capacity());
        assert!(burning.plasma_heater.power() > 0.0);

        cell.with(|c| c.fuel_storage.set_level(0.0));
        for _ in 0..50 {
            heater.tick().unwrap();
        }
        let starved = cell.snapshot();
        assert_eq!(starved.fuel_storage.level(), 0.0);
        assert!(starved.plasma_heater.power() < 5.0);

        cell.with(|c| c.stop());
        let level = cell.snapshot().fuel_storage.level();
        heater.tick().unwrap();
        assert_eq!(cell.snapshot().fuel_storage.level(), level);
    }

    #[test]
    fn test_health_strategy_raises_alarm() {
        let cell = running_cell();
        cell.with(|c| c.magnet_system.set_durability(10.0));
        let mut health = CellHealthStrategy::new("health", cell.clone(), 40.0);

        health.tick().unwrap();

        assert!(cell.snapshot().alarm());
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let a = running_cell();
        let b = running_cell();
        let mut sa = DefaultGenerationStrategy::new("a", SubsystemKind::PlasmaHeater, a.clone(), 9);
        let mut sb = DefaultGenerationStrategy::new("b", SubsystemKind::PlasmaHeater, b.clone(), 9);

        for _ in 0..20 {
            sa.tick().unwrap();
            sb.tick().unwrap();
        }

        approx::assert_relative_eq!(a.snapshot().plasma_heater.power(), b.snapshot().plasma_heater.power());
    }

    #[test]
    fn test_strategy_names() {
        let cell = running_cell();
        let strategies = strategies_for_cell("cell-7", &cell, |i| i, 0, 40.0, 1.0);
        let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();

        assert_eq!(strategies.len(), 6);
        assert!(names.contains(&"cooling_generator-cell-7"));
        assert!(names.contains(&"health_generator-cell-7"));
    }

    proptest! {
        #[test]
        fn prop_values_stay_in_bounds(seed in any::<u64>(), ticks in 1usize..300, wear in 0.0f64..50.0, on in any::<bool>()) {
            let cell = Guarded::new(PowerCell::new("cell-1"));
            if on {
                cell.with(|c| c.start());
            }
            let mut strategies = strategies_for_cell("cell-1", &cell, |i| seed ^ i, 0, 40.0, wear);

            for _ in 0..ticks {
                for strategy in strategies.iter_mut() {
                    prop_assert!(strategy.tick().is_ok());
                }
            }

            assert_in_bounds(&cell.snapshot());
        }
    }
}
