//! Power-cell subsystems.
//!
//! Every numeric field has a declared range and every setter clamps into it,
//! so no strategy can push a subsystem out of bounds.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Durability bound shared by every subsystem and by the cell itself.
pub const DURABILITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Charge bound for capacitors (percent).
pub const CHARGE_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Clamps `value` into `range`; NaN maps to the lower bound.
pub fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

/// Subsystem kinds a generation strategy or a control request can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    Cooling,
    Magnet,
    PlasmaHeater,
    VacuumVessel,
    Battery,
}

impl SubsystemKind {
    pub fn all() -> [SubsystemKind; 5] {
        [
            SubsystemKind::Cooling,
            SubsystemKind::Magnet,
            SubsystemKind::PlasmaHeater,
            SubsystemKind::VacuumVessel,
            SubsystemKind::Battery,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubsystemKind::Cooling => "cooling",
            SubsystemKind::Magnet => "magnet",
            SubsystemKind::PlasmaHeater => "plasma_heater",
            SubsystemKind::VacuumVessel => "vacuum_vessel",
            SubsystemKind::Battery => "battery",
        }
    }
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SubsystemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cooling" | "cooling_system" => Ok(SubsystemKind::Cooling),
            "magnet" | "magnet_system" => Ok(SubsystemKind::Magnet),
            "plasma_heater" | "plasmaheater" => Ok(SubsystemKind::PlasmaHeater),
            "vacuum_vessel" | "vacuumvessel" => Ok(SubsystemKind::VacuumVessel),
            "battery" => Ok(SubsystemKind::Battery),
            _ => Err(format!("Unknown subsystem: {}", s)),
        }
    }
}

/// Capabilities shared by all switchable subsystems.
pub trait Subsystem {
    fn kind(&self) -> SubsystemKind;

    fn is_on(&self) -> bool;

    fn start(&mut self);

    fn stop(&mut self);

    fn durability(&self) -> f64;

    fn set_durability(&mut self, value: f64);
}

/// Primary coolant loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoolingSystem {
    is_on: bool,
    durability: f64,

    /// Coolant temperature in kelvin
    coolant_temperature: f64,

    /// Pump flow in percent of nominal
    flow_rate: f64,
}

impl CoolingSystem {
    pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=1000.0;
    pub const FLOW_RANGE: RangeInclusive<f64> = 0.0..=100.0;

    /// Coolant temperature at rest.
    pub const AMBIENT_TEMPERATURE: f64 = 293.0;

    pub fn new() -> Self {
        Self {
            is_on: false,
            durability: 100.0,
            coolant_temperature: Self::AMBIENT_TEMPERATURE,
            flow_rate: 0.0,
        }
    }

    pub fn coolant_temperature(&self) -> f64 {
        self.coolant_temperature
    }

    pub fn set_coolant_temperature(&mut self, value: f64) {
        self.coolant_temperature = clamp_to(value, &Self::TEMPERATURE_RANGE);
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn set_flow_rate(&mut self, value: f64) {
        self.flow_rate = clamp_to(value, &Self::FLOW_RANGE);
    }
}

impl Default for CoolingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for CoolingSystem {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Cooling
    }

    fn is_on(&self) -> bool {
        self.is_on
    }

    fn start(&mut self) {
        self.is_on = true;
    }

    fn stop(&mut self) {
        self.is_on = false;
    }

    fn durability(&self) -> f64 {
        self.durability
    }

    fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }
}

/// Confinement magnets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetSystem {
    is_on: bool,
    durability: f64,

    /// Field strength in tesla
    field_strength: f64,

    /// Coil temperature in kelvin
    temperature: f64,
}

impl MagnetSystem {
    pub const FIELD_RANGE: RangeInclusive<f64> = 0.0..=20.0;
    pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=400.0;

    /// Nominal operating field.
    pub const NOMINAL_FIELD: f64 = 12.0;

    /// Superconducting coil temperature.
    pub const COIL_TEMPERATURE: f64 = 20.0;

    pub fn new() -> Self {
        Self {
            is_on: false,
            durability: 100.0,
            field_strength: 0.0,
            temperature: Self::COIL_TEMPERATURE,
        }
    }

    pub fn field_strength(&self) -> f64 {
        self.field_strength
    }

    pub fn set_field_strength(&mut self, value: f64) {
        self.field_strength = clamp_to(value, &Self::FIELD_RANGE);
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, value: f64) {
        self.temperature = clamp_to(value, &Self::TEMPERATURE_RANGE);
    }
}

impl Default for MagnetSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for MagnetSystem {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Magnet
    }

    fn is_on(&self) -> bool {
        self.is_on
    }

    fn start(&mut self) {
        self.is_on = true;
    }

    fn stop(&mut self) {
        self.is_on = false;
    }

    fn durability(&self) -> f64 {
        self.durability
    }

    fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }
}

/// Auxiliary plasma heating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlasmaHeater {
    is_on: bool,
    durability: f64,

    /// Injected power in megawatts
    power: f64,

    /// Plasma temperature in mega-kelvin
    plasma_temperature: f64,
}

impl PlasmaHeater {
    pub const POWER_RANGE: RangeInclusive<f64> = 0.0..=100.0;
    pub const PLASMA_TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=200.0;

    pub const NOMINAL_POWER: f64 = 50.0;

    pub fn new() -> Self {
        Self {
            is_on: false,
            durability: 100.0,
            power: 0.0,
            plasma_temperature: 0.0,
        }
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn set_power(&mut self, value: f64) {
        self.power = clamp_to(value, &Self::POWER_RANGE);
    }

    pub fn plasma_temperature(&self) -> f64 {
        self.plasma_temperature
    }

    pub fn set_plasma_temperature(&mut self, value: f64) {
        self.plasma_temperature = clamp_to(value, &Self::PLASMA_TEMPERATURE_RANGE);
    }
}

impl Default for PlasmaHeater {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for PlasmaHeater {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::PlasmaHeater
    }

    fn is_on(&self) -> bool {
        self.is_on
    }

    fn start(&mut self) {
        self.is_on = true;
    }

    fn stop(&mut self) {
        self.is_on = false;
    }

    fn durability(&self) -> f64 {
        self.durability
    }

    fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }
}

/// Vacuum vessel around the plasma chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacuumVessel {
    is_on: bool,
    durability: f64,

    /// Residual gas pressure in pascal
    pressure: f64,
}

impl VacuumVessel {
    pub const PRESSURE_RANGE: RangeInclusive<f64> = 0.0..=1.0e5;

    pub const ATMOSPHERIC_PRESSURE: f64 = 1.0e5;

    /// Pressure the pumps hold while running.
    pub const OPERATING_PRESSURE: f64 = 1.0e-3;

    pub fn new() -> Self {
        Self {
            is_on: false,
            durability: 100.0,
            pressure: Self::ATMOSPHERIC_PRESSURE,
        }
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn set_pressure(&mut self, value: f64) {
        self.pressure = clamp_to(value, &Self::PRESSURE_RANGE);
    }
}

impl Default for VacuumVessel {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for VacuumVessel {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::VacuumVessel
    }

    fn is_on(&self) -> bool {
        self.is_on
    }

    fn start(&mut self) {
        self.is_on = true;
    }

    fn stop(&mut self) {
        self.is_on = false;
    }

    fn durability(&self) -> f64 {
        self.durability
    }

    fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }
}

/// Fuel tank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidStorage {
    capacity: f64,
    level: f64,
}

impl LiquidStorage {
    pub const DEFAULT_CAPACITY: f64 = 1000.0;

    pub fn new(capacity: f64) -> Self {
        let capacity = capacity.max(0.0);
        Self {
            capacity,
            level: capacity,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn set_level(&mut self, value: f64) {
        self.level = clamp_to(value, &(0.0..=self.capacity));
    }

    /// Fill ratio in `[0, 1]`.
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0.0 {
            0.0
        } else {
            self.level / self.capacity
        }
    }
}

impl Default for LiquidStorage {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// One storage capacitor of a battery bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capacitor {
    name: String,
    is_on: bool,
    durability: f64,
    charge_level: f64,
    rated_voltage: f64,
}

impl Capacitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_on: false,
            durability: 100.0,
            charge_level: 100.0,
            rated_voltage: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn start(&mut self) {
        self.is_on = true;
    }

    pub fn stop(&mut self) {
        self.is_on = false;
    }

    pub fn durability(&self) -> f64 {
        self.durability
    }

    pub fn set_durability(&mut self, value: f64) {
        self.durability = clamp_to(value, &DURABILITY_RANGE);
    }

    pub fn charge_level(&self) -> f64 {
        self.charge_level
    }

    pub fn set_charge_level(&mut self, value: f64) {
        self.charge_level = clamp_to(value, &CHARGE_RANGE);
    }

    pub fn rated_voltage(&self) -> f64 {
        self.rated_voltage
    }

    pub fn set_rated_voltage(&mut self, value: f64) {
        self.rated_voltage = value.max(0.0);
    }
}

/// Capacitor bank buffering the cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    is_on: bool,
    capacitors: Vec<Capacitor>,
}

impl Battery {
    pub const DEFAULT_CAPACITORS: usize = 4;

    pub fn new(capacitors: usize) -> Self {
        Self {
            is_on: false,
            capacitors: (0..capacitors.max(1))
                .map(|i| Capacitor::new(format!("capacitor-{}", i)))
                .collect(),
        }
    }

    pub fn capacitors(&self) -> &[Capacitor] {
        &self.capacitors
    }

    pub fn capacitors_mut(&mut self) -> &mut [Capacitor] {
        &mut self.capacitors
    }

    /// Mean charge over all capacitors.
    pub fn charge_level(&self) -> f64 {
        mean(self.capacitors.iter().map(Capacitor::charge_level))
    }
}

impl Default for Battery {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITORS)
    }
}

impl Subsystem for Battery {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Battery
    }

    fn is_on(&self) -> bool {
        self.is_on
    }

    fn start(&mut self) {
        self.is_on = true;
        self.capacitors.iter_mut().for_each(Capacitor::start);
    }

    fn stop(&mut self) {
        self.is_on = false;
        self.capacitors.iter_mut().for_each(Capacitor::stop);
    }

    fn durability(&self) -> f64 {
        mean(self.capacitors.iter().map(Capacitor::durability))
    }

    fn set_durability(&mut self, value: f64) {
        for capacitor in &mut self.capacitors {
            capacitor.set_durability(value);
        }
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
