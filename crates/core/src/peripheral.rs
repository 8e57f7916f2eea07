// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::group::{GroupId, GroupMap, LineSet};
use crate::line::{Edge, LineId, PinId, Port, Priority, PriorityGrouping, Pull};
use crate::ConfigError;
use std::fmt::Debug;
use std::str::FromStr;

/// Pin function selected by `configure_pin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinMode {
    Input,
    OutputPushPull,
    OutputOpenDrain,
    /// Input routed to its EXTI line, triggering on `Edge`.
    Interrupt(Edge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Speed {
    pub(crate) fn bits(self) -> u32 {
        match self {
            Speed::Low => 0b00,
            Speed::Medium => 0b01,
            Speed::High => 0b10,
            Speed::VeryHigh => 0b11,
        }
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "low" => Ok(Speed::Low),
            "medium" => Ok(Speed::Medium),
            "high" => Ok(Speed::High),
            "very_high" | "very-high" | "veryhigh" => Ok(Speed::VeryHigh),
            _ => Err(format!(
                "unsupported pin speed '{}'; supported: low, medium, high, very_high",
                value
            )),
        }
    }
}

/// Digital level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for PinLevel {
    fn from(b: bool) -> Self {
        if b {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl From<PinLevel> for bool {
    fn from(level: PinLevel) -> Self {
        match level {
            PinLevel::High => true,
            PinLevel::Low => false,
        }
    }
}

impl std::ops::Not for PinLevel {
    type Output = PinLevel;

    fn not(self) -> PinLevel {
        match self {
            PinLevel::High => PinLevel::Low,
            PinLevel::Low => PinLevel::High,
        }
    }
}

/// Peripheral clock gates the controller needs opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum ClockDomain {
    GpioPort(Port),
    /// System configuration controller, which owns the EXTI port multiplexer.
    Syscfg,
}

/// The hardware the line controller drives.
///
/// Implementations sit directly on memory-mapped registers (or on a model of
/// them). Every method takes `&self`: register state is shared between the
/// interrupt path and the main loop.
pub trait ExtiPeripheral: Debug + Send + Sync {
    /// Which lines share which dispatch entry point.
    fn group_map(&self) -> &GroupMap;

    /// Split of the priority bits between preemption tier and sub-tier.
    fn priority_grouping(&self) -> PriorityGrouping;

    fn enable_clock_domain(&self, domain: ClockDomain);

    fn configure_pin(&self, pin: PinId, mode: PinMode, pull: Pull, speed: Speed);

    fn set_pin_output(&self, pin: PinId, level: PinLevel);

    fn output_level(&self, pin: PinId) -> PinLevel;

    /// Selects which port drives `line`.
    fn route_line(&self, line: LineId, port: Port);

    /// Programs the trigger edges for `line` and unmasks it.
    fn enable_interrupt_line(&self, line: LineId, edge: Edge);

    fn set_group_priority(&self, group: GroupId, priority: Priority);

    fn enable_group(&self, group: GroupId);

    /// Priority of an enabled group; `None` while the group is disabled.
    fn group_priority(&self, group: GroupId) -> Option<Priority>;

    /// Unmasked member lines of `group` whose pending flag is set.
    fn read_pending(&self, group: GroupId) -> LineSet;

    fn is_pending(&self, line: LineId) -> bool;

    /// Acknowledges `line`. Equivalent to writing its bit to the pending
    /// register.
    fn clear_pending(&self, line: LineId);
}

impl FromStr for ClockDomain {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        if v == "syscfg" {
            return Ok(ClockDomain::Syscfg);
        }
        Ok(ClockDomain::GpioPort(value.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_parsing() {
        assert_eq!("High".parse::<Speed>().unwrap(), Speed::High);
        assert_eq!("very-high".parse::<Speed>().unwrap(), Speed::VeryHigh);
        assert!("ludicrous".parse::<Speed>().is_err());
    }

    #[test]
    fn test_pin_level_conversions() {
        assert_eq!(PinLevel::from(true), PinLevel::High);
        assert!(!bool::from(PinLevel::Low));
        assert_eq!(!PinLevel::Low, PinLevel::High);
    }

    #[test]
    fn test_clock_domain_parsing() {
        assert_eq!("SYSCFG".parse::<ClockDomain>().unwrap(), ClockDomain::Syscfg);
        assert_eq!(
            "gpiob".parse::<ClockDomain>().unwrap(),
            ClockDomain::GpioPort(Port::B)
        );
        assert!("usart1".parse::<ClockDomain>().is_err());
    }
}
