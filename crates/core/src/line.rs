// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Number of GPIO-routable external interrupt lines.
pub const LINE_COUNT: u8 = 16;

/// Number of implemented NVIC priority bits (STM32 `__NVIC_PRIO_BITS`).
pub const PRIORITY_BITS: u8 = 4;

/// Identifier of an external interrupt line (0..=15), equal to the pin number
/// that drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct LineId(u8);

impl LineId {
    pub fn new(id: u8) -> Result<Self, ConfigError> {
        if id < LINE_COUNT {
            Ok(Self(id))
        } else {
            Err(ConfigError::InvalidLine(id))
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub(crate) fn mask(self) -> u32 {
        1 << self.0
    }

    pub fn all() -> impl Iterator<Item = LineId> {
        (0..LINE_COUNT).map(LineId)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXTI{}", self.0)
    }
}

impl TryFrom<u8> for LineId {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

bitflags::bitflags! {
    /// Raw trigger selection bits, as written to the rising/falling trigger
    /// selection registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TriggerBits: u8 {
        const RISING = 0b01;
        const FALLING = 0b10;
    }
}

/// Trigger polarity of an interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn triggers(self) -> TriggerBits {
        match self {
            Edge::Rising => TriggerBits::RISING,
            Edge::Falling => TriggerBits::FALLING,
            Edge::Both => TriggerBits::RISING | TriggerBits::FALLING,
        }
    }
}

impl TryFrom<u8> for Edge {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        let Some(triggers) = TriggerBits::from_bits(bits) else {
            return Err(ConfigError::InvalidEdge(format!("{:#04x}", bits)));
        };
        if triggers == TriggerBits::RISING | TriggerBits::FALLING {
            Ok(Edge::Both)
        } else if triggers == TriggerBits::RISING {
            Ok(Edge::Rising)
        } else if triggers == TriggerBits::FALLING {
            Ok(Edge::Falling)
        } else {
            Err(ConfigError::InvalidEdge(format!("{:#04x}", bits)))
        }
    }
}

impl FromStr for Edge {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "rising" | "rise" | "it_rising" => Ok(Edge::Rising),
            "falling" | "fall" | "it_falling" => Ok(Edge::Falling),
            "both" | "rising_falling" | "it_rising_falling" => Ok(Edge::Both),
            _ => Err(ConfigError::InvalidEdge(value.to_string())),
        }
    }
}

/// Idle bias of an input pin. Raw codes follow the HAL: 0 none, 1 up, 2 down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

impl Pull {
    pub(crate) fn bits(self) -> u32 {
        match self {
            Pull::None => 0b00,
            Pull::Up => 0b01,
            Pull::Down => 0b10,
        }
    }
}

impl TryFrom<u8> for Pull {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Pull::None),
            1 => Ok(Pull::Up),
            2 => Ok(Pull::Down),
            _ => Err(ConfigError::InvalidPull(code.to_string())),
        }
    }
}

impl FromStr for Pull {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "none" | "nopull" | "floating" => Ok(Pull::None),
            "up" | "pullup" | "pull-up" | "pull_up" => Ok(Pull::Up),
            "down" | "pulldown" | "pull-down" | "pull_down" => Ok(Pull::Down),
            _ => Err(ConfigError::InvalidPull(value.to_string())),
        }
    }
}

/// GPIO port letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub enum Port {
    #[default]
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
}

impl Port {
    pub const ALL: [Port; 11] = [
        Port::A,
        Port::B,
        Port::C,
        Port::D,
        Port::E,
        Port::F,
        Port::G,
        Port::H,
        Port::I,
        Port::J,
        Port::K,
    ];

    /// Index used by the EXTI port multiplexer (A = 0).
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", (b'A' + self.index()) as char)
    }
}

impl FromStr for Port {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_uppercase();
        let v = v.strip_prefix("GPIO").unwrap_or(&v);
        let mut chars = v.chars();
        match (chars.next(), chars.next()) {
            (Some(c @ 'A'..='K'), None) => Ok(Self::ALL[(c as u8 - b'A') as usize]),
            _ => Err(ConfigError::InvalidPort(value.to_string())),
        }
    }
}

/// A physical pin: port plus pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct PinId {
    pub port: Port,
    pub pin: u8,
}

impl PinId {
    pub fn new(port: Port, pin: u8) -> Result<Self, ConfigError> {
        LineId::new(pin)?;
        Ok(Self { port, pin })
    }

    /// The EXTI line this pin can drive.
    pub fn line(self) -> LineId {
        LineId(self.pin)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}{}", self.port, self.pin)
    }
}

impl FromStr for PinId {
    type Err = ConfigError;

    /// Accepts "A5", "PA5" and "GPIOA5".
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_uppercase();
        let v = v
            .strip_prefix("GPIO")
            .or_else(|| v.strip_prefix('P'))
            .unwrap_or(&v);
        let split = v
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| ConfigError::InvalidPort(value.to_string()))?;
        let port: Port = v[..split].parse()?;
        let pin: u8 = v[split..]
            .parse()
            .map_err(|_| ConfigError::InvalidPort(value.to_string()))?;
        Self::new(port, pin)
    }
}

/// How the 4 NVIC priority bits are split between preemption tier and
/// sub-tier. `Group(n)` gives `n` bits to the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PriorityGrouping(u8);

impl PriorityGrouping {
    pub fn new(tier_bits: u8) -> Option<Self> {
        (tier_bits <= PRIORITY_BITS).then_some(Self(tier_bits))
    }

    pub fn tier_bits(self) -> u8 {
        self.0
    }

    pub fn sub_bits(self) -> u8 {
        PRIORITY_BITS - self.0
    }

    pub fn max_tier(self) -> u8 {
        ((1u16 << self.tier_bits()) - 1) as u8
    }

    pub fn max_sub(self) -> u8 {
        ((1u16 << self.sub_bits()) - 1) as u8
    }

    pub fn contains(self, priority: Priority) -> bool {
        priority.preempt <= self.max_tier() && priority.sub <= self.max_sub()
    }

    /// Encodes a priority into the upper bits of an 8-bit NVIC IPR field.
    pub fn encode(self, priority: Priority) -> u8 {
        let raw = (priority.preempt << self.sub_bits()) | (priority.sub & self.max_sub());
        raw << (8 - PRIORITY_BITS)
    }

    pub fn decode(self, ipr: u8) -> Priority {
        let raw = ipr >> (8 - PRIORITY_BITS);
        Priority {
            preempt: raw >> self.sub_bits(),
            sub: raw & self.max_sub(),
        }
    }
}

impl Default for PriorityGrouping {
    /// All bits to preemption, as HAL_Init configures it.
    fn default() -> Self {
        Self(PRIORITY_BITS)
    }
}

/// Two-level priority. Lower numbers are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub struct Priority {
    pub preempt: u8,
    pub sub: u8,
}

impl Priority {
    pub const fn new(preempt: u8, sub: u8) -> Self {
        Self { preempt, sub }
    }

    /// Whether a frame running at `self` may be interrupted by `incoming`.
    pub fn preempted_by(self, incoming: Priority) -> bool {
        incoming.preempt < self.preempt
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.preempt, self.sub)
    }
}

/// Configuration of one interrupt line, as given at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LineConfig {
    pub id: LineId,
    pub port: Port,
    pub edge: Edge,
    pub pull: Pull,
    pub priority: Priority,
}

impl LineConfig {
    pub fn new(id: LineId, edge: Edge, pull: Pull, priority: Priority) -> Self {
        Self {
            id,
            port: Port::A,
            edge,
            pull,
            priority,
        }
    }

    pub fn on_port(mut self, port: Port) -> Self {
        self.port = port;
        self
    }

    pub fn pin(&self) -> PinId {
        PinId {
            port: self.port,
            pin: self.id.index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_id_bounds() {
        assert!(LineId::new(15).is_ok());
        assert_eq!(LineId::new(16), Err(ConfigError::InvalidLine(16)));
        assert_eq!(LineId::new(3).unwrap().to_string(), "EXTI3");
    }

    #[test]
    fn test_edge_from_bits() {
        assert_eq!(Edge::try_from(0b01).unwrap(), Edge::Rising);
        assert_eq!(Edge::try_from(0b10).unwrap(), Edge::Falling);
        assert_eq!(Edge::try_from(0b11).unwrap(), Edge::Both);
        assert!(matches!(Edge::try_from(0), Err(ConfigError::InvalidEdge(_))));
        assert!(matches!(
            Edge::try_from(0b100),
            Err(ConfigError::InvalidEdge(_))
        ));
    }

    #[test]
    fn test_edge_and_pull_from_str() {
        assert_eq!("Falling".parse::<Edge>().unwrap(), Edge::Falling);
        assert_eq!("both".parse::<Edge>().unwrap(), Edge::Both);
        assert_eq!(
            "sideways".parse::<Edge>(),
            Err(ConfigError::InvalidEdge("sideways".to_string()))
        );
        assert_eq!("pull-up".parse::<Pull>().unwrap(), Pull::Up);
        assert_eq!(Pull::try_from(2).unwrap(), Pull::Down);
        assert!(matches!(Pull::try_from(3), Err(ConfigError::InvalidPull(_))));
        assert!(matches!(
            "strong".parse::<Pull>(),
            Err(ConfigError::InvalidPull(_))
        ));
    }

    #[test]
    fn test_pin_parsing() {
        let pin: PinId = "PA5".parse().unwrap();
        assert_eq!(pin.port, Port::A);
        assert_eq!(pin.pin, 5);
        assert_eq!("gpioc13".parse::<PinId>().unwrap().to_string(), "PC13");
        assert_eq!("B0".parse::<PinId>().unwrap().line().index(), 0);
        assert!("Z1".parse::<PinId>().is_err());
        assert!("A16".parse::<PinId>().is_err());
        assert!("A".parse::<PinId>().is_err());
    }

    #[test]
    fn test_priority_grouping_domain() {
        let g4 = PriorityGrouping::default();
        assert_eq!(g4.max_tier(), 15);
        assert_eq!(g4.max_sub(), 0);
        assert!(g4.contains(Priority::new(15, 0)));
        assert!(!g4.contains(Priority::new(2, 1)));

        let g2 = PriorityGrouping::new(2).unwrap();
        assert_eq!(g2.max_tier(), 3);
        assert_eq!(g2.max_sub(), 3);
        assert!(g2.contains(Priority::new(3, 3)));
        assert!(!g2.contains(Priority::new(4, 0)));
        assert!(PriorityGrouping::new(5).is_none());
    }

    #[test]
    fn test_priority_encoding() {
        let g2 = PriorityGrouping::new(2).unwrap();
        let p = Priority::new(2, 1);
        let ipr = g2.encode(p);
        assert_eq!(ipr, 0b1001_0000);
        assert_eq!(g2.decode(ipr), p);

        let g4 = PriorityGrouping::default();
        assert_eq!(g4.encode(Priority::new(2, 0)), 0x20);
    }

    #[test]
    fn test_preemption_is_by_tier_only() {
        let running = Priority::new(2, 0);
        assert!(running.preempted_by(Priority::new(1, 3)));
        assert!(!running.preempted_by(Priority::new(2, 0)));
        assert!(!running.preempted_by(Priority::new(3, 0)));
        let sub_running = Priority::new(1, 2);
        assert!(!sub_running.preempted_by(Priority::new(1, 0)));
    }
}
