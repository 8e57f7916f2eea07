// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::{LineId, LINE_COUNT};
use crate::ConfigError;
use std::fmt;

/// Number of device IRQ vectors the interrupt controller implements.
pub const IRQ_COUNT: u32 = 240;

/// A hardware dispatch entry point, identified by its IRQ number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IRQ{}", self.0)
    }
}

/// A set of lines, one bit per line id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LineSet(u32);

impl LineSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & ((1 << LINE_COUNT) - 1))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn insert(&mut self, line: LineId) {
        self.0 |= line.mask();
    }

    pub fn contains(self, line: LineId) -> bool {
        self.0 & line.mask() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn intersection(self, other: LineSet) -> LineSet {
        Self(self.0 & other.0)
    }

    /// Members in ascending line-id order.
    pub fn iter(self) -> impl Iterator<Item = LineId> {
        LineId::all().filter(move |line| self.contains(*line))
    }
}

impl FromIterator<LineId> for LineSet {
    fn from_iter<I: IntoIterator<Item = LineId>>(iter: I) -> Self {
        let mut set = LineSet::empty();
        for line in iter {
            set.insert(line);
        }
        set
    }
}

impl serde::Serialize for LineSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupSpec {
    pub id: GroupId,
    pub name: String,
    pub lines: LineSet,
}

/// Many-to-one mapping from line to dispatch group.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupMap {
    groups: Vec<GroupSpec>,
}

impl GroupMap {
    /// Builds a map from explicit groups. A line may appear in at most one
    /// group, every group needs at least one line, and group ids must be
    /// distinct IRQ numbers below [`IRQ_COUNT`].
    pub fn new(groups: Vec<GroupSpec>) -> Result<Self, ConfigError> {
        let mut seen = LineSet::empty();
        for (i, group) in groups.iter().enumerate() {
            if group.id.0 >= IRQ_COUNT {
                return Err(ConfigError::InvalidGroup(group.id.0));
            }
            if groups[..i].iter().any(|g| g.id == group.id) {
                return Err(ConfigError::DuplicateGroup(group.id.0));
            }
            if group.lines.is_empty() {
                return Err(ConfigError::EmptyGroup(group.id.0));
            }
            if let Some(line) = seen.intersection(group.lines).iter().next() {
                return Err(ConfigError::OverlappingGroups(line));
            }
            seen = LineSet(seen.0 | group.lines.0);
        }
        Ok(Self { groups })
    }

    /// STM32F4 layout: EXTI0..4 each have their own vector, 5..9 share
    /// EXTI9_5 and 10..15 share EXTI15_10.
    pub fn stm32() -> Self {
        let single = |irq: u32, line: u8| GroupSpec {
            id: GroupId(irq),
            name: format!("EXTI{}", line),
            lines: LineSet(1 << line),
        };
        Self {
            groups: vec![
                single(6, 0),
                single(7, 1),
                single(8, 2),
                single(9, 3),
                single(10, 4),
                GroupSpec {
                    id: GroupId(23),
                    name: "EXTI9_5".to_string(),
                    lines: LineSet(0x03E0),
                },
                GroupSpec {
                    id: GroupId(40),
                    name: "EXTI15_10".to_string(),
                    lines: LineSet(0xFC00),
                },
            ],
        }
    }

    pub fn group_of(&self, line: LineId) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|g| g.lines.contains(line))
            .map(|g| g.id)
    }

    pub fn members(&self, group: GroupId) -> LineSet {
        self.get(group).map(|g| g.lines).unwrap_or_default()
    }

    pub fn get(&self, group: GroupId) -> Option<&GroupSpec> {
        self.groups.iter().find(|g| g.id == group)
    }

    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }
}

impl Default for GroupMap {
    fn default() -> Self {
        Self::stm32()
    }
}
