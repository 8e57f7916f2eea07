// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_priority_grouping() -> u8 {
    4
}

fn default_livelock_threshold() -> u32 {
    32
}

fn default_queue_capacity() -> usize {
    16
}

/// Device IRQ vectors available to dispatch groups.
pub const MAX_IRQ: u32 = 240;

fn default_port() -> String {
    "A".to_string()
}

fn default_pull() -> String {
    "none".to_string()
}

fn default_speed() -> String {
    "low".to_string()
}

/// When the controller clears a line's pending flag relative to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOrder {
    #[default]
    BeforeHandler,
    AfterHandler,
}

/// What the handler registered for a line does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerAction {
    /// Enqueue a work item for the main loop.
    #[default]
    Queue,
    /// Raise an event flag polled by the main loop.
    Flag,
    /// Always report a handler error (fault injection).
    Fail,
    /// Default no-op handler.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub preempt: u8,
    #[serde(default)]
    pub sub: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LineEntry {
    pub id: u8,
    #[serde(default = "default_port")]
    pub port: String,
    pub edge: String, // "rising", "falling", "both"
    #[serde(default = "default_pull")]
    pub pull: String, // "none", "up", "down"
    pub priority: PriorityConfig,
    #[serde(default)]
    pub action: HandlerAction,
    /// Output pin (e.g. "A5") toggled by the main loop each time this line fires.
    #[serde(default)]
    pub toggle: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// A hardware dispatch group: one vector shared by a set of lines.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupEntry {
    pub irq: u32,
    pub lines: Vec<u8>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputEntry {
    pub pin: String, // e.g. "A5"
    #[serde(default = "default_speed")]
    pub speed: String,
    #[serde(default)]
    pub initial_high: bool,
}

/// Board description: which lines exist, how they trigger and what their
/// handlers do.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_priority_grouping")]
    pub priority_grouping: u8,
    #[serde(default)]
    pub ack_order: AckOrder,
    #[serde(default = "default_livelock_threshold")]
    pub livelock_threshold: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Custom dispatch groups. Empty means the STM32 layout.
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    #[serde(default)]
    pub lines: Vec<LineEntry>,
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read board description at {:?}", path.as_ref()))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let board: Self =
            serde_yaml::from_str(contents).context("Failed to parse Board Description YAML")?;
        board.validate()?;
        tracing::debug!(
            "Loaded board '{}' with {} lines",
            board.name,
            board.lines.len()
        );
        Ok(board)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.priority_grouping > 4 {
            anyhow::bail!(
                "Field 'priority_grouping' must be between 0 and 4, got {}",
                self.priority_grouping
            );
        }

        if self.livelock_threshold == 0 {
            anyhow::bail!("Field 'livelock_threshold' must be greater than zero");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("Field 'queue_capacity' must be greater than zero");
        }

        let mut seen = HashSet::new();
        for line in &self.lines {
            if !seen.insert(line.id) {
                anyhow::bail!("Line {} is declared more than once", line.id);
            }
        }

        let mut grouped = HashSet::new();
        let mut irqs = HashSet::new();
        for group in &self.groups {
            if group.irq >= MAX_IRQ {
                anyhow::bail!(
                    "Group IRQ {} is out of range, must be below {}",
                    group.irq,
                    MAX_IRQ
                );
            }
            if !irqs.insert(group.irq) {
                anyhow::bail!("Group for IRQ {} is declared more than once", group.irq);
            }
            if group.lines.is_empty() {
                anyhow::bail!("Group for IRQ {} has no lines", group.irq);
            }
            for line in &group.lines {
                if !grouped.insert(*line) {
                    anyhow::bail!("Line {} appears in more than one group", line);
                }
            }
        }

        let mut outputs = HashSet::new();
        for output in &self.outputs {
            if !outputs.insert(output.pin.trim().to_ascii_uppercase()) {
                anyhow::bail!("Output pin '{}' is declared more than once", output.pin);
            }
        }

        Ok(())
    }
}
