// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod controller;
pub mod diagnostics;
pub mod group;
pub mod handler;
pub mod line;
pub mod metrics;
pub mod peripheral;
pub mod peripherals;
pub mod pin;
pub mod scheduler;
pub mod work;

mod tests;

pub use controller::{DispatchReport, LineController, LineInfo};
pub use diagnostics::{DiagnosticContext, Diagnostics, Fault};
pub use group::{GroupId, GroupMap, LineSet};
pub use handler::{HandlerError, LineHandler, NoopHandler, TriggerContext};
pub use labwired_irq_config::AckOrder;
pub use line::{Edge, LineConfig, LineId, PinId, Port, Priority, PriorityGrouping, Pull};
pub use peripheral::ExtiPeripheral;
pub use peripherals::SimBoard;
pub use scheduler::{InterruptScheduler, SchedulerError};

/// Configuration errors reported by the line controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid trigger edge '{0}'")]
    InvalidEdge(String),
    #[error("invalid pull configuration '{0}'")]
    InvalidPull(String),
    #[error("{0} is already registered")]
    AlreadyRegistered(LineId),
    #[error("{0} is not registered")]
    NotRegistered(LineId),
    #[error("{0} asserted with no registered handler")]
    UnhandledLine(LineId),
    #[error("line {0} is outside the interrupt controller's line range")]
    InvalidLine(u8),
    #[error("priority {priority} is outside the domain of priority grouping {grouping}")]
    InvalidPriority { priority: Priority, grouping: u8 },
    #[error("invalid port or pin '{0}'")]
    InvalidPort(String),
    #[error("{0} is mapped to more than one dispatch group")]
    OverlappingGroups(LineId),
    #[error("dispatch group IRQ{0} has no lines")]
    EmptyGroup(u32),
    #[error("dispatch group IRQ{0} is declared more than once")]
    DuplicateGroup(u32),
    #[error("IRQ{0} is outside the interrupt controller's vector range")]
    InvalidGroup(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Register access outside the block at offset {0:#x}")]
    InvalidOffset(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Word-granular register access to a simulated peripheral block.
///
/// Registers are backed by atomics, so both the interrupt path and the main
/// loop may touch a block through a shared reference.
pub trait Peripheral: std::fmt::Debug + Send + Sync {
    fn read(&self, offset: u64) -> SimResult<u32>;
    fn write(&self, offset: u64, value: u32) -> SimResult<()>;
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
