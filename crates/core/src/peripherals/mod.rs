// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod exti;
pub mod gpio;
pub mod nvic;
pub mod rcc;
pub mod syscfg;

use crate::group::{GroupId, GroupMap, LineSet};
use crate::line::{Edge, LineId, PinId, Port, Priority, PriorityGrouping, Pull};
use crate::peripheral::{ClockDomain, ExtiPeripheral, PinLevel, PinMode, Speed};
use crate::Peripheral;
use std::collections::BTreeMap;

/// A simulated MCU exposing the blocks the line controller needs.
#[derive(Debug)]
pub struct SimBoard {
    groups: GroupMap,
    pub exti: exti::Exti,
    pub nvic: nvic::Nvic,
    pub rcc: rcc::Rcc,
    pub syscfg: syscfg::Syscfg,
    ports: BTreeMap<Port, gpio::GpioPort>,
}

impl SimBoard {
    pub fn new(groups: GroupMap, grouping: PriorityGrouping) -> Self {
        Self {
            groups,
            exti: exti::Exti::new(),
            nvic: nvic::Nvic::new(grouping),
            rcc: rcc::Rcc::new(),
            syscfg: syscfg::Syscfg::new(),
            ports: Port::ALL
                .iter()
                .map(|p| (*p, gpio::GpioPort::new()))
                .collect(),
        }
    }

    /// STM32 line grouping with all priority bits given to preemption.
    pub fn stm32() -> Self {
        Self::new(GroupMap::stm32(), PriorityGrouping::default())
    }

    pub fn port(&self, port: Port) -> &gpio::GpioPort {
        // Every port is created in `new`.
        &self.ports[&port]
    }

    /// Software trigger of `line` (SWIER-style, ignores the edge selection).
    pub fn assert_line(&self, line: LineId) {
        tracing::trace!("assert {}", line);
        self.exti.trigger_line(line);
    }

    /// Drives a pin from outside the chip and runs the edge detector if the
    /// pin's port is routed to its EXTI line. Returns whether a pending flag
    /// was latched.
    pub fn drive_pin(&self, pin: PinId, level: Option<PinLevel>) -> bool {
        let (before, after) = self.port(pin.port).drive(pin.pin, level);
        if before == after || self.syscfg.port_for(pin.line()) != pin.port {
            return false;
        }
        let latched = self
            .exti
            .on_input_edge(pin.line(), after == PinLevel::High);
        if latched {
            tracing::trace!("{} edge latched {}", pin, pin.line());
        }
        latched
    }

    /// Holds a line asserted so that acknowledging it has no effect.
    pub fn set_stuck(&self, line: LineId, stuck: bool) {
        self.exti.set_stuck(line, stuck);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let ports: serde_json::Map<String, serde_json::Value> = self
            .ports
            .iter()
            .map(|(port, gpio)| (format!("gpio{}", port).to_lowercase(), gpio.snapshot()))
            .collect();
        serde_json::json!({
            "exti": self.exti.snapshot(),
            "nvic": self.nvic.snapshot(),
            "rcc": self.rcc.snapshot(),
            "syscfg": self.syscfg.snapshot(),
            "gpio": ports,
        })
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::stm32()
    }
}

impl ExtiPeripheral for SimBoard {
    fn group_map(&self) -> &GroupMap {
        &self.groups
    }

    fn priority_grouping(&self) -> PriorityGrouping {
        self.nvic.grouping()
    }

    fn enable_clock_domain(&self, domain: ClockDomain) {
        self.rcc.enable(domain);
    }

    fn configure_pin(&self, pin: PinId, mode: PinMode, pull: Pull, speed: Speed) {
        if !self.rcc.is_enabled(ClockDomain::GpioPort(pin.port)) {
            tracing::warn!("configuring {} while its port clock is gated", pin);
        }
        self.port(pin.port).configure(pin.pin, mode, pull, speed);
    }

    fn set_pin_output(&self, pin: PinId, level: PinLevel) {
        self.port(pin.port).write_output(pin.pin, level);
    }

    fn output_level(&self, pin: PinId) -> PinLevel {
        self.port(pin.port).output(pin.pin)
    }

    fn route_line(&self, line: LineId, port: Port) {
        self.syscfg.route(line, port);
    }

    fn enable_interrupt_line(&self, line: LineId, edge: Edge) {
        self.exti.select_edges(line, edge);
        self.exti.unmask(line);
    }

    fn set_group_priority(&self, group: GroupId, priority: Priority) {
        self.nvic.set_priority(group, priority);
    }

    fn enable_group(&self, group: GroupId) {
        self.nvic.enable(group);
    }

    fn group_priority(&self, group: GroupId) -> Option<Priority> {
        self.nvic
            .is_enabled(group)
            .then(|| self.nvic.priority(group))
    }

    fn read_pending(&self, group: GroupId) -> LineSet {
        LineSet::from_bits(self.exti.active()).intersection(self.groups.members(group))
    }

    fn is_pending(&self, line: LineId) -> bool {
        self.exti.pending() & (1 << line.index()) != 0
    }

    fn clear_pending(&self, line: LineId) {
        self.exti.clear(1 << line.index());
    }
}
