// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::{Edge, LineId, TriggerBits};
use crate::{Peripheral, SimResult, SimulationError};
use std::sync::atomic::{AtomicU32, Ordering};

/// Implemented EXTI lines (STM32F4: 23).
const LINE_MASK: u32 = 0x007F_FFFF;

/// External Interrupt/Event Controller (EXTI) register block.
#[derive(Debug, Default)]
pub struct Exti {
    imr: AtomicU32,   // 0x00 - Interrupt mask register
    emr: AtomicU32,   // 0x04 - Event mask register
    rtsr: AtomicU32,  // 0x08 - Rising trigger selection register
    ftsr: AtomicU32,  // 0x0C - Falling trigger selection register
    swier: AtomicU32, // 0x10 - Software interrupt event register
    pr: AtomicU32,    // 0x14 - Pending register
    // Lines whose input is held asserted: acknowledging them has no effect.
    stuck: AtomicU32,
}

impl Exti {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches a pending flag for `line`, as the edge detector would.
    pub fn trigger_line(&self, line: LineId) {
        self.pr.fetch_or(line.mask(), Ordering::SeqCst);
    }

    /// Feeds an input transition into the edge detector. Sets the pending
    /// flag when the transition matches the line's trigger selection.
    pub fn on_input_edge(&self, line: LineId, rising: bool) -> bool {
        let selected = if rising {
            self.rtsr.load(Ordering::SeqCst)
        } else {
            self.ftsr.load(Ordering::SeqCst)
        };
        if selected & line.mask() != 0 {
            self.trigger_line(line);
            true
        } else {
            false
        }
    }

    pub fn select_edges(&self, line: LineId, edge: Edge) {
        let triggers = edge.triggers();
        let mask = line.mask();
        if triggers.contains(TriggerBits::RISING) {
            self.rtsr.fetch_or(mask, Ordering::SeqCst);
        } else {
            self.rtsr.fetch_and(!mask, Ordering::SeqCst);
        }
        if triggers.contains(TriggerBits::FALLING) {
            self.ftsr.fetch_or(mask, Ordering::SeqCst);
        } else {
            self.ftsr.fetch_and(!mask, Ordering::SeqCst);
        }
    }

    pub fn unmask(&self, line: LineId) {
        self.imr.fetch_or(line.mask(), Ordering::SeqCst);
    }

    pub fn is_unmasked(&self, line: LineId) -> bool {
        self.imr.load(Ordering::SeqCst) & line.mask() != 0
    }

    /// Pending lines that are also unmasked.
    pub fn active(&self) -> u32 {
        self.pr.load(Ordering::SeqCst) & self.imr.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> u32 {
        self.pr.load(Ordering::SeqCst)
    }

    /// Write-one-to-clear on PR, shared by the register path and the
    /// acknowledge path.
    pub fn clear(&self, bits: u32) {
        let clearable = bits & !self.stuck.load(Ordering::SeqCst);
        self.pr.fetch_and(!clearable, Ordering::SeqCst);
        self.swier.fetch_and(!clearable, Ordering::SeqCst);
    }

    /// Holds `line` asserted (or releases it). A stuck line re-latches its
    /// pending flag immediately after every acknowledge.
    pub fn set_stuck(&self, line: LineId, stuck: bool) {
        if stuck {
            self.stuck.fetch_or(line.mask(), Ordering::SeqCst);
            self.trigger_line(line);
        } else {
            self.stuck.fetch_and(!line.mask(), Ordering::SeqCst);
        }
    }

    fn read_reg(&self, offset: u64) -> SimResult<u32> {
        let reg = match offset {
            0x00 => &self.imr,
            0x04 => &self.emr,
            0x08 => &self.rtsr,
            0x0C => &self.ftsr,
            0x10 => &self.swier,
            0x14 => &self.pr,
            _ => return Err(SimulationError::InvalidOffset(offset)),
        };
        Ok(reg.load(Ordering::SeqCst))
    }
}

impl Peripheral for Exti {
    fn read(&self, offset: u64) -> SimResult<u32> {
        self.read_reg(offset & !3)
    }

    fn write(&self, offset: u64, value: u32) -> SimResult<()> {
        let value = value & LINE_MASK;
        match offset & !3 {
            0x00 => self.imr.store(value, Ordering::SeqCst),
            0x04 => self.emr.store(value, Ordering::SeqCst),
            0x08 => self.rtsr.store(value, Ordering::SeqCst),
            0x0C => self.ftsr.store(value, Ordering::SeqCst),
            0x10 => {
                // A 0 -> 1 transition on SWIER latches PR for unmasked lines.
                let previous = self.swier.swap(value, Ordering::SeqCst);
                let raised = (previous ^ value) & value;
                self.pr.fetch_or(
                    raised & self.imr.load(Ordering::SeqCst),
                    Ordering::SeqCst,
                );
            }
            0x14 => self.clear(value),
            other => return Err(SimulationError::InvalidOffset(other)),
        }
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "imr": self.imr.load(Ordering::Relaxed),
            "emr": self.emr.load(Ordering::Relaxed),
            "rtsr": self.rtsr.load(Ordering::Relaxed),
            "ftsr": self.ftsr.load(Ordering::Relaxed),
            "swier": self.swier.load(Ordering::Relaxed),
            "pr": self.pr.load(Ordering::Relaxed),
        })
    }
}
