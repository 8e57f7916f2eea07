// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::group::{GroupId, IRQ_COUNT};
use crate::line::{Priority, PriorityGrouping};
use crate::{Peripheral, SimResult, SimulationError};
use std::sync::atomic::{AtomicU32, Ordering};

/// Nested Vectored Interrupt Controller (NVIC): enable and priority state
/// for device IRQs.
#[derive(Debug)]
pub struct Nvic {
    grouping: PriorityGrouping,
    iser: [AtomicU32; 8],
    ipr: Vec<AtomicU32>, // 4 priority bytes per word
}

impl Nvic {
    pub fn new(grouping: PriorityGrouping) -> Self {
        Self {
            grouping,
            iser: Default::default(),
            ipr: (0..IRQ_COUNT / 4).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn grouping(&self) -> PriorityGrouping {
        self.grouping
    }

    pub fn enable(&self, irq: GroupId) {
        if let Some((idx, bit)) = Self::split(irq) {
            self.iser[idx].fetch_or(1 << bit, Ordering::SeqCst);
        }
    }

    pub fn is_enabled(&self, irq: GroupId) -> bool {
        match Self::split(irq) {
            Some((idx, bit)) => self.iser[idx].load(Ordering::SeqCst) & (1 << bit) != 0,
            None => false,
        }
    }

    pub fn set_priority(&self, irq: GroupId, priority: Priority) {
        if irq.0 >= IRQ_COUNT {
            return;
        }
        let word = &self.ipr[(irq.0 / 4) as usize];
        let shift = (irq.0 % 4) * 8;
        let byte = self.grouping.encode(priority) as u32;
        let mut current = word.load(Ordering::SeqCst);
        loop {
            let next = (current & !(0xFF << shift)) | (byte << shift);
            match word.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn priority(&self, irq: GroupId) -> Priority {
        if irq.0 >= IRQ_COUNT {
            return Priority::default();
        }
        let word = self.ipr[(irq.0 / 4) as usize].load(Ordering::SeqCst);
        let byte = (word >> ((irq.0 % 4) * 8)) as u8;
        self.grouping.decode(byte)
    }

    fn split(irq: GroupId) -> Option<(usize, u32)> {
        (irq.0 < IRQ_COUNT).then(|| ((irq.0 / 32) as usize, irq.0 % 32))
    }
}

impl Peripheral for Nvic {
    fn read(&self, offset: u64) -> SimResult<u32> {
        let offset = offset & !3;
        match offset {
            // ISER0-7 and ICER0-7 both read back the enable state.
            0x000..=0x01C => Ok(self.iser[(offset / 4) as usize].load(Ordering::SeqCst)),
            0x080..=0x09C => Ok(self.iser[((offset - 0x80) / 4) as usize].load(Ordering::SeqCst)),
            0x300..=0x3EC => Ok(self.ipr[((offset - 0x300) / 4) as usize].load(Ordering::SeqCst)),
            _ => Err(SimulationError::InvalidOffset(offset)),
        }
    }

    fn write(&self, offset: u64, value: u32) -> SimResult<()> {
        let offset = offset & !3;
        match offset {
            // ISER: Writing 1 sets the enable bit
            0x000..=0x01C => {
                self.iser[(offset / 4) as usize].fetch_or(value, Ordering::SeqCst);
            }
            // ICER: Writing 1 clears the enable bit
            0x080..=0x09C => {
                self.iser[((offset - 0x80) / 4) as usize].fetch_and(!value, Ordering::SeqCst);
            }
            0x300..=0x3EC => {
                self.ipr[((offset - 0x300) / 4) as usize].store(value, Ordering::SeqCst);
            }
            _ => return Err(SimulationError::InvalidOffset(offset)),
        }
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        let iser: Vec<u32> = self
            .iser
            .iter()
            .map(|a| a.load(Ordering::Relaxed))
            .collect();
        serde_json::json!({
            "priority_grouping": self.grouping.tier_bits(),
            "iser": iser,
        })
    }
}
