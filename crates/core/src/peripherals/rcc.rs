// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripheral::ClockDomain;
use crate::{Peripheral, SimResult, SimulationError};
use std::sync::atomic::{AtomicU32, Ordering};

const AHB1ENR: u64 = 0x30;
const APB2ENR: u64 = 0x44;
const SYSCFGEN: u32 = 1 << 14;

/// Minimal RCC (Reset and Clock Control) peripheral: only the clock-enable
/// registers that gate GPIO ports and SYSCFG.
#[derive(Debug, Default)]
pub struct Rcc {
    ahb1enr: AtomicU32,
    apb2enr: AtomicU32,
}

impl Rcc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, domain: ClockDomain) {
        match domain {
            ClockDomain::GpioPort(port) => {
                self.ahb1enr
                    .fetch_or(1 << port.index(), Ordering::SeqCst);
            }
            ClockDomain::Syscfg => {
                self.apb2enr.fetch_or(SYSCFGEN, Ordering::SeqCst);
            }
        }
    }

    pub fn is_enabled(&self, domain: ClockDomain) -> bool {
        match domain {
            ClockDomain::GpioPort(port) => {
                self.ahb1enr.load(Ordering::SeqCst) & (1 << port.index()) != 0
            }
            ClockDomain::Syscfg => self.apb2enr.load(Ordering::SeqCst) & SYSCFGEN != 0,
        }
    }
}

impl Peripheral for Rcc {
    fn read(&self, offset: u64) -> SimResult<u32> {
        match offset & !3 {
            AHB1ENR => Ok(self.ahb1enr.load(Ordering::SeqCst)),
            APB2ENR => Ok(self.apb2enr.load(Ordering::SeqCst)),
            other => Err(SimulationError::InvalidOffset(other)),
        }
    }

    fn write(&self, offset: u64, value: u32) -> SimResult<()> {
        match offset & !3 {
            AHB1ENR => self.ahb1enr.store(value, Ordering::SeqCst),
            APB2ENR => self.apb2enr.store(value, Ordering::SeqCst),
            other => return Err(SimulationError::InvalidOffset(other)),
        }
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "ahb1enr": self.ahb1enr.load(Ordering::Relaxed),
            "apb2enr": self.apb2enr.load(Ordering::Relaxed),
        })
    }
}
