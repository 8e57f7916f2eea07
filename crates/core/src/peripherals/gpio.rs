// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::Pull;
use crate::peripheral::{PinLevel, PinMode, Speed};
use crate::{Peripheral, SimResult, SimulationError};
use std::sync::atomic::{AtomicU32, Ordering};

/// STM32 GPIO port (MODER/PUPDR-style layout).
#[derive(Debug, Default)]
pub struct GpioPort {
    moder: AtomicU32,   // 0x00: mode register
    otyper: AtomicU32,  // 0x04: output type register
    ospeedr: AtomicU32, // 0x08: output speed register
    pupdr: AtomicU32,   // 0x0C: pull-up/pull-down register
    idr: AtomicU32,     // 0x10: input data register
    odr: AtomicU32,     // 0x14: output data register
    // Pins with an external driver; the rest float to their pull level.
    driven: AtomicU32,
    driven_level: AtomicU32,
}

fn update_field(reg: &AtomicU32, shift: u32, width_mask: u32, value: u32) {
    let mut current = reg.load(Ordering::SeqCst);
    loop {
        let next = (current & !(width_mask << shift)) | ((value & width_mask) << shift);
        match reg.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

impl GpioPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, pin: u8, mode: PinMode, pull: Pull, speed: Speed) {
        let pin = pin as u32 & 0xF;
        let (moder, open_drain) = match mode {
            PinMode::Input | PinMode::Interrupt(_) => (0b00, false),
            PinMode::OutputPushPull => (0b01, false),
            PinMode::OutputOpenDrain => (0b01, true),
        };
        update_field(&self.moder, pin * 2, 0b11, moder);
        update_field(&self.otyper, pin, 0b1, open_drain as u32);
        update_field(&self.ospeedr, pin * 2, 0b11, speed.bits());
        update_field(&self.pupdr, pin * 2, 0b11, pull.bits());
        self.refresh_input();
    }

    pub fn pull(&self, pin: u8) -> Pull {
        match (self.pupdr.load(Ordering::SeqCst) >> ((pin as u32 & 0xF) * 2)) & 0b11 {
            0b01 => Pull::Up,
            0b10 => Pull::Down,
            _ => Pull::None,
        }
    }

    pub fn is_output(&self, pin: u8) -> bool {
        (self.moder.load(Ordering::SeqCst) >> ((pin as u32 & 0xF) * 2)) & 0b11 == 0b01
    }

    pub fn write_output(&self, pin: u8, level: PinLevel) {
        // BSRR semantics: set or reset a single bit atomically.
        let bit = 1u32 << (pin & 0xF);
        match level {
            PinLevel::High => self.odr.fetch_or(bit, Ordering::SeqCst),
            PinLevel::Low => self.odr.fetch_and(!bit, Ordering::SeqCst),
        };
        self.refresh_input();
    }

    pub fn output(&self, pin: u8) -> PinLevel {
        PinLevel::from(self.odr.load(Ordering::SeqCst) & (1 << (pin & 0xF)) != 0)
    }

    pub fn input(&self, pin: u8) -> PinLevel {
        PinLevel::from(self.idr.load(Ordering::SeqCst) & (1 << (pin & 0xF)) != 0)
    }

    /// Drives an input from outside the chip; `None` releases it to its pull.
    /// Returns the input level before and after.
    pub fn drive(&self, pin: u8, level: Option<PinLevel>) -> (PinLevel, PinLevel) {
        let bit = 1u32 << (pin & 0xF);
        let before = self.input(pin);
        match level {
            Some(level) => {
                self.driven.fetch_or(bit, Ordering::SeqCst);
                if bool::from(level) {
                    self.driven_level.fetch_or(bit, Ordering::SeqCst);
                } else {
                    self.driven_level.fetch_and(!bit, Ordering::SeqCst);
                }
            }
            None => {
                self.driven.fetch_and(!bit, Ordering::SeqCst);
            }
        }
        self.refresh_input();
        (before, self.input(pin))
    }

    /// Recomputes IDR from outputs, external drivers and pulls.
    fn refresh_input(&self) {
        let moder = self.moder.load(Ordering::SeqCst);
        let pupdr = self.pupdr.load(Ordering::SeqCst);
        let odr = self.odr.load(Ordering::SeqCst);
        let driven = self.driven.load(Ordering::SeqCst);
        let driven_level = self.driven_level.load(Ordering::SeqCst);

        let mut idr = 0u32;
        for pin in 0..16 {
            let bit = 1u32 << pin;
            let high = if (moder >> (pin * 2)) & 0b11 == 0b01 {
                odr & bit != 0
            } else if driven & bit != 0 {
                driven_level & bit != 0
            } else {
                (pupdr >> (pin * 2)) & 0b11 == 0b01
            };
            if high {
                idr |= bit;
            }
        }
        self.idr.store(idr, Ordering::SeqCst);
    }
}

impl Peripheral for GpioPort {
    fn read(&self, offset: u64) -> SimResult<u32> {
        let reg = match offset & !3 {
            0x00 => &self.moder,
            0x04 => &self.otyper,
            0x08 => &self.ospeedr,
            0x0C => &self.pupdr,
            0x10 => &self.idr,
            0x14 => &self.odr,
            0x18 => return Ok(0), // BSRR is write-only
            other => return Err(SimulationError::InvalidOffset(other)),
        };
        Ok(reg.load(Ordering::SeqCst))
    }

    fn write(&self, offset: u64, value: u32) -> SimResult<()> {
        match offset & !3 {
            0x00 => self.moder.store(value, Ordering::SeqCst),
            0x04 => self.otyper.store(value & 0xFFFF, Ordering::SeqCst),
            0x08 => self.ospeedr.store(value, Ordering::SeqCst),
            0x0C => self.pupdr.store(value, Ordering::SeqCst),
            0x10 => {} // IDR is read-only
            0x14 => self.odr.store(value & 0xFFFF, Ordering::SeqCst),
            0x18 => {
                // BSRR: lower 16 bits set, upper 16 bits reset.
                let set = value & 0xFFFF;
                let reset = (value >> 16) & 0xFFFF;
                self.odr.fetch_and(!reset, Ordering::SeqCst);
                self.odr.fetch_or(set, Ordering::SeqCst);
            }
            other => return Err(SimulationError::InvalidOffset(other)),
        }
        self.refresh_input();
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "moder": self.moder.load(Ordering::Relaxed),
            "otyper": self.otyper.load(Ordering::Relaxed),
            "ospeedr": self.ospeedr.load(Ordering::Relaxed),
            "pupdr": self.pupdr.load(Ordering::Relaxed),
            "idr": self.idr.load(Ordering::Relaxed),
            "odr": self.odr.load(Ordering::Relaxed),
        })
    }
}
