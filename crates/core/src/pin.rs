// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::PinId;
use crate::peripheral::{ExtiPeripheral, PinLevel};
use std::sync::Arc;

/// A push-pull output handed out by
/// [`LineController::output_pin`](crate::LineController::output_pin).
#[derive(Debug)]
pub struct OutputPin<P: ExtiPeripheral> {
    peripheral: Arc<P>,
    pin: PinId,
}

impl<P: ExtiPeripheral> OutputPin<P> {
    pub(crate) fn new(peripheral: Arc<P>, pin: PinId) -> Self {
        Self { peripheral, pin }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn set(&self, level: PinLevel) {
        self.peripheral.set_pin_output(self.pin, level);
    }

    pub fn set_high(&self) {
        self.set(PinLevel::High);
    }

    pub fn set_low(&self) {
        self.set(PinLevel::Low);
    }

    /// Flips the output latch and returns the new level.
    pub fn toggle(&self) -> PinLevel {
        let next = !self.level();
        self.set(next);
        next
    }

    pub fn level(&self) -> PinLevel {
        self.peripheral.output_level(self.pin)
    }
}
