// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::line::{LineId, Port};
use crate::{Peripheral, SimResult, SimulationError};
use std::sync::atomic::{AtomicU32, Ordering};

/// System configuration controller: the EXTI port multiplexer
/// (EXTICR1..EXTICR4, four lines per register, four bits per line).
#[derive(Debug, Default)]
pub struct Syscfg {
    exticr: [AtomicU32; 4],
}

impl Syscfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, line: LineId, port: Port) {
        let reg = &self.exticr[(line.index() / 4) as usize];
        let shift = (line.index() % 4) as u32 * 4;
        let mut current = reg.load(Ordering::SeqCst);
        loop {
            let next = (current & !(0xF << shift)) | ((port.index() as u32) << shift);
            match reg.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Port currently driving `line` (A after reset).
    pub fn port_for(&self, line: LineId) -> Port {
        let reg = self.exticr[(line.index() / 4) as usize].load(Ordering::SeqCst);
        let shift = (line.index() % 4) as u32 * 4;
        Port::from_index(((reg >> shift) & 0xF) as u8).unwrap_or_default()
    }
}

impl Peripheral for Syscfg {
    fn read(&self, offset: u64) -> SimResult<u32> {
        match offset & !3 {
            o @ 0x08..=0x14 => Ok(self.exticr[((o - 0x08) / 4) as usize].load(Ordering::SeqCst)),
            other => Err(SimulationError::InvalidOffset(other)),
        }
    }

    fn write(&self, offset: u64, value: u32) -> SimResult<()> {
        match offset & !3 {
            o @ 0x08..=0x14 => {
                self.exticr[((o - 0x08) / 4) as usize].store(value & 0xFFFF, Ordering::SeqCst);
                Ok(())
            }
            other => Err(SimulationError::InvalidOffset(other)),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        let exticr: Vec<u32> = self
            .exticr
            .iter()
            .map(|r| r.load(Ordering::Relaxed))
            .collect();
        serde_json::json!({ "exticr": exticr })
    }
}

#[cfg(test)]
mod tests {
    use super::Syscfg;
    use crate::line::{LineId, Port};
    use crate::Peripheral;

    #[test]
    fn test_route_line_to_port() {
        let syscfg = Syscfg::new();
        let line13 = LineId::new(13).unwrap();
        syscfg.route(line13, Port::C);
        assert_eq!(syscfg.port_for(line13), Port::C);
        // EXTICR4 holds lines 12..15; line 13 is the second nibble.
        assert_eq!(syscfg.read(0x14).unwrap(), 0x0020);
        assert_eq!(syscfg.port_for(LineId::new(12).unwrap()), Port::A);
    }
}
