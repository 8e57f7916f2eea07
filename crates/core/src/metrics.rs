// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::group::GroupId;
use crate::line::LineId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Trait for observing dispatch events in a modular way.
pub trait DispatchObserver: std::fmt::Debug + Send + Sync {
    fn on_dispatch_start(&self, _group: GroupId) {}
    fn on_dispatch_end(&self, _group: GroupId) {}
    fn on_handler_invoked(&self, _line: LineId) {}
    fn on_line_acknowledged(&self, _line: LineId) {}
    fn on_handler_fault(&self, _line: LineId) {}
    fn on_unhandled_line(&self, _line: LineId) {}
}

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    dispatch_count: AtomicU64,
    handler_count: AtomicU64,
    ack_count: AtomicU64,
    fault_count: AtomicU64,
    unhandled_count: AtomicU64,
    acks_by_line: Mutex<HashMap<LineId, u64>>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.dispatch_count.store(0, Ordering::SeqCst);
        self.handler_count.store(0, Ordering::SeqCst);
        self.ack_count.store(0, Ordering::SeqCst);
        self.fault_count.store(0, Ordering::SeqCst);
        self.unhandled_count.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.acks_by_line.lock() {
            m.clear();
        }
    }

    pub fn get_dispatches(&self) -> u64 {
        self.dispatch_count.load(Ordering::SeqCst)
    }

    pub fn get_handler_calls(&self) -> u64 {
        self.handler_count.load(Ordering::SeqCst)
    }

    pub fn get_acks(&self) -> u64 {
        self.ack_count.load(Ordering::SeqCst)
    }

    pub fn get_faults(&self) -> u64 {
        self.fault_count.load(Ordering::SeqCst)
    }

    pub fn get_unhandled(&self) -> u64 {
        self.unhandled_count.load(Ordering::SeqCst)
    }

    pub fn get_acks_for(&self, line: LineId) -> u64 {
        self.acks_by_line
            .lock()
            .ok()
            .and_then(|m| m.get(&line).copied())
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "dispatches": self.get_dispatches(),
            "handler_calls": self.get_handler_calls(),
            "acks": self.get_acks(),
            "faults": self.get_faults(),
            "unhandled": self.get_unhandled(),
        })
    }
}

impl DispatchObserver for DispatchMetrics {
    fn on_dispatch_start(&self, _group: GroupId) {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_handler_invoked(&self, _line: LineId) {
        self.handler_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_line_acknowledged(&self, line: LineId) {
        self.ack_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.acks_by_line.lock() {
            *m.entry(line).or_insert(0) += 1;
        }
    }

    fn on_handler_fault(&self, _line: LineId) {
        self.fault_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unhandled_line(&self, _line: LineId) {
        self.unhandled_count.fetch_add(1, Ordering::SeqCst);
    }
}
