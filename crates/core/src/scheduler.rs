// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Priority-ordered servicing of dispatch groups.
//!
//! Models how the NVIC picks which group entry point runs: the most urgent
//! enabled group with an asserting line goes first, and a group only
//! interrupts a running one when its preemption tier is strictly lower.
//! Handlers reach nested preemption through
//! [`TriggerContext::preemption_point`](crate::TriggerContext::preemption_point).

use crate::controller::{DispatchReport, LineController};
use crate::diagnostics::{DiagnosticContext, Fault};
use crate::group::GroupId;
use crate::handler::PreemptionHook;
use crate::line::Priority;
use crate::peripheral::ExtiPeripheral;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

pub const DEFAULT_LIVELOCK_THRESHOLD: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("{group} dispatched {dispatches} times without its pending flag clearing")]
    Livelock { group: GroupId, dispatches: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    Enter { group: GroupId, depth: usize },
    Exit { group: GroupId, depth: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ServiceSummary {
    pub dispatches: u32,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFrame {
    group: GroupId,
    priority: Priority,
}

#[derive(Debug, Default)]
struct Pass {
    counts: BTreeMap<GroupId, u32>,
    max_depth: usize,
}

#[derive(Debug)]
pub struct InterruptScheduler<P: ExtiPeripheral> {
    controller: Arc<LineController<P>>,
    livelock_threshold: u32,
    active: Mutex<Vec<ActiveFrame>>,
    pass: Mutex<Pass>,
    events: Mutex<Vec<ServiceEvent>>,
    reports: Mutex<Vec<DispatchReport>>,
    nested_error: Mutex<Option<SchedulerError>>,
}

impl<P: ExtiPeripheral> InterruptScheduler<P> {
    pub fn new(controller: Arc<LineController<P>>) -> Self {
        Self {
            controller,
            livelock_threshold: DEFAULT_LIVELOCK_THRESHOLD,
            active: Mutex::new(Vec::new()),
            pass: Mutex::new(Pass::default()),
            events: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            nested_error: Mutex::new(None),
        }
    }

    /// Dispatches of one group allowed in a single service pass before the
    /// pass gives up. Zero is treated as one.
    pub fn with_livelock_threshold(mut self, threshold: u32) -> Self {
        self.livelock_threshold = threshold.max(1);
        self
    }

    pub fn controller(&self) -> &Arc<LineController<P>> {
        &self.controller
    }

    /// Runs dispatch until no enabled group has an asserting line.
    ///
    /// A group whose pending flag will not clear is reported as a livelock
    /// instead of spinning forever.
    pub fn service(&self) -> Result<ServiceSummary, SchedulerError> {
        *lock(&self.pass) = Pass::default();
        lock(&self.nested_error).take();

        let result = self.run_eligible();
        let pass = std::mem::take(&mut *lock(&self.pass));
        let summary = ServiceSummary {
            dispatches: pass.counts.values().sum(),
            max_depth: pass.max_depth,
        };
        debug!(
            "Service pass: {} dispatches, max depth {}",
            summary.dispatches, summary.max_depth
        );
        result.map(|()| summary)
    }

    /// True when nothing is running and nothing is waiting to run.
    pub fn is_idle(&self) -> bool {
        lock(&self.active).is_empty() && self.eligible_group(None).is_none()
    }

    pub fn events(&self) -> Vec<ServiceEvent> {
        lock(&self.events).clone()
    }

    pub fn take_events(&self) -> Vec<ServiceEvent> {
        std::mem::take(&mut *lock(&self.events))
    }

    pub fn take_reports(&self) -> Vec<DispatchReport> {
        std::mem::take(&mut *lock(&self.reports))
    }

    fn run_eligible(&self) -> Result<(), SchedulerError> {
        loop {
            let top = lock(&self.active).last().map(|f| f.priority);
            let Some((group, priority)) = self.eligible_group(top) else {
                return Ok(());
            };

            let depth = {
                let mut pass = lock(&self.pass);
                let count = pass.counts.entry(group).or_insert(0);
                if *count >= self.livelock_threshold {
                    let dispatches = *count;
                    drop(pass);
                    self.controller.diagnostics().report(
                        &Fault::Livelock { group, dispatches },
                        &DiagnosticContext::service(group),
                    );
                    return Err(SchedulerError::Livelock { group, dispatches });
                }
                *count += 1;

                let mut active = lock(&self.active);
                active.push(ActiveFrame { group, priority });
                pass.max_depth = pass.max_depth.max(active.len());
                active.len()
            };

            trace!("enter {} at depth {}", group, depth);
            lock(&self.events).push(ServiceEvent::Enter { group, depth });
            let report = self.controller.dispatch_with(group, self);
            lock(&self.active).pop();
            lock(&self.events).push(ServiceEvent::Exit { group, depth });
            lock(&self.reports).push(report);

            if let Some(err) = lock(&self.nested_error).take() {
                return Err(err);
            }
        }
    }

    /// Most urgent enabled group with an asserting line that may run on top
    /// of `running`.
    fn eligible_group(&self, running: Option<Priority>) -> Option<(GroupId, Priority)> {
        let peripheral = self.controller.peripheral();
        peripheral
            .group_map()
            .groups()
            .iter()
            .filter_map(|spec| {
                let priority = peripheral.group_priority(spec.id)?;
                if peripheral.read_pending(spec.id).is_empty() {
                    return None;
                }
                match running {
                    Some(current) if !current.preempted_by(priority) => None,
                    _ => Some((spec.id, priority)),
                }
            })
            .min_by_key(|(group, priority)| (*priority, *group))
    }
}

impl<P: ExtiPeripheral> PreemptionHook for InterruptScheduler<P> {
    fn preemption_point(&self) {
        if lock(&self.nested_error).is_some() {
            return;
        }
        if let Err(err) = self.run_eligible() {
            *lock(&self.nested_error) = Some(err);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
