// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::diagnostics::{DiagnosticContext, Diagnostics, Fault, TracingDiagnostics};
use crate::group::GroupId;
use crate::handler::{HandlerError, LineHandler, NoPreemption, PreemptionHook, TriggerContext};
use crate::line::{LineConfig, LineId, PinId, Priority};
use crate::metrics::DispatchObserver;
use crate::peripheral::{ClockDomain, ExtiPeripheral, PinLevel, PinMode, Speed};
use crate::pin::OutputPin;
use crate::{AckOrder, ConfigError};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct LineSlot {
    config: LineConfig,
    group: GroupId,
    enabled: AtomicBool,
    triggers: AtomicU64,
    faults: AtomicU64,
    handler: Mutex<Box<dyn LineHandler>>,
}

/// Point-in-time view of a registered line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LineInfo {
    pub config: LineConfig,
    pub group: GroupId,
    pub enabled: bool,
    pub pending: bool,
    pub triggers: u64,
    pub faults: u64,
}

/// Outcome of one `dispatch` call. Every line listed here was acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DispatchReport {
    pub group: GroupId,
    /// Lines whose handler ran, in invocation order.
    pub serviced: Vec<LineId>,
    /// Subset of `serviced` whose handler returned an error or panicked.
    pub failed: Vec<LineId>,
    /// Pending lines with no registered handler.
    pub unhandled: Vec<LineId>,
    /// Registered but disabled lines found pending; cleared without running
    /// their handler.
    pub masked: Vec<LineId>,
}

impl DispatchReport {
    fn new(group: GroupId) -> Self {
        Self {
            group,
            serviced: Vec::new(),
            failed: Vec::new(),
            unhandled: Vec::new(),
            masked: Vec::new(),
        }
    }

    pub fn acknowledged(&self) -> usize {
        self.serviced.len() + self.unhandled.len() + self.masked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledged() == 0
    }
}

/// Owns the line table: which handler belongs to which line, how each line
/// triggers, and the acknowledge-on-dispatch contract.
///
/// All operations take `&self` so a controller can be shared between the
/// interrupt path and the main loop. The table is written only while lines are
/// registered; each handler sits behind its own lock so that a nested
/// dispatch of another group never contends with the one it preempted.
#[derive(Debug)]
pub struct LineController<P: ExtiPeripheral> {
    peripheral: Arc<P>,
    diagnostics: Arc<dyn Diagnostics>,
    ack_order: AckOrder,
    lines: RwLock<BTreeMap<LineId, Arc<LineSlot>>>,
    clocks: Mutex<BTreeSet<ClockDomain>>,
    observers: RwLock<Vec<Arc<dyn DispatchObserver>>>,
}

impl<P: ExtiPeripheral> LineController<P> {
    pub fn new(peripheral: Arc<P>) -> Self {
        Self {
            peripheral,
            diagnostics: Arc::new(TracingDiagnostics),
            ack_order: AckOrder::default(),
            lines: RwLock::new(BTreeMap::new()),
            clocks: Mutex::new(BTreeSet::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_ack_order(mut self, ack_order: AckOrder) -> Self {
        self.ack_order = ack_order;
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn DispatchObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn peripheral(&self) -> &Arc<P> {
        &self.peripheral
    }

    pub fn diagnostics(&self) -> &Arc<dyn Diagnostics> {
        &self.diagnostics
    }

    pub fn ack_order(&self) -> AckOrder {
        self.ack_order
    }

    /// Registers a line and its handler.
    ///
    /// Opens the clocks the line needs, configures its pin as an interrupt
    /// input and routes the port to the line. Signal delivery stays off until
    /// [`enable`](Self::enable). A rejected registration leaves the table and
    /// the hardware untouched.
    pub fn register_line<H>(&self, config: LineConfig, handler: H) -> Result<(), ConfigError>
    where
        H: LineHandler + 'static,
    {
        let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
        if lines.contains_key(&config.id) {
            return Err(ConfigError::AlreadyRegistered(config.id));
        }

        let group = self
            .peripheral
            .group_map()
            .group_of(config.id)
            .ok_or(ConfigError::InvalidLine(config.id.index()))?;

        let grouping = self.peripheral.priority_grouping();
        if !grouping.contains(config.priority) {
            return Err(ConfigError::InvalidPriority {
                priority: config.priority,
                grouping: grouping.tier_bits(),
            });
        }

        self.ensure_clock(ClockDomain::GpioPort(config.port));
        self.ensure_clock(ClockDomain::Syscfg);
        self.peripheral.configure_pin(
            config.pin(),
            PinMode::Interrupt(config.edge),
            config.pull,
            Speed::Low,
        );
        self.peripheral.route_line(config.id, config.port);

        lines.insert(
            config.id,
            Arc::new(LineSlot {
                config,
                group,
                enabled: AtomicBool::new(false),
                triggers: AtomicU64::new(0),
                faults: AtomicU64::new(0),
                handler: Mutex::new(Box::new(handler)),
            }),
        );
        debug!(
            "Registered {} on {} ({:?} edge, {:?} pull, priority {}) in {}",
            config.id,
            config.pin(),
            config.edge,
            config.pull,
            config.priority,
            group
        );
        Ok(())
    }

    /// Turns on signal delivery for a registered line. Enabling twice is a
    /// no-op.
    pub fn enable(&self, id: LineId) -> Result<(), ConfigError> {
        let slot = self.slot(id).ok_or(ConfigError::NotRegistered(id))?;
        if slot.enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.peripheral.enable_interrupt_line(id, slot.config.edge);
        let priority = self
            .group_priority(slot.group)
            .unwrap_or(slot.config.priority);
        self.peripheral.set_group_priority(slot.group, priority);
        self.peripheral.enable_group(slot.group);
        debug!("Enabled {} ({} at priority {})", id, slot.group, priority);
        Ok(())
    }

    /// Services every asserting line of `group`.
    pub fn dispatch(&self, group: GroupId) -> DispatchReport {
        self.dispatch_with(group, &NoPreemption)
    }

    /// Like [`dispatch`](Self::dispatch), with a hook handlers can use to let
    /// higher-priority groups preempt them.
    ///
    /// Lines are serviced in ascending id order and each is acknowledged on
    /// its own, whatever its handler does. A line nobody registered is
    /// acknowledged and reported.
    pub fn dispatch_with(&self, group: GroupId, hook: &dyn PreemptionHook) -> DispatchReport {
        self.notify(|o| o.on_dispatch_start(group));
        let pending = self.peripheral.read_pending(group);
        trace!("dispatch {}: pending {:?}", group, pending);

        let mut report = DispatchReport::new(group);
        for line in pending.iter() {
            let Some(slot) = self.slot(line) else {
                self.acknowledge(line);
                report.unhandled.push(line);
                self.notify(|o| o.on_unhandled_line(line));
                self.diagnostics.report(
                    &Fault::Config {
                        error: ConfigError::UnhandledLine(line),
                    },
                    &DiagnosticContext::dispatch(group, line),
                );
                continue;
            };

            let sequence = slot.triggers.fetch_add(1, Ordering::SeqCst) + 1;
            if self.ack_order == AckOrder::BeforeHandler {
                self.acknowledge(line);
            }
            let outcome = self.invoke(&slot, line, group, sequence, hook);
            if self.ack_order == AckOrder::AfterHandler {
                self.acknowledge(line);
            }

            report.serviced.push(line);
            if let Err(error) = outcome {
                slot.faults.fetch_add(1, Ordering::SeqCst);
                report.failed.push(line);
                self.notify(|o| o.on_handler_fault(line));
                self.diagnostics.report(
                    &Fault::Handler { line, error },
                    &DiagnosticContext::dispatch(group, line),
                );
            }
        }

        // Disabled lines still latch PR on a software trigger.
        let members = self.peripheral.group_map().members(group);
        for line in members.iter().filter(|l| !pending.contains(*l)) {
            let masked = self
                .slot(line)
                .is_some_and(|slot| !slot.enabled.load(Ordering::SeqCst));
            if masked && self.peripheral.is_pending(line) {
                self.acknowledge(line);
                report.masked.push(line);
                debug!("{} pending while disabled; cleared without handler", line);
            }
        }

        self.notify(|o| o.on_dispatch_end(group));
        report
    }

    pub fn is_pending(&self, id: LineId) -> bool {
        self.peripheral.is_pending(id)
    }

    pub fn is_registered(&self, id: LineId) -> bool {
        self.slot(id).is_some()
    }

    pub fn is_enabled(&self, id: LineId) -> bool {
        self.slot(id)
            .map(|s| s.enabled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn group_of(&self, id: LineId) -> Option<GroupId> {
        self.peripheral.group_map().group_of(id)
    }

    pub fn line(&self, id: LineId) -> Option<LineInfo> {
        self.slot(id).map(|slot| self.info(&slot))
    }

    /// All registered lines, ascending by id.
    pub fn lines(&self) -> Vec<LineInfo> {
        let slots: Vec<Arc<LineSlot>> = self
            .lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots.iter().map(|slot| self.info(slot)).collect()
    }

    /// Configures `pin` as a push-pull output driven to `initial`.
    pub fn output_pin(&self, pin: PinId, speed: Speed, initial: PinLevel) -> OutputPin<P> {
        if let Some(slot) = self.slot(pin.line()) {
            if slot.config.pin() == pin {
                warn!("{} is also the input of {}", pin, pin.line());
            }
        }
        self.ensure_clock(ClockDomain::GpioPort(pin.port));
        self.peripheral
            .configure_pin(pin, PinMode::OutputPushPull, crate::Pull::None, speed);
        self.peripheral.set_pin_output(pin, initial);
        OutputPin::new(self.peripheral.clone(), pin)
    }

    /// Clock domains opened so far.
    pub fn enabled_clocks(&self) -> Vec<ClockDomain> {
        self.clocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn ensure_clock(&self, domain: ClockDomain) {
        let mut clocks = self.clocks.lock().unwrap_or_else(PoisonError::into_inner);
        if clocks.insert(domain) {
            self.peripheral.enable_clock_domain(domain);
            debug!("Enabled clock {:?}", domain);
        }
    }

    /// Most urgent priority among the enabled lines of `group`.
    fn group_priority(&self, group: GroupId) -> Option<Priority> {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.group == group && s.enabled.load(Ordering::SeqCst))
            .map(|s| s.config.priority)
            .min()
    }

    fn slot(&self, id: LineId) -> Option<Arc<LineSlot>> {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn info(&self, slot: &LineSlot) -> LineInfo {
        LineInfo {
            config: slot.config,
            group: slot.group,
            enabled: slot.enabled.load(Ordering::SeqCst),
            pending: self.peripheral.is_pending(slot.config.id),
            triggers: slot.triggers.load(Ordering::SeqCst),
            faults: slot.faults.load(Ordering::SeqCst),
        }
    }

    fn acknowledge(&self, line: LineId) {
        self.peripheral.clear_pending(line);
        self.notify(|o| o.on_line_acknowledged(line));
        trace!("ack {}", line);
    }

    fn invoke(
        &self,
        slot: &LineSlot,
        line: LineId,
        group: GroupId,
        sequence: u64,
        hook: &dyn PreemptionHook,
    ) -> Result<(), HandlerError> {
        // A panic is caught while the guard is still held, so the lock is
        // never poisoned by a handler.
        let mut handler = slot.handler.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cx = TriggerContext::new(line, group, sequence, hook);
        self.notify(|o| o.on_handler_invoked(line));
        match panic::catch_unwind(AssertUnwindSafe(|| handler.on_trigger(&mut cx))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::from_panic(payload)),
        }
    }

    fn notify(&self, f: impl Fn(&dyn DispatchObserver)) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            f(observer.as_ref());
        }
    }
}
