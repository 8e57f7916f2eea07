// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::controller::LineController;
use crate::diagnostics::{DiagnosticFanout, DiagnosticLog, Diagnostics, TracingDiagnostics};
use crate::group::{GroupId, GroupMap, GroupSpec, LineSet};
use crate::handler::{FailingHandler, NoopHandler};
use crate::line::{Edge, LineConfig, LineId, PinId, Port, Priority, PriorityGrouping, Pull};
use crate::metrics::DispatchMetrics;
use crate::peripheral::{PinLevel, Speed};
use crate::peripherals::SimBoard;
use crate::pin::OutputPin;
use crate::scheduler::InterruptScheduler;
use crate::work::{EventFlag, FlagHandler, LineEvent, QueueHandler, WorkConsumer, WorkQueue};
use anyhow::{anyhow, Context};
use labwired_irq_config::{BoardConfig, HandlerAction, LineEntry};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A simulated board wired up from a [`BoardConfig`].
#[derive(Debug)]
pub struct Board {
    pub name: String,
    pub hardware: Arc<SimBoard>,
    pub controller: Arc<LineController<SimBoard>>,
    pub scheduler: InterruptScheduler<SimBoard>,
    pub metrics: Arc<DispatchMetrics>,
    pub log: Arc<DiagnosticLog>,
    queues: Vec<(LineId, WorkConsumer<LineEvent>)>,
    flags: Vec<(LineId, EventFlag)>,
    outputs: BTreeMap<PinId, OutputPin<SimBoard>>,
    toggles: BTreeMap<LineId, PinId>,
}

/// What one main-loop pass picked up from the handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MainLoopReport {
    pub events: Vec<LineEvent>,
    pub flags: Vec<LineId>,
    pub toggled: Vec<(PinId, PinLevel)>,
    /// Work items lost to full queues since the board was built.
    pub dropped: u64,
}

impl MainLoopReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.flags.is_empty()
    }
}

/// Loads a board description from disk and builds it.
pub fn load_board(path: &Path) -> anyhow::Result<Board> {
    info!("Loading board description: {:?}", path);
    let config = BoardConfig::from_file(path)?;
    build_board(&config)
}

pub fn build_board(config: &BoardConfig) -> anyhow::Result<Board> {
    let groups = if config.groups.is_empty() {
        GroupMap::stm32()
    } else {
        let specs = config
            .groups
            .iter()
            .map(|g| -> Result<GroupSpec, crate::ConfigError> {
                let lines = g
                    .lines
                    .iter()
                    .map(|&l| LineId::new(l))
                    .collect::<Result<LineSet, _>>()?;
                Ok(GroupSpec {
                    id: GroupId(g.irq),
                    name: g.name.clone().unwrap_or_else(|| format!("IRQ{}", g.irq)),
                    lines,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        GroupMap::new(specs)?
    };
    let grouping = PriorityGrouping::new(config.priority_grouping).ok_or_else(|| {
        anyhow!(
            "priority grouping {} is out of range",
            config.priority_grouping
        )
    })?;

    let hardware = Arc::new(SimBoard::new(groups, grouping));
    let log = Arc::new(DiagnosticLog::new());
    let sinks: Vec<Arc<dyn Diagnostics>> = vec![Arc::new(TracingDiagnostics), log.clone()];
    let diagnostics: Arc<dyn Diagnostics> = Arc::new(DiagnosticFanout::new(sinks));
    let controller = Arc::new(
        LineController::new(hardware.clone())
            .with_diagnostics(diagnostics)
            .with_ack_order(config.ack_order),
    );
    let metrics = Arc::new(DispatchMetrics::new());
    controller.add_observer(metrics.clone());

    let mut outputs = BTreeMap::new();
    for entry in &config.outputs {
        let pin: PinId = entry
            .pin
            .parse()
            .with_context(|| format!("Invalid output pin '{}'", entry.pin))?;
        let speed: Speed = entry.speed.parse().map_err(|e: String| anyhow!(e))?;
        let initial = PinLevel::from(entry.initial_high);
        outputs.insert(pin, controller.output_pin(pin, speed, initial));
    }

    let mut queues = Vec::new();
    let mut flags = Vec::new();
    let mut toggles = BTreeMap::new();
    for entry in &config.lines {
        let line_config =
            line_config(entry).with_context(|| format!("Invalid line entry {}", entry.id))?;
        let id = line_config.id;

        match entry.action {
            HandlerAction::Queue => {
                let (producer, consumer) = WorkQueue::bounded(config.queue_capacity);
                controller.register_line(line_config, QueueHandler::new(producer))?;
                queues.push((id, consumer));
            }
            HandlerAction::Flag => {
                let flag = EventFlag::new();
                controller.register_line(line_config, FlagHandler::new(flag.clone()))?;
                flags.push((id, flag));
            }
            HandlerAction::Fail => {
                controller
                    .register_line(line_config, FailingHandler::new("injected failure"))?;
            }
            HandlerAction::None => {
                controller.register_line(line_config, NoopHandler)?;
            }
        }

        if let Some(toggle) = &entry.toggle {
            let pin: PinId = toggle
                .parse()
                .with_context(|| format!("Invalid toggle pin for {}", id))?;
            if !outputs.contains_key(&pin) {
                anyhow::bail!("{} toggles {} which is not declared as an output", id, pin);
            }
            toggles.insert(id, pin);
        }

        if entry.enabled {
            controller.enable(id)?;
        }
    }

    let scheduler =
        InterruptScheduler::new(controller.clone()).with_livelock_threshold(config.livelock_threshold);
    debug!(
        "Board '{}' ready: {} lines, {} outputs",
        config.name,
        config.lines.len(),
        outputs.len()
    );

    Ok(Board {
        name: config.name.clone(),
        hardware,
        controller,
        scheduler,
        metrics,
        log,
        queues,
        flags,
        outputs,
        toggles,
    })
}

fn line_config(entry: &LineEntry) -> Result<LineConfig, crate::ConfigError> {
    let id = LineId::new(entry.id)?;
    let edge: Edge = entry.edge.parse()?;
    let pull: Pull = entry.pull.parse()?;
    let port: Port = entry.port.parse()?;
    let priority = Priority::new(entry.priority.preempt, entry.priority.sub);
    Ok(LineConfig::new(id, edge, pull, priority).on_port(port))
}

impl Board {
    pub fn output(&self, pin: PinId) -> Option<&OutputPin<SimBoard>> {
        self.outputs.get(&pin)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputPin<SimBoard>> {
        self.outputs.values()
    }

    /// Drains every queue and flag once and toggles the outputs bound to the
    /// lines that fired.
    pub fn run_main_loop_once(&self) -> MainLoopReport {
        let mut report = MainLoopReport::default();
        for (_, consumer) in &self.queues {
            consumer.drain(|event| report.events.push(event));
            report.dropped += consumer.dropped();
        }
        for (line, flag) in &self.flags {
            if flag.take() {
                report.flags.push(*line);
            }
        }

        let fired: Vec<LineId> = report
            .events
            .iter()
            .map(|e| e.line)
            .chain(report.flags.iter().copied())
            .collect();
        for line in fired {
            let Some(output) = self.toggles.get(&line).and_then(|p| self.outputs.get(p)) else {
                continue;
            };
            let level = output.toggle();
            report.toggled.push((output.pin(), level));
        }
        report
    }
}
