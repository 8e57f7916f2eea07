// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::group::GroupId;
use crate::handler::HandlerError;
use crate::line::LineId;
use crate::ConfigError;
use std::fmt;
use std::sync::Mutex;

/// Something that went wrong on the dispatch path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    Config {
        #[serde(serialize_with = "serialize_display")]
        error: ConfigError,
    },
    Handler {
        line: LineId,
        #[serde(serialize_with = "serialize_display")]
        error: HandlerError,
    },
    Livelock {
        group: GroupId,
        dispatches: u32,
    },
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Config { error } => write!(f, "{}", error),
            Fault::Handler { line, error } => write!(f, "handler for {} failed: {}", line, error),
            Fault::Livelock { group, dispatches } => write!(
                f,
                "{} dispatched {} times in one service pass; pending flag is not clearing",
                group, dispatches
            ),
        }
    }
}

/// Where a fault was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DiagnosticContext {
    pub operation: &'static str,
    pub group: Option<GroupId>,
    pub line: Option<LineId>,
}

impl DiagnosticContext {
    pub fn dispatch(group: GroupId, line: LineId) -> Self {
        Self {
            operation: "dispatch",
            group: Some(group),
            line: Some(line),
        }
    }

    pub fn service(group: GroupId) -> Self {
        Self {
            operation: "service",
            group: Some(group),
            line: None,
        }
    }
}

/// Sink for faults. Fire-and-forget: implementations must not block and
/// have no way to fail back into the controller.
pub trait Diagnostics: fmt::Debug + Send + Sync {
    fn report(&self, fault: &Fault, context: &DiagnosticContext);
}

/// Reports faults as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, fault: &Fault, context: &DiagnosticContext) {
        tracing::warn!(
            operation = context.operation,
            group = ?context.group,
            line = ?context.line,
            "{}",
            fault
        );
    }
}

/// Keeps every reported fault in memory, in report order.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<(Fault, DiagnosticContext)>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Fault, DiagnosticContext)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.entries().into_iter().map(|(fault, _)| fault).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Diagnostics for DiagnosticLog {
    fn report(&self, fault: &Fault, context: &DiagnosticContext) {
        tracing::debug!("diagnostic: {}", fault);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((fault.clone(), *context));
        }
    }
}

/// Forwards every fault to each of its sinks in turn.
#[derive(Debug, Default)]
pub struct DiagnosticFanout {
    sinks: Vec<std::sync::Arc<dyn Diagnostics>>,
}

impl DiagnosticFanout {
    pub fn new(sinks: Vec<std::sync::Arc<dyn Diagnostics>>) -> Self {
        Self { sinks }
    }
}

impl Diagnostics for DiagnosticFanout {
    fn report(&self, fault: &Fault, context: &DiagnosticContext) {
        for sink in &self.sinks {
            sink.report(fault, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_report_order() {
        let log = DiagnosticLog::new();
        let line = LineId::new(2).unwrap();
        let group = GroupId(8);
        log.report(
            &Fault::Config {
                error: ConfigError::UnhandledLine(line),
            },
            &DiagnosticContext::dispatch(group, line),
        );
        log.report(
            &Fault::Livelock {
                group,
                dispatches: 33,
            },
            &DiagnosticContext::service(group),
        );

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.line, Some(line));
        assert!(matches!(entries[1].0, Fault::Livelock { dispatches: 33, .. }));
    }

    #[test]
    fn test_fault_serializes_with_kind() {
        let fault = Fault::Handler {
            line: LineId::new(1).unwrap(),
            error: HandlerError::new("bad"),
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "handler");
        assert_eq!(json["line"], 1);
        assert_eq!(json["error"], "bad");
        assert_eq!(fault.to_string(), "handler for EXTI1 failed: bad");
    }
}
