// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::group::GroupId;
use crate::line::LineId;
use std::fmt::Debug;

/// Error reported by a line handler. Isolated at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(format!("handler panicked: {}", detail))
    }
}

/// Called by a running handler to let strictly-higher-tier pending groups
/// run nested inside it.
pub trait PreemptionHook {
    fn preemption_point(&self);
}

/// Hook used when a group is dispatched outside of a scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreemption;

impl PreemptionHook for NoPreemption {
    fn preemption_point(&self) {}
}

/// What a handler sees of the trigger it is servicing.
pub struct TriggerContext<'a> {
    line: LineId,
    group: GroupId,
    sequence: u64,
    hook: &'a dyn PreemptionHook,
}

impl<'a> TriggerContext<'a> {
    pub(crate) fn new(
        line: LineId,
        group: GroupId,
        sequence: u64,
        hook: &'a dyn PreemptionHook,
    ) -> Self {
        Self {
            line,
            group,
            sequence,
            hook,
        }
    }

    pub fn line(&self) -> LineId {
        self.line
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Number of times this line has fired, including this trigger.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn preemption_point(&self) {
        self.hook.preemption_point();
    }
}

/// Callback bound to an interrupt line.
///
/// Runs in interrupt context: it must finish quickly and never block. Work
/// that takes time belongs in the main loop, reached through an
/// [`EventFlag`](crate::work::EventFlag) or a
/// [`WorkQueue`](crate::work::WorkQueue).
pub trait LineHandler: Send {
    fn on_trigger(&mut self, cx: &mut TriggerContext<'_>) -> Result<(), HandlerError>;
}

impl<F> LineHandler for F
where
    F: FnMut(LineId) -> Result<(), HandlerError> + Send,
{
    fn on_trigger(&mut self, cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        self(cx.line())
    }
}

/// Default handler slot: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl LineHandler for NoopHandler {
    fn on_trigger(&mut self, _cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Handler that always fails, used to exercise fault isolation.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    reason: String,
}

impl FailingHandler {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl LineHandler for FailingHandler {
    fn on_trigger(&mut self, cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::new(format!("{}: {}", cx.line(), self.reason)))
    }
}

impl Debug for dyn LineHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LineHandler")
    }
}
