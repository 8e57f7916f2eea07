// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Hand-off from interrupt context to the main loop.
//!
//! Handlers never do slow work themselves. They raise an [`EventFlag`] or push
//! onto a [`WorkQueue`], and the main loop picks the work up later. Both
//! sides only ever use non-blocking operations.

use crate::handler::{HandlerError, LineHandler, TriggerContext};
use crate::line::LineId;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A single-bit, lock-free signal from a handler to the main loop.
#[derive(Debug, Clone, Default)]
pub struct EventFlag {
    raised: Arc<AtomicBool>,
}

impl EventFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Returns whether the flag was raised and lowers it.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

/// Unit of work produced by [`QueueHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LineEvent {
    pub line: LineId,
    pub sequence: u64,
}

/// Bounded single-producer/single-consumer queue.
pub struct WorkQueue;

impl WorkQueue {
    pub fn bounded<T>(capacity: usize) -> (WorkProducer<T>, WorkConsumer<T>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        (
            WorkProducer {
                tx,
                dropped: dropped.clone(),
            },
            WorkConsumer { rx, dropped },
        )
    }
}

/// Producing half; deliberately not `Clone`, so there is one producer.
#[derive(Debug)]
pub struct WorkProducer<T> {
    tx: Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> WorkProducer<T> {
    /// Enqueues without blocking. A full (or abandoned) queue hands the item
    /// back and counts it as dropped.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(item)
            }
        }
    }
}

#[derive(Debug)]
pub struct WorkConsumer<T> {
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> WorkConsumer<T> {
    pub fn try_dequeue(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Hands every queued item to `f`; returns how many were drained.
    pub fn drain(&self, mut f: impl FnMut(T)) -> usize {
        let mut count = 0;
        while let Some(item) = self.try_dequeue() {
            f(item);
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Items the producer could not enqueue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Raises a flag each time the line fires.
#[derive(Debug, Clone)]
pub struct FlagHandler {
    flag: EventFlag,
}

impl FlagHandler {
    pub fn new(flag: EventFlag) -> Self {
        Self { flag }
    }
}

impl LineHandler for FlagHandler {
    fn on_trigger(&mut self, _cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        self.flag.raise();
        Ok(())
    }
}

/// Enqueues a [`LineEvent`] each time the line fires. A full queue is a
/// handler error: the event is lost but the line is still acknowledged.
#[derive(Debug)]
pub struct QueueHandler {
    producer: WorkProducer<LineEvent>,
}

impl QueueHandler {
    pub fn new(producer: WorkProducer<LineEvent>) -> Self {
        Self { producer }
    }
}

impl LineHandler for QueueHandler {
    fn on_trigger(&mut self, cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        let event = LineEvent {
            line: cx.line(),
            sequence: cx.sequence(),
        };
        self.producer
            .try_enqueue(event)
            .map_err(|_| HandlerError::new(format!("work queue full, dropped {}", cx.line())))
    }
}
