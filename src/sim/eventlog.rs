//! Bounded, append-only event log.
//!
//! Records every observable transition of a run as a structured event plus
//! a human-readable description. The log is the audit trail for the
//! post-run checker, the replay reconstruction, and the presentation
//! layer; it is read-only to every consumer except the producing harness.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::gate::Checkpoint;

/// Default capacity: oldest entries are evicted beyond this many.
pub const DEFAULT_LOG_CAPACITY: usize = 250;

/// One observable transition of the simulation.
///
/// Each variant carries the emitting process's clock where the transition
/// changed it, so a full log is sufficient to reconstruct final clocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    /// REQUEST broadcast; `request_ts` is also the clock after the tick.
    RequestSent { pid: u32, request_ts: u64 },
    /// Immediate REPLY to a requester.
    ReplySent { pid: u32, to: u32, clock: u64 },
    /// REQUEST deferred; reply withheld until CS exit.
    ReplyDeferred { pid: u32, from: u32, clock: u64 },
    /// Critical section entered.
    CsEntered { pid: u32, clock: u64 },
    /// Critical section exited (hold elapsed).
    CsExited { pid: u32, clock: u64 },
    /// A withheld REPLY flushed during exit.
    DeferredReplySent { pid: u32, to: u32, clock: u64 },
    /// RELEASE broadcast at the end of the exit sequence.
    ReleaseSent { pid: u32, clock: u64 },
    /// A task suspended at a step-mode checkpoint.
    StepWait { pid: u32, checkpoint: Checkpoint },
    /// A process finished all its entries and drained its queue.
    ProcessDone { pid: u32, clock: u64 },
    /// Every process is done.
    RunCompleted,
}

impl SimEvent {
    /// Emitting process, if the event is process-scoped.
    pub fn pid(&self) -> Option<u32> {
        match self {
            SimEvent::RequestSent { pid, .. }
            | SimEvent::ReplySent { pid, .. }
            | SimEvent::ReplyDeferred { pid, .. }
            | SimEvent::CsEntered { pid, .. }
            | SimEvent::CsExited { pid, .. }
            | SimEvent::DeferredReplySent { pid, .. }
            | SimEvent::ReleaseSent { pid, .. }
            | SimEvent::StepWait { pid, .. }
            | SimEvent::ProcessDone { pid, .. } => Some(*pid),
            SimEvent::RunCompleted => None,
        }
    }

    /// The emitter's clock after the transition, when it changed.
    pub fn clock(&self) -> Option<u64> {
        match self {
            SimEvent::RequestSent { request_ts, .. } => Some(*request_ts),
            SimEvent::ReplySent { clock, .. }
            | SimEvent::ReplyDeferred { clock, .. }
            | SimEvent::CsEntered { clock, .. }
            | SimEvent::CsExited { clock, .. }
            | SimEvent::DeferredReplySent { clock, .. }
            | SimEvent::ReleaseSent { clock, .. }
            | SimEvent::ProcessDone { clock, .. } => Some(*clock),
            SimEvent::StepWait { .. } | SimEvent::RunCompleted => None,
        }
    }

    /// Human-readable rendering, in the log format of the original UI.
    pub fn describe(&self) -> String {
        match self {
            SimEvent::RequestSent { pid, request_ts } => {
                format!("[P{}] REQUEST(ts={})", pid, request_ts)
            }
            SimEvent::ReplySent { pid, to, .. } => format!("[P{}] REPLY → P{}", pid, to),
            SimEvent::ReplyDeferred { pid, from, .. } => format!("[P{}] DEFER → P{}", pid, from),
            SimEvent::CsEntered { pid, clock } => {
                format!("[P{}] >>> ENTER CS @L{}", pid, clock)
            }
            SimEvent::CsExited { pid, clock } => {
                format!("[P{}] <<< EXIT  CS @L{}", pid, clock)
            }
            SimEvent::DeferredReplySent { pid, to, .. } => {
                format!("[P{}] REPLY deferred → P{}", pid, to)
            }
            SimEvent::ReleaseSent { pid, clock } => format!("[P{}] RELEASE @L{}", pid, clock),
            SimEvent::StepWait { pid, checkpoint } => {
                format!("[STEP] P{} {} (awaiting advance)", pid, checkpoint.label())
            }
            SimEvent::ProcessDone { pid, clock } => format!("[P{}] done @L{}", pid, clock),
            SimEvent::RunCompleted => "Simulation finished.".to_string(),
        }
    }
}

/// A recorded event with its global sequence number and elapsed time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Global, monotonic; survives eviction (seq 0 is the first event of
    /// the run, not the first retained one).
    pub seq: u64,
    /// Milliseconds since the log was created.
    pub at_ms: u64,
    pub event: SimEvent,
    pub description: String,
}

/// The append-only, capacity-bounded log.
pub struct EventLog {
    epoch: Instant,
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EventLog {
            epoch: Instant::now(),
            capacity,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    /// Append an event, evicting the oldest entry if at capacity.
    pub fn record(&mut self, event: SimEvent) {
        let record = EventRecord {
            seq: self.next_seq,
            at_ms: self.epoch.elapsed().as_millis() as u64,
            description: event.describe(),
            event,
        };
        self.next_seq += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter()
    }

    /// Sequence number of the oldest retained record.
    pub fn first_seq(&self) -> Option<u64> {
        self.entries.front().map(|r| r.seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe event log handle shared by the runner tasks.
#[derive(Clone)]
pub struct SharedEventLog {
    inner: Arc<Mutex<EventLog>>,
}

impl SharedEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SharedEventLog {
            inner: Arc::new(Mutex::new(EventLog::with_capacity(capacity))),
        }
    }

    /// Append an event.
    pub fn record(&self, event: SimEvent) {
        let mut log = self.inner.lock().unwrap();
        log.record(event);
    }

    /// Copy of the retained records, oldest first.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        let log = self.inner.lock().unwrap();
        log.records().cloned().collect()
    }

    /// Records with `seq > after`, for pollers.
    pub fn since(&self, after: Option<u64>) -> Vec<EventRecord> {
        let log = self.inner.lock().unwrap();
        log.records()
            .filter(|r| after.map_or(true, |s| r.seq > s))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Default for SharedEventLog {
    fn default() -> Self {
        Self::new()
    }
}
