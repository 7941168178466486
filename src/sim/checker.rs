//! Occupancy ledger and post-run invariant checker.
//!
//! The ledger is the runtime guard: it records every critical-section
//! entry and exit instant and trips immediately on double occupancy. The
//! checker is the oracle: after a run it verifies mutual exclusion, clock
//! monotonicity, completion, deferred-reply completeness, and priority
//! order against the recorded history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::ra::errors::InvariantViolation;
use crate::ra::process::PriorityKey;

use super::driver::SimulationReport;
use super::eventlog::SimEvent;

/// One completed critical-section occupancy.
#[derive(Debug, Clone)]
pub struct CsInterval {
    pub pid: u32,
    /// Which of the process's entries this was (0-based).
    pub entry: u32,
    pub entered: Instant,
    pub exited: Instant,
}

struct LedgerInner {
    /// Current holder, with its entry instant and per-pid entry index.
    holder: Option<(u32, Instant, u32)>,
    /// Completed entries per pid, for the interval's entry index.
    entries_by_pid: HashMap<u32, u32>,
    intervals: Vec<CsInterval>,
}

/// Shared ledger of critical-section occupancy.
///
/// The driver observes correctness here; it does not enforce exclusion.
/// Exclusion emerges from the state machine, and a second concurrent
/// entry is an algorithmic defect that halts the run.
#[derive(Clone)]
pub struct OccupancyLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl OccupancyLedger {
    pub fn new() -> Self {
        OccupancyLedger {
            inner: Arc::new(Mutex::new(LedgerInner {
                holder: None,
                entries_by_pid: HashMap::new(),
                intervals: Vec::new(),
            })),
        }
    }

    /// Record that `pid` is entering the critical section.
    ///
    /// Fatal if any process currently holds it.
    pub fn enter(&self, pid: u32) -> Result<(), InvariantViolation> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((holder, _, _)) = inner.holder {
            return Err(InvariantViolation::DoubleOccupancy {
                holder,
                entrant: pid,
            });
        }
        let entry = *inner.entries_by_pid.get(&pid).unwrap_or(&0);
        inner.holder = Some((pid, Instant::now(), entry));
        Ok(())
    }

    /// Record that `pid` is leaving the critical section.
    ///
    /// Fatal if `pid` does not hold it.
    pub fn exit(&self, pid: u32) -> Result<(), InvariantViolation> {
        let mut inner = self.inner.lock().unwrap();
        match inner.holder.take() {
            Some((holder, entered, entry)) if holder == pid => {
                inner.intervals.push(CsInterval {
                    pid,
                    entry,
                    entered,
                    exited: Instant::now(),
                });
                *inner.entries_by_pid.entry(pid).or_insert(0) += 1;
                Ok(())
            }
            other => {
                inner.holder = other;
                Err(InvariantViolation::ExitWithoutEntry { pid })
            }
        }
    }

    /// Copy of all completed intervals.
    pub fn intervals(&self) -> Vec<CsInterval> {
        self.inner.lock().unwrap().intervals.clone()
    }
}

impl Default for OccupancyLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Kinds of post-run violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Two occupancy intervals overlapped.
    OverlappingOccupancy,
    /// A process's logged clocks did not strictly increase.
    ClockRegression,
    /// A process did not complete its configured entry count.
    IncompleteRun,
    /// A deferral without a matching flush, or a leftover deferral.
    UnflushedDeferral,
    /// Overlapping requests entered the CS against priority order.
    PriorityInversion,
}

/// A single check failure.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

/// Message and transition counts gathered during verification.
#[derive(Debug, Clone, Default)]
pub struct CheckStats {
    pub requests: usize,
    pub immediate_replies: usize,
    pub deferrals: usize,
    pub flushed_replies: usize,
    pub releases: usize,
    pub cs_entries: usize,
}

/// Result of a full verification pass.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub stats: CheckStats,
}

/// One request episode reconstructed from the log: REQUEST broadcast at
/// `sent_seq`, CS entered at `enter_seq`.
struct Episode {
    pid: u32,
    request_ts: u64,
    sent_seq: u64,
    enter_seq: u64,
}

/// The post-run oracle.
pub struct Checker;

impl Checker {
    /// Verify every testable invariant against a finished run.
    pub fn verify(report: &SimulationReport) -> CheckResult {
        let mut violations = Vec::new();
        let mut stats = CheckStats::default();

        Self::check_occupancy(report, &mut violations);
        Self::check_completion(report, &mut violations);

        // Event-derived checks need the untruncated log; a capacity-bounded
        // log that evicted entries cannot support them.
        let full_log = report.events.first().map_or(false, |r| r.seq == 0);
        if full_log {
            Self::gather_stats(report, &mut stats);
            Self::check_clocks(report, &mut violations);
            Self::check_deferrals(report, &mut violations);
            Self::check_priority(report, &mut violations);
        }

        CheckResult {
            passed: violations.is_empty(),
            violations,
            stats,
        }
    }

    fn check_occupancy(report: &SimulationReport, violations: &mut Vec<Violation>) {
        let mut intervals = report.intervals.clone();
        intervals.sort_by_key(|iv| iv.entered);

        for pair in intervals.windows(2) {
            if pair[1].entered < pair[0].exited {
                violations.push(Violation {
                    kind: ViolationKind::OverlappingOccupancy,
                    description: format!(
                        "P{} entered the CS before P{} left it",
                        pair[1].pid, pair[0].pid
                    ),
                });
            }
        }
    }

    fn check_completion(report: &SimulationReport, violations: &mut Vec<Violation>) {
        let expected = report.config.entries;
        for snap in &report.snapshots {
            if snap.completed != expected {
                violations.push(Violation {
                    kind: ViolationKind::IncompleteRun,
                    description: format!(
                        "P{} completed {} of {} entries",
                        snap.pid, snap.completed, expected
                    ),
                });
            }
        }

        let mut per_pid: HashMap<u32, u32> = HashMap::new();
        for iv in &report.intervals {
            *per_pid.entry(iv.pid).or_insert(0) += 1;
        }
        for snap in &report.snapshots {
            let got = *per_pid.get(&snap.pid).unwrap_or(&0);
            if got != expected {
                violations.push(Violation {
                    kind: ViolationKind::IncompleteRun,
                    description: format!(
                        "P{} recorded {} of {} occupancy intervals",
                        snap.pid, got, expected
                    ),
                });
            }
        }
    }

    fn gather_stats(report: &SimulationReport, stats: &mut CheckStats) {
        for record in &report.events {
            match record.event {
                SimEvent::RequestSent { .. } => stats.requests += 1,
                SimEvent::ReplySent { .. } => stats.immediate_replies += 1,
                SimEvent::ReplyDeferred { .. } => stats.deferrals += 1,
                SimEvent::DeferredReplySent { .. } => stats.flushed_replies += 1,
                SimEvent::ReleaseSent { .. } => stats.releases += 1,
                SimEvent::CsEntered { .. } => stats.cs_entries += 1,
                _ => {}
            }
        }
    }

    fn check_clocks(report: &SimulationReport, violations: &mut Vec<Violation>) {
        let mut last: HashMap<u32, u64> = HashMap::new();

        for record in &report.events {
            let (pid, clock) = match (record.event.pid(), record.event.clock()) {
                (Some(pid), Some(clock)) => (pid, clock),
                _ => continue,
            };

            if let Some(&prev) = last.get(&pid) {
                // ProcessDone is a terminal marker, not a transition: it may
                // repeat the last clock but never go backwards.
                let ok = match record.event {
                    SimEvent::ProcessDone { .. } => clock >= prev,
                    _ => clock > prev,
                };
                if !ok {
                    violations.push(Violation {
                        kind: ViolationKind::ClockRegression,
                        description: format!(
                            "P{} logged clock {} after {} (seq {})",
                            pid, clock, prev, record.seq
                        ),
                    });
                }
            }
            last.insert(pid, clock);
        }
    }

    fn check_deferrals(report: &SimulationReport, violations: &mut Vec<Violation>) {
        // Count per (deferring pid, deferred peer) both ways.
        let mut recorded: HashMap<(u32, u32), usize> = HashMap::new();
        let mut flushed: HashMap<(u32, u32), usize> = HashMap::new();

        for record in &report.events {
            match record.event {
                SimEvent::ReplyDeferred { pid, from, .. } => {
                    *recorded.entry((pid, from)).or_insert(0) += 1;
                }
                SimEvent::DeferredReplySent { pid, to, .. } => {
                    *flushed.entry((pid, to)).or_insert(0) += 1;
                }
                _ => {}
            }
        }

        for (&(pid, peer), &count) in &recorded {
            let sent = *flushed.get(&(pid, peer)).unwrap_or(&0);
            if sent != count {
                violations.push(Violation {
                    kind: ViolationKind::UnflushedDeferral,
                    description: format!(
                        "P{} deferred P{} {} time(s) but flushed {} reply(ies)",
                        pid, peer, count, sent
                    ),
                });
            }
        }
        for (&(pid, peer), &sent) in &flushed {
            if !recorded.contains_key(&(pid, peer)) {
                violations.push(Violation {
                    kind: ViolationKind::UnflushedDeferral,
                    description: format!(
                        "P{} flushed {} reply(ies) to P{} without a recorded deferral",
                        pid, sent, peer
                    ),
                });
            }
        }

        for snap in &report.snapshots {
            if !snap.deferred.is_empty() {
                violations.push(Violation {
                    kind: ViolationKind::UnflushedDeferral,
                    description: format!(
                        "P{} finished with deferrals still recorded: {:?}",
                        snap.pid, snap.deferred
                    ),
                });
            }
        }
    }

    fn check_priority(report: &SimulationReport, violations: &mut Vec<Violation>) {
        let mut episodes: Vec<Episode> = Vec::new();
        let mut open: HashMap<u32, (u64, u64)> = HashMap::new();

        for record in &report.events {
            match record.event {
                SimEvent::RequestSent { pid, request_ts } => {
                    open.insert(pid, (request_ts, record.seq));
                }
                SimEvent::CsEntered { pid, .. } => {
                    if let Some((request_ts, sent_seq)) = open.remove(&pid) {
                        episodes.push(Episode {
                            pid,
                            request_ts,
                            sent_seq,
                            enter_seq: record.seq,
                        });
                    }
                }
                _ => {}
            }
        }

        // Two episodes overlap when each request was broadcast before the
        // other entered. The smaller (request_ts, pid) key must enter first.
        for i in 0..episodes.len() {
            for j in (i + 1)..episodes.len() {
                let (a, b) = (&episodes[i], &episodes[j]);
                let overlap = a.sent_seq < b.enter_seq && b.sent_seq < a.enter_seq;
                if !overlap {
                    continue;
                }

                let key_a = PriorityKey {
                    request_ts: a.request_ts,
                    pid: a.pid,
                };
                let key_b = PriorityKey {
                    request_ts: b.request_ts,
                    pid: b.pid,
                };
                let (winner, loser) = if key_a < key_b { (a, b) } else { (b, a) };
                if winner.enter_seq > loser.enter_seq {
                    violations.push(Violation {
                        kind: ViolationKind::PriorityInversion,
                        description: format!(
                            "P{} (ts={}) entered before P{} (ts={}) despite losing the priority comparison",
                            loser.pid, loser.request_ts, winner.pid, winner.request_ts
                        ),
                    });
                }
            }
        }
    }
}
