//! Per-process Ricart-Agrawala state machine.
//!
//! Request/reply/defer decision logic and the critical-section entry/exit
//! transitions. The machine is synchronous: methods mutate the process
//! record and push outbound messages through a [`BusEndpoint`], returning
//! outcomes for the harness to observe. Mutual exclusion emerges from the
//! priority rule alone; nothing here consults global state.
//!
//! # Invariants
//!
//! 1. **Clock monotonicity**: the process's clock strictly increases.
//! 2. **Reply accounting**: `replies_needed` decreases monotonically from
//!    n-1 to 0 within one request cycle; a REPLY outside a cycle is fatal.
//! 3. **Deferral discipline**: `deferred` is non-empty only while a request
//!    is pending or being retired, and is flushed exactly once per exit.

use serde::{Deserialize, Serialize};

use super::bus::BusEndpoint;
use super::clock::LamportClock;
use super::errors::InvariantViolation;
use super::message::RaMessage;

/// Lifecycle states of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Not interested in the critical section.
    Idle,
    /// REQUEST broadcast, collecting replies.
    Requesting,
    /// Inside the critical section.
    InCs,
    /// Left the critical section, retiring deferrals.
    Exiting,
}

/// Request priority: `(request_ts, pid)` ordered lexicographically.
///
/// Smaller timestamp wins; equal timestamps break by smaller pid. A process
/// with no active request carries the key `(u64::MAX, pid)` and loses every
/// comparison, so it always replies immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    pub request_ts: u64,
    pub pid: u32,
}

impl PriorityKey {
    /// Key of a process with no pending request.
    pub fn idle(pid: u32) -> Self {
        PriorityKey {
            request_ts: u64::MAX,
            pid,
        }
    }
}

/// What [`Process::handle`] did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A REQUEST was answered immediately.
    Replied { to: u32, clock: u64 },
    /// A REQUEST was deferred; the reply is withheld until CS exit.
    Deferred { from: u32, clock: u64 },
    /// A REPLY was counted against the outstanding request.
    ReplyAbsorbed { remaining: u32 },
    /// A RELEASE was observed (clock merged, nothing else).
    ReleaseObserved,
}

/// Immutable copy of a process record, for the presentation layer and the
/// post-run checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub clock: u64,
    pub requesting: bool,
    pub request_ts: Option<u64>,
    pub deferred: Vec<u32>,
    pub replies_needed: u32,
    pub completed: u32,
}

/// One simulated process.
///
/// Owned by the driver; mutated only by its own task and by handlers
/// processing messages addressed to it.
pub struct Process {
    pid: u32,
    n: u32,
    clock: LamportClock,
    state: ProcState,
    request_ts: Option<u64>,
    deferred: Vec<u32>,
    replies_needed: u32,
    completed: u32,
}

/// What a CS exit produced: the deferred replies that were flushed (in
/// deferral order, with the clock each was stamped with) and the clock of
/// the RELEASE broadcast.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub flushed: Vec<(u32, u64)>,
    pub release_clock: u64,
}

impl Process {
    /// Create a process with pid `pid` in a group of `n`.
    pub fn new(pid: u32, n: u32) -> Self {
        debug_assert!(pid < n, "pid must be < n");
        Process {
            pid,
            n,
            clock: LamportClock::new(),
            state: ProcState::Idle,
            request_ts: None,
            deferred: Vec::new(),
            replies_needed: 0,
            completed: 0,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn replies_needed(&self) -> u32 {
        self.replies_needed
    }

    pub fn request_ts(&self) -> Option<u64> {
        self.request_ts
    }

    /// Current priority key: `(request_ts, pid)` while a request is live,
    /// `(+inf, pid)` otherwise.
    pub fn priority_key(&self) -> PriorityKey {
        match self.request_ts {
            Some(ts) => PriorityKey {
                request_ts: ts,
                pid: self.pid,
            },
            None => PriorityKey::idle(self.pid),
        }
    }

    /// IDLE -> REQUESTING.
    ///
    /// Ticks the clock, stamps the request, arms the reply counter, and
    /// broadcasts REQUEST to every peer. Returns the request timestamp.
    pub fn begin_request(&mut self, net: &BusEndpoint) -> u64 {
        debug_assert!(
            self.state == ProcState::Idle,
            "begin_request from {:?}",
            self.state
        );

        let ts = self.clock.tick();
        self.state = ProcState::Requesting;
        self.request_ts = Some(ts);
        self.replies_needed = self.n - 1;

        net.broadcast(RaMessage::Request {
            timestamp: ts,
            request_ts: ts,
            sender: self.pid,
        });

        ts
    }

    /// Apply one inbound message.
    ///
    /// Merges the clock with the message timestamp first, then applies the
    /// request/reply/defer rules. Valid in every state: an idle process
    /// answers REQUESTs immediately, a requesting one compares priorities.
    pub fn handle(
        &mut self,
        msg: RaMessage,
        net: &BusEndpoint,
    ) -> Result<HandleOutcome, InvariantViolation> {
        self.clock.merge(msg.timestamp());

        match msg {
            RaMessage::Request {
                request_ts, sender, ..
            } => {
                let requester = PriorityKey {
                    request_ts,
                    pid: sender,
                };
                if requester < self.priority_key() {
                    let clock = self.clock.tick();
                    net.send(
                        sender,
                        RaMessage::Reply {
                            timestamp: clock,
                            sender: self.pid,
                        },
                    );
                    Ok(HandleOutcome::Replied { to: sender, clock })
                } else {
                    self.deferred.push(sender);
                    Ok(HandleOutcome::Deferred {
                        from: sender,
                        clock: self.clock.value(),
                    })
                }
            }
            RaMessage::Reply { sender, .. } => {
                if self.state != ProcState::Requesting || self.replies_needed == 0 {
                    return Err(InvariantViolation::StrayReply {
                        pid: self.pid,
                        from: sender,
                    });
                }
                self.replies_needed -= 1;
                Ok(HandleOutcome::ReplyAbsorbed {
                    remaining: self.replies_needed,
                })
            }
            RaMessage::Release { .. } => Ok(HandleOutcome::ReleaseObserved),
        }
    }

    /// True when every peer has granted permission.
    pub fn ready_to_enter(&self) -> bool {
        self.state == ProcState::Requesting && self.replies_needed == 0
    }

    /// REQUESTING -> IN_CS. Returns the clock at entry.
    ///
    /// The mutual exclusion invariant must hold here: the driver's
    /// occupancy ledger asserts no other process is inside.
    pub fn enter_cs(&mut self) -> u64 {
        debug_assert!(self.ready_to_enter(), "enter_cs without full permission");
        self.state = ProcState::InCs;
        self.clock.value()
    }

    /// IN_CS -> EXITING, after the simulated hold. Ticks the clock.
    pub fn begin_exit(&mut self) -> u64 {
        debug_assert!(self.state == ProcState::InCs, "begin_exit from {:?}", self.state);
        self.state = ProcState::Exiting;
        self.clock.tick()
    }

    /// EXITING -> IDLE.
    ///
    /// Clears the request, flushes every deferred REPLY in recorded order
    /// (one tick each), broadcasts RELEASE, and counts the completed entry.
    pub fn finish_exit(&mut self, net: &BusEndpoint) -> ExitReport {
        debug_assert!(self.state == ProcState::Exiting, "finish_exit from {:?}", self.state);

        self.request_ts = None;

        let deferred = std::mem::take(&mut self.deferred);
        let mut flushed = Vec::with_capacity(deferred.len());
        for peer in deferred {
            let clock = self.clock.tick();
            net.send(
                peer,
                RaMessage::Reply {
                    timestamp: clock,
                    sender: self.pid,
                },
            );
            flushed.push((peer, clock));
        }

        let release_clock = self.clock.tick();
        net.broadcast(RaMessage::Release {
            timestamp: release_clock,
            sender: self.pid,
        });

        self.completed += 1;
        self.state = ProcState::Idle;

        ExitReport {
            flushed,
            release_clock,
        }
    }

    /// Immutable copy of the record.
    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: self.pid,
            clock: self.clock.value(),
            requesting: self.request_ts.is_some(),
            request_ts: self.request_ts,
            deferred: self.deferred.clone(),
            replies_needed: self.replies_needed,
            completed: self.completed,
        }
    }
}
