//! Threaded simulation driver.
//!
//! Owns the N processes and the bus, runs one thread per process through
//! its configured number of critical-section cycles, and observes the
//! mutual-exclusion invariant via the occupancy ledger. The driver never
//! enforces exclusion itself; it emerges from the state machine's rules.
//!
//! Scheduling model: the OS scheduler interleaves the per-process threads
//! freely, but every shared mutation (queue operations, ledger updates,
//! log appends, snapshot publishes) is serialized per resource, and a
//! blocked drain wakes exactly when a message is enqueued. Once started, a
//! run always completes all N x entries cycles; there is no cancellation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::ra::bus::{BusEndpoint, MessageBus};
use crate::ra::errors::InvariantViolation;
use crate::ra::message::{MessageKind, RaMessage};
use crate::ra::process::{HandleOutcome, Process, ProcessSnapshot};

use super::checker::{CsInterval, OccupancyLedger};
use super::delay::{DelayProvider, JitterDelay};
use super::eventlog::{EventRecord, SharedEventLog, SimEvent};
use super::gate::{Checkpoint, StepGate};
use super::snapshot::{PacketEvent, PacketLog, SharedSnapshots};

/// Supported process-count bounds.
pub const MIN_PROCESSES: u32 = 2;
pub const MAX_PROCESSES: u32 = 10;
/// Supported entries-per-process bounds.
pub const MIN_ENTRIES: u32 = 1;
pub const MAX_ENTRIES: u32 = 10;

/// How long a drain blocks for a message before rechecking run state.
const RECV_PATIENCE: Duration = Duration::from_millis(10);

/// Run configuration, validated before any thread spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of simulated processes (pids 0..processes).
    pub processes: u32,
    /// Critical-section entries each process performs.
    pub entries: u32,
    /// Pause at checkpoints until externally advanced.
    pub step_mode: bool,
}

impl SimConfig {
    pub fn new(processes: u32, entries: u32, step_mode: bool) -> Self {
        SimConfig {
            processes,
            entries,
            step_mode,
        }
    }

    /// Reject out-of-bounds configuration before the run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes < MIN_PROCESSES || self.processes > MAX_PROCESSES {
            return Err(ConfigError::ProcessCount {
                got: self.processes,
            });
        }
        if self.entries < MIN_ENTRIES || self.entries > MAX_ENTRIES {
            return Err(ConfigError::EntryCount { got: self.entries });
        }
        Ok(())
    }
}

impl Default for SimConfig {
    /// The original demo defaults: 4 processes, 2 entries each.
    fn default() -> Self {
        SimConfig::new(4, 2, false)
    }
}

/// Configuration rejected before the run; the only user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ProcessCount { got: u32 },
    EntryCount { got: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ProcessCount { got } => {
                write!(
                    f,
                    "process count {} outside supported range {}..={}",
                    got, MIN_PROCESSES, MAX_PROCESSES
                )
            }
            ConfigError::EntryCount { got } => {
                write!(
                    f,
                    "entry count {} outside supported range {}..={}",
                    got, MIN_ENTRIES, MAX_ENTRIES
                )
            }
        }
    }
}

/// Everything a finished run produced.
#[derive(Clone)]
pub struct SimulationReport {
    pub config: SimConfig,
    /// Final per-process snapshots, ordered by pid.
    pub snapshots: Vec<ProcessSnapshot>,
    /// Retained event records, oldest first.
    pub events: Vec<EventRecord>,
    /// Every completed CS occupancy.
    pub intervals: Vec<CsInterval>,
    /// Every packet emitted, in emission order.
    pub packets: Vec<PacketEvent>,
}

/// The simulation: N processes, one bus, shared observability state.
///
/// Handles for the presentation layer (`gate`, `event_log`, `snapshots`,
/// `packets`) can be cloned off before `run` consumes the simulation.
pub struct Simulation {
    config: SimConfig,
    delays: Arc<dyn DelayProvider>,
    log: SharedEventLog,
    snapshots: SharedSnapshots,
    packets: PacketLog,
    ledger: OccupancyLedger,
    gate: StepGate,
}

impl Simulation {
    /// Create a simulation with the default jittered delays.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        Self::with_delays(config, Arc::new(JitterDelay::default()))
    }

    /// Create a simulation with an injected delay provider.
    pub fn with_delays(
        config: SimConfig,
        delays: Arc<dyn DelayProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let gate = StepGate::new(config.step_mode);
        Ok(Simulation {
            snapshots: SharedSnapshots::new(config.processes),
            log: SharedEventLog::new(),
            packets: PacketLog::new(),
            ledger: OccupancyLedger::new(),
            delays,
            gate,
            config,
        })
    }

    /// Replace the event log with one of the given capacity.
    ///
    /// Replay needs the full history; runs bigger than the default
    /// capacity can raise it here before starting.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = SharedEventLog::with_capacity(capacity);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Step-mode advance handle.
    pub fn gate(&self) -> StepGate {
        self.gate.clone()
    }

    /// Live event log handle.
    pub fn event_log(&self) -> SharedEventLog {
        self.log.clone()
    }

    /// Live per-process snapshot handle.
    pub fn snapshots(&self) -> SharedSnapshots {
        self.snapshots.clone()
    }

    /// Live packet feed handle.
    pub fn packets(&self) -> PacketLog {
        self.packets.clone()
    }

    /// Run to completion and return the report.
    ///
    /// Spawns one thread per process and joins them all. An invariant
    /// violation in any thread panics there and is re-raised here; it is
    /// a defect signal, never a recoverable condition.
    pub fn run(self) -> SimulationReport {
        let n = self.config.processes;
        let mut bus = MessageBus::new(n);
        let done = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::with_capacity(n as usize);
        for pid in 0..n {
            let endpoint = match bus.create_endpoint(pid) {
                Some(ep) => ep,
                None => unreachable!("endpoint {} claimed twice", pid),
            };
            let runner = ProcessRunner {
                process: Process::new(pid, n),
                endpoint,
                entries: self.config.entries,
                n,
                delays: self.delays.clone(),
                log: self.log.clone(),
                snapshots: self.snapshots.clone(),
                packets: self.packets.clone(),
                ledger: self.ledger.clone(),
                gate: self.gate.clone(),
                done: done.clone(),
            };
            handles.push(thread::spawn(move || {
                if let Err(violation) = runner.run() {
                    panic!("{}", violation);
                }
            }));
        }

        for handle in handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }

        self.log.record(SimEvent::RunCompleted);

        SimulationReport {
            config: self.config,
            snapshots: self.snapshots.snapshot(),
            events: self.log.snapshot(),
            intervals: self.ledger.intervals(),
            packets: self.packets.snapshot(),
        }
    }
}

/// One process's task: the request/drain/enter/exit loop plus the
/// post-completion service phase.
struct ProcessRunner {
    process: Process,
    endpoint: BusEndpoint,
    entries: u32,
    n: u32,
    delays: Arc<dyn DelayProvider>,
    log: SharedEventLog,
    snapshots: SharedSnapshots,
    packets: PacketLog,
    ledger: OccupancyLedger,
    gate: StepGate,
    done: Arc<AtomicU32>,
}

impl ProcessRunner {
    fn run(mut self) -> Result<(), InvariantViolation> {
        let pid = self.process.pid();

        for entry in 0..self.entries {
            thread::sleep(self.delays.arrival_delay(pid, entry));

            let request_ts = self.process.begin_request(&self.endpoint);
            self.packets.emit_broadcast(
                pid,
                &self.endpoint.peers(),
                MessageKind::Request,
                request_ts,
            );
            self.log.record(SimEvent::RequestSent { pid, request_ts });
            self.publish();
            self.gate.wait(pid, Checkpoint::RequestSent, &self.log);

            // Drain until every peer has granted permission. The blocking
            // receive wakes on enqueue; the timeout only bounds the wait
            // so a reply raced in just before blocking is still seen.
            while !self.process.ready_to_enter() {
                if let Some(msg) = self.endpoint.recv_timeout(RECV_PATIENCE) {
                    self.dispatch(msg)?;
                }
            }

            self.gate.wait(pid, Checkpoint::EnterCs, &self.log);
            self.ledger.enter(pid)?;
            let clock = self.process.enter_cs();
            self.log.record(SimEvent::CsEntered { pid, clock });
            self.publish();

            thread::sleep(self.delays.hold_delay(pid, entry));

            let clock = self.process.begin_exit();
            self.log.record(SimEvent::CsExited { pid, clock });
            self.publish();
            self.gate.wait(pid, Checkpoint::ExitCs, &self.log);
            self.ledger.exit(pid)?;

            let exit = self.process.finish_exit(&self.endpoint);
            for &(peer, clock) in &exit.flushed {
                self.packets.emit(pid, peer, MessageKind::Reply, clock);
                self.log.record(SimEvent::DeferredReplySent {
                    pid,
                    to: peer,
                    clock,
                });
            }
            self.packets.emit_broadcast(
                pid,
                &self.endpoint.peers(),
                MessageKind::Release,
                exit.release_clock,
            );
            self.log.record(SimEvent::ReleaseSent {
                pid,
                clock: exit.release_clock,
            });
            self.publish();
        }

        // All entries completed. Peers may still need this process's
        // replies, so keep servicing the queue until everyone is done;
        // every in-flight message is already enqueued by then, so a final
        // non-blocking drain leaves nothing unconsumed.
        self.done.fetch_add(1, Ordering::SeqCst);
        while self.done.load(Ordering::SeqCst) < self.n {
            if let Some(msg) = self.endpoint.recv_timeout(RECV_PATIENCE) {
                self.dispatch(msg)?;
            }
        }
        while let Some(msg) = self.endpoint.try_recv() {
            self.dispatch(msg)?;
        }

        self.log.record(SimEvent::ProcessDone {
            pid,
            clock: self.process.clock(),
        });
        self.publish();
        Ok(())
    }

    /// Apply one inbound message and mirror its outcome to the observers.
    fn dispatch(&mut self, msg: RaMessage) -> Result<(), InvariantViolation> {
        let pid = self.process.pid();
        match self.process.handle(msg, &self.endpoint)? {
            HandleOutcome::Replied { to, clock } => {
                self.packets.emit(pid, to, MessageKind::Reply, clock);
                self.log.record(SimEvent::ReplySent { pid, to, clock });
            }
            HandleOutcome::Deferred { from, clock } => {
                self.log.record(SimEvent::ReplyDeferred { pid, from, clock });
            }
            HandleOutcome::ReplyAbsorbed { .. } | HandleOutcome::ReleaseObserved => {}
        }
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.snapshots.publish(self.process.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_bounds() {
        assert!(SimConfig::new(2, 1, false).validate().is_ok());
        assert!(SimConfig::new(10, 10, true).validate().is_ok());

        assert_eq!(
            SimConfig::new(1, 1, false).validate().unwrap_err(),
            ConfigError::ProcessCount { got: 1 }
        );
        assert_eq!(
            SimConfig::new(11, 1, false).validate().unwrap_err(),
            ConfigError::ProcessCount { got: 11 }
        );
        assert_eq!(
            SimConfig::new(2, 0, false).validate().unwrap_err(),
            ConfigError::EntryCount { got: 0 }
        );
        assert_eq!(
            SimConfig::new(2, 11, false).validate().unwrap_err(),
            ConfigError::EntryCount { got: 11 }
        );
    }

    #[test]
    fn test_rejected_config_spawns_nothing() {
        let err = Simulation::new(SimConfig::new(0, 5, false)).err().unwrap();
        assert!(matches!(err, ConfigError::ProcessCount { got: 0 }));
        assert!(err.to_string().contains("outside supported range"));
    }
}
