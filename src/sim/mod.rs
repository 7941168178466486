//! Simulation harness.
//!
//! Everything around the protocol: the validated configuration and the
//! threaded driver, the step-mode gate, injectable delays, the bounded
//! event log, presentation-facing snapshots and packet feed, the
//! occupancy ledger with its post-run checker, and event-log replay.
//!
//! The driver observes correctness; it never enforces it. Exclusion is
//! the protocol's job, and any observed violation is a defect that halts
//! the run.

pub mod checker;
pub mod delay;
pub mod driver;
pub mod eventlog;
pub mod gate;
pub mod replay;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use checker::{
    Checker, CheckResult, CheckStats, CsInterval, OccupancyLedger, Violation, ViolationKind,
};
pub use delay::{DelayProvider, JitterDelay, NoDelay};
pub use driver::{
    ConfigError, SimConfig, Simulation, SimulationReport, MAX_ENTRIES, MAX_PROCESSES,
    MIN_ENTRIES, MIN_PROCESSES,
};
pub use eventlog::{EventLog, EventRecord, SharedEventLog, SimEvent, DEFAULT_LOG_CAPACITY};
pub use gate::{Checkpoint, StepGate};
pub use replay::{replay, ReplayError, ReplayedProcess};
pub use snapshot::{PacketEvent, PacketLog, SharedSnapshots};
