//! Ricart-Agrawala mutual exclusion over Lamport clocks.
//!
//! The protocol layer: logical clocks, the message vocabulary, the channel
//! bus connecting the simulated processes, and the per-process state
//! machine. Nothing here spawns tasks or records history; the harness in
//! `crate::sim` drives these pieces and observes their outcomes.
//!
//! # Invariants
//!
//! 1. **Mutual exclusion**: at most one process occupies the critical
//!    section at any simulated instant.
//! 2. **Clock monotonicity**: each process's clock strictly increases.
//! 3. **Priority order**: contending requests are served in `(request_ts,
//!    pid)` order, smaller first.
//! 4. **Deferral completeness**: every deferred REPLY is sent exactly once,
//!    no later than the deferring process's next CS exit.

pub mod bus;
pub mod clock;
pub mod errors;
pub mod message;
pub mod process;


pub use bus::{BusEndpoint, MessageBus};
pub use clock::LamportClock;
pub use errors::InvariantViolation;
pub use message::{MessageKind, RaMessage};
pub use process::{
    ExitReport, HandleOutcome, PriorityKey, ProcState, Process, ProcessSnapshot,
};
