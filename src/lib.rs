//! Discrete-event simulation of Ricart-Agrawala mutual exclusion over
//! Lamport logical clocks.
//!
//! N simulated processes, each on its own thread, contend for a critical
//! section by broadcasting timestamped REQUESTs and collecting REPLYs,
//! deferring lower-priority requesters until their own exit. The driver
//! observes every transition into a bounded event log, per-process
//! snapshots, and a packet feed, and checks the mutual-exclusion
//! invariant without ever enforcing it.
//!
//! - [`ra`] is the protocol: clocks, messages, the channel bus, and the
//!   per-process state machine.
//! - [`sim`] is the harness: the validated configuration, the threaded
//!   driver, the step-mode gate, injectable delays, the event log and its
//!   replay, and the post-run checker.

pub mod ra;
pub mod sim;
