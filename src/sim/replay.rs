//! Event-log replay.
//!
//! Re-derives the final per-process state of a run purely from the
//! recorded events, validating clock monotonicity and exclusive occupancy
//! along the way. A finished run's log, replayed against the same
//! configuration, must reconstruct the driver's final snapshots exactly;
//! any divergence indicates a defect in either the log or the algorithm.

use std::fmt;

use super::driver::SimConfig;
use super::eventlog::{EventRecord, SimEvent};

/// Final state of one process as reconstructed from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedProcess {
    pub pid: u32,
    pub clock: u64,
    pub completed: u32,
}

/// Why a replay could not reconstruct the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The log evicted early entries; replay needs the full history.
    TruncatedLog { first_seq: u64 },
    /// An event names a pid outside the configured range.
    UnknownPid { pid: u32, seq: u64 },
    /// A process's logged clock went backwards.
    ClockRegression { pid: u32, previous: u64, current: u64, seq: u64 },
    /// A CS entry was logged while another process held the section.
    OverlappingEntry { holder: u32, entrant: u32, seq: u64 },
    /// A CS exit was logged by a process that had not entered.
    ExitWithoutEntry { pid: u32, seq: u64 },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::TruncatedLog { first_seq } => {
                write!(
                    f,
                    "log is truncated: oldest retained seq is {}, need 0",
                    first_seq
                )
            }
            ReplayError::UnknownPid { pid, seq } => {
                write!(f, "event seq {} names unknown pid {}", seq, pid)
            }
            ReplayError::ClockRegression { pid, previous, current, seq } => {
                write!(
                    f,
                    "P{} clock went from {} to {} at seq {}",
                    pid, previous, current, seq
                )
            }
            ReplayError::OverlappingEntry { holder, entrant, seq } => {
                write!(
                    f,
                    "P{} entered the CS at seq {} while P{} held it",
                    entrant, seq, holder
                )
            }
            ReplayError::ExitWithoutEntry { pid, seq } => {
                write!(f, "P{} exited the CS at seq {} without entering", pid, seq)
            }
        }
    }
}

/// Replay `records` against `config` and reconstruct final state.
///
/// Records must be the complete, ordered history of the run (seq 0
/// onward). Entry completion is counted at the RELEASE broadcast, the
/// last step of the exit sequence.
pub fn replay(
    config: &SimConfig,
    records: &[EventRecord],
) -> Result<Vec<ReplayedProcess>, ReplayError> {
    if let Some(first) = records.first() {
        if first.seq != 0 {
            return Err(ReplayError::TruncatedLog {
                first_seq: first.seq,
            });
        }
    }

    let n = config.processes;
    let mut state: Vec<ReplayedProcess> = (0..n)
        .map(|pid| ReplayedProcess {
            pid,
            clock: 0,
            completed: 0,
        })
        .collect();
    let mut occupant: Option<u32> = None;

    for record in records {
        let pid = match record.event.pid() {
            Some(pid) => pid,
            None => continue,
        };
        if pid >= n {
            return Err(ReplayError::UnknownPid {
                pid,
                seq: record.seq,
            });
        }

        if let Some(clock) = record.event.clock() {
            let previous = state[pid as usize].clock;
            // ProcessDone is a terminal marker: it may repeat the last
            // clock value, every transition must advance it.
            let ok = match record.event {
                SimEvent::ProcessDone { .. } => clock >= previous,
                _ => clock > previous,
            };
            if !ok {
                return Err(ReplayError::ClockRegression {
                    pid,
                    previous,
                    current: clock,
                    seq: record.seq,
                });
            }
            state[pid as usize].clock = clock;
        }

        match record.event {
            SimEvent::CsEntered { .. } => {
                if let Some(holder) = occupant {
                    return Err(ReplayError::OverlappingEntry {
                        holder,
                        entrant: pid,
                        seq: record.seq,
                    });
                }
                occupant = Some(pid);
            }
            SimEvent::CsExited { .. } => {
                if occupant != Some(pid) {
                    return Err(ReplayError::ExitWithoutEntry {
                        pid,
                        seq: record.seq,
                    });
                }
                occupant = None;
            }
            SimEvent::ReleaseSent { .. } => {
                state[pid as usize].completed += 1;
            }
            _ => {}
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: u64, event: SimEvent) -> EventRecord {
        EventRecord {
            seq,
            at_ms: seq,
            description: event.describe(),
            event,
        }
    }

    fn config(n: u32, entries: u32) -> SimConfig {
        SimConfig {
            processes: n,
            entries,
            step_mode: false,
        }
    }

    #[test]
    fn test_replay_reconstructs_final_state() {
        // A minimal uncontended run: P0 requests, enters, exits, releases.
        let records = vec![
            record(0, SimEvent::RequestSent { pid: 0, request_ts: 1 }),
            record(1, SimEvent::ReplySent { pid: 1, to: 0, clock: 3 }),
            record(2, SimEvent::CsEntered { pid: 0, clock: 4 }),
            record(3, SimEvent::CsExited { pid: 0, clock: 5 }),
            record(4, SimEvent::ReleaseSent { pid: 0, clock: 6 }),
            record(5, SimEvent::ProcessDone { pid: 0, clock: 6 }),
            record(6, SimEvent::ProcessDone { pid: 1, clock: 7 }),
            record(7, SimEvent::RunCompleted),
        ];

        let state = replay(&config(2, 1), &records).unwrap();
        assert_eq!(state[0].clock, 6);
        assert_eq!(state[0].completed, 1);
        assert_eq!(state[1].clock, 7);
        assert_eq!(state[1].completed, 0);
    }

    #[test]
    fn test_replay_rejects_truncated_log() {
        let records = vec![record(5, SimEvent::RunCompleted)];
        assert_eq!(
            replay(&config(2, 1), &records).unwrap_err(),
            ReplayError::TruncatedLog { first_seq: 5 }
        );
    }

    #[test]
    fn test_replay_rejects_clock_regression() {
        let records = vec![
            record(0, SimEvent::RequestSent { pid: 0, request_ts: 5 }),
            record(1, SimEvent::CsEntered { pid: 0, clock: 3 }),
        ];
        assert!(matches!(
            replay(&config(2, 1), &records).unwrap_err(),
            ReplayError::ClockRegression { pid: 0, previous: 5, current: 3, .. }
        ));
    }

    #[test]
    fn test_replay_rejects_overlapping_entries() {
        let records = vec![
            record(0, SimEvent::CsEntered { pid: 0, clock: 2 }),
            record(1, SimEvent::CsEntered { pid: 1, clock: 3 }),
        ];
        assert!(matches!(
            replay(&config(2, 1), &records).unwrap_err(),
            ReplayError::OverlappingEntry { holder: 0, entrant: 1, .. }
        ));
    }

    #[test]
    fn test_replay_rejects_unmatched_exit() {
        let records = vec![record(0, SimEvent::CsExited { pid: 1, clock: 2 })];
        assert!(matches!(
            replay(&config(2, 1), &records).unwrap_err(),
            ReplayError::ExitWithoutEntry { pid: 1, .. }
        ));
    }
}
