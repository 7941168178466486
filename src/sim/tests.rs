//! End-to-end simulation tests.
//!
//! Threaded runs across the supported configuration space, verified by
//! the checker and the replay reconstruction.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, TryRecvError};

use crate::ra::message::MessageKind;
use crate::ra::process::ProcessSnapshot;

use super::checker::{Checker, CsInterval, ViolationKind};
use super::delay::{JitterDelay, NoDelay};
use super::driver::{SimConfig, Simulation, SimulationReport};
use super::eventlog::SimEvent;
use super::replay::replay;

fn run_with_no_delay(n: u32, entries: u32) -> SimulationReport {
    let sim = Simulation::with_delays(SimConfig::new(n, entries, false), Arc::new(NoDelay))
        .unwrap()
        .with_log_capacity(4096);
    sim.run()
}

fn run_with_jitter(n: u32, entries: u32) -> SimulationReport {
    let sim = Simulation::with_delays(
        SimConfig::new(n, entries, false),
        Arc::new(JitterDelay::brisk()),
    )
    .unwrap()
    .with_log_capacity(4096);
    sim.run()
}

/// Scenario B: two processes, two entries each. Exactly 4 REQUEST
/// messages, at least 4 REPLY messages, and exactly 2 non-overlapping
/// occupancy intervals per process.
#[test]
fn test_two_processes_two_entries() {
    let report = run_with_no_delay(2, 2);

    let requests = report
        .packets
        .iter()
        .filter(|p| p.kind == MessageKind::Request)
        .count();
    let replies = report
        .packets
        .iter()
        .filter(|p| p.kind == MessageKind::Reply)
        .count();
    assert_eq!(requests, 4);
    assert!(replies >= 4);

    for pid in 0..2 {
        let count = report.intervals.iter().filter(|iv| iv.pid == pid).count();
        assert_eq!(count, 2);
    }

    let result = Checker::verify(&report);
    assert!(result.passed, "violations: {:?}", result.violations);
    assert_eq!(result.stats.requests, 4);
    assert_eq!(result.stats.cs_entries, 4);
}

/// Mutual exclusion holds under real contention and jittered timing.
#[test]
fn test_mutual_exclusion_under_contention() {
    let report = run_with_jitter(6, 3);

    let result = Checker::verify(&report);
    assert!(result.passed, "violations: {:?}", result.violations);
    assert_eq!(result.stats.cs_entries, 18);

    // Explicit pairwise interval check, independent of the checker.
    let mut intervals = report.intervals.clone();
    intervals.sort_by_key(|iv| iv.entered);
    for pair in intervals.windows(2) {
        assert!(
            pair[0].exited <= pair[1].entered,
            "P{} and P{} overlapped in the CS",
            pair[0].pid,
            pair[1].pid
        );
    }
}

/// Every process that requests eventually enters, across the supported
/// bounds. Completion of `run` is itself the liveness proof; the final
/// counters confirm nothing was starved.
#[test]
fn test_liveness_across_configurations() {
    for (n, entries) in [(2, 1), (3, 2), (5, 2), (10, 1)] {
        let report = run_with_no_delay(n, entries);
        for snap in &report.snapshots {
            assert_eq!(
                snap.completed, entries,
                "P{} starved in n={} entries={}",
                snap.pid, n, entries
            );
            assert!(!snap.requesting);
            assert!(snap.deferred.is_empty());
        }
    }
}

/// Per-process clocks strictly increase across every logged transition.
#[test]
fn test_clock_monotonicity() {
    let report = run_with_jitter(4, 2);

    for pid in 0..4 {
        let clocks: Vec<u64> = report
            .events
            .iter()
            .filter(|r| r.event.pid() == Some(pid) && !matches!(r.event, SimEvent::ProcessDone { .. }))
            .filter_map(|r| r.event.clock())
            .collect();
        assert!(!clocks.is_empty());
        for pair in clocks.windows(2) {
            assert!(pair[0] < pair[1], "P{} clocks not increasing: {:?}", pid, clocks);
        }
    }
}

/// Replaying the recorded log reconstructs the driver's final state.
#[test]
fn test_round_trip_replay() {
    let report = run_with_jitter(4, 2);

    let replayed = replay(&report.config, &report.events).unwrap();
    assert_eq!(replayed.len(), report.snapshots.len());
    for (rp, snap) in replayed.iter().zip(&report.snapshots) {
        assert_eq!(rp.pid, snap.pid);
        assert_eq!(rp.clock, snap.clock, "P{} clock diverged", snap.pid);
        assert_eq!(rp.completed, snap.completed, "P{} entries diverged", snap.pid);
    }
}

/// Step mode suspends at every checkpoint and each advance releases one
/// task; the run still completes and verifies once enough signals arrive.
#[test]
fn test_step_mode_run_completes_under_advances() {
    let sim = Simulation::with_delays(SimConfig::new(2, 1, true), Arc::new(NoDelay))
        .unwrap()
        .with_log_capacity(4096);
    let gate = sim.gate();

    let (report_tx, report_rx) = bounded(1);
    let worker = thread::spawn(move || {
        let _ = report_tx.send(sim.run());
    });

    // Feed advance signals until the run finishes.
    let report = loop {
        match report_rx.try_recv() {
            Ok(report) => break report,
            Err(TryRecvError::Disconnected) => panic!("run died before reporting"),
            Err(TryRecvError::Empty) => {}
        }
        gate.advance();
        thread::sleep(Duration::from_millis(1));
    };
    worker.join().unwrap();

    let result = Checker::verify(&report);
    assert!(result.passed, "violations: {:?}", result.violations);

    // Three checkpoints per entry per process.
    let waits = report
        .events
        .iter()
        .filter(|r| matches!(r.event, SimEvent::StepWait { .. }))
        .count();
    assert_eq!(waits, 6);
}

/// The checker flags a fabricated occupancy overlap; an oracle that
/// cannot fail a bad history proves nothing about good ones.
#[test]
fn test_checker_detects_overlap() {
    let t0 = Instant::now();
    let report = SimulationReport {
        config: SimConfig::new(2, 1, false),
        snapshots: (0..2)
            .map(|pid| ProcessSnapshot {
                pid,
                clock: 5,
                requesting: false,
                request_ts: None,
                deferred: Vec::new(),
                replies_needed: 0,
                completed: 1,
            })
            .collect(),
        events: Vec::new(),
        intervals: vec![
            CsInterval {
                pid: 0,
                entry: 0,
                entered: t0,
                exited: t0 + Duration::from_millis(10),
            },
            CsInterval {
                pid: 1,
                entry: 0,
                entered: t0 + Duration::from_millis(5),
                exited: t0 + Duration::from_millis(15),
            },
        ],
        packets: Vec::new(),
    };

    let result = Checker::verify(&report);
    assert!(!result.passed);
    assert!(result
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::OverlappingOccupancy));
}

/// The checker flags an unflushed deferral left in a final snapshot.
#[test]
fn test_checker_detects_leftover_deferral() {
    let mut report = run_with_no_delay(2, 1);
    report.snapshots[0].deferred.push(1);

    let result = Checker::verify(&report);
    assert!(!result.passed);
    assert!(result
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::UnflushedDeferral));
}
