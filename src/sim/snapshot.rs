//! Presentation-facing state: per-process snapshots and the packet feed.
//!
//! The presentation layer never sees live mutable state. Each runner task
//! replaces its own snapshot slot after every mutation, and every message
//! send is mirrored as a packet event. Both containers are mutex-held and
//! hand out copies only.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::ra::message::MessageKind;
use crate::ra::process::ProcessSnapshot;

/// One slot per process, replaced wholesale on every publish.
#[derive(Clone)]
pub struct SharedSnapshots {
    inner: Arc<Mutex<Vec<ProcessSnapshot>>>,
}

impl SharedSnapshots {
    /// Initial snapshots for `n` fresh processes.
    pub fn new(n: u32) -> Self {
        let slots = (0..n)
            .map(|pid| ProcessSnapshot {
                pid,
                clock: 0,
                requesting: false,
                request_ts: None,
                deferred: Vec::new(),
                replies_needed: 0,
                completed: 0,
            })
            .collect();
        SharedSnapshots {
            inner: Arc::new(Mutex::new(slots)),
        }
    }

    /// Replace the slot for `snapshot.pid`.
    pub fn publish(&self, snapshot: ProcessSnapshot) {
        let mut slots = self.inner.lock().unwrap();
        let pid = snapshot.pid as usize;
        slots[pid] = snapshot;
    }

    /// Copy of every slot, ordered by pid.
    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.inner.lock().unwrap().clone()
    }
}

/// A message in flight, for animation and message accounting.
///
/// A broadcast produces one packet per destination. Display expiry is the
/// presentation layer's business and has no bearing on correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketEvent {
    /// Unique within the run, assigned in emission order.
    pub id: u64,
    pub src: u32,
    pub dst: u32,
    pub kind: MessageKind,
    /// Lamport send-time of the mirrored message.
    pub timestamp: u64,
}

/// Append-only feed of every packet emitted during the run.
#[derive(Clone)]
pub struct PacketLog {
    next_id: Arc<AtomicU64>,
    sent: Arc<Mutex<Vec<PacketEvent>>>,
}

impl PacketLog {
    pub fn new() -> Self {
        PacketLog {
            next_id: Arc::new(AtomicU64::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record one point-to-point send.
    pub fn emit(&self, src: u32, dst: u32, kind: MessageKind, timestamp: u64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let packet = PacketEvent {
            id,
            src,
            dst,
            kind,
            timestamp,
        };
        self.sent.lock().unwrap().push(packet);
    }

    /// Record one packet per destination of a broadcast.
    pub fn emit_broadcast(&self, src: u32, dsts: &[u32], kind: MessageKind, timestamp: u64) {
        for &dst in dsts {
            self.emit(src, dst, kind, timestamp);
        }
    }

    /// Copy of the whole feed, in emission order.
    pub fn snapshot(&self) -> Vec<PacketEvent> {
        self.sent.lock().unwrap().clone()
    }

    /// Packets with `id > after`, for pollers.
    pub fn since(&self, after: Option<u64>) -> Vec<PacketEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|p| after.map_or(true, |id| p.id > id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap().is_empty()
    }
}

impl Default for PacketLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_slot() {
        let snaps = SharedSnapshots::new(2);
        assert_eq!(snaps.snapshot()[1].clock, 0);

        snaps.publish(ProcessSnapshot {
            pid: 1,
            clock: 7,
            requesting: true,
            request_ts: Some(7),
            deferred: vec![0],
            replies_needed: 1,
            completed: 0,
        });

        let all = snaps.snapshot();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].clock, 0);
        assert_eq!(all[1].clock, 7);
        assert_eq!(all[1].deferred, vec![0]);
    }

    #[test]
    fn test_packet_ids_are_sequential() {
        let packets = PacketLog::new();
        packets.emit(0, 1, MessageKind::Request, 1);
        packets.emit_broadcast(1, &[0, 2], MessageKind::Release, 5);

        let all = packets.snapshot();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, 0);
        assert_eq!(all[2].id, 2);
        assert_eq!(packets.since(Some(0)).len(), 2);
    }
}
