//! Message bus for the simulated processes.
//!
//! One unbounded FIFO queue per process, backed by crossbeam channels.
//! Any process may write to any other process's queue; only the owning
//! process reads it. Enqueue order is preserved per sender-to-destination
//! link; no ordering is guaranteed across distinct senders to the same
//! destination beyond their individual arrival order.
//!
//! No message is ever lost, duplicated, or mutated after enqueue, and
//! `try_recv`/`recv_timeout` are the only ways a message leaves a queue.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::time::Duration;

use super::message::RaMessage;

/// The bus endpoint owned by a single process.
///
/// Holds the receive side of this process's queue and senders to every
/// other process.
pub struct BusEndpoint {
    /// Owning process.
    pub pid: u32,
    /// Receiver for this process's inbound queue.
    rx: Receiver<RaMessage>,
    /// Senders to all other processes, keyed by pid.
    tx_map: HashMap<u32, Sender<RaMessage>>,
}

impl BusEndpoint {
    /// Append a message to `dst`'s queue.
    ///
    /// Returns true if the message was enqueued. The only failure mode is
    /// a destination endpoint that has already been dropped, which cannot
    /// happen while the simulation is running.
    pub fn send(&self, dst: u32, msg: RaMessage) -> bool {
        if let Some(tx) = self.tx_map.get(&dst) {
            tx.send(msg).is_ok()
        } else {
            false
        }
    }

    /// Enqueue an independent copy of `msg` to every process except self.
    ///
    /// Returns the number of destinations reached.
    pub fn broadcast(&self, msg: RaMessage) -> usize {
        let mut count = 0;
        for tx in self.tx_map.values() {
            if tx.send(msg.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Pids of every other process, in ascending order.
    ///
    /// The order a broadcast visits destinations in is unspecified; this
    /// is for callers that need a stable iteration order (packet feeds).
    pub fn peers(&self) -> Vec<u32> {
        let mut peers: Vec<u32> = self.tx_map.keys().copied().collect();
        peers.sort_unstable();
        peers
    }

    /// Non-blocking pop of the oldest queued message, if any.
    pub fn try_recv(&self) -> Option<RaMessage> {
        self.rx.try_recv().ok()
    }

    /// Blocking pop with a timeout.
    ///
    /// Wakes as soon as a message is enqueued; returns None on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RaMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// True iff this process's queue is non-empty.
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// The bus connecting all simulated processes.
///
/// Creates the per-process queues up front; each process claims its
/// endpoint exactly once via [`MessageBus::create_endpoint`].
pub struct MessageBus {
    senders: HashMap<u32, Sender<RaMessage>>,
    receivers: HashMap<u32, Receiver<RaMessage>>,
}

impl MessageBus {
    /// Create a bus for `n` processes with pids `0..n`.
    pub fn new(n: u32) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for pid in 0..n {
            let (tx, rx) = unbounded();
            senders.insert(pid, tx);
            receivers.insert(pid, rx);
        }

        MessageBus { senders, receivers }
    }

    /// Claim the endpoint for `pid`.
    ///
    /// Consumes the receiver for that pid, so this can only be called once
    /// per process. Returns None for an unknown or already-claimed pid.
    pub fn create_endpoint(&mut self, pid: u32) -> Option<BusEndpoint> {
        let rx = self.receivers.remove(&pid)?;

        let mut tx_map = HashMap::new();
        for (&id, tx) in &self.senders {
            if id != pid {
                tx_map.insert(id, tx.clone());
            }
        }

        Some(BusEndpoint { pid, rx, tx_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sender: u32, ts: u64) -> RaMessage {
        RaMessage::Request {
            timestamp: ts,
            request_ts: ts,
            sender,
        }
    }

    #[test]
    fn test_send_and_recv() {
        let mut bus = MessageBus::new(3);
        let ep0 = bus.create_endpoint(0).unwrap();
        let ep1 = bus.create_endpoint(1).unwrap();

        assert!(!ep1.has_pending());
        assert!(ep0.send(1, request(0, 1)));
        assert!(ep1.has_pending());

        let msg = ep1.try_recv().unwrap();
        assert_eq!(msg.sender(), 0);

        // Consumed exactly once.
        assert!(ep1.try_recv().is_none());
        assert!(!ep1.has_pending());
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let mut bus = MessageBus::new(3);
        let ep0 = bus.create_endpoint(0).unwrap();
        let ep1 = bus.create_endpoint(1).unwrap();
        let ep2 = bus.create_endpoint(2).unwrap();

        assert_eq!(ep0.broadcast(request(0, 1)), 2);

        assert!(ep1.try_recv().is_some());
        assert!(ep2.try_recv().is_some());
        assert!(ep0.try_recv().is_none());
    }

    #[test]
    fn test_per_sender_fifo_order() {
        let mut bus = MessageBus::new(2);
        let ep0 = bus.create_endpoint(0).unwrap();
        let ep1 = bus.create_endpoint(1).unwrap();

        for ts in 1..=5 {
            ep0.send(1, request(0, ts));
        }

        for expected in 1..=5 {
            let msg = ep1.try_recv().unwrap();
            assert_eq!(msg.timestamp(), expected);
        }
    }

    #[test]
    fn test_endpoint_claimed_once() {
        let mut bus = MessageBus::new(2);
        assert!(bus.create_endpoint(0).is_some());
        assert!(bus.create_endpoint(0).is_none());
        assert!(bus.create_endpoint(7).is_none());
    }

    #[test]
    fn test_peers_are_sorted() {
        let mut bus = MessageBus::new(4);
        let ep2 = bus.create_endpoint(2).unwrap();
        assert_eq!(ep2.peers(), vec![0, 1, 3]);
    }
}
