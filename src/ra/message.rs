use serde::{Deserialize, Serialize};

/// Ricart-Agrawala protocol messages.
///
/// Every message carries the sender's Lamport clock at send time. REQUEST
/// additionally carries the timestamp the request was issued at, which forms
/// the priority key `(request_ts, sender)` together with the sender's pid.
///
/// Messages are immutable once sent. A broadcast enqueues an independent
/// copy to every destination; each copy is consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaMessage {
    /// Broadcast when a process wants the critical section.
    Request {
        /// Sender's clock at send time.
        timestamp: u64,
        /// Timestamp the request was issued at (priority key component).
        request_ts: u64,
        /// Requesting process.
        sender: u32,
    },

    /// Permission grant, sent point-to-point to a requester.
    ///
    /// Sent either immediately on REQUEST receipt, or deferred until the
    /// sender's own critical-section exit.
    Reply {
        /// Sender's clock at send time.
        timestamp: u64,
        /// Replying process.
        sender: u32,
    },

    /// Broadcast on critical-section exit.
    ///
    /// Observability only: no recipient logic depends on its delivery.
    /// REPLY alone already grants entry.
    Release {
        /// Sender's clock at send time.
        timestamp: u64,
        /// Exiting process.
        sender: u32,
    },
}

impl RaMessage {
    /// Lamport send-time of this message.
    pub fn timestamp(&self) -> u64 {
        match self {
            RaMessage::Request { timestamp, .. }
            | RaMessage::Reply { timestamp, .. }
            | RaMessage::Release { timestamp, .. } => *timestamp,
        }
    }

    /// Originating process.
    pub fn sender(&self) -> u32 {
        match self {
            RaMessage::Request { sender, .. }
            | RaMessage::Reply { sender, .. }
            | RaMessage::Release { sender, .. } => *sender,
        }
    }

    /// Discriminant, shared with packet events.
    pub fn kind(&self) -> MessageKind {
        match self {
            RaMessage::Request { .. } => MessageKind::Request,
            RaMessage::Reply { .. } => MessageKind::Reply,
            RaMessage::Release { .. } => MessageKind::Release,
        }
    }
}

/// Message discriminant, used by packet events and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Reply,
    Release,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => write!(f, "REQUEST"),
            MessageKind::Reply => write!(f, "REPLY"),
            MessageKind::Release => write!(f, "RELEASE"),
        }
    }
}
