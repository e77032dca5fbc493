//! Message passing between cooperating processes.
//!
//! The aggregation step of a distributed run needs exactly two collective
//! operations: workers stream their accumulator state to the coordinator, and
//! the coordinator broadcasts completion. Both are expressed over a narrow
//! point-to-point [`Transport`] interface so any substrate can implement it:
//! in-process channels for tests and single-machine runs
//! ([`ChannelTransport`]), sockets for multi-process runs
//! ([`SocketTransport`]).
//!
//! # Frames
//!
//! Messages are small tagged [`Frame`]s. The byte layout (used by wire
//! transports; channel transports pass frames by value) is:
//!
//! ```text
//! Header   [0x01][u32 LE slot count]
//! Slot     [0x02][0x00]                          (skip marker)
//!          [0x02][0x01][u32 LE len][payload...]
//! Complete [0x03]
//! ```
//!
//! Payload sizes are bounded by [`MAX_PAYLOAD_LEN`]; an oversized or
//! truncated frame is a [`TransferError::MalformedFrame`], never a partial
//! read.

mod channel;
mod socket;

pub use channel::ChannelTransport;
pub use socket::SocketTransport;

/// Identity of one cooperating process in a fixed-size group.
pub type Rank = usize;

/// The distinguished rank that merges and reports.
pub const COORDINATOR: Rank = 0;

/// Upper bound on a single slot payload (1 GiB). A length field above this
/// is treated as malformed rather than allocated.
pub const MAX_PAYLOAD_LEN: usize = 1 << 30;

// ============================================================================
// ProcessTopology
// ============================================================================

/// Rank and group size, as provided by the surrounding execution environment.
///
/// The core never computes topology; it only validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTopology {
    rank: Rank,
    size: usize,
}

impl ProcessTopology {
    /// # Panics
    ///
    /// Panics if `size == 0` or `rank >= size`.
    pub fn new(rank: Rank, size: usize) -> Self {
        assert!(size > 0, "process group must have at least one rank");
        assert!(rank < size, "rank {rank} out of range for size {size}");
        Self { rank, size }
    }

    /// A single-process group.
    pub fn solo() -> Self {
        Self::new(0, 1)
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One message of the aggregation protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Announces how many slot frames the sender will stream.
    Header { slots: u32 },
    /// One accumulator slot. `None` marks a rank that completed zero tasks
    /// and contributes nothing to this slot.
    Slot { payload: Option<Vec<u8>> },
    /// Coordinator's completion broadcast.
    Complete,
}

const TAG_HEADER: u8 = 0x01;
const TAG_SLOT: u8 = 0x02;
const TAG_COMPLETE: u8 = 0x03;

impl Frame {
    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Frame::Header { slots } => {
                let mut buf = Vec::with_capacity(5);
                buf.push(TAG_HEADER);
                buf.extend_from_slice(&slots.to_le_bytes());
                buf
            }
            Frame::Slot { payload: None } => vec![TAG_SLOT, 0x00],
            Frame::Slot { payload: Some(bytes) } => {
                let mut buf = Vec::with_capacity(6 + bytes.len());
                buf.push(TAG_SLOT);
                buf.push(0x01);
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
                buf
            }
            Frame::Complete => vec![TAG_COMPLETE],
        }
    }

    /// Deserialize from the wire layout.
    ///
    /// `from` only labels the error.
    pub fn from_bytes(from: Rank, bytes: &[u8]) -> Result<Self, TransferError> {
        let malformed = |detail: String| TransferError::MalformedFrame { rank: from, detail };

        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| malformed("empty frame".into()))?;
        match tag {
            TAG_HEADER => {
                let slots: [u8; 4] = rest
                    .try_into()
                    .map_err(|_| malformed(format!("header frame of {} byte(s)", bytes.len())))?;
                Ok(Frame::Header { slots: u32::from_le_bytes(slots) })
            }
            TAG_SLOT => {
                let (&marker, rest) = rest
                    .split_first()
                    .ok_or_else(|| malformed("slot frame without marker".into()))?;
                match marker {
                    0x00 if rest.is_empty() => Ok(Frame::Slot { payload: None }),
                    0x01 => {
                        if rest.len() < 4 {
                            return Err(malformed("slot frame without length".into()));
                        }
                        let (len, payload) = rest.split_at(4);
                        let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
                        if len > MAX_PAYLOAD_LEN {
                            return Err(malformed(format!("payload length {len} exceeds limit")));
                        }
                        if payload.len() != len {
                            return Err(malformed(format!(
                                "payload length {} does not match declared {len}",
                                payload.len()
                            )));
                        }
                        Ok(Frame::Slot { payload: Some(payload.to_vec()) })
                    }
                    other => Err(malformed(format!("unknown slot marker {other:#04x}"))),
                }
            }
            TAG_COMPLETE if rest.is_empty() => Ok(Frame::Complete),
            other => Err(malformed(format!("unknown frame tag {other:#04x}"))),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Transfer errors. All fatal: the run aborts, nothing is resent.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("rank {rank} is not reachable over this transport")]
    UnknownRank { rank: Rank },

    #[error("connection to rank {rank} closed before the transfer finished")]
    Disconnected { rank: Rank },

    #[error("malformed frame from rank {rank}: {detail}")]
    MalformedFrame { rank: Rank, detail: String },

    #[error("I/O error talking to rank {rank}: {source}")]
    Io {
        rank: Rank,
        #[source]
        source: std::io::Error,
    },
}

/// Point-to-point message passing between ranks.
///
/// Sends may be buffered; a `recv` blocks until the named rank's next frame
/// arrives. A hung peer stalls the run — the core defines no timeout or
/// cancellation semantics.
pub trait Transport: Send + Sync {
    fn send(&self, to: Rank, frame: Frame) -> Result<(), TransferError>;
    fn recv(&self, from: Rank) -> Result<Frame, TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_validates_rank_and_size() {
        let topo = ProcessTopology::new(2, 4);
        assert_eq!(topo.rank(), 2);
        assert!(!topo.is_coordinator());
        assert!(ProcessTopology::solo().is_coordinator());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn topology_rejects_rank_beyond_size() {
        ProcessTopology::new(3, 3);
    }

    #[test]
    fn frames_round_trip_through_wire_layout() {
        let frames = [
            Frame::Header { slots: 3 },
            Frame::Slot { payload: None },
            Frame::Slot { payload: Some(vec![1, 2, 3, 255]) },
            Frame::Slot { payload: Some(Vec::new()) },
            Frame::Complete,
        ];
        for frame in frames {
            let bytes = frame.to_bytes();
            assert_eq!(Frame::from_bytes(5, &bytes).unwrap(), frame);
        }
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for bytes in [
            &[][..],
            &[0xFF][..],
            &[TAG_HEADER, 1][..],                    // truncated count
            &[TAG_SLOT][..],                         // no marker
            &[TAG_SLOT, 0x01, 5, 0, 0, 0, 1][..],    // declared 5, got 1
            &[TAG_SLOT, 0x07][..],                   // unknown marker
            &[TAG_COMPLETE, 0][..],                  // trailing byte
        ] {
            let err = Frame::from_bytes(1, bytes).unwrap_err();
            assert!(matches!(err, TransferError::MalformedFrame { rank: 1, .. }), "{bytes:?}");
        }
    }
}
