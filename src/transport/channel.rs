//! In-process channel transport.
//!
//! A full mesh of bounded channels connecting every ordered rank pair, for
//! multi-rank runs hosted in one process (one thread per rank). This is the
//! transport used by the integration tests and by single-machine runs.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;

use super::{Frame, Rank, Transport, TransferError};

/// One rank's endpoint of an in-process mesh.
///
/// Frames pass by value; the wire byte layout is not involved. Sends block
/// once the per-pair buffer is full, receives block until the named peer's
/// next frame arrives.
pub struct ChannelTransport {
    rank: Rank,
    /// Sender for (self -> dst); `None` at our own index.
    senders: Vec<Option<SyncSender<Frame>>>,
    /// Receiver for (src -> self); `None` at our own index. Guarded so that
    /// `recv` works through `&self` as the `Transport` trait requires.
    receivers: Vec<Option<Mutex<Receiver<Frame>>>>,
}

impl ChannelTransport {
    /// Build endpoints for a `size`-rank group with `capacity` frames of
    /// buffering per ordered pair.
    ///
    /// The returned vector is indexed by rank; hand each endpoint to the
    /// thread driving that rank.
    pub fn mesh(size: usize, capacity: usize) -> Vec<ChannelTransport> {
        assert!(size > 0, "mesh needs at least one rank");

        // channels[src][dst] connects src -> dst
        let mut pairs: Vec<Vec<Option<(SyncSender<Frame>, Receiver<Frame>)>>> = (0..size)
            .map(|src| {
                (0..size)
                    .map(|dst| (src != dst).then(|| mpsc::sync_channel(capacity)))
                    .collect()
            })
            .collect();

        // clone every sender before receivers are moved out of the grid
        let senders_by_rank: Vec<Vec<Option<SyncSender<Frame>>>> = (0..size)
            .map(|src| {
                (0..size)
                    .map(|dst| pairs[src][dst].as_ref().map(|(tx, _)| tx.clone()))
                    .collect()
            })
            .collect();

        senders_by_rank
            .into_iter()
            .enumerate()
            .map(|(rank, senders)| {
                let receivers = (0..size)
                    .map(|src| pairs[src][rank].take().map(|(_, rx)| Mutex::new(rx)))
                    .collect();
                ChannelTransport { rank, senders, receivers }
            })
            .collect()
    }

    /// The rank this endpoint belongs to.
    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: Rank, frame: Frame) -> Result<(), TransferError> {
        let sender = self
            .senders
            .get(to)
            .and_then(|s| s.as_ref())
            .ok_or(TransferError::UnknownRank { rank: to })?;
        sender
            .send(frame)
            .map_err(|_| TransferError::Disconnected { rank: to })
    }

    fn recv(&self, from: Rank) -> Result<Frame, TransferError> {
        let receiver = self
            .receivers
            .get(from)
            .and_then(|r| r.as_ref())
            .ok_or(TransferError::UnknownRank { rank: from })?;
        receiver
            .lock()
            .expect("receiver mutex poisoned")
            .recv()
            .map_err(|_| TransferError::Disconnected { rank: from })
    }
}
