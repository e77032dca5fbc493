//! TCP star transport for multi-process runs.
//!
//! The aggregation protocol only ever talks worker <-> coordinator, so the
//! socket transport is a star: the coordinator accepts one connection per
//! worker rank, workers dial in and identify themselves with a fixed-size
//! hello. Frames travel in the wire layout documented in
//! [the module root](super): a 4-byte LE frame length followed by the tagged
//! frame bytes.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Mutex;

use super::{Frame, Rank, Transport, TransferError, COORDINATOR, MAX_PAYLOAD_LEN};

/// Fixed-size hello a worker sends after connecting: its rank as u32 LE.
const HELLO_LEN: usize = 4;

/// A star-topology TCP transport endpoint.
///
/// The coordinator endpoint can reach every worker rank; a worker endpoint
/// can reach only rank [`COORDINATOR`]. Streams are guarded per peer so the
/// endpoint is shareable across threads, and the per-peer protocol is
/// strictly sequential.
pub struct SocketTransport {
    rank: Rank,
    /// Peer streams indexed by rank; `None` where no link exists.
    peers: Vec<Option<Mutex<TcpStream>>>,
}

impl SocketTransport {
    /// Coordinator side: accept `size - 1` worker connections on `listener`.
    ///
    /// Blocks until every worker has dialed in and identified itself. A
    /// duplicate or out-of-range hello is malformed and aborts setup.
    pub fn coordinator(listener: TcpListener, size: usize) -> Result<Self, TransferError> {
        assert!(size > 0, "process group must have at least one rank");

        let mut peers: Vec<Option<Mutex<TcpStream>>> = (0..size).map(|_| None).collect();
        for _ in 1..size {
            let (mut stream, _) = listener.accept().map_err(|source| TransferError::Io {
                rank: COORDINATOR,
                source,
            })?;

            let mut hello = [0u8; HELLO_LEN];
            stream
                .read_exact(&mut hello)
                .map_err(|source| TransferError::Io { rank: COORDINATOR, source })?;
            let rank = u32::from_le_bytes(hello) as usize;

            if rank == COORDINATOR || rank >= size {
                return Err(TransferError::MalformedFrame {
                    rank,
                    detail: format!("hello from out-of-range rank {rank} (size {size})"),
                });
            }
            if peers[rank].is_some() {
                return Err(TransferError::MalformedFrame {
                    rank,
                    detail: format!("duplicate hello from rank {rank}"),
                });
            }
            peers[rank] = Some(Mutex::new(stream));
        }

        Ok(Self { rank: COORDINATOR, peers })
    }

    /// Worker side: dial the coordinator and identify as `rank`.
    pub fn worker(rank: Rank, coordinator: impl ToSocketAddrs) -> Result<Self, TransferError> {
        assert!(rank != COORDINATOR, "the coordinator does not dial itself");

        let mut stream = TcpStream::connect(coordinator)
            .map_err(|source| TransferError::Io { rank: COORDINATOR, source })?;
        stream
            .write_all(&(rank as u32).to_le_bytes())
            .map_err(|source| TransferError::Io { rank: COORDINATOR, source })?;

        let mut peers: Vec<Option<Mutex<TcpStream>>> = vec![None];
        peers[COORDINATOR] = Some(Mutex::new(stream));
        Ok(Self { rank, peers })
    }

    fn peer(&self, rank: Rank) -> Result<&Mutex<TcpStream>, TransferError> {
        self.peers
            .get(rank)
            .and_then(|p| p.as_ref())
            .ok_or(TransferError::UnknownRank { rank })
    }
}

impl Transport for SocketTransport {
    fn send(&self, to: Rank, frame: Frame) -> Result<(), TransferError> {
        let peer = self.peer(to)?;
        let bytes = frame.to_bytes();

        let mut stream = peer.lock().expect("peer stream mutex poisoned");
        let io = |source| TransferError::Io { rank: to, source };
        stream
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .map_err(io)?;
        stream.write_all(&bytes).map_err(io)?;
        stream.flush().map_err(io)
    }

    fn recv(&self, from: Rank) -> Result<Frame, TransferError> {
        let peer = self.peer(from)?;

        let mut stream = peer.lock().expect("peer stream mutex poisoned");
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                TransferError::Disconnected { rank: from }
            } else {
                TransferError::Io { rank: from, source }
            }
        })?;
        let len = u32::from_le_bytes(len) as usize;
        if len == 0 || len > MAX_PAYLOAD_LEN + 16 {
            return Err(TransferError::MalformedFrame {
                rank: from,
                detail: format!("frame length {len}"),
            });
        }

        let mut bytes = vec![0u8; len];
        stream
            .read_exact(&mut bytes)
            .map_err(|source| TransferError::Io { rank: from, source })?;
        Frame::from_bytes(from, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn star_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::scope(|scope| {
            scope.spawn(move || {
                let worker = SocketTransport::worker(1, addr).unwrap();
                worker.send(0, Frame::Header { slots: 1 }).unwrap();
                worker
                    .send(0, Frame::Slot { payload: Some(vec![7, 8, 9]) })
                    .unwrap();
                assert_eq!(worker.recv(0).unwrap(), Frame::Complete);
            });

            let coordinator = SocketTransport::coordinator(listener, 2).unwrap();
            assert_eq!(coordinator.recv(1).unwrap(), Frame::Header { slots: 1 });
            assert_eq!(
                coordinator.recv(1).unwrap(),
                Frame::Slot { payload: Some(vec![7, 8, 9]) }
            );
            coordinator.send(1, Frame::Complete).unwrap();
        });
    }

    #[test]
    fn worker_can_only_reach_the_coordinator() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || SocketTransport::worker(1, addr).unwrap());
        let _coordinator = SocketTransport::coordinator(listener, 2).unwrap();

        let worker = handle.join().unwrap();
        assert!(matches!(
            worker.send(1, Frame::Complete),
            Err(TransferError::UnknownRank { rank: 1 })
        ));
    }
}
