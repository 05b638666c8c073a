//! Communication backend abstraction for the halo-exchange engines.
//!
//! Provides a trait for tagged point-to-point exchange, a no-op
//! single-process implementation, and an in-process bus that lets tests
//! simulate several ranks inside one process (one thread per rank).

use super::ExchangeTag;
use crate::error::{Result, TemblorError};
use crate::topology::RankId;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

/// A stalled exchange has no recovery path; give up after this long and
/// report the topology mismatch.
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Abstraction over inter-rank communication for the exchange engines.
///
/// Implementations: [`SingleProcessComm`] (no-op), [`LocalBus`] ranks
/// (in-process, for tests), `MpiComm` (via the mpi crate, `distributed`
/// feature).
pub trait CommunicationBackend: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> RankId;

    /// Total number of ranks.
    fn num_ranks(&self) -> usize;

    /// Paired exchange of one halo message with a neighbor rank.
    ///
    /// Sends `send` labeled `send_tag` and fills `recv` with the peer's
    /// message labeled `recv_tag`. Tags must match exactly on both sides;
    /// a mismatch or a missing message is a fatal exchange error, never
    /// retried.
    fn sendrecv(
        &self,
        peer: RankId,
        send_tag: ExchangeTag,
        recv_tag: ExchangeTag,
        send: &[f32],
        recv: &mut [f32],
    ) -> Result<()>;

    /// Synchronization barrier.
    fn barrier(&self);
}

/// No-op backend for single-rank runs.
///
/// The only legal peer is the rank itself, which can occur on a periodic
/// axis of size 1; the exchange degenerates to a buffer copy.
pub struct SingleProcessComm;

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> RankId {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn sendrecv(
        &self,
        peer: RankId,
        _send_tag: ExchangeTag,
        _recv_tag: ExchangeTag,
        send: &[f32],
        recv: &mut [f32],
    ) -> Result<()> {
        if peer != 0 {
            return Err(TemblorError::Exchange(format!(
                "single-process run has no rank {peer}"
            )));
        }
        if recv.len() != send.len() {
            return Err(TemblorError::Exchange(format!(
                "self-exchange length mismatch: send {} recv {}",
                send.len(),
                recv.len()
            )));
        }
        recv.copy_from_slice(send);
        Ok(())
    }

    fn barrier(&self) {}
}

type Packet = (u32, Vec<f32>);

struct Inbox {
    rx: Receiver<Packet>,
    /// Messages that arrived ahead of the tag currently awaited.
    pending: Vec<Packet>,
}

/// One rank's endpoint on an in-process communication bus.
///
/// Channels are unbounded, so sends never block and the symmetric
/// send-then-receive pattern of the engines cannot deadlock. Receives are
/// tag-selective: out-of-order arrivals are parked until their tag is
/// awaited.
pub struct LocalComm {
    rank: RankId,
    num_ranks: usize,
    /// Indexed by destination rank.
    senders: Vec<Sender<Packet>>,
    /// Indexed by source rank.
    inboxes: Vec<Mutex<Inbox>>,
    barrier: Arc<Barrier>,
}

/// Constructor for a set of [`LocalComm`] endpoints sharing one bus.
pub struct LocalBus;

impl LocalBus {
    /// Create `num_ranks` connected endpoints, one per simulated rank.
    pub fn new(num_ranks: usize) -> Vec<LocalComm> {
        let barrier = Arc::new(Barrier::new(num_ranks));
        let mut txs: Vec<Vec<Option<Sender<Packet>>>> = (0..num_ranks)
            .map(|_| (0..num_ranks).map(|_| None).collect())
            .collect();
        let mut rxs: Vec<Vec<Option<Receiver<Packet>>>> = (0..num_ranks)
            .map(|_| (0..num_ranks).map(|_| None).collect())
            .collect();
        for src in 0..num_ranks {
            for dst in 0..num_ranks {
                let (tx, rx) = channel();
                txs[src][dst] = Some(tx);
                rxs[dst][src] = Some(rx);
            }
        }
        txs.into_iter()
            .zip(rxs)
            .enumerate()
            .map(|(rank, (senders, inboxes))| LocalComm {
                rank,
                num_ranks,
                senders: senders.into_iter().map(|t| t.unwrap()).collect(),
                inboxes: inboxes
                    .into_iter()
                    .map(|rx| {
                        Mutex::new(Inbox {
                            rx: rx.unwrap(),
                            pending: Vec::new(),
                        })
                    })
                    .collect(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl CommunicationBackend for LocalComm {
    fn rank(&self) -> RankId {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    fn sendrecv(
        &self,
        peer: RankId,
        send_tag: ExchangeTag,
        recv_tag: ExchangeTag,
        send: &[f32],
        recv: &mut [f32],
    ) -> Result<()> {
        if peer >= self.num_ranks {
            return Err(TemblorError::Exchange(format!(
                "rank {} addressed nonexistent rank {peer}",
                self.rank
            )));
        }
        self.senders[peer]
            .send((send_tag.encode(), send.to_vec()))
            .map_err(|_| TemblorError::Exchange(format!("rank {peer} hung up")))?;

        let want = recv_tag.encode();
        let mut inbox = self
            .inboxes[peer]
            .lock()
            .map_err(|_| TemblorError::Exchange("inbox poisoned".into()))?;
        let payload = loop {
            if let Some(pos) = inbox.pending.iter().position(|(t, _)| *t == want) {
                break inbox.pending.swap_remove(pos).1;
            }
            match inbox.rx.recv_timeout(RECV_TIMEOUT) {
                Ok((t, data)) if t == want => break data,
                Ok(other) => inbox.pending.push(other),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TemblorError::Exchange(format!(
                        "rank {} timed out waiting for tag {want:#x} from rank {peer}; \
                         mismatched neighbor topology?",
                        self.rank
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TemblorError::Exchange(format!("rank {peer} hung up")));
                }
            }
        };
        if payload.len() != recv.len() {
            return Err(TemblorError::Exchange(format!(
                "tag {want:#x} from rank {peer}: got {} elements, expected {}",
                payload.len(),
                recv.len()
            )));
        }
        recv.copy_from_slice(&payload);
        Ok(())
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}
