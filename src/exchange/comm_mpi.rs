//! MPI communication backend for multi-node runs.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements [`CommunicationBackend`] using `mpi::traits::*`.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! # Deadlock avoidance
//!
//! Each paired exchange posts both the receive and the send as
//! non-blocking requests before waiting on either. A blocking send would
//! deadlock on a periodic ring: every rank runs its minus-direction
//! exchange first, so each first-iteration send is matched only by the
//! peer's second-iteration receive, and above the rendezvous threshold
//! all ranks would stall in the send. Message tags carry the full slot
//! identity, so overlapping stages cannot be confused.

use super::comm::CommunicationBackend;
use super::ExchangeTag;
use crate::error::{Result, TemblorError};
use crate::topology::RankId;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communication backend.
///
/// Wraps the MPI world communicator. Requires `mpi::initialize()` to have
/// been called before construction.
pub struct MpiComm;

impl MpiComm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> RankId {
        SimpleCommunicator::world().rank() as RankId
    }

    fn num_ranks(&self) -> usize {
        SimpleCommunicator::world().size() as usize
    }

    fn sendrecv(
        &self,
        peer: RankId,
        send_tag: ExchangeTag,
        recv_tag: ExchangeTag,
        send: &[f32],
        recv: &mut [f32],
    ) -> Result<()> {
        let world = SimpleCommunicator::world();
        if peer >= world.size() as usize {
            return Err(TemblorError::Exchange(format!(
                "rank {} addressed nonexistent rank {peer}",
                world.rank()
            )));
        }
        let process = world.process_at_rank(peer as i32);
        mpi::request::scope(|scope| {
            let rreq =
                process.immediate_receive_into_with_tag(scope, recv, recv_tag.encode() as i32);
            let sreq = process.immediate_send_with_tag(scope, send, send_tag.encode() as i32);
            rreq.wait();
            sreq.wait();
        });
        Ok(())
    }

    fn barrier(&self) {
        SimpleCommunicator::world().barrier();
    }
}
