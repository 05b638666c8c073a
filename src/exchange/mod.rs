//! Halo-exchange engines, staging buffers, and communication backends.
//!
//! Each (direction, pair, stage) combination owns a dedicated send/receive
//! staging slot, allocated once at setup and reused for the whole run. Slot
//! ownership is the concurrency discipline: the stage loop serializes reuse,
//! so no locking is needed and overlapping in-flight stages can never alias
//! a buffer. Messages carry a tag encoding the slot identity plus the fault
//! plane (when applicable) so a mismatched exchange is detected, not silently
//! absorbed.

pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod fault;
pub mod wavefield;

pub use comm::{CommunicationBackend, LocalBus, SingleProcessComm};
pub use fault::FaultExchange;
pub use wavefield::WavefieldExchange;

use crate::error::{Result, TemblorError};
use crate::topology::Direction;

/// Which variable family a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeFamily {
    Wavefield,
    FaultWavefield,
    FaultOutput,
}

impl ExchangeFamily {
    fn code(self) -> u32 {
        match self {
            ExchangeFamily::Wavefield => 0,
            ExchangeFamily::FaultWavefield => 1,
            ExchangeFamily::FaultOutput => 2,
        }
    }
}

/// Identity of one in-flight halo message.
///
/// Encoded into the transport tag so that messages from different stages,
/// directions, or fault planes can never be confused for one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTag {
    pub family: ExchangeFamily,
    pub pair: usize,
    pub stage: usize,
    /// Direction of travel, from the sender's perspective.
    pub direction: Direction,
    pub plane: Option<usize>,
}

impl ExchangeTag {
    /// Pack into a transport tag. Fits comfortably in an MPI tag (i32 > 0).
    pub fn encode(&self) -> u32 {
        debug_assert!(self.stage < 16 && self.pair < 16);
        let plane = self.plane.map(|p| p as u32 + 1).unwrap_or(0);
        debug_assert!(plane < 512);
        self.direction.index() as u32
            | (self.stage as u32) << 2
            | (self.pair as u32) << 6
            | self.family.code() << 10
            | plane << 12
    }
}

/// One send/receive staging pair.
pub struct Slot {
    pub send: Vec<f32>,
    pub recv: Vec<f32>,
}

/// Device-resident staging buffers, one slot per (direction, pair, stage).
///
/// Sized once from the stencil halo width, the cross-section extent of each
/// direction, and the maximum variable count; exchanges for fewer variables
/// use a prefix of the slot.
pub struct BufferPool {
    num_pairs: usize,
    num_stages: usize,
    lens: [usize; 4],
    slots: Vec<Slot>,
}

fn alloc_f32(context: &str, n: usize) -> Result<Vec<f32>> {
    let mut v: Vec<f32> = Vec::new();
    v.try_reserve_exact(n).map_err(|_| TemblorError::Allocation {
        context: context.to_string(),
        bytes: n as u128 * 4,
    })?;
    v.resize(n, 0.0);
    Ok(v)
}

impl BufferPool {
    /// Allocate all slots. `lens[d]` is the element count for direction `d`
    /// at the maximum variable count.
    pub fn new(context: &str, num_pairs: usize, num_stages: usize, lens: [usize; 4]) -> Result<Self> {
        let total = lens
            .iter()
            .try_fold(0usize, |acc, &l| acc.checked_add(l))
            .and_then(|t| t.checked_mul(num_pairs))
            .and_then(|t| t.checked_mul(num_stages))
            .and_then(|t| t.checked_mul(2))
            .ok_or_else(|| TemblorError::Allocation {
                context: context.to_string(),
                bytes: lens
                    .iter()
                    .map(|&l| l as u128)
                    .sum::<u128>()
                    .saturating_mul(num_pairs as u128)
                    .saturating_mul(num_stages as u128)
                    .saturating_mul(2 * 4),
            })?;
        tracing::debug!(context, num_pairs, num_stages, elements = total, "allocating staging pool");

        let mut slots = Vec::with_capacity(num_pairs * num_stages * 4);
        for _ in 0..num_pairs * num_stages {
            for &len in &lens {
                slots.push(Slot {
                    send: alloc_f32(context, len)?,
                    recv: alloc_f32(context, len)?,
                });
            }
        }
        Ok(Self {
            num_pairs,
            num_stages,
            lens,
            slots,
        })
    }

    pub fn buffer_len(&self, dir: Direction) -> usize {
        self.lens[dir.index()]
    }

    fn slot_index(&self, pair: usize, stage: usize, dir: Direction) -> Result<usize> {
        if pair >= self.num_pairs || stage >= self.num_stages {
            return Err(TemblorError::Config(format!(
                "exchange slot ({pair}, {stage}) outside {} pairs x {} stages",
                self.num_pairs, self.num_stages
            )));
        }
        Ok((pair * self.num_stages + stage) * 4 + dir.index())
    }

    pub fn slot_mut(&mut self, pair: usize, stage: usize, dir: Direction) -> Result<&mut Slot> {
        let idx = self.slot_index(pair, stage, dir)?;
        Ok(&mut self.slots[idx])
    }

    /// Self-neighbor shortcut: move the packed send planes of `from` straight
    /// into the receive slot of `to`, bypassing the transport. Used when a
    /// periodic axis has a single rank and the general two-sided path would
    /// have the rank message itself.
    pub fn local_copy(
        &mut self,
        pair: usize,
        stage: usize,
        from: Direction,
        to: Direction,
        len: usize,
    ) -> Result<()> {
        let ia = self.slot_index(pair, stage, from)?;
        let ib = self.slot_index(pair, stage, to)?;
        if ia == ib {
            return Err(TemblorError::Exchange(
                "local copy between identical slots".into(),
            ));
        }
        let (a, b) = if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            (&lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            (&hi[0], &mut lo[ib])
        };
        b.recv[..len].copy_from_slice(&a.send[..len]);
        Ok(())
    }
}
