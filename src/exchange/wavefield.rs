//! Halo exchange for the volumetric wavefield.
//!
//! Pack, transport, and unpack are three strictly ordered phases: every
//! boundary-adjacent plane is staged before the first message leaves, and no
//! ghost plane is written until its message has fully arrived. After
//! `exchange` returns, every ghost cell adjacent to a real neighbor holds
//! that neighbor's interior values for the requested (pair, stage) and no
//! other region of the array has been touched. The round trip is equivalent
//! to a direct remote read of the neighbor's boundary planes; that contract
//! holds regardless of the transport backend.

use super::comm::CommunicationBackend;
use super::{BufferPool, ExchangeFamily, ExchangeTag};
use crate::error::{Result, TemblorError};
use crate::kernel::{PackKernel, RegionSpec};
use crate::stencil::StencilSpec;
use crate::topology::{Direction, Neighbor, NeighborTable};
use crate::wavefield::{GridLayout, Wavefield};

/// Per-rank context for volumetric halo exchange.
pub struct WavefieldExchange {
    layout: GridLayout,
    stencil: StencilSpec,
    table: NeighborTable,
    ncmp_max: usize,
    pool: BufferPool,
}

impl WavefieldExchange {
    /// Validate the topology against the stencil and allocate staging slots.
    ///
    /// Fails with a config error if the halo is wider than the local interior
    /// along an exchanged axis, and with an allocation error if the staging
    /// sizes overflow.
    pub fn new(
        layout: GridLayout,
        stencil: StencilSpec,
        table: NeighborTable,
        ncmp_max: usize,
    ) -> Result<Self> {
        if layout.halo != stencil.halo_width {
            return Err(TemblorError::Config(format!(
                "grid padded for halo {} but stencil needs {}",
                layout.halo, stencil.halo_width
            )));
        }
        let has_y = Direction::ALL[..2].iter().any(|&d| table.get(d) != Neighbor::Boundary);
        let has_z = Direction::ALL[2..].iter().any(|&d| table.get(d) != Neighbor::Boundary);
        if has_y {
            stencil.validate_extent("y", layout.nj)?;
        }
        if has_z {
            stencil.validate_extent("z", layout.nk)?;
        }

        let h = stencil.halo_width;
        let len = |a: usize, b: usize| -> Result<usize> {
            a.checked_mul(b)
                .and_then(|c| c.checked_mul(h))
                .and_then(|c| c.checked_mul(ncmp_max))
                .ok_or_else(|| TemblorError::Allocation {
                    context: "wavefield staging buffer".into(),
                    bytes: (a as u128)
                        .saturating_mul(b as u128)
                        .saturating_mul(h as u128)
                        .saturating_mul(ncmp_max as u128)
                        .saturating_mul(4),
                })
        };
        let y_len = len(layout.ni, layout.nk)?;
        let z_len = len(layout.ni, layout.nj)?;
        let pool = BufferPool::new(
            "wavefield exchange",
            stencil.num_pairs,
            stencil.num_stages,
            [y_len, y_len, z_len, z_len],
        )?;
        Ok(Self {
            layout,
            stencil,
            table,
            ncmp_max,
            pool,
        })
    }

    /// Staging size for one direction at the maximum variable count.
    pub fn buffer_len(&self, dir: Direction) -> usize {
        self.pool.buffer_len(dir)
    }

    pub fn neighbor_table(&self) -> &NeighborTable {
        &self.table
    }

    /// The interior planes a neighbor needs from this rank.
    fn send_region(&self, dir: Direction, ncmp: usize) -> RegionSpec {
        let l = &self.layout;
        let h = self.stencil.halo_width;
        let (start, count) = match dir {
            Direction::YMinus => ([h, h, h], [l.ni, h, l.nk]),
            Direction::YPlus => ([h, l.nj, h], [l.ni, h, l.nk]),
            Direction::ZMinus => ([h, h, h], [l.ni, l.nj, h]),
            Direction::ZPlus => ([h, h, l.nk], [l.ni, l.nj, h]),
        };
        RegionSpec::volume(l, start, count, ncmp)
    }

    /// The ghost planes this rank fills from a neighbor.
    fn ghost_region(&self, dir: Direction, ncmp: usize) -> RegionSpec {
        let l = &self.layout;
        let h = self.stencil.halo_width;
        let (start, count) = match dir {
            Direction::YMinus => ([h, 0, h], [l.ni, h, l.nk]),
            Direction::YPlus => ([h, h + l.nj, h], [l.ni, h, l.nk]),
            Direction::ZMinus => ([h, h, 0], [l.ni, l.nj, h]),
            Direction::ZPlus => ([h, h, h + l.nk], [l.ni, l.nj, h]),
        };
        RegionSpec::volume(l, start, count, ncmp)
    }

    fn tag(&self, pair: usize, stage: usize, dir: Direction) -> ExchangeTag {
        ExchangeTag {
            family: ExchangeFamily::Wavefield,
            pair,
            stage,
            direction: dir,
            plane: None,
        }
    }

    /// Exchange the first `ncmp` components of one integration level.
    ///
    /// Directions whose neighbor is a physical boundary are skipped entirely;
    /// their ghost values belong to the boundary-condition module. A rank
    /// that is its own neighbor (periodic axis of size 1) is resolved as a
    /// staged local copy, never a message to self.
    pub fn exchange(
        &mut self,
        wavefield: &mut Wavefield,
        level: usize,
        pair: usize,
        stage: usize,
        ncmp: usize,
        comm: &dyn CommunicationBackend,
        kernel: &dyn PackKernel,
    ) -> Result<()> {
        if ncmp > self.ncmp_max {
            return Err(TemblorError::Config(format!(
                "exchange of {ncmp} components exceeds pool sized for {}",
                self.ncmp_max
            )));
        }
        if wavefield.layout != self.layout {
            return Err(TemblorError::Config(
                "wavefield layout does not match exchange context".into(),
            ));
        }
        let table = self.table;
        let me = comm.rank();
        let field = wavefield.level_mut(level)?;

        // Phase 1: stage every outgoing boundary plane.
        for (dir, _) in table.exchange_directions() {
            let region = self.send_region(dir, ncmp);
            let n = region.len();
            let slot = self.pool.slot_mut(pair, stage, dir)?;
            kernel.pack(field, &region, &mut slot.send[..n])?;
        }

        // Phase 2: transport. All packs are complete, so a self-neighbor can
        // read the opposite side's staged planes directly.
        for (dir, peer) in table.exchange_directions() {
            let n = self.send_region(dir, ncmp).len();
            if peer == me {
                self.pool.local_copy(pair, stage, dir.opposite(), dir, n)?;
            } else {
                tracing::trace!(?dir, peer, pair, stage, "wavefield sendrecv");
                let send_tag = self.tag(pair, stage, dir);
                let recv_tag = self.tag(pair, stage, dir.opposite());
                let slot = self.pool.slot_mut(pair, stage, dir)?;
                comm.sendrecv(peer, send_tag, recv_tag, &slot.send[..n], &mut slot.recv[..n])?;
            }
        }

        // Phase 3: scatter arrivals into ghost planes.
        for (dir, _) in table.exchange_directions() {
            let region = self.ghost_region(dir, ncmp);
            let n = region.len();
            let slot = self.pool.slot_mut(pair, stage, dir)?;
            kernel.unpack(field, &region, &slot.recv[..n])?;
        }
        Ok(())
    }
}
