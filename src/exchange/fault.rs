//! Halo exchange for fault split-node state.
//!
//! Fault planes live on a 2-D (y, z) index space; their exchange reuses the
//! volumetric machinery with the third region axis collapsed. Every plane a
//! rank hosts gets its own staging pools, and the plane id rides in the
//! message tag, so segments of different planes crossing the same rank
//! boundary can never be confused.
//!
//! Two variable families travel here: the split-node wavefield (both sides
//! of every component, exchanged per (pair, stage) like the volumetric
//! field) and the friction-law outputs (tractions, slip, slip rate),
//! exchanged once per friction sweep.

use super::comm::CommunicationBackend;
use super::{BufferPool, ExchangeFamily, ExchangeTag};
use crate::error::{Result, TemblorError};
use crate::fault::state::NUM_FAULT_OUTPUT_VARS;
use crate::fault::{FaultGridLayout, FaultPlane, FaultWavefield, NUM_SIDES};
use crate::kernel::{PackKernel, RegionSpec};
use crate::stencil::StencilSpec;
use crate::topology::{Direction, Neighbor, NeighborTable};
use std::collections::BTreeMap;

/// Plane ids must leave room for the +1 bias in the tag encoding.
const MAX_PLANE_ID: usize = 510;

struct PlanePools {
    /// Split-node wavefield slots, one per (pair, stage, direction).
    wave: BufferPool,
    /// Friction-output slots; one sweep in flight at a time.
    out: BufferPool,
}

/// Per-rank context for fault-plane halo exchange.
///
/// All hosted planes share one layout and neighbor table; they differ only
/// in id and staging pools. Planes are registered up front so allocation
/// happens once, before time stepping.
pub struct FaultExchange {
    layout: FaultGridLayout,
    stencil: StencilSpec,
    table: NeighborTable,
    /// Components per split-node side.
    ncmp: usize,
    pools: BTreeMap<usize, PlanePools>,
}

impl FaultExchange {
    pub fn new(
        layout: FaultGridLayout,
        stencil: StencilSpec,
        table: NeighborTable,
        ncmp: usize,
    ) -> Result<Self> {
        if layout.halo != stencil.halo_width {
            return Err(TemblorError::Config(format!(
                "fault grid padded for halo {} but stencil needs {}",
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
        Ok(Self {
            layout,
            stencil,
            table,
            ncmp,
            pools: BTreeMap::new(),
        })
    }

    /// Allocate staging pools for one hosted plane segment.
    pub fn add_plane(&mut self, id: usize) -> Result<()> {
        if id > MAX_PLANE_ID {
            return Err(TemblorError::Config(format!(
                "fault plane id {id} exceeds the tag limit of {MAX_PLANE_ID}"
            )));
        }
        if self.pools.contains_key(&id) {
            return Err(TemblorError::Config(format!("duplicate fault plane id {id}")));
        }
        let h = self.stencil.halo_width;
        let lens = |nvar: usize| -> Result<[usize; 4]> {
            let cross = |c: usize| -> Result<usize> {
                c.checked_mul(h)
                    .and_then(|n| n.checked_mul(nvar))
                    .ok_or_else(|| TemblorError::Allocation {
                        context: format!("fault plane {id} staging buffer"),
                        bytes: (c as u128)
                            .saturating_mul(h as u128)
                            .saturating_mul(nvar as u128)
                            .saturating_mul(4),
                    })
            };
            let y = cross(self.layout.nk)?;
            let z = cross(self.layout.nj)?;
            Ok([y, y, z, z])
        };
        let wave = BufferPool::new(
            "fault wavefield exchange",
            self.stencil.num_pairs,
            self.stencil.num_stages,
            lens(NUM_SIDES * self.ncmp)?,
        )?;
        let out = BufferPool::new(
            "fault output exchange",
            1,
            1,
            lens(NUM_FAULT_OUTPUT_VARS)?,
        )?;
        self.pools.insert(id, PlanePools { wave, out });
        Ok(())
    }

    pub fn plane_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.pools.keys().copied()
    }

    fn pools_mut(&mut self, id: usize) -> Result<&mut PlanePools> {
        self.pools.get_mut(&id).ok_or_else(|| {
            TemblorError::Config(format!("fault plane {id} has no registered exchange pools"))
        })
    }

    /// One boundary strip of the padded plane, with the third region axis
    /// collapsed.
    fn strip(&self, dir: Direction, ghost: bool, nvar: usize) -> RegionSpec {
        let l = &self.layout;
        let h = self.stencil.halo_width;
        let (start, count) = match (dir, ghost) {
            (Direction::YMinus, false) => ([h, h], [h, l.nk]),
            (Direction::YPlus, false) => ([l.nj, h], [h, l.nk]),
            (Direction::ZMinus, false) => ([h, h], [l.nj, h]),
            (Direction::ZPlus, false) => ([h, l.nk], [l.nj, h]),
            (Direction::YMinus, true) => ([0, h], [h, l.nk]),
            (Direction::YPlus, true) => ([h + l.nj, h], [h, l.nk]),
            (Direction::ZMinus, true) => ([h, 0], [l.nj, h]),
            (Direction::ZPlus, true) => ([h, h + l.nk], [l.nj, h]),
        };
        RegionSpec {
            start: [start[0], start[1], 0],
            count: [count[0], count[1], 1],
            stride: [1, l.ny, 0],
            cmp_stride: l.siz_slice,
            ncmp: nvar,
        }
    }

    fn tag(&self, family: ExchangeFamily, pair: usize, stage: usize, dir: Direction, id: usize) -> ExchangeTag {
        ExchangeTag {
            family,
            pair,
            stage,
            direction: dir,
            plane: Some(id),
        }
    }

    /// Exchange the split-node wavefield of one plane for one (pair, stage).
    ///
    /// Same three-phase contract as the volumetric exchange: boundary skip,
    /// staged local copy for a self-neighbor, ghosts filled only from real
    /// neighbors.
    pub fn exchange_wavefield(
        &mut self,
        id: usize,
        fw: &mut FaultWavefield,
        level: usize,
        pair: usize,
        stage: usize,
        comm: &dyn CommunicationBackend,
        kernel: &dyn PackKernel,
    ) -> Result<()> {
        if fw.layout != self.layout {
            return Err(TemblorError::Config(
                "fault wavefield layout does not match exchange context".into(),
            ));
        }
        if fw.ncmp != self.ncmp {
            return Err(TemblorError::Config(format!(
                "fault wavefield has {} components per side, exchange sized for {}",
                fw.ncmp, self.ncmp
            )));
        }
        let nvar = NUM_SIDES * self.ncmp;
        let table = self.table;
        let me = comm.rank();
        let field = fw.level_mut(level)?;

        for (dir, _) in table.exchange_directions() {
            let region = self.strip(dir, false, nvar);
            let n = region.len();
            let slot = self.pools_mut(id)?.wave.slot_mut(pair, stage, dir)?;
            kernel.pack(field, &region, &mut slot.send[..n])?;
        }

        for (dir, peer) in table.exchange_directions() {
            let n = self.strip(dir, false, nvar).len();
            if peer == me {
                self.pools_mut(id)?
                    .wave
                    .local_copy(pair, stage, dir.opposite(), dir, n)?;
            } else {
                tracing::trace!(?dir, peer, pair, stage, plane = id, "fault wavefield sendrecv");
                let send_tag = self.tag(ExchangeFamily::FaultWavefield, pair, stage, dir, id);
                let recv_tag =
                    self.tag(ExchangeFamily::FaultWavefield, pair, stage, dir.opposite(), id);
                let slot = self.pools_mut(id)?.wave.slot_mut(pair, stage, dir)?;
                comm.sendrecv(peer, send_tag, recv_tag, &slot.send[..n], &mut slot.recv[..n])?;
            }
        }

        for (dir, _) in table.exchange_directions() {
            let region = self.strip(dir, true, nvar);
            let n = region.len();
            let slot = self.pools_mut(id)?.wave.slot_mut(pair, stage, dir)?;
            kernel.unpack(field, &region, &slot.recv[..n])?;
        }
        Ok(())
    }

    /// Exchange the friction-law output variables of one plane.
    ///
    /// The nine published variables live in separate arrays, so each is
    /// packed into its own segment of the direction's staging buffer; one
    /// message per direction carries the whole set.
    pub fn exchange_outputs(
        &mut self,
        id: usize,
        plane: &mut FaultPlane,
        comm: &dyn CommunicationBackend,
        kernel: &dyn PackKernel,
    ) -> Result<()> {
        if plane.layout != self.layout {
            return Err(TemblorError::Config(
                "fault plane layout does not match exchange context".into(),
            ));
        }
        let table = self.table;
        let me = comm.rank();

        for (dir, _) in table.exchange_directions() {
            let region = self.strip(dir, false, 1);
            let seg = region.len();
            let vars = plane.output_vars();
            let slot = self.pools_mut(id)?.out.slot_mut(0, 0, dir)?;
            for (v, var) in vars.iter().enumerate() {
                kernel.pack(var, &region, &mut slot.send[v * seg..(v + 1) * seg])?;
            }
        }

        for (dir, peer) in table.exchange_directions() {
            let n = self.strip(dir, false, 1).len() * NUM_FAULT_OUTPUT_VARS;
            if peer == me {
                self.pools_mut(id)?
                    .out
                    .local_copy(0, 0, dir.opposite(), dir, n)?;
            } else {
                tracing::trace!(?dir, peer, plane = id, "fault output sendrecv");
                let send_tag = self.tag(ExchangeFamily::FaultOutput, 0, 0, dir, id);
                let recv_tag = self.tag(ExchangeFamily::FaultOutput, 0, 0, dir.opposite(), id);
                let slot = self.pools_mut(id)?.out.slot_mut(0, 0, dir)?;
                comm.sendrecv(peer, send_tag, recv_tag, &slot.send[..n], &mut slot.recv[..n])?;
            }
        }

        for (dir, _) in table.exchange_directions() {
            let region = self.strip(dir, true, 1);
            let seg = region.len();
            // Stage the arrivals out of the pool first; the unpack below
            // needs the plane borrowed mutably.
            let recv = {
                let slot = self.pools_mut(id)?.out.slot_mut(0, 0, dir)?;
                slot.recv[..seg * NUM_FAULT_OUTPUT_VARS].to_vec()
            };
            for (v, var) in plane.output_vars_mut().iter_mut().enumerate() {
                kernel.unpack(var, &region, &recv[v * seg..(v + 1) * seg])?;
            }
        }
        Ok(())
    }
}
