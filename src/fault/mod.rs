//! Fault split-node state: geometry-derived coupling coefficients, the
//! 2-D fault-local wavefield, and the dynamic-rupture state model.
//!
//! A fault plane is embedded in the volumetric grid at a fixed x index; its
//! arrays span the same (y, z) index space as the enclosing grid but with a
//! reduced two-axis stride scheme. A rank may host segments of several
//! planes, each with its own id and independent exchange buffers.

pub mod coef;
pub mod state;

pub use coef::FaultCoef;
pub use state::{FaultPlane, RuptureState};

use crate::error::{Result, TemblorError};
use std::collections::BTreeMap;

/// Split-node sides, in storage order.
pub const MINUS_SIDE: usize = 0;
pub const PLUS_SIDE: usize = 1;
pub const NUM_SIDES: usize = 2;

/// Padded extents and strides of one rank's fault sub-plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultGridLayout {
    /// Interior extents along y and z.
    pub nj: usize,
    pub nk: usize,
    pub halo: usize,
    /// Padded extents.
    pub ny: usize,
    pub nz: usize,
    /// Elements per variable (one full padded slice).
    pub siz_slice: usize,
}

impl FaultGridLayout {
    pub fn new(nj: usize, nk: usize, halo: usize) -> Result<Self> {
        if nj == 0 || nk == 0 {
            return Err(TemblorError::Config(format!(
                "fault extents must be non-zero, got {nj} x {nk}"
            )));
        }
        let dims = halo.checked_mul(2).and_then(|p| {
            let ny = nj.checked_add(p)?;
            let nz = nk.checked_add(p)?;
            let siz_slice = ny.checked_mul(nz)?;
            Some((ny, nz, siz_slice))
        });
        let (ny, nz, siz_slice) = dims.ok_or_else(|| TemblorError::Allocation {
            context: format!("fault layout {nj}x{nk} halo {halo}"),
            bytes: (nj as u128 + 2 * halo as u128)
                .saturating_mul(nk as u128 + 2 * halo as u128)
                .saturating_mul(4),
        })?;
        Ok(Self {
            nj,
            nk,
            halo,
            ny,
            nz,
            siz_slice,
        })
    }

    /// Linear offset of a node given padded (j, k) coordinates.
    #[inline]
    pub fn idx(&self, j: usize, k: usize) -> usize {
        j + k * self.ny
    }
}

/// Fault-local wavefield: both split-node sides of every component, per
/// integration level.
///
/// Level slice layout is `[side][component][k][j]`, sides outermost, so one
/// exchange region with `2 * ncmp` components covers the whole slice.
pub struct FaultWavefield {
    pub layout: FaultGridLayout,
    /// Components per side.
    pub ncmp: usize,
    pub nlevel: usize,
    /// Elements per integration level (`2 * ncmp * siz_slice`).
    pub siz_ilevel: usize,
    data: Vec<f32>,
}

impl FaultWavefield {
    pub fn new(layout: FaultGridLayout, ncmp: usize, nlevel: usize) -> Result<Self> {
        let siz_ilevel = layout
            .siz_slice
            .checked_mul(ncmp)
            .and_then(|s| s.checked_mul(NUM_SIDES))
            .ok_or_else(|| TemblorError::Allocation {
                context: format!("fault wavefield level ({ncmp} components)"),
                bytes: (layout.siz_slice as u128)
                    .saturating_mul(ncmp as u128)
                    .saturating_mul(NUM_SIDES as u128)
                    .saturating_mul(4),
            })?;
        let total = siz_ilevel
            .checked_mul(nlevel)
            .filter(|&t| (t as u128) * 4 <= isize::MAX as u128)
            .ok_or_else(|| TemblorError::Allocation {
                context: format!("fault wavefield ({ncmp} components x {nlevel} levels)"),
                bytes: siz_ilevel as u128 * nlevel as u128 * 4,
            })?;
        Ok(Self {
            layout,
            ncmp,
            nlevel,
            siz_ilevel,
            data: vec![0.0; total],
        })
    }

    fn level_range(&self, level: usize) -> Result<std::ops::Range<usize>> {
        if level >= self.nlevel {
            return Err(TemblorError::Config(format!(
                "fault level {level} out of range 0..{}",
                self.nlevel
            )));
        }
        let start = level * self.siz_ilevel;
        Ok(start..start + self.siz_ilevel)
    }

    pub fn level(&self, level: usize) -> Result<&[f32]> {
        let r = self.level_range(level)?;
        Ok(&self.data[r])
    }

    pub fn level_mut(&mut self, level: usize) -> Result<&mut [f32]> {
        let r = self.level_range(level)?;
        Ok(&mut self.data[r])
    }

    /// One component of one split-node side.
    pub fn side_component(&self, level: usize, side: usize, cmp: usize) -> Result<&[f32]> {
        if side >= NUM_SIDES || cmp >= self.ncmp {
            return Err(TemblorError::Config(format!(
                "fault side {side} / component {cmp} out of range"
            )));
        }
        let r = self.level_range(level)?;
        let start = r.start + (side * self.ncmp + cmp) * self.layout.siz_slice;
        Ok(&self.data[start..start + self.layout.siz_slice])
    }

    pub fn side_component_mut(&mut self, level: usize, side: usize, cmp: usize) -> Result<&mut [f32]> {
        if side >= NUM_SIDES || cmp >= self.ncmp {
            return Err(TemblorError::Config(format!(
                "fault side {side} / component {cmp} out of range"
            )));
        }
        let r = self.level_range(level)?;
        let start = r.start + (side * self.ncmp + cmp) * self.layout.siz_slice;
        Ok(&mut self.data[start..start + self.layout.siz_slice])
    }

    pub fn check_finite(&self, level: usize, rank: usize, step: usize, plane: usize) -> Result<()> {
        if self.level(level)?.iter().any(|v| !v.is_finite()) {
            return Err(TemblorError::NonFinite {
                what: "fault wavefield".into(),
                rank,
                step,
                plane: Some(plane),
            });
        }
        Ok(())
    }
}

/// The fault planes hosted by one rank, keyed by plane id.
///
/// Dynamically sized: there is no fixed cap on the number of planes.
pub struct FaultSet {
    /// Interior x extent of the enclosing local grid.
    ni: usize,
    planes: BTreeMap<usize, FaultEntry>,
}

pub struct FaultEntry {
    /// x grid index the plane is embedded at, in local interior coordinates.
    pub x_index: usize,
    pub coef: FaultCoef,
    pub state: FaultPlane,
}

impl FaultSet {
    pub fn new(ni: usize) -> Self {
        Self {
            ni,
            planes: BTreeMap::new(),
        }
    }

    /// Register a plane. The x index must fall inside the local partition.
    pub fn insert(
        &mut self,
        id: usize,
        x_index: usize,
        coef: FaultCoef,
        state: FaultPlane,
    ) -> Result<()> {
        if x_index >= self.ni {
            return Err(TemblorError::Config(format!(
                "fault plane {id} at x index {x_index} is outside the local partition (ni = {})",
                self.ni
            )));
        }
        if coef.layout != state.layout {
            return Err(TemblorError::Config(format!(
                "fault plane {id}: coefficient and state layouts differ"
            )));
        }
        if self.planes.contains_key(&id) {
            return Err(TemblorError::Config(format!("duplicate fault plane id {id}")));
        }
        self.planes.insert(id, FaultEntry { x_index, coef, state });
        Ok(())
    }

    pub fn get(&self, id: usize) -> Option<&FaultEntry> {
        self.planes.get(&id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut FaultEntry> {
        self.planes.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.planes.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut FaultEntry)> {
        self.planes.iter_mut().map(|(&id, e)| (id, e))
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}
