//! The volumetric wavefield array and its strided layout.
//!
//! Storage is a single dense buffer indexed by (level, component, z, y, x)
//! with strides derived once at construction and invariant afterwards. The
//! multi-level axis carries the intermediate states of the low-storage
//! Runge-Kutta cycle; the exchange engines operate on one level at a time.

use crate::error::{Result, TemblorError};

/// Elastic first-order velocity-stress system: 3 velocities + 6 stresses.
pub const NUM_WAVE_COMPONENTS: usize = 9;

pub const WAVE_COMPONENT_NAMES: [&str; NUM_WAVE_COMPONENTS] = [
    "Vx", "Vy", "Vz", "Txx", "Tyy", "Tzz", "Txz", "Tyz", "Txy",
];

/// Padded extents and strides of one rank's sub-volume.
///
/// Interior extents are `(ni, nj, nk)`; every axis is padded by `halo` ghost
/// planes on both sides. The x-axis ghosts only ever hold physical
/// boundary-condition values since x is not partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub ni: usize,
    pub nj: usize,
    pub nk: usize,
    pub halo: usize,
    /// Padded extents.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Element stride for a +1 step in y.
    pub siz_iy: usize,
    /// Element stride for a +1 step in z.
    pub siz_iz: usize,
    /// Elements per component (one full padded volume).
    pub siz_icmp: usize,
}

impl GridLayout {
    pub fn new(ni: usize, nj: usize, nk: usize, halo: usize) -> Result<Self> {
        if ni == 0 || nj == 0 || nk == 0 {
            return Err(TemblorError::Config(format!(
                "grid extents must be non-zero, got {ni} x {nj} x {nk}"
            )));
        }
        let pad = halo.checked_mul(2).and_then(|p| {
            let nx = ni.checked_add(p)?;
            let ny = nj.checked_add(p)?;
            let nz = nk.checked_add(p)?;
            let siz_iz = nx.checked_mul(ny)?;
            let siz_icmp = siz_iz.checked_mul(nz)?;
            Some((nx, ny, nz, siz_iz, siz_icmp))
        });
        let (nx, ny, nz, siz_iz, siz_icmp) = pad
            .filter(|&(_, _, _, _, s)| (s as u128) * 4 <= isize::MAX as u128)
            .ok_or_else(|| TemblorError::Allocation {
                context: format!("grid layout {ni}x{nj}x{nk} halo {halo}"),
                bytes: (ni as u128 + 2 * halo as u128)
                    .saturating_mul(nj as u128 + 2 * halo as u128)
                    .saturating_mul(nk as u128 + 2 * halo as u128)
                    .saturating_mul(4),
            })?;
        Ok(Self {
            ni,
            nj,
            nk,
            halo,
            nx,
            ny,
            nz,
            siz_iy: nx,
            siz_iz,
            siz_icmp,
        })
    }

    /// Linear offset of a point given padded coordinates.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.siz_iy + k * self.siz_iz
    }
}

/// Dense multi-component, multi-level wavefield owned by one rank.
pub struct Wavefield {
    pub layout: GridLayout,
    pub ncmp: usize,
    pub nlevel: usize,
    /// Elements per integration level.
    pub siz_ilevel: usize,
    data: Vec<f32>,
}

impl Wavefield {
    pub fn new(layout: GridLayout, ncmp: usize, nlevel: usize) -> Result<Self> {
        let siz_ilevel = layout
            .siz_icmp
            .checked_mul(ncmp)
            .ok_or_else(|| TemblorError::Allocation {
                context: format!("wavefield level ({ncmp} components)"),
                bytes: (layout.siz_icmp as u128)
                    .saturating_mul(ncmp as u128)
                    .saturating_mul(4),
            })?;
        let total = siz_ilevel
            .checked_mul(nlevel)
            .filter(|&t| (t as u128) * 4 <= isize::MAX as u128)
            .ok_or_else(|| TemblorError::Allocation {
                context: format!("wavefield ({ncmp} components x {nlevel} levels)"),
                bytes: siz_ilevel as u128 * nlevel as u128 * 4,
            })?;
        tracing::debug!(
            nx = layout.nx,
            ny = layout.ny,
            nz = layout.nz,
            ncmp,
            nlevel,
            elements = total,
            "allocating wavefield"
        );
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
                "level {level} out of range 0..{}",
                self.nlevel
            )));
        }
        let start = level * self.siz_ilevel;
        Ok(start..start + self.siz_ilevel)
    }

    /// All components of one integration level.
    pub fn level(&self, level: usize) -> Result<&[f32]> {
        let r = self.level_range(level)?;
        Ok(&self.data[r])
    }

    pub fn level_mut(&mut self, level: usize) -> Result<&mut [f32]> {
        let r = self.level_range(level)?;
        Ok(&mut self.data[r])
    }

    /// One component of one level.
    pub fn component(&self, level: usize, cmp: usize) -> Result<&[f32]> {
        if cmp >= self.ncmp {
            return Err(TemblorError::Config(format!(
                "component {cmp} out of range 0..{}",
                self.ncmp
            )));
        }
        let r = self.level_range(level)?;
        let start = r.start + cmp * self.layout.siz_icmp;
        Ok(&self.data[start..start + self.layout.siz_icmp])
    }

    pub fn component_mut(&mut self, level: usize, cmp: usize) -> Result<&mut [f32]> {
        if cmp >= self.ncmp {
            return Err(TemblorError::Config(format!(
                "component {cmp} out of range 0..{}",
                self.ncmp
            )));
        }
        let r = self.level_range(level)?;
        let start = r.start + cmp * self.layout.siz_icmp;
        Ok(&mut self.data[start..start + self.layout.siz_icmp])
    }

    /// Scan one level for NaN/Inf.
    ///
    /// A non-finite value anywhere poisons every downstream rank at the next
    /// exchange, so the caller must treat this as fatal. The error names the
    /// first offending component for diagnostics.
    pub fn check_finite(&self, level: usize, rank: usize, step: usize) -> Result<()> {
        let slice = self.level(level)?;
        for (cmp, chunk) in slice.chunks(self.layout.siz_icmp).enumerate() {
            if chunk.iter().any(|v| !v.is_finite()) {
                let what = WAVE_COMPONENT_NAMES
                    .get(cmp)
                    .copied()
                    .unwrap_or("wavefield component");
                return Err(TemblorError::NonFinite {
                    what: what.to_string(),
                    rank,
                    step,
                    plane: None,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_follow_padded_extents() {
        let l = GridLayout::new(10, 20, 30, 3).unwrap();
        assert_eq!(l.nx, 16);
        assert_eq!(l.ny, 26);
        assert_eq!(l.nz, 36);
        assert_eq!(l.siz_iy, 16);
        assert_eq!(l.siz_iz, 16 * 26);
        assert_eq!(l.siz_icmp, 16 * 26 * 36);
        assert_eq!(l.idx(1, 2, 3), 1 + 2 * 16 + 3 * 16 * 26);
    }

    #[test]
    fn level_slices_are_disjoint() {
        let l = GridLayout::new(4, 4, 4, 1).unwrap();
        let mut w = Wavefield::new(l, 2, 2).unwrap();
        w.level_mut(1).unwrap()[0] = 7.0;
        assert_eq!(w.level(0).unwrap()[0], 0.0);
        assert_eq!(w.level(1).unwrap()[0], 7.0);
        assert_eq!(w.siz_ilevel, l.siz_icmp * 2);
    }

    #[test]
    fn component_slice_offsets() {
        let l = GridLayout::new(3, 3, 3, 1).unwrap();
        let mut w = Wavefield::new(l, 3, 1).unwrap();
        w.component_mut(0, 2).unwrap()[5] = 1.5;
        assert_eq!(w.level(0).unwrap()[2 * l.siz_icmp + 5], 1.5);
    }

    #[test]
    fn oversized_allocation_reports_requested_bytes() {
        let n = 1usize << 21;
        match GridLayout::new(n, n, n, 3) {
            Err(TemblorError::Allocation { bytes, .. }) => {
                assert_eq!(bytes, (n as u128 + 6).pow(3) * 4);
            }
            other => panic!("expected allocation error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_detected_with_component_name() {
        let l = GridLayout::new(4, 4, 4, 1).unwrap();
        let mut w = Wavefield::new(l, 9, 1).unwrap();
        w.component_mut(0, 3).unwrap()[10] = f32::NAN;
        let err = w.check_finite(0, 2, 17).unwrap_err();
        match err {
            TemblorError::NonFinite {
                what, rank, step, ..
            } => {
                assert_eq!(what, "Txx");
                assert_eq!(rank, 2);
                assert_eq!(step, 17);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
