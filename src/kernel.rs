//! Backend-agnostic pack/unpack kernels over rectangular index ranges.
//!
//! Packing a halo region is an embarrassingly parallel strided copy: every
//! element of a `(start, count, stride)` box, replicated per component, maps
//! to one slot of a contiguous staging buffer. The [`PackKernel`] trait lets
//! the same region description drive either the CPU loops here or the wgpu
//! compute shaders in [`crate::gpu`]; both must honor the canonical element
//! ordering so a region packed by one backend unpacks identically on another.

use crate::error::{Result, TemblorError};
use crate::wavefield::GridLayout;

/// A rectangular sub-region of a strided field, replicated per component.
///
/// Axis 0 is the fastest-varying. The canonical staging order for linear
/// index `l` is `l = ((c * count[2] + a2) * count[1] + a1) * count[0] + a0`,
/// i.e. components outermost, preserving component ordering across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    pub start: [usize; 3],
    pub count: [usize; 3],
    /// Element stride per axis. An axis with `count == 1` may use stride 0.
    pub stride: [usize; 3],
    /// Stride between consecutive components.
    pub cmp_stride: usize,
    /// Number of components to copy.
    pub ncmp: usize,
}

impl RegionSpec {
    /// A 3-D box within a volumetric [`GridLayout`], in padded coordinates.
    pub fn volume(layout: &GridLayout, start: [usize; 3], count: [usize; 3], ncmp: usize) -> Self {
        Self {
            start,
            count,
            stride: [1, layout.siz_iy, layout.siz_iz],
            cmp_stride: layout.siz_icmp,
            ncmp,
        }
    }

    /// Staging-buffer length for this region.
    pub fn len(&self) -> usize {
        self.count[0] * self.count[1] * self.count[2] * self.ncmp
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field offset of one element of the region.
    #[inline]
    pub fn field_offset(&self, c: usize, a0: usize, a1: usize, a2: usize) -> usize {
        c * self.cmp_stride
            + (self.start[0] + a0) * self.stride[0]
            + (self.start[1] + a1) * self.stride[1]
            + (self.start[2] + a2) * self.stride[2]
    }

    /// Field offset of the last element; used for bounds validation.
    fn max_field_offset(&self) -> usize {
        self.field_offset(
            self.ncmp - 1,
            self.count[0] - 1,
            self.count[1] - 1,
            self.count[2] - 1,
        )
    }

    pub(crate) fn validate(&self, field_len: usize, staging_len: usize) -> Result<()> {
        if self.is_empty() {
            return Err(TemblorError::Config(format!(
                "empty pack region {:?}",
                self
            )));
        }
        if staging_len != self.len() {
            return Err(TemblorError::Config(format!(
                "staging buffer holds {staging_len} elements, region needs {}",
                self.len()
            )));
        }
        if self.max_field_offset() >= field_len {
            return Err(TemblorError::Config(format!(
                "region {:?} exceeds field of {field_len} elements",
                self
            )));
        }
        Ok(())
    }
}

/// Data-parallel copy between a strided field region and a contiguous
/// staging buffer.
pub trait PackKernel {
    /// Gather the region into `staging` in canonical order.
    fn pack(&self, field: &[f32], region: &RegionSpec, staging: &mut [f32]) -> Result<()>;

    /// Scatter `staging` (canonical order) back into the region.
    fn unpack(&self, field: &mut [f32], region: &RegionSpec, staging: &[f32]) -> Result<()>;
}

/// Portable loop implementation. Reference semantics for every backend.
pub struct CpuKernel;

impl PackKernel for CpuKernel {
    fn pack(&self, field: &[f32], region: &RegionSpec, staging: &mut [f32]) -> Result<()> {
        region.validate(field.len(), staging.len())?;
        let mut l = 0;
        for c in 0..region.ncmp {
            for a2 in 0..region.count[2] {
                for a1 in 0..region.count[1] {
                    let row = region.field_offset(c, 0, a1, a2);
                    for a0 in 0..region.count[0] {
                        staging[l] = field[row + a0 * region.stride[0]];
                        l += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn unpack(&self, field: &mut [f32], region: &RegionSpec, staging: &[f32]) -> Result<()> {
        region.validate(field.len(), staging.len())?;
        let mut l = 0;
        for c in 0..region.ncmp {
            for a2 in 0..region.count[2] {
                for a1 in 0..region.count[1] {
                    let row = region.field_offset(c, 0, a1, a2);
                    for a0 in 0..region.count[0] {
                        field[row + a0 * region.stride[0]] = staging[l];
                        l += 1;
                    }
                }
            }
        }
        Ok(())
    }
}
