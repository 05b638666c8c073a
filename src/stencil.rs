//! Stencil descriptor: halo width and integrator stage bookkeeping.
//!
//! The MacCormack-DRP scheme sweeps through forward/backward operator pairs,
//! each advanced by a low-storage Runge-Kutta cycle. Every (pair, stage)
//! combination performs its own halo exchange, and in-flight messages from
//! different combinations must never alias the same staging buffer.

use crate::error::{Result, TemblorError};

/// Message tags reserve 4 bits each for the pair and stage indices.
pub const MAX_PAIRS: usize = 16;
pub const MAX_STAGES: usize = 16;

/// Halo width and stage-pair counts of the difference scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilSpec {
    /// Ghost planes required on each side of a partitioned axis.
    pub halo_width: usize,
    /// Forward/backward operator pair combinations per time step.
    pub num_pairs: usize,
    /// Runge-Kutta stages per pair.
    pub num_stages: usize,
}

impl StencilSpec {
    pub fn new(halo_width: usize, num_pairs: usize, num_stages: usize) -> Result<Self> {
        if halo_width == 0 || num_pairs == 0 || num_stages == 0 {
            return Err(TemblorError::Config(format!(
                "stencil spec must be non-zero: halo {halo_width}, pairs {num_pairs}, stages {num_stages}"
            )));
        }
        if num_pairs > MAX_PAIRS || num_stages > MAX_STAGES {
            return Err(TemblorError::Config(format!(
                "stencil spec exceeds the tag field widths: {num_pairs} pairs \
                 (max {MAX_PAIRS}), {num_stages} stages (max {MAX_STAGES})"
            )));
        }
        Ok(Self {
            halo_width,
            num_pairs,
            num_stages,
        })
    }

    /// The 7-point MacCormack-DRP operator: 3 ghost planes, 8 forward/backward
    /// pair combinations, 4-stage Runge-Kutta.
    pub fn macdrp() -> Self {
        Self {
            halo_width: 3,
            num_pairs: 8,
            num_stages: 4,
        }
    }

    /// Total number of independent exchange slots per direction.
    pub fn num_slots(&self) -> usize {
        self.num_pairs * self.num_stages
    }

    /// A halo wider than the local interior would make a rank read data two
    /// partitions away, which the four-neighbor exchange cannot provide.
    pub fn validate_extent(&self, axis: &str, interior: usize) -> Result<()> {
        if interior < self.halo_width {
            return Err(TemblorError::Config(format!(
                "local {axis} extent {interior} is smaller than halo width {}; \
                 use fewer ranks along {axis}",
                self.halo_width
            )));
        }
        Ok(())
    }
}
