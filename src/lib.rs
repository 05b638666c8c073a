//! Halo-exchange and fault split-node core for a distributed, GPU-accelerated
//! curvilinear finite-difference rupture solver.
//!
//! The domain is partitioned across ranks along the two lateral axes (y, z).
//! Each rank owns a sub-volume of the elastic wavefield and, where a rupture
//! plane crosses its partition, a sub-plane of fault split-node state. This
//! crate provides everything needed to keep ghost regions consistent across
//! rank boundaries at every sub-stage of the MacCormack-DRP time integrator:
//!
//! - [`topology`]: the 2-D process grid and per-rank neighbor table
//! - [`stencil`]: halo width and operator-pair/stage bookkeeping
//! - [`wavefield`]: the strided 5-D wavefield array
//! - [`kernel`]: backend-agnostic pack/unpack over rectangular index ranges
//! - [`gpu`]: wgpu compute-shader implementation of the pack/unpack kernels
//! - [`exchange`]: staging buffers, communication backends, and the wavefield
//!   and fault halo-exchange engines
//! - [`fault`]: split-node coupling coefficients and slip-weakening rupture
//!   state
//!
//! Grid generation, material models, absorbing boundaries, and file output are
//! external collaborators; this crate only consumes their descriptors.

pub mod error;
pub mod exchange;
pub mod fault;
pub mod gpu;
pub mod kernel;
pub mod shaders;
pub mod stencil;
pub mod topology;
pub mod wavefield;
