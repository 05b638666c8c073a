//! WGSL compute shader sources for the halo pack/unpack kernels.
//!
//! Both entry points consume the same `RegionParams` uniform, mirroring
//! `crate::kernel::RegionSpec`. One thread handles one staging-buffer slot;
//! the canonical element ordering (components outermost, axis 0 innermost)
//! matches the CPU kernel exactly so packed buffers are interchangeable
//! between backends.

/// WGSL source containing the halo staging kernels.
///
/// Entry points:
/// - `pack_region`: staging[l] = field[offset(l)]
/// - `unpack_region`: field[offset(l)] = staging[l]
pub const SHADER_SOURCE: &str = r#"
// ============================================================
// Temblor halo staging kernels
// ============================================================

struct RegionParams {
    start0: u32,
    start1: u32,
    start2: u32,
    count0: u32,
    count1: u32,
    count2: u32,
    stride0: u32,
    stride1: u32,
    stride2: u32,
    cmp_stride: u32,
    ncmp: u32,
    total: u32,
}

fn field_offset(params: RegionParams, l: u32) -> u32 {
    let per_cmp = params.count0 * params.count1 * params.count2;
    let c = l / per_cmp;
    var rem = l % per_cmp;
    let a2 = rem / (params.count0 * params.count1);
    rem = rem % (params.count0 * params.count1);
    let a1 = rem / params.count0;
    let a0 = rem % params.count0;
    return c * params.cmp_stride
        + (params.start0 + a0) * params.stride0
        + (params.start1 + a1) * params.stride1
        + (params.start2 + a2) * params.stride2;
}

// --- pack: gather field region into contiguous staging ---

@group(0) @binding(0) var<storage, read> pack_field: array<f32>;
@group(0) @binding(1) var<storage, read_write> pack_staging: array<f32>;
@group(0) @binding(2) var<uniform> pack_params: RegionParams;

@compute @workgroup_size(64)
fn pack_region(@builtin(global_invocation_id) gid: vec3<u32>) {
    let l = gid.x;
    if l >= pack_params.total {
        return;
    }
    pack_staging[l] = pack_field[field_offset(pack_params, l)];
}

// --- unpack: scatter staging back into field region ---

@group(0) @binding(0) var<storage, read_write> unpack_field: array<f32>;
@group(0) @binding(1) var<storage, read> unpack_staging: array<f32>;
@group(0) @binding(2) var<uniform> unpack_params: RegionParams;

@compute @workgroup_size(64)
fn unpack_region(@builtin(global_invocation_id) gid: vec3<u32>) {
    let l = gid.x;
    if l >= unpack_params.total {
        return;
    }
    unpack_field[field_offset(unpack_params, l)] = unpack_staging[l];
}
"#;
