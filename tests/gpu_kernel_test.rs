//! Integration tests comparing the GPU and CPU pack kernels.
//!
//! The two backends must agree bit-for-bit on the canonical staging order:
//! a region packed on one side has to unpack identically on the other, or
//! cross-backend runs would corrupt ghost cells at rank boundaries.

use temblor::exchange::{SingleProcessComm, WavefieldExchange};
use temblor::gpu::GpuKernel;
use temblor::kernel::{CpuKernel, PackKernel, RegionSpec};
use temblor::stencil::StencilSpec;
use temblor::topology::ProcessGrid;
use temblor::wavefield::{GridLayout, Wavefield};

fn gpu_available() -> bool {
    GpuKernel::new().is_ok()
}

macro_rules! skip_if_no_gpu {
    () => {
        if !gpu_available() {
            eprintln!("Skipping: no GPU available");
            return;
        }
    };
}

fn demo_field(layout: &GridLayout, ncmp: usize) -> Vec<f32> {
    (0..layout.siz_icmp * ncmp).map(|i| (i % 977) as f32 * 0.25).collect()
}

#[test]
fn gpu_pack_matches_cpu_pack() {
    skip_if_no_gpu!();
    let gpu = GpuKernel::new().unwrap();
    let layout = GridLayout::new(5, 6, 7, 3).unwrap();
    let ncmp = 4;
    let field = demo_field(&layout, ncmp);
    let region = RegionSpec::volume(&layout, [3, 6, 3], [5, 3, 7], ncmp);

    let mut cpu_out = vec![0.0; region.len()];
    let mut gpu_out = vec![0.0; region.len()];
    CpuKernel.pack(&field, &region, &mut cpu_out).unwrap();
    gpu.pack(&field, &region, &mut gpu_out).unwrap();
    assert_eq!(cpu_out, gpu_out);
}

#[test]
fn gpu_unpack_matches_cpu_unpack() {
    skip_if_no_gpu!();
    let gpu = GpuKernel::new().unwrap();
    let layout = GridLayout::new(5, 6, 7, 3).unwrap();
    let ncmp = 2;
    let region = RegionSpec::volume(&layout, [3, 3, 3], [5, 6, 3], ncmp);
    let staging: Vec<f32> = (0..region.len()).map(|i| i as f32 + 0.5).collect();

    let mut cpu_field = vec![0.0f32; layout.siz_icmp * ncmp];
    let mut gpu_field = cpu_field.clone();
    CpuKernel.unpack(&mut cpu_field, &region, &staging).unwrap();
    gpu.unpack(&mut gpu_field, &region, &staging).unwrap();
    assert_eq!(cpu_field, gpu_field);
}

#[test]
fn gpu_handles_planar_fault_regions() {
    skip_if_no_gpu!();
    let gpu = GpuKernel::new().unwrap();
    // A 2-D strip with the third axis collapsed, as the fault engine builds.
    let region = RegionSpec {
        start: [2, 2, 0],
        count: [3, 8, 1],
        stride: [1, 12, 0],
        cmp_stride: 12 * 10,
        ncmp: 6,
    };
    let field: Vec<f32> = (0..12 * 10 * 6).map(|i| (i as f32).sin()).collect();

    let mut cpu_out = vec![0.0; region.len()];
    let mut gpu_out = vec![0.0; region.len()];
    CpuKernel.pack(&field, &region, &mut cpu_out).unwrap();
    gpu.pack(&field, &region, &mut gpu_out).unwrap();
    assert_eq!(cpu_out, gpu_out);
}

#[test]
fn gpu_rejects_out_of_bounds_regions_like_cpu() {
    skip_if_no_gpu!();
    let gpu = GpuKernel::new().unwrap();
    let layout = GridLayout::new(4, 4, 4, 1).unwrap();
    let field = vec![0.0f32; layout.siz_icmp];
    let region = RegionSpec::volume(&layout, [0, 0, 0], [layout.nx + 1, 1, 1], 1);
    let mut staging = vec![0.0; region.len()];
    assert!(gpu.pack(&field, &region, &mut staging).is_err());

    let mut field = field;
    assert!(gpu.unpack(&mut field, &region, &staging).is_err());
}

#[test]
fn exchange_is_backend_agnostic() {
    skip_if_no_gpu!();
    let gpu = GpuKernel::new().unwrap();
    let stencil = StencilSpec::new(2, 2, 2).unwrap();
    let layout = GridLayout::new(4, 5, 5, 2).unwrap();
    let grid = ProcessGrid::new(1, 1).unwrap().with_periodic(true, true);
    let table = grid.neighbor_table(0).unwrap();
    let ncmp = 3;

    let run = |kernel: &dyn PackKernel| -> Vec<f32> {
        let mut ex = WavefieldExchange::new(layout, stencil, table, ncmp).unwrap();
        let mut w = Wavefield::new(layout, ncmp, 1).unwrap();
        let field = w.level_mut(0).unwrap();
        for c in 0..ncmp {
            for k in 2..2 + layout.nk {
                for j in 2..2 + layout.nj {
                    for i in 2..2 + layout.ni {
                        field[c * layout.siz_icmp + layout.idx(i, j, k)] =
                            (c * 1000 + i * 100 + j * 10 + k) as f32;
                    }
                }
            }
        }
        ex.exchange(&mut w, 0, 0, 0, ncmp, &SingleProcessComm, kernel).unwrap();
        w.level(0).unwrap().to_vec()
    };

    assert_eq!(run(&CpuKernel), run(&gpu));
}
