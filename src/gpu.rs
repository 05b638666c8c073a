//! wgpu implementation of the pack/unpack kernels.
//!
//! Mirrors the CPU kernel's canonical staging order via the shaders in
//! [`crate::shaders`]. Fields are uploaded per call and staging buffers read
//! back through a mapped copy; the engines treat this backend and the CPU
//! backend interchangeably.

use crate::error::{Result, TemblorError};
use crate::kernel::{PackKernel, RegionSpec};
use crate::shaders;
use wgpu::util::DeviceExt;

const WORKGROUP_SIZE: u32 = 64;

fn workgroup_count(n: u32) -> u32 {
    n.div_ceil(WORKGROUP_SIZE)
}

// Shader RegionParams layout: twelve u32 fields, tightly packed.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct RegionParams {
    start: [u32; 3],
    count: [u32; 3],
    stride: [u32; 3],
    cmp_stride: u32,
    ncmp: u32,
    total: u32,
}

impl RegionParams {
    fn from_spec(region: &RegionSpec) -> Result<Self> {
        let narrow = |v: usize, what: &str| -> Result<u32> {
            u32::try_from(v).map_err(|_| {
                TemblorError::Gpu(format!("{what} {v} exceeds u32 index range"))
            })
        };
        Ok(Self {
            start: [
                narrow(region.start[0], "region start")?,
                narrow(region.start[1], "region start")?,
                narrow(region.start[2], "region start")?,
            ],
            count: [
                narrow(region.count[0], "region count")?,
                narrow(region.count[1], "region count")?,
                narrow(region.count[2], "region count")?,
            ],
            stride: [
                narrow(region.stride[0], "region stride")?,
                narrow(region.stride[1], "region stride")?,
                narrow(region.stride[2], "region stride")?,
            ],
            cmp_stride: narrow(region.cmp_stride, "component stride")?,
            ncmp: narrow(region.ncmp, "component count")?,
            total: narrow(region.len(), "region size")?,
        })
    }
}

/// GPU context holding the wgpu device, queue, and staging pipelines.
pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) pack_pipeline: wgpu::ComputePipeline,
    pub(crate) unpack_pipeline: wgpu::ComputePipeline,
}

impl GpuContext {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| TemblorError::Gpu("no GPU adapter found".into()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("temblor_gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| TemblorError::Gpu(format!("failed to get GPU device: {e}")))?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("temblor_halo_shaders"),
            source: wgpu::ShaderSource::Wgsl(shaders::SHADER_SOURCE.into()),
        });

        let make_pipeline = |entry_point: &str| -> wgpu::ComputePipeline {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module: &shader_module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let pack_pipeline = make_pipeline("pack_region");
        let unpack_pipeline = make_pipeline("unpack_region");

        Ok(Self {
            device,
            queue,
            pack_pipeline,
            unpack_pipeline,
        })
    }
}

/// Read a GPU buffer back to CPU as f32 values.
fn read_buffer_f32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<f32>> {
    let size = (count * std::mem::size_of::<f32>()) as u64;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("read_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&Default::default());
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = sender.send(r);
    });
    let _ = device.poll(wgpu::PollType::Wait);
    receiver
        .recv()
        .map_err(|_| TemblorError::Gpu("readback channel closed".into()))?
        .map_err(|e| TemblorError::Gpu(format!("buffer map failed: {e:?}")))?;

    let data = slice.get_mapped_range();
    let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    Ok(result)
}

/// wgpu-based implementation of [`PackKernel`].
pub struct GpuKernel {
    ctx: GpuContext,
}

impl GpuKernel {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ctx: GpuContext::new()?,
        })
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        field: &wgpu::Buffer,
        staging: &wgpu::Buffer,
        region: &RegionSpec,
    ) -> Result<()> {
        let device = &self.ctx.device;
        let params = RegionParams::from_spec(region)?;
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: field.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: staging.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, Some(&bg), &[]);
            pass.dispatch_workgroups(workgroup_count(params.total), 1, 1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

impl PackKernel for GpuKernel {
    fn pack(&self, field: &[f32], region: &RegionSpec, staging: &mut [f32]) -> Result<()> {
        region.validate(field.len(), staging.len())?;
        let device = &self.ctx.device;
        let field_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pack_field"),
            contents: bytemuck::cast_slice(field),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let staging_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pack_staging"),
            size: (staging.len() * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        self.dispatch(&self.ctx.pack_pipeline, &field_buf, &staging_buf, region)?;
        let out = read_buffer_f32(device, &self.ctx.queue, &staging_buf, staging.len())?;
        staging.copy_from_slice(&out);
        Ok(())
    }

    fn unpack(&self, field: &mut [f32], region: &RegionSpec, staging: &[f32]) -> Result<()> {
        region.validate(field.len(), staging.len())?;
        let device = &self.ctx.device;
        let field_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("unpack_field"),
            contents: bytemuck::cast_slice(field),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let staging_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("unpack_staging"),
            contents: bytemuck::cast_slice(staging),
            usage: wgpu::BufferUsages::STORAGE,
        });
        self.dispatch(&self.ctx.unpack_pipeline, &field_buf, &staging_buf, region)?;
        let out = read_buffer_f32(device, &self.ctx.queue, &field_buf, field.len())?;
        field.copy_from_slice(&out);
        Ok(())
    }
}
