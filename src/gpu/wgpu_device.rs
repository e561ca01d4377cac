//! Brick compute pipelines on wgpu

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3};
use crate::volume::{BitDepth, TEXEL_CHANNELS};
use super::context::GpuContext;
use super::{
    BrickDevice, BrickTexture, ChildBrick, RawRegion, brick_byte_size, mip_level_count, mip_size,
    workgroup_count,
};

/// Uniforms of the raw min/max kernel
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct RawParams {
    size: [u32; 3],
    _pad0: u32,
    data: [u32; 3],
    _pad1: u32,
    padded: [u32; 3],
    _pad2: u32,
}

/// Uniforms of the down-sample kernel
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DownsampleParams {
    src_size: [u32; 3],
    _pad0: u32,
    shift: [u32; 3],
    _pad1: u32,
    dst_size: [u32; 3],
    _pad2: u32,
}

/// Compute programs of one bit-depth family
pub struct BrickPrograms {
    raw_pipeline: wgpu::ComputePipeline,
    raw_layout: wgpu::BindGroupLayout,
    downsample_pipeline: wgpu::ComputePipeline,
    downsample_layout: wgpu::BindGroupLayout,
}

impl BrickPrograms {
    /// Compile both kernels for the given texel format
    pub fn new(device: &wgpu::Device, bit_depth: BitDepth) -> Self {
        let format = bit_depth.texture_format();
        let wgsl = bit_depth.wgsl_format();

        let raw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brick_min_max_raw_shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/min_max_raw.wgsl").replace("OUT_FORMAT", wgsl).into(),
            ),
        });
        let downsample_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brick_downsample_shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/downsample_min_max.wgsl").replace("OUT_FORMAT", wgsl).into(),
            ),
        });

        let uniform_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let output_entry = wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D3,
            },
            count: None,
        };

        // Bind group 0: params, raw voxels, output brick
        let raw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brick_min_max_raw_layout"),
            entries: &[
                uniform_entry,
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                output_entry,
            ],
        });

        // Bind group 0: params, source brick, destination brick
        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brick_downsample_layout"),
            entries: &[
                uniform_entry,
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Uint,
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                output_entry,
            ],
        });

        let raw_pipeline = Self::create_pipeline(device, "brick_min_max_raw", &raw_layout, &raw_shader);
        let downsample_pipeline =
            Self::create_pipeline(device, "brick_downsample", &downsample_layout, &downsample_shader);

        Self { raw_pipeline, raw_layout, downsample_pipeline, downsample_layout }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        shader: &wgpu::ShaderModule,
    ) -> wgpu::ComputePipeline {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            immediate_size: 0,
        });

        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}

/// Brick resident in GPU memory
pub struct GpuBrick {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    size: UVec3,
    bit_depth: BitDepth,
    mip_level_count: u32,
}

impl GpuBrick {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View over the whole mip chain
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Linear, clamp-to-edge sampler for the renderer
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    fn level_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("brick_level_view"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}

impl BrickTexture for GpuBrick {
    fn size(&self) -> UVec3 {
        self.size
    }

    fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
}

/// [`BrickDevice`] backed by wgpu compute shaders.
///
/// Every operation submits its work and blocks until the GPU is idle.
pub struct WgpuBrickDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    programs: HashMap<BitDepth, BrickPrograms>,
}

impl WgpuBrickDevice {
    /// Compile program families for the requested bit depths
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, depths: &[BitDepth]) -> Self {
        let programs = depths
            .iter()
            .map(|&depth| (depth, BrickPrograms::new(&device, depth)))
            .collect();
        log::info!("Compiled brick programs for {:?}", depths);
        Self { device, queue, programs }
    }

    pub fn from_context(context: &GpuContext, depths: &[BitDepth]) -> Self {
        Self::new(context.device.clone(), context.queue.clone(), depths)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn programs(&self, bit_depth: BitDepth) -> Result<&BrickPrograms> {
        self.programs.get(&bit_depth).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no brick program family for {:?}", bit_depth))
        })
    }

    fn create_brick(&self, size: UVec3, bit_depth: BitDepth) -> GpuBrick {
        let mip_level_count = mip_level_count(size);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("volume_brick"),
            size: extent(size),
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: bit_depth.texture_format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("volume_brick_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        GpuBrick { texture, view, sampler, size, bit_depth, mip_level_count }
    }

    /// Record one down-sample dispatch from `src` into `dst`
    fn encode_downsample(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        programs: &BrickPrograms,
        src: &wgpu::TextureView,
        src_size: UVec3,
        dst: &wgpu::TextureView,
        dst_size: UVec3,
        shift: UVec3,
    ) {
        let params = DownsampleParams {
            src_size: src_size.to_array(),
            _pad0: 0,
            shift: shift.to_array(),
            _pad1: 0,
            dst_size: dst_size.to_array(),
            _pad2: 0,
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brick_downsample_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brick_downsample_bind_group"),
            layout: &programs.downsample_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(src) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(dst) },
            ],
        });

        pass.set_pipeline(&programs.downsample_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let groups = workgroup_count(src_size);
        pass.dispatch_workgroups(groups.x, groups.y, groups.z);
    }

    /// Rebuild mip levels 1.. of a brick from level 0
    fn encode_mips(&self, encoder: &mut wgpu::CommandEncoder, programs: &BrickPrograms, brick: &GpuBrick) {
        if brick.mip_level_count < 2 {
            return;
        }
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("brick_mip_pass"),
            timestamp_writes: None,
        });
        for level in 1..brick.mip_level_count {
            let src = brick.level_view(level - 1);
            let dst = brick.level_view(level);
            self.encode_downsample(
                &mut pass,
                programs,
                &src,
                mip_size(brick.size, level - 1),
                &dst,
                mip_size(brick.size, level),
                UVec3::ZERO,
            );
        }
    }

    /// Submit and block until the GPU has drained the queue
    fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| Error::Gpu(format!("waiting for brick work failed: {:?}", e)))?;
        Ok(())
    }

    /// Read one mip level back to the CPU through a padded staging buffer
    fn download_level(&self, texture: &GpuBrick, level: u32) -> Result<Vec<u8>> {
        let size = mip_size(texture.size, level);
        let bytes_per_texel = texture.bit_depth.bytes() * TEXEL_CHANNELS;
        let row_bytes = size.x * bytes_per_texel;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer_size = padded_row_bytes as u64 * size.y as u64 * size.z as u64;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("brick_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder("brick_readback_encoder");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(size.y),
                },
            },
            extent(size),
        );
        self.submit_and_wait(encoder)?;

        let slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| Error::Gpu(format!("waiting for readback failed: {:?}", e)))?;
        rx.recv()
            .map_err(|e| Error::Gpu(format!("readback channel closed: {}", e)))?
            .map_err(|e| Error::Gpu(format!("mapping brick readback failed: {}", e)))?;

        let mut bytes = Vec::with_capacity(brick_byte_size(size, texture.bit_depth));
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded_row_bytes as usize) {
                bytes.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        staging_buffer.unmap();

        Ok(bytes)
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}

fn extent(size: UVec3) -> wgpu::Extent3d {
    wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: size.z }
}

impl BrickDevice for WgpuBrickDevice {
    type Texture = GpuBrick;

    fn supports(&self, bit_depth: BitDepth) -> bool {
        self.programs.contains_key(&bit_depth)
    }

    fn min_max_from_raw(&self, values: &[u32], region: RawRegion, bit_depth: BitDepth) -> Result<GpuBrick> {
        let programs = self.programs(bit_depth)?;
        let brick = self.create_brick(region.size, bit_depth);

        let params = RawParams {
            size: region.size.to_array(),
            _pad0: 0,
            data: region.data.to_array(),
            _pad1: 0,
            padded: region.padded.to_array(),
            _pad2: 0,
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brick_raw_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let raw_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brick_raw_voxels"),
            contents: bytemuck::cast_slice(values),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let level0 = brick.level_view(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brick_raw_bind_group"),
            layout: &programs.raw_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: raw_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&level0) },
            ],
        });

        let mut encoder = self.encoder("brick_min_max_encoder");
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("brick_min_max_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&programs.raw_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = workgroup_count(region.size);
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.encode_mips(&mut encoder, programs, &brick);
        self.submit_and_wait(encoder)?;

        Ok(brick)
    }

    fn combine_children(
        &self,
        parent_size: UVec3,
        bit_depth: BitDepth,
        children: &[ChildBrick<'_, GpuBrick>],
    ) -> Result<GpuBrick> {
        let programs = self.programs(bit_depth)?;
        let parent = self.create_brick(parent_size, bit_depth);
        let dst = parent.level_view(0);

        let mut encoder = self.encoder("brick_combine_encoder");
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("brick_combine_pass"),
                timestamp_writes: None,
            });
            for child in children {
                let src = child.texture.level_view(0);
                self.encode_downsample(
                    &mut pass,
                    programs,
                    &src,
                    child.texture.size,
                    &dst,
                    parent_size,
                    child.shift,
                );
            }
        }
        self.encode_mips(&mut encoder, programs, &parent);
        self.submit_and_wait(encoder)?;

        Ok(parent)
    }

    fn upload_brick(&self, size: UVec3, bit_depth: BitDepth, texels: &[u8]) -> Result<GpuBrick> {
        let programs = self.programs(bit_depth)?;
        let expected = brick_byte_size(size, bit_depth);
        if texels.len() != expected {
            return Err(Error::Gpu(format!(
                "upload of {} bytes into a {:?} brick needing {}",
                texels.len(),
                size,
                expected
            )));
        }

        let brick = self.create_brick(size, bit_depth);
        let bytes_per_texel = bit_depth.bytes() * TEXEL_CHANNELS;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &brick.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.x * bytes_per_texel),
                rows_per_image: Some(size.y),
            },
            extent(size),
        );

        let mut encoder = self.encoder("brick_reload_encoder");
        self.encode_mips(&mut encoder, programs, &brick);
        self.submit_and_wait(encoder)?;

        Ok(brick)
    }

    fn download_brick(&self, texture: &GpuBrick) -> Result<Vec<u8>> {
        self.download_level(texture, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::volume_of;
    use crate::gpu::{CpuBrick, CpuBrickDevice, Texel, texel};

    /// GPU device for the given depths, or None on machines without an adapter
    fn gpu_device(depths: &[BitDepth]) -> Option<WgpuBrickDevice> {
        match GpuContext::new_headless_blocking() {
            Ok(context) => Some(WgpuBrickDevice::from_context(&context, depths)),
            Err(e) => {
                eprintln!("no GPU adapter, skipping: {}", e);
                None
            }
        }
    }

    /// Every mip level of both bricks must hold the same texels
    fn assert_same_pyramid(gpu: &WgpuBrickDevice, gpu_brick: &GpuBrick, cpu_brick: &CpuBrick) {
        assert_eq!(gpu_brick.size(), cpu_brick.size());
        assert_eq!(gpu_brick.mip_level_count(), cpu_brick.mip_level_count());
        for level in 0..cpu_brick.mip_level_count() {
            let expected = texel::encode_brick(cpu_brick.bit_depth(), cpu_brick.level(level));
            assert_eq!(gpu.download_level(gpu_brick, level).unwrap(), expected, "mip level {}", level);
        }
    }

    fn pattern_texels(size: UVec3, max: u32) -> Vec<Texel> {
        (0..volume_of(size) as u32)
            .map(|i| {
                let value = (i * 37 + 11) % (max + 1);
                Texel::new(value, value / 3, value.max((i * 53) % (max + 1)))
            })
            .collect()
    }

    #[test]
    fn test_min_max_from_raw_matches_cpu() {
        let Some(gpu) = gpu_device(&[BitDepth::U8]) else { return };
        let cpu = CpuBrickDevice::new();

        // Brick at the volume's end: padding row and slice stay outside the data
        let size = UVec3::new(5, 3, 2);
        let padded = size + UVec3::ONE;
        let region = RawRegion { size, data: size, padded };
        let values: Vec<u32> = (0..volume_of(padded) as u32).map(|i| (i * 29 + 7) % 256).collect();

        let gpu_brick = gpu.min_max_from_raw(&values, region, BitDepth::U8).unwrap();
        let cpu_brick = cpu.min_max_from_raw(&values, region, BitDepth::U8).unwrap();
        assert_same_pyramid(&gpu, &gpu_brick, &cpu_brick);
    }

    #[test]
    fn test_combine_children_matches_cpu() {
        let Some(gpu) = gpu_device(&[BitDepth::U16]) else { return };
        let cpu = CpuBrickDevice::new();

        let low_size = UVec3::new(7, 5, 3);
        let high_size = UVec3::new(3, 5, 3);
        let low_bytes = texel::encode_brick(BitDepth::U16, &pattern_texels(low_size, 65535));
        let high_bytes = texel::encode_brick(BitDepth::U16, &pattern_texels(high_size, 4000));
        let parent_size = UVec3::new(6, 3, 2);
        let shift = UVec3::new(4, 0, 0);

        let gpu_low = gpu.upload_brick(low_size, BitDepth::U16, &low_bytes).unwrap();
        let gpu_high = gpu.upload_brick(high_size, BitDepth::U16, &high_bytes).unwrap();
        let gpu_parent = gpu
            .combine_children(
                parent_size,
                BitDepth::U16,
                &[
                    ChildBrick { texture: &gpu_low, shift: UVec3::ZERO },
                    ChildBrick { texture: &gpu_high, shift },
                ],
            )
            .unwrap();

        let cpu_low = cpu.upload_brick(low_size, BitDepth::U16, &low_bytes).unwrap();
        let cpu_high = cpu.upload_brick(high_size, BitDepth::U16, &high_bytes).unwrap();
        let cpu_parent = cpu
            .combine_children(
                parent_size,
                BitDepth::U16,
                &[
                    ChildBrick { texture: &cpu_low, shift: UVec3::ZERO },
                    ChildBrick { texture: &cpu_high, shift },
                ],
            )
            .unwrap();

        assert_same_pyramid(&gpu, &gpu_parent, &cpu_parent);
    }

    #[test]
    fn test_upload_download_roundtrip_matches_cpu() {
        let Some(gpu) = gpu_device(&[BitDepth::U32]) else { return };
        let cpu = CpuBrickDevice::new();

        // 5 texels of 16 bytes: 80-byte rows, padded to 256 on readback
        let size = UVec3::new(5, 2, 3);
        let bytes = texel::encode_brick(BitDepth::U32, &pattern_texels(size, u32::MAX / 7));

        let gpu_brick = gpu.upload_brick(size, BitDepth::U32, &bytes).unwrap();
        assert_eq!(gpu.download_brick(&gpu_brick).unwrap(), bytes);

        let cpu_brick = cpu.upload_brick(size, BitDepth::U32, &bytes).unwrap();
        assert_same_pyramid(&gpu, &gpu_brick, &cpu_brick);
    }

    #[test]
    fn test_missing_program_family() {
        let Some(gpu) = gpu_device(&[BitDepth::U8]) else { return };
        assert!(!gpu.supports(BitDepth::U16));
        let result = gpu.upload_brick(UVec3::ONE, BitDepth::U16, &[0; 8]);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }
}
