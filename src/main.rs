//! Volbrick - builds a brick octree and streams it around an orbiting camera
//!
//! Usage:
//!   volbrick [--dat volume.dat] [--size 320] [--config octree.json] [--frames 120] [--cpu]

use std::path::Path;

use volbrick::core::{Camera, OctreeConfig, Result, logging};
use volbrick::core::types::{Mat4, UVec3, Vec3};
use volbrick::gpu::{BrickDevice, CpuBrickDevice, GpuContext, WgpuBrickDevice};
use volbrick::octree::VolumeBrickOctree;
use volbrick::volume::{BitDepth, MemoryVolume, RawVolume, VolumeSource};

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_u32_arg(&args, "--frames").unwrap_or(120);
    let use_cpu = args.iter().any(|a| a == "--cpu");
    let config = match parse_str_arg(&args, "--config") {
        Some(path) => OctreeConfig::load(Path::new(&path))?,
        None => OctreeConfig::default(),
    };

    match parse_str_arg(&args, "--dat") {
        Some(path) => {
            let volume = RawVolume::open(Path::new(&path))?;
            log::info!("Loaded {} ({:?}, {:?})", path, volume.size(), volume.format().bit_depth);
            run_with_volume(&volume, &config, use_cpu, frames)
        }
        None => {
            let size = parse_u32_arg(&args, "--size").unwrap_or(320);
            log::info!("Generating {}^3 sphere volume", size);
            let volume = MemoryVolume::sphere(UVec3::splat(size), BitDepth::U8);
            run_with_volume(&volume, &config, use_cpu, frames)
        }
    }
}

fn run_with_volume<S: VolumeSource>(volume: &S, config: &OctreeConfig, use_cpu: bool, frames: u32) -> Result<()> {
    if use_cpu {
        let octree = VolumeBrickOctree::build(volume, CpuBrickDevice::new(), config)?;
        orbit(octree, frames);
    } else {
        let context = GpuContext::new_headless_blocking()?;
        log::info!("Using adapter: {}", context.adapter.get_info().name);
        let device = WgpuBrickDevice::from_context(&context, &[volume.format().bit_depth]);
        let octree = VolumeBrickOctree::build(volume, device, config)?;
        orbit(octree, frames);
    }
    Ok(())
}

/// Circle the volume once, streaming bricks in and out every frame
fn orbit<D: BrickDevice>(mut octree: VolumeBrickOctree<D>, frames: u32) {
    let extent = octree.root().voxel_scale() * octree.volume_size().as_vec3();
    let center = extent * 0.5;
    let radius = extent.max_element() * 1.2;

    for frame in 0..frames {
        let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
        let position = center + Vec3::new(angle.cos() * radius, radius * 0.3, angle.sin() * radius);
        let camera = Camera::look_at(position, center, Vec3::Y);

        let visible = octree.update_frustum(&camera, &Mat4::IDENTITY);
        let bricks = octree.rendered_bricks(&camera, &Mat4::IDENTITY);
        if frame % 30 == 0 {
            let nearest = bricks.iter().map(|b| b.distance).fold(f32::INFINITY, f32::min);
            log::info!(
                "Frame {}: visible={} bricks={} nearest={:.3}",
                frame,
                visible,
                bricks.len(),
                nearest
            );
        }
    }

    log::info!("Final residency: {}", octree.stats());
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
