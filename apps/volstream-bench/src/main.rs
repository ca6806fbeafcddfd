//! volstream Frame-Loop Benchmark
//!
//! Streams a synthetic volume through the headless texture device while the
//! camera orbits it, and reports block, upload and memory statistics.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -p volstream-bench -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--size <N>`: Points along each axis (default: 128)
//! - `--type <TYPE>`: Element type, one of u8 i8 u16 i16 u32 i32 u64 i64 f32 f64 (default: f32)
//! - `--partitions <X,Y,Z>`: Blocks per axis (default: 2,2,2)
//! - `--frames <N>`: Frames to render (default: 60)
//! - `--blend <MODE>`: composite, additive or mip (default: composite)
//! - `--max-3d <N>`: Largest 3D texture extent the device accepts (default: 2048)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::time::Instant;

use glam::{UVec3, Vec3};
use tracing::info;
use tracing_subscriber::EnvFilter;

use volstream_core::ScalarType;
use volstream_gpu::{HeadlessDevice, TextureLimits};
use volstream_render::{BlendMode, FrameStats, VolumeMapper, VolumeProperty, VolumeRenderConfig};
use volstream_test::{create_test_camera, ramp_volume, ARRAY};

/// Benchmark parameters (from CLI or defaults).
#[derive(Debug, Clone)]
struct BenchParams {
    size: u32,
    scalar_type: ScalarType,
    partitions: [u32; 3],
    frames: u32,
    blend_mode: BlendMode,
    max_texture_3d: u32,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            size: 128,
            scalar_type: ScalarType::F32,
            partitions: [2, 2, 2],
            frames: 60,
            blend_mode: BlendMode::Composite,
            max_texture_3d: TextureLimits::default().max_texture_3d,
        }
    }
}

impl BenchParams {
    /// Parse benchmark parameters from command line arguments.
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).map(String::as_str);
            let consumed = match (args[i].as_str(), value) {
                ("--size", Some(v)) => v.parse().map(|n| params.size = n).is_ok(),
                ("--frames", Some(v)) => v.parse().map(|n| params.frames = n).is_ok(),
                ("--max-3d", Some(v)) => v.parse().map(|n| params.max_texture_3d = n).is_ok(),
                ("--type", Some(v)) => ScalarType::from_name(v)
                    .map(|t| params.scalar_type = t)
                    .is_some(),
                ("--partitions", Some(v)) => parse_triple(v)
                    .map(|p| params.partitions = p)
                    .is_some(),
                ("--blend", Some(v)) => parse_blend(v).map(|b| params.blend_mode = b).is_some(),
                _ => false,
            };
            if consumed {
                i += 1;
            }
            i += 1;
        }

        params
    }
}

fn parse_triple(s: &str) -> Option<[u32; 3]> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<u32>>>()?;
    parts.try_into().ok()
}

fn parse_blend(s: &str) -> Option<BlendMode> {
    match s {
        "composite" => Some(BlendMode::Composite),
        "additive" => Some(BlendMode::Additive),
        "mip" => Some(BlendMode::MaximumIntensity),
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let params = BenchParams::from_args();
    info!("volstream benchmark: {:?}", params);

    let volume = ramp_volume(UVec3::splat(params.size), params.scalar_type)?;
    let config = VolumeRenderConfig {
        partitions: params.partitions,
        blend_mode: params.blend_mode,
        ..VolumeRenderConfig::default()
    };
    let mut device = HeadlessDevice::new(TextureLimits {
        max_texture_3d: params.max_texture_3d,
        ..TextureLimits::default()
    });
    let mut mapper = VolumeMapper::new(ARRAY, config)?;
    let mut property = VolumeProperty::new();

    let bounds = volume.bounds();
    let center = bounds.center();
    let radius = bounds.size().max_element() * 2.0;
    let mut camera = create_test_camera(&bounds, Vec3::Z, 2.0);

    let mut totals = FrameStats::default();
    let mut resorts = 0;
    let start = Instant::now();
    for frame in 0..params.frames {
        let angle = frame as f32 / params.frames.max(1) as f32 * std::f32::consts::TAU;
        camera.set_position(center + Vec3::new(angle.sin(), 0.25, angle.cos()) * radius);
        camera.look_at(center);

        let stats = mapper.render(&mut device, &volume, &mut property, &camera, |_| Ok(()))?;
        totals.blocks_drawn += stats.blocks_drawn;
        totals.blocks_skipped += stats.blocks_skipped;
        totals.tables_rebuilt += stats.tables_rebuilt;
        resorts += usize::from(stats.resorted);
    }
    let elapsed = start.elapsed();

    let device_stats = device.stats();
    info!(
        "{} frames in {:.2?} ({:.3} ms/frame)",
        params.frames,
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / f64::from(params.frames.max(1))
    );
    info!(
        "Blocks: {} drawn, {} skipped; {} resorts; {} table rebuilds",
        totals.blocks_drawn, totals.blocks_skipped, resorts, totals.tables_rebuilt
    );
    info!(
        "Device: {} uploads ({:.1} MiB), {} textures created, peak {:.1} MiB resident",
        device_stats.uploads,
        device_stats.bytes_uploaded as f64 / (1024.0 * 1024.0),
        device_stats.textures_created,
        device_stats.peak_bytes_resident as f64 / (1024.0 * 1024.0)
    );

    mapper.release_graphics_resources(&mut device)?;
    Ok(())
}

fn print_help() {
    eprintln!(
        "volstream Frame-Loop Benchmark

USAGE:
    cargo run --release -p volstream-bench -- [OPTIONS]

OPTIONS:
    --size <N>              Points along each axis (default: 128)
    --type <TYPE>           Element type: u8 i8 u16 i16 u32 i32 u64 i64 f32 f64
                            Default: f32
    --partitions <X,Y,Z>    Blocks per axis (default: 2,2,2)
    --frames <N>            Frames to render (default: 60)
    --blend <MODE>          composite, additive or mip (default: composite)
    --max-3d <N>            Largest 3D texture extent the device accepts
                            Default: 2048
    -h, --help              Print this help message

EXAMPLES:
    # Stream a 256^3 u16 volume as 4x4x4 blocks
    cargo run --release -p volstream-bench -- --size 256 --type u16 --partitions 4,4,4

    # Single resident block, maximum intensity projection
    cargo run --release -p volstream-bench -- --partitions 1,1,1 --blend mip

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_parse_as_triples() {
        assert_eq!(parse_triple("4, 2,1"), Some([4, 2, 1]));
        assert_eq!(parse_triple("4,2"), None);
        assert_eq!(parse_triple("a,b,c"), None);
    }

    #[test]
    fn blend_names() {
        assert_eq!(parse_blend("mip"), Some(BlendMode::MaximumIntensity));
        assert_eq!(parse_blend("over"), None);
    }
}
