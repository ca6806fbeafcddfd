//! Headless frame recording.
//!
//! Drives a [`VolumeMapper`] against a [`HeadlessDevice`] and records every
//! block draw, so ordering, streaming and table caching can be checked
//! without a GPU.

use glam::Vec3;
use volstream_core::{Aabb, Volume};
use volstream_gpu::{HeadlessDevice, TextureHandle, TextureLimits};
use volstream_render::{
    Camera, DrawUniforms, FrameStats, VolumeMapper, VolumeProperty, VolumeRenderConfig,
};

use crate::{Result, TestError};

/// One block draw as seen by the draw callback.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub block: usize,
    pub texture: TextureHandle,
    /// Volume-local bounds of the block.
    pub bounds: Aabb,
    pub uniforms: DrawUniforms,
}

/// Everything a frame drew.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordedFrame {
    pub stats: FrameStats,
    pub draws: Vec<RecordedDraw>,
}

impl RecordedFrame {
    /// Block ids in draw order.
    pub fn block_ids(&self) -> Vec<usize> {
        self.draws.iter().map(|d| d.block).collect()
    }
}

/// Mapper, property and device for one volume.
pub struct HeadlessHarness {
    device: HeadlessDevice,
    mapper: VolumeMapper,
    property: VolumeProperty,
}

impl HeadlessHarness {
    /// Create a harness with default device limits.
    pub fn new(array: &str, config: VolumeRenderConfig) -> Result<Self> {
        Self::with_limits(TextureLimits::default(), array, config)
    }

    /// Create a harness whose device reports `limits`.
    pub fn with_limits(limits: TextureLimits, array: &str, config: VolumeRenderConfig) -> Result<Self> {
        Ok(Self {
            device: HeadlessDevice::new(limits),
            mapper: VolumeMapper::new(array, config)?,
            property: VolumeProperty::new(),
        })
    }

    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut HeadlessDevice {
        &mut self.device
    }

    pub fn mapper(&self) -> &VolumeMapper {
        &self.mapper
    }

    pub fn property_mut(&mut self) -> &mut VolumeProperty {
        &mut self.property
    }

    /// Apply a new configuration to the mapper.
    pub fn set_config(&mut self, config: VolumeRenderConfig) -> Result<()> {
        self.mapper.set_config(&mut self.device, config)?;
        Ok(())
    }

    /// Render one frame and record its draws.
    pub fn render_frame(&mut self, volume: &Volume, camera: &Camera) -> Result<RecordedFrame> {
        let mut draws = Vec::new();
        let stats = self.mapper.render(
            &mut self.device,
            volume,
            &mut self.property,
            camera,
            |request| {
                draws.push(RecordedDraw {
                    block: request.block.id(),
                    texture: request.volume_texture,
                    bounds: request.block.bounds(),
                    uniforms: *request.uniforms,
                });
                Ok(())
            },
        )?;
        tracing::debug!(
            "Recorded frame: {} drawn, {} skipped, {} tables rebuilt",
            stats.blocks_drawn,
            stats.blocks_skipped,
            stats.tables_rebuilt
        );
        Ok(RecordedFrame { stats, draws })
    }

    /// Release every texture the mapper holds.
    pub fn release(&mut self) -> Result<()> {
        self.mapper.release_graphics_resources(&mut self.device)?;
        Ok(())
    }
}

/// Check that consecutive draws never get closer to the camera than the
/// draw after them, measured between block centers.
pub fn check_back_to_front(frame: &RecordedFrame, camera: &Camera) -> Result<()> {
    let eye = camera.position();
    for pair in frame.draws.windows(2) {
        let first = pair[0].bounds.center().distance(eye);
        let second = pair[1].bounds.center().distance(eye);
        if second > first {
            return Err(TestError::FrameCheck(format!(
                "block {} drawn after block {} but is farther from the camera",
                pair[1].block, pair[0].block
            )));
        }
    }
    Ok(())
}

/// Create a camera looking at the center of `bounds` from along `axis`.
pub fn create_test_camera(bounds: &Aabb, axis: Vec3, distance_factor: f32) -> Camera {
    let center = bounds.center();
    let distance = bounds.size().max_element() * distance_factor;
    let axis = axis.normalize_or(Vec3::Z);
    let up = if axis.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Camera::new(
        center + axis * distance,
        center,
        up,
        std::f32::consts::FRAC_PI_4,
        1.0, // Square for testing
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volumes::{constant_volume, ramp_volume, sphere_volume, ARRAY};
    use approx::assert_relative_eq;
    use glam::UVec3;
    use volstream_core::ScalarType;
    use volstream_render::{BlendMode, CompositeInput, CompositeMapper, RenderError};

    fn partitioned(partitions: [u32; 3]) -> VolumeRenderConfig {
        VolumeRenderConfig {
            partitions,
            ..VolumeRenderConfig::default()
        }
    }

    #[test]
    fn two_blocks_are_drawn_back_to_front() {
        let volume = ramp_volume(UVec3::splat(100), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 1, 1])).unwrap();
        let mut camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(frame.block_ids(), vec![0, 1]);
        assert!(frame.stats.resorted);
        check_back_to_front(&frame, &camera).unwrap();

        let again = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(again.block_ids(), vec![0, 1]);
        assert!(!again.stats.resorted);

        camera.set_position(volume.bounds().center() - Vec3::X * 300.0);
        camera.look_at(volume.bounds().center());
        let flipped = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(flipped.block_ids(), vec![1, 0]);
        assert!(flipped.stats.resorted);
        check_back_to_front(&flipped, &camera).unwrap();
    }

    #[test]
    fn blocks_share_their_boundary_plane() {
        let volume = ramp_volume(UVec3::splat(100), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 1, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        let (first, second) = (&frame.draws[0], &frame.draws[1]);
        assert_relative_eq!(first.bounds.max.x, second.bounds.min.x);
        assert_relative_eq!(first.bounds.min.x, 0.0);
        assert_relative_eq!(second.bounds.max.x, 99.0);
        assert_eq!(first.uniforms.texture_extents_max[0], 49.0);
        assert_eq!(second.uniforms.texture_extents_min[0], 49.0);
    }

    #[test]
    fn streaming_keeps_one_block_resident() {
        let volume = ramp_volume(UVec3::splat(100), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 1, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        harness.render_frame(&volume, &camera).unwrap();
        let whole_volume = 100 * 100 * 100 * 4;
        let largest_block = 51 * 100 * 100 * 4;
        let tables = 1024 * 16 + 1024 * 4;
        let stats = harness.device().stats();
        assert!(stats.peak_bytes_resident <= largest_block + tables);
        assert!(stats.peak_bytes_resident < whole_volume);
        // Only the two lookup tables survive the frame
        assert_eq!(harness.device().live_textures(), 2);
        assert_eq!(stats.bytes_uploaded, whole_volume + 100 * 100 * 4 + tables);
    }

    #[test]
    fn single_block_stays_resident_until_data_changes() {
        let mut volume = ramp_volume(UVec3::splat(16), ScalarType::U16).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::Z, 2.0);

        harness.render_frame(&volume, &camera).unwrap();
        let uploads = harness.device().stats().uploads;
        harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(harness.device().stats().uploads, uploads);
        assert_eq!(harness.device().live_textures(), 3);

        volume.mark_modified();
        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(frame.stats.blocks_drawn, 1);
        assert_eq!(harness.device().stats().uploads, uploads + 1);
    }

    #[test]
    fn integer_volumes_publish_normalizing_scale_bias() {
        let volume = ramp_volume(UVec3::splat(8), ScalarType::U8).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::Z, 2.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        let uniforms = &frame.draws[0].uniforms;
        // Texels 0..1 cover the data range 0..255 exactly
        assert_relative_eq!(uniforms.volume_scale[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(uniforms.volume_bias[0], 0.0, epsilon = 1e-6);
        assert_eq!(uniforms.volume_scale[1], 1.0);
        assert_eq!(uniforms.scalars_range_max[0], 255.0);
    }

    #[test]
    fn unchanged_tables_are_not_rebuilt() {
        let volume = ramp_volume(UVec3::splat(16), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 2, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::Y, 2.0);

        assert_eq!(harness.render_frame(&volume, &camera).unwrap().stats.tables_rebuilt, 2);
        assert_eq!(harness.render_frame(&volume, &camera).unwrap().stats.tables_rebuilt, 0);

        harness.property_mut().scalar_opacity_mut(0).add_point(0.25, 1.0);
        assert_eq!(harness.render_frame(&volume, &camera).unwrap().stats.tables_rebuilt, 1);

        let config = VolumeRenderConfig {
            blend_mode: BlendMode::Additive,
            ..partitioned([2, 2, 1])
        };
        harness.set_config(config).unwrap();
        // Only the opacity table depends on the blend mode
        assert_eq!(harness.render_frame(&volume, &camera).unwrap().stats.tables_rebuilt, 1);
    }

    #[test]
    fn oversized_block_is_skipped() {
        let volume = ramp_volume(UVec3::new(100, 40, 40), ScalarType::F32).unwrap();
        let limits = TextureLimits {
            max_texture_3d: 50,
            ..TextureLimits::default()
        };
        let mut harness = HeadlessHarness::with_limits(limits, ARRAY, partitioned([2, 1, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(frame.block_ids(), vec![0]);
        assert_eq!(frame.stats.blocks_skipped, 1);

        // The skip does not poison later frames
        let next = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(next.stats.blocks_drawn, 1);
        assert_eq!(harness.device().live_textures(), 2);
    }

    #[test]
    fn oversized_single_block_skips_the_frame() {
        let volume = ramp_volume(UVec3::new(100, 40, 40), ScalarType::F32).unwrap();
        let limits = TextureLimits {
            max_texture_3d: 50,
            ..TextureLimits::default()
        };
        let mut harness =
            HeadlessHarness::with_limits(limits, ARRAY, VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert!(frame.draws.is_empty());
        assert_eq!(frame.stats.blocks_skipped, 1);
        assert_eq!(frame.stats.tables_rebuilt, 2);
        assert_eq!(harness.device().live_textures(), 2);

        // Same failure next frame, then a roomier device loads it
        let again = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(again.stats.blocks_skipped, 1);
        harness.device_mut().set_limits(TextureLimits::default());
        let loaded = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(loaded.block_ids(), vec![0]);
        assert_eq!(harness.device().live_textures(), 3);
    }

    #[test]
    fn rejected_probe_skips_blocks_but_keeps_tables() {
        let volume = ramp_volume(UVec3::splat(20), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 1, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        harness.render_frame(&volume, &camera).unwrap();
        harness.device_mut().set_reject_probes(true);
        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert!(frame.draws.is_empty());
        assert_eq!(frame.stats.blocks_skipped, 2);
        assert_eq!(harness.device().live_textures(), 2);
    }

    #[test]
    fn released_resources_are_recreated() {
        let volume = ramp_volume(UVec3::splat(12), ScalarType::I16).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 2.0);

        harness.render_frame(&volume, &camera).unwrap();
        harness.release().unwrap();
        assert_eq!(harness.device().live_textures(), 0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(frame.stats.blocks_drawn, 1);
        assert_eq!(frame.stats.tables_rebuilt, 2);
        assert_eq!(harness.device().live_textures(), 3);
    }

    #[test]
    fn independent_components_get_their_own_tables() {
        let volume = sphere_volume(UVec3::splat(8), 2).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::Z, 2.0);

        let frame = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(frame.stats.tables_rebuilt, 4);
        let bindings = harness.mapper().table_bindings();
        assert!(bindings.color[1].is_some());
        assert_eq!(frame.draws[0].uniforms.components, 2);
        assert_eq!(frame.draws[0].uniforms.independent_components, 1);

        harness.property_mut().set_independent_components(false);
        harness.render_frame(&volume, &camera).unwrap();
        let bindings = harness.mapper().table_bindings();
        assert!(bindings.color[1].is_none());
        assert_eq!(harness.mapper().tables().len(), 2);
    }

    #[test]
    fn camera_inside_is_flagged() {
        let volume = ramp_volume(UVec3::splat(10), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, VolumeRenderConfig::default()).unwrap();
        let mut camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let outside = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(outside.draws[0].uniforms.camera_inside, 0);

        camera.set_position(volume.bounds().center());
        camera.look_at(Vec3::new(9.0, 4.5, 4.5));
        let inside = harness.render_frame(&volume, &camera).unwrap();
        assert_eq!(inside.draws[0].uniforms.camera_inside, 1);
    }

    #[test]
    fn render_without_array_fails() {
        let volume = ramp_volume(UVec3::splat(4), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new("missing", VolumeRenderConfig::default()).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 2.0);
        assert!(harness.render_frame(&volume, &camera).is_err());
    }

    #[test]
    fn out_of_order_draws_are_reported() {
        let volume = ramp_volume(UVec3::splat(20), ScalarType::F32).unwrap();
        let mut harness = HeadlessHarness::new(ARRAY, partitioned([2, 1, 1])).unwrap();
        let camera = create_test_camera(&volume.bounds(), Vec3::X, 3.0);

        let mut frame = harness.render_frame(&volume, &camera).unwrap();
        frame.draws.reverse();
        assert!(matches!(
            check_back_to_front(&frame, &camera),
            Err(TestError::FrameCheck(_))
        ));
    }

    #[test]
    fn composite_scene_draws_whole_volumes_in_order() {
        let mut device = HeadlessDevice::default();
        let near = constant_volume(UVec3::splat(9), Vec3::ZERO, 0.5).unwrap();
        let far = constant_volume(UVec3::splat(9), Vec3::new(0.0, 0.0, -20.0), 0.5).unwrap();
        let (mut p0, mut p1) = (VolumeProperty::new(), VolumeProperty::new());
        let mut composite = CompositeMapper::new();
        composite.add_mapper(VolumeMapper::new(ARRAY, partitioned([1, 1, 2])).unwrap());
        composite.add_mapper(VolumeMapper::new(ARRAY, partitioned([1, 1, 2])).unwrap());
        let camera = create_test_camera(&near.bounds(), Vec3::Z, 4.0);

        let mut inputs = [
            CompositeInput {
                volume: &near,
                property: &mut p0,
            },
            CompositeInput {
                volume: &far,
                property: &mut p1,
            },
        ];
        let mut drawn = Vec::new();
        composite
            .render(&mut device, &mut inputs, &camera, |mapper, request| {
                drawn.push((mapper, request.block.id()));
                Ok::<(), RenderError>(())
            })
            .unwrap();
        assert_eq!(drawn, vec![(1, 0), (1, 1), (0, 0), (0, 1)]);
        assert_eq!(device.live_textures(), 4);
    }
}
