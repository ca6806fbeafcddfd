//! Single-volume mapper: the per-frame render loop.
//!
//! A frame runs in a fixed sequence: make sure the volume is partitioned
//! and the lookup tables are current, order the blocks back to front, then
//! hand every block to the draw callback as soon as its texture is loaded.

use glam::Mat4;
use volstream_core::{Aabb, Version, Volume};
use volstream_gpu::{TextureDevice, TextureHandle};
use volstream_volume::{Block, VolumeStreamer};

use crate::camera::Camera;
use crate::config::VolumeRenderConfig;
use crate::error::{RenderError, Result};
use crate::lookup_table::{LookupTableCache, TableInputs, TableKey, TableKind};
use crate::property::VolumeProperty;
use crate::sort::{sort_back_to_front, RenderUnit, SortView};
use crate::uniforms::{vec4, DrawUniforms, TableBindings};

/// Tolerance of the camera-inside test, in volume-local units.
const INSIDE_TOLERANCE: f32 = 1e-6;

/// Everything the caller needs to issue one block draw.
#[derive(Debug)]
pub struct DrawRequest<'a> {
    pub block: &'a Block,
    pub volume_texture: TextureHandle,
    pub tables: &'a TableBindings,
    pub uniforms: &'a DrawUniforms,
    /// Volume-to-world transform.
    pub model: Mat4,
}

/// What a frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub blocks_drawn: usize,
    /// Blocks skipped after a capability failure.
    pub blocks_skipped: usize,
    pub tables_rebuilt: usize,
    /// Whether the block order was recomputed.
    pub resorted: bool,
}

/// Renders one volume, streaming its blocks when it is partitioned.
pub struct VolumeMapper {
    config: VolumeRenderConfig,
    array: String,
    model: Mat4,
    streamer: VolumeStreamer,
    tables: LookupTableCache,
    bindings: TableBindings,
    reload: bool,
    layout_version: Version,
    sort_key: Option<(Version, Version)>,
    order: Vec<usize>,
    sample_distance: f32,
}

impl VolumeMapper {
    /// Create a mapper drawing the array named `array`.
    pub fn new(array: impl Into<String>, config: VolumeRenderConfig) -> Result<Self> {
        let streamer = VolumeStreamer::new(config.partitions())?;
        Ok(Self {
            tables: LookupTableCache::new(config.table_width),
            sample_distance: config.sample_distance,
            config,
            array: array.into(),
            model: Mat4::IDENTITY,
            streamer,
            bindings: TableBindings::default(),
            reload: true,
            layout_version: Version::next(),
            sort_key: None,
            order: Vec::new(),
        })
    }

    pub fn config(&self) -> &VolumeRenderConfig {
        &self.config
    }

    /// Apply a new configuration.
    ///
    /// Interpolation changes are applied to resident textures right away;
    /// partition changes take effect with a reload on the next frame.
    pub fn set_config(
        &mut self,
        device: &mut dyn TextureDevice,
        config: VolumeRenderConfig,
    ) -> Result<()> {
        if config.partitions != self.config.partitions {
            self.streamer.set_partitions(config.partitions())?;
            self.reload = true;
        }
        if config.interpolation != self.config.interpolation {
            let filter = config.interpolation.filter();
            self.streamer.set_interpolation(device, filter)?;
            self.tables.set_filter(device, filter)?;
        }
        self.tables.set_min_width(config.table_width);
        self.config = config;
        Ok(())
    }

    /// Name of the drawn array.
    pub fn array_name(&self) -> &str {
        &self.array
    }

    /// Draw a different array; reloads on the next frame.
    pub fn set_array(&mut self, array: impl Into<String>) {
        let array = array.into();
        if array != self.array {
            self.array = array;
            self.reload = true;
        }
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    /// Set the volume-to-world transform.
    pub fn set_model(&mut self, model: Mat4) {
        if model != self.model {
            self.model = model;
            self.layout_version.touch();
        }
    }

    pub fn streamer(&self) -> &VolumeStreamer {
        &self.streamer
    }

    pub fn tables(&self) -> &LookupTableCache {
        &self.tables
    }

    /// Table textures bound by the last prepared frame.
    pub fn table_bindings(&self) -> &TableBindings {
        &self.bindings
    }

    /// Ray step used by the last prepared frame.
    pub fn sample_distance(&self) -> f32 {
        self.sample_distance
    }

    /// Version advanced whenever block bounds or the model transform change.
    pub fn layout_version(&self) -> Version {
        self.layout_version
    }

    /// World-space bounds of the loaded volume.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.streamer
            .loaded_bounds()
            .map(|bounds| bounds.transform(&self.model))
    }

    /// Whether the camera's near plane cuts into the loaded volume.
    pub fn is_camera_inside(&self, camera: &Camera) -> bool {
        let Some(bounds) = self.streamer.loaded_bounds() else {
            return false;
        };
        let near = self
            .model
            .inverse()
            .transform_point3(camera.near_plane_point());
        bounds.contains_point(near, INSIDE_TOLERANCE)
    }

    /// Load the volume if needed and bring every active lookup table up to
    /// date. Returns the number of rebuilt tables.
    pub fn prepare(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
        property: &mut VolumeProperty,
    ) -> Result<usize> {
        if self.needs_load(volume)? {
            let loaded = self.streamer.load_volume(
                device,
                volume,
                &self.array,
                self.config.interpolation.filter(),
            );
            match loaded {
                Ok(()) => {}
                // Partitioned but not uploaded; draw_blocks skips the block
                Err(e) if e.is_capability_failure() && self.streamer.is_loaded() => {
                    tracing::warn!("Deferring single block upload: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
            self.reload = false;
            self.layout_version.touch();
            self.sort_key = None;
        }
        self.sample_distance = self.compute_sample_distance(volume);
        self.update_tables(device, property)
    }

    /// Order the blocks back to front for `camera`, reusing the previous
    /// order while neither the camera nor the layout changed. Rewinds block
    /// iteration either way. Returns whether the order was recomputed.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn sort_blocks(&mut self, camera: &Camera) -> Result<bool> {
        let key = (camera.version(), self.layout_version);
        let resorted = self.sort_key != Some(key);
        if resorted {
            let view = SortView::from_camera(camera, &self.model);
            self.order = sort_back_to_front(self.streamer.blocks(), &view);
            self.sort_key = Some(key);
        }
        self.streamer.set_block_order(&self.order)?;
        Ok(resorted)
    }

    /// Current block order, farthest first.
    pub fn block_order(&self) -> &[usize] {
        &self.order
    }

    /// Render one frame: prepare, sort, then stream and draw every block.
    pub fn render<F>(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
        property: &mut VolumeProperty,
        camera: &Camera,
        draw: F,
    ) -> Result<FrameStats>
    where
        F: FnMut(&DrawRequest<'_>) -> Result<()>,
    {
        let tables_rebuilt = self.prepare(device, volume, property)?;
        let mut stats = self.draw_blocks(device, volume, property, camera, draw)?;
        stats.tables_rebuilt = tables_rebuilt;
        Ok(stats)
    }

    /// Sort and draw the blocks of a prepared volume.
    pub fn draw_blocks<F>(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
        property: &VolumeProperty,
        camera: &Camera,
        mut draw: F,
    ) -> Result<FrameStats>
    where
        F: FnMut(&DrawRequest<'_>) -> Result<()>,
    {
        if !self.streamer.is_loaded() {
            return Err(RenderError::NoInput);
        }
        let mut stats = FrameStats {
            resorted: self.sort_blocks(camera)?,
            ..FrameStats::default()
        };
        let base = self.frame_uniforms(volume, property, camera);
        let centering = self.streamer.centering().unwrap_or_default();

        loop {
            let id = match self.streamer.next_block(device, volume) {
                Ok(Some(block)) => block.id(),
                Ok(None) => break,
                Err(e) if e.is_capability_failure() => {
                    tracing::warn!("Skipping block: {}", e);
                    stats.blocks_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let block = &self.streamer.blocks()[id];
            let Some(texture) = block.texture() else {
                stats.blocks_skipped += 1;
                continue;
            };
            let mut uniforms = base;
            uniforms.set_block(block, block.texture_bounds(centering));
            draw(&DrawRequest {
                block,
                volume_texture: texture,
                tables: &self.bindings,
                uniforms: &uniforms,
                model: self.model,
            })?;
            stats.blocks_drawn += 1;
        }
        Ok(stats)
    }

    /// Destroy every block and table texture. The next frame re-creates
    /// them.
    pub fn release_graphics_resources(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        self.streamer.release_graphics_resources(device)?;
        self.tables.release(device)?;
        self.bindings = TableBindings::default();
        Ok(())
    }

    fn needs_load(&self, volume: &Volume) -> Result<bool> {
        if self.reload || self.streamer.array_name() != Some(self.array.as_str()) {
            return Ok(true);
        }
        let array = volume.array(&self.array)?;
        let Some(encoding) = self.streamer.encoding() else {
            return Ok(true);
        };
        Ok(self.streamer.loaded_extent() != Some(volume.extent())
            || self.streamer.loaded_bounds() != Some(volume.bounds())
            || self.streamer.centering() != Some(array.centering())
            || encoding.scalar_type() != array.scalar_type()
            || encoding.components() != array.components()
            || encoding.ranges() != array.ranges())
    }

    /// Configured step, or the smallest world-space spacing coarsened by
    /// the reduction factor.
    fn compute_sample_distance(&self, volume: &Volume) -> f32 {
        if !self.config.auto_adjust_sample_distance {
            return self.config.sample_distance;
        }
        let spacing = volume.spacing();
        let axes = [self.model.x_axis, self.model.y_axis, self.model.z_axis];
        let min_spacing = (0..3)
            .map(|i| (spacing[i] * axes[i].truncate().length()).abs())
            .fold(f32::INFINITY, f32::min);
        let factor = self.config.reduction_factor;
        if factor > 0.0 && factor < 1.0 {
            min_spacing / factor
        } else {
            min_spacing
        }
    }

    fn update_tables(
        &mut self,
        device: &mut dyn TextureDevice,
        property: &mut VolumeProperty,
    ) -> Result<usize> {
        let Some(encoding) = self.streamer.encoding() else {
            return Err(RenderError::NoInput);
        };
        let ranges = encoding.ranges().to_vec();
        let active = property.active_tables(encoding.components());
        let filter = self.config.interpolation.filter();
        let mut bindings = TableBindings::default();
        let mut rebuilt = 0;

        for index in active.clone() {
            let range = property.range_override(index).unwrap_or(ranges[index]);
            let inputs = TableInputs {
                range,
                blend_mode: self.config.blend_mode,
                sample_distance: self.sample_distance,
                unit_distance: property.scalar_opacity_unit_distance(index),
                filter,
            };

            property.color_mut(index).ensure_default(range);
            let key = TableKey::new(TableKind::Color, index);
            rebuilt += usize::from(self.tables.update(device, key, property.color(index), &inputs)?);
            bindings.color[index] = self.tables.texture(key);

            property.scalar_opacity_mut(index).ensure_default(range);
            let key = TableKey::new(TableKind::ScalarOpacity, index);
            rebuilt += usize::from(self.tables.update(
                device,
                key,
                property.scalar_opacity(index),
                &inputs,
            )?);
            bindings.scalar_opacity[index] = self.tables.texture(key);

            if let Some(gradient) = property.gradient_opacity_mut(index) {
                gradient.ensure_default(range);
                let key = TableKey::new(TableKind::GradientOpacity, index);
                rebuilt += usize::from(self.tables.update(device, key, &*gradient, &inputs)?);
                bindings.gradient_opacity[index] = self.tables.texture(key);
            }
        }

        self.tables.retain(device, |key| {
            active.contains(&key.component)
                && (key.kind != TableKind::GradientOpacity
                    || property.gradient_opacity(key.component).is_some())
        })?;
        self.bindings = bindings;
        Ok(rebuilt)
    }

    fn frame_uniforms(
        &self,
        volume: &Volume,
        property: &VolumeProperty,
        camera: &Camera,
    ) -> DrawUniforms {
        let mut uniforms = DrawUniforms::default();
        uniforms.set_scale_bias(self.streamer.scale_bias());
        if let Some(encoding) = self.streamer.encoding() {
            uniforms.components = encoding.components() as u32;
            for (c, &[lo, hi]) in encoding.ranges().iter().enumerate() {
                let range = property.range_override(c).unwrap_or([lo, hi]);
                uniforms.scalars_range_min[c] = range[0] as f32;
                uniforms.scalars_range_max[c] = range[1] as f32;
                uniforms.component_weight[c] = property.component_weight(c);
            }
        }
        let (scale, bias) = self.config.intensity_scale_bias();
        uniforms.intensity_scale = scale;
        uniforms.intensity_bias = bias;
        uniforms.sample_distance = self.sample_distance;
        uniforms.cell_spacing = vec4(volume.spacing());
        uniforms.camera_position = vec4(camera.position());
        uniforms.projection_direction = vec4(camera.direction());
        uniforms.independent_components = u32::from(property.independent_components());
        uniforms.blend_mode = self.config.blend_mode.as_u32();
        uniforms.camera_inside = u32::from(self.is_camera_inside(camera));
        uniforms.parallel_projection = u32::from(camera.is_parallel());
        uniforms
    }
}

impl RenderUnit for VolumeMapper {
    fn bounds(&self) -> Aabb {
        self.world_bounds().unwrap_or_default()
    }
}
