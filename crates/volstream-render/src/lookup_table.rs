//! Transfer function lookup tables and their cache.
//!
//! A table is resampled and re-uploaded only when something that changes its
//! contents changed: the scalar range, the function itself, a missing
//! texture, or (for scalar opacity) the blend mode and sample distance the
//! opacity correction depends on. A filter change alone only touches the
//! sampler.

use hashbrown::HashMap;
use volstream_core::Version;
use volstream_gpu::{
    ChannelKind, Filter, HostLayout, SamplerState, TexelFormat, TextureDesc, TextureDevice,
    TextureHandle, TextureRegion,
};

use crate::config::BlendMode;
use crate::error::Result;
use crate::transfer_function::TransferFunction;

/// Which transfer function a table samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Color,
    ScalarOpacity,
    GradientOpacity,
}

impl TableKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::ScalarOpacity => "opacity",
            Self::GradientOpacity => "gradient opacity",
        }
    }
}

/// Cache key: one table per kind and component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub kind: TableKind,
    pub component: usize,
}

impl TableKey {
    pub const fn new(kind: TableKind, component: usize) -> Self {
        Self { kind, component }
    }
}

/// Everything besides the function that determines a table's contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableInputs {
    /// Scalar range the table spans.
    pub range: [f64; 2],
    pub blend_mode: BlendMode,
    /// Ray step in world units.
    pub sample_distance: f32,
    /// Distance the scalar opacity is defined for.
    pub unit_distance: f32,
    pub filter: Filter,
}

/// Table width that resolves the narrowest node interval of `function`
/// over `range`, at least `min_width` and at most `max_width`.
pub fn ideal_width(
    function: &dyn TransferFunction,
    range: [f64; 2],
    min_width: u32,
    max_width: u32,
) -> u32 {
    let span = (range[1] - range[0]).abs();
    let needed = match function.min_node_spacing() {
        Some(dx) if span > 0.0 => ((span / dx).ceil() + 1.0).min(f64::from(max_width)) as u32,
        _ => 0,
    };
    needed.max(min_width).min(max_width).max(1)
}

/// Correct sampled opacities for the ray step.
///
/// Composite blending accumulates opacity per step, so the per-sample value
/// is rescaled to keep the optical density independent of the step length.
/// Additive blending scales linearly.
pub fn correct_opacity(
    samples: &mut [f32],
    blend_mode: BlendMode,
    sample_distance: f32,
    unit_distance: f32,
) {
    let ratio = if unit_distance > 0.0 {
        sample_distance / unit_distance
    } else {
        1.0
    };
    match blend_mode {
        BlendMode::Composite => {
            for value in samples {
                *value = 1.0 - (1.0 - value.clamp(0.0, 1.0)).powf(ratio);
            }
        }
        BlendMode::Additive => {
            for value in samples {
                *value *= ratio;
            }
        }
        BlendMode::MaximumIntensity => {}
    }
}

/// One sampled transfer function and its texture.
#[derive(Debug)]
pub struct LookupTable {
    key: TableKey,
    texture: Option<TextureHandle>,
    width: u32,
    samples: Vec<f32>,
    last_inputs: Option<TableInputs>,
    filter: Filter,
    source_version: Version,
    build_version: Version,
}

impl LookupTable {
    pub fn new(key: TableKey) -> Self {
        Self {
            key,
            texture: None,
            width: 0,
            samples: Vec::new(),
            last_inputs: None,
            filter: Filter::Linear,
            source_version: Version::NEVER,
            build_version: Version::NEVER,
        }
    }

    pub fn key(&self) -> TableKey {
        self.key
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Texels in the table.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Host copy of the last upload.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Version stamped by the last rebuild.
    pub fn build_version(&self) -> Version {
        self.build_version
    }

    /// Function version the table was last built from.
    pub fn source_version(&self) -> Version {
        self.source_version
    }

    /// Scalar range of the last rebuild.
    pub fn range(&self) -> Option<[f64; 2]> {
        self.last_inputs.map(|i| i.range)
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Whether the table must be resampled for `function` under `inputs`.
    pub fn needs_update(&self, function: &dyn TransferFunction, inputs: &TableInputs) -> bool {
        let Some(last) = self.last_inputs else {
            return true;
        };
        if self.texture.is_none()
            || last.range != inputs.range
            || function.version() != self.source_version
        {
            return true;
        }
        self.key.kind == TableKind::ScalarOpacity
            && (last.blend_mode != inputs.blend_mode
                || last.sample_distance != inputs.sample_distance
                || last.unit_distance != inputs.unit_distance)
    }

    /// Bring the table up to date. Returns whether it was rebuilt.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn update(
        &mut self,
        device: &mut dyn TextureDevice,
        function: &dyn TransferFunction,
        inputs: &TableInputs,
        min_width: u32,
    ) -> Result<bool> {
        if !self.needs_update(function, inputs) {
            self.set_filter(device, inputs.filter)?;
            return Ok(false);
        }

        let width = ideal_width(
            function,
            inputs.range,
            min_width,
            device.limits().max_texture_2d,
        );
        let channels = function.channels();
        let len = width as usize * channels;
        if self.samples.len() != len {
            self.samples = vec![0.0; len];
        }
        function.sample_into(inputs.range, width as usize, &mut self.samples);
        if self.key.kind == TableKind::ScalarOpacity {
            correct_opacity(
                &mut self.samples,
                inputs.blend_mode,
                inputs.sample_distance,
                inputs.unit_distance,
            );
        }

        let format = TexelFormat::new(ChannelKind::Float32, channels as u32)?;
        let desc = TextureDesc::table(
            format!("{} table {}", self.key.kind.name(), self.key.component),
            width,
            1,
            format,
        );
        let texture = self.ensure_texture(device, &desc, inputs.filter)?;
        device.upload(
            texture,
            &TextureRegion::whole(desc.size),
            &HostLayout::tight(desc.size),
            bytemuck::cast_slice(self.samples.as_slice()),
        )?;

        self.width = width;
        self.last_inputs = Some(*inputs);
        self.source_version = function.version();
        self.build_version = Version::next();
        tracing::debug!(
            "Rebuilt {} ({} texels over [{}, {}])",
            desc.label,
            width,
            inputs.range[0],
            inputs.range[1]
        );
        Ok(true)
    }

    /// Change the sampling filter without resampling.
    pub fn set_filter(&mut self, device: &mut dyn TextureDevice, filter: Filter) -> Result<()> {
        if filter == self.filter {
            return Ok(());
        }
        if let Some(texture) = self.texture {
            device.set_sampler(texture, SamplerState { filter })?;
        }
        self.filter = filter;
        Ok(())
    }

    /// Destroy the texture; the next update rebuilds it.
    pub fn release(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture)?;
        }
        Ok(())
    }

    /// Reuse the current texture if it has the right shape, otherwise
    /// allocate a new one after the capability checks pass.
    fn ensure_texture(
        &mut self,
        device: &mut dyn TextureDevice,
        desc: &TextureDesc,
        filter: Filter,
    ) -> Result<TextureHandle> {
        if let Some(texture) = self.texture {
            let fits = device
                .texture_desc(texture)
                .is_some_and(|d| d.size == desc.size && d.format == desc.format);
            if fits {
                self.set_filter(device, filter)?;
                return Ok(texture);
            }
        }

        let checked = device
            .limits()
            .check(desc)
            .and_then(|()| device.probe_texture(desc));
        if let Err(e) = checked {
            tracing::warn!("Cannot allocate {} ({}): {}", desc.label, desc.size, e);
            return Err(e.into());
        }
        if let Some(old) = self.texture.take() {
            device.destroy_texture(old)?;
        }
        let texture = device.create_texture(desc)?;
        device.set_sampler(texture, SamplerState { filter })?;
        self.texture = Some(texture);
        self.filter = filter;
        Ok(texture)
    }
}

/// Lookup tables keyed per kind and component.
#[derive(Debug)]
pub struct LookupTableCache {
    tables: HashMap<TableKey, LookupTable>,
    min_width: u32,
}

impl Default for LookupTableCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LookupTableCache {
    /// Create a cache whose tables are at least `min_width` texels wide.
    pub fn new(min_width: u32) -> Self {
        Self {
            tables: HashMap::new(),
            min_width: min_width.max(1),
        }
    }

    pub fn min_width(&self) -> u32 {
        self.min_width
    }

    /// Change the minimum width. Tables pick it up on their next rebuild.
    pub fn set_min_width(&mut self, min_width: u32) {
        self.min_width = min_width.max(1);
    }

    /// Bring the table for `key` up to date, creating it on first use.
    /// Returns whether it was rebuilt.
    pub fn update(
        &mut self,
        device: &mut dyn TextureDevice,
        key: TableKey,
        function: &dyn TransferFunction,
        inputs: &TableInputs,
    ) -> Result<bool> {
        let min_width = self.min_width;
        self.tables
            .entry(key)
            .or_insert_with(|| LookupTable::new(key))
            .update(device, function, inputs, min_width)
    }

    pub fn get(&self, key: TableKey) -> Option<&LookupTable> {
        self.tables.get(&key)
    }

    /// Texture of the table for `key`, if built.
    pub fn texture(&self, key: TableKey) -> Option<TextureHandle> {
        self.tables.get(&key).and_then(LookupTable::texture)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Apply a filter to every table without resampling.
    pub fn set_filter(&mut self, device: &mut dyn TextureDevice, filter: Filter) -> Result<()> {
        for table in self.tables.values_mut() {
            table.set_filter(device, filter)?;
        }
        Ok(())
    }

    /// Drop tables not accepted by `keep`, destroying their textures.
    pub fn retain(
        &mut self,
        device: &mut dyn TextureDevice,
        mut keep: impl FnMut(TableKey) -> bool,
    ) -> Result<()> {
        let stale: Vec<TableKey> = self.tables.keys().copied().filter(|&k| !keep(k)).collect();
        for key in stale {
            if let Some(mut table) = self.tables.remove(&key) {
                table.release(device)?;
            }
        }
        Ok(())
    }

    /// Destroy every table texture. Tables rebuild on their next update.
    pub fn release(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        for table in self.tables.values_mut() {
            table.release(device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_function::{ColorTransferFunction, PiecewiseFunction};
    use approx::assert_relative_eq;
    use volstream_gpu::{HeadlessDevice, TextureLimits};

    fn inputs(range: [f64; 2]) -> TableInputs {
        TableInputs {
            range,
            blend_mode: BlendMode::Composite,
            sample_distance: 1.0,
            unit_distance: 1.0,
            filter: Filter::Linear,
        }
    }

    fn ramp() -> PiecewiseFunction {
        let mut f = PiecewiseFunction::new();
        f.ensure_default([0.0, 1.0]);
        f
    }

    const OPACITY: TableKey = TableKey::new(TableKind::ScalarOpacity, 0);

    #[test]
    fn identical_update_is_a_no_op() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let f = ramp();
        assert!(cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap());
        let built = cache.get(OPACITY).unwrap().build_version();
        assert!(!cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap());
        assert_eq!(cache.get(OPACITY).unwrap().build_version(), built);
        assert_eq!(device.stats().uploads, 1);
    }

    #[test]
    fn range_and_function_changes_rebuild() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let mut f = ramp();
        cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap();
        assert!(cache.update(&mut device, OPACITY, &f, &inputs([0.0, 2.0])).unwrap());
        f.add_point(0.5, 1.0);
        assert!(cache.update(&mut device, OPACITY, &f, &inputs([0.0, 2.0])).unwrap());
        assert_eq!(device.stats().uploads, 3);
        // Same width every time, so the texture is reused
        assert_eq!(device.stats().textures_created, 1);
    }

    #[test]
    fn opacity_depends_on_blend_and_step_but_color_does_not() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let f = ramp();
        let mut color = ColorTransferFunction::new();
        color.ensure_default([0.0, 1.0]);
        let color_key = TableKey::new(TableKind::Color, 0);
        let base = inputs([0.0, 1.0]);
        cache.update(&mut device, OPACITY, &f, &base).unwrap();
        cache.update(&mut device, color_key, &color, &base).unwrap();

        let changed = TableInputs {
            sample_distance: 0.5,
            ..base
        };
        assert!(cache.update(&mut device, OPACITY, &f, &changed).unwrap());
        assert!(!cache.update(&mut device, color_key, &color, &changed).unwrap());
        let additive = TableInputs {
            blend_mode: BlendMode::Additive,
            ..changed
        };
        assert!(cache.update(&mut device, OPACITY, &f, &additive).unwrap());
    }

    #[test]
    fn filter_change_only_touches_sampler() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let f = ramp();
        cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap();
        let nearest = TableInputs {
            filter: Filter::Nearest,
            ..inputs([0.0, 1.0])
        };
        assert!(!cache.update(&mut device, OPACITY, &f, &nearest).unwrap());
        let texture = cache.texture(OPACITY).unwrap();
        assert_eq!(device.sampler(texture).unwrap().filter, Filter::Nearest);
        assert_eq!(device.stats().uploads, 1);
    }

    #[test]
    fn composite_correction_preserves_density() {
        let mut samples = vec![0.0, 0.5, 1.0];
        correct_opacity(&mut samples, BlendMode::Composite, 2.0, 1.0);
        assert_relative_eq!(samples[0], 0.0);
        assert_relative_eq!(samples[1], 0.75);
        assert_relative_eq!(samples[2], 1.0);

        let mut samples = vec![0.25];
        correct_opacity(&mut samples, BlendMode::Additive, 0.5, 1.0);
        assert_relative_eq!(samples[0], 0.125);

        let mut samples = vec![0.25];
        correct_opacity(&mut samples, BlendMode::MaximumIntensity, 0.5, 1.0);
        assert_relative_eq!(samples[0], 0.25);
    }

    #[test]
    fn width_follows_node_spacing_within_limits() {
        let mut f = PiecewiseFunction::new();
        f.add_point(0.0, 0.0);
        f.add_point(1.0 / 1024.0, 1.0);
        f.add_point(10.0, 1.0);
        assert_eq!(ideal_width(&f, [0.0, 10.0], 1024, 16384), 10241);
        assert_eq!(ideal_width(&f, [0.0, 10.0], 1024, 4096), 4096);
        assert_eq!(ideal_width(&ramp(), [0.0, 1.0], 1024, 4096), 1024);

        let mut device = HeadlessDevice::new(TextureLimits {
            max_texture_3d: 256,
            max_texture_2d: 512,
        });
        let mut cache = LookupTableCache::default();
        cache.update(&mut device, OPACITY, &f, &inputs([0.0, 10.0])).unwrap();
        assert_eq!(cache.get(OPACITY).unwrap().width(), 512);
    }

    #[test]
    fn components_are_independent() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let a = ramp();
        let mut b = ramp();
        let ka = TableKey::new(TableKind::ScalarOpacity, 0);
        let kb = TableKey::new(TableKind::ScalarOpacity, 1);
        cache.update(&mut device, ka, &a, &inputs([0.0, 1.0])).unwrap();
        cache.update(&mut device, kb, &b, &inputs([0.0, 1.0])).unwrap();
        b.add_point(0.3, 0.9);
        assert!(!cache.update(&mut device, ka, &a, &inputs([0.0, 1.0])).unwrap());
        assert!(cache.update(&mut device, kb, &b, &inputs([0.0, 1.0])).unwrap());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn release_forces_rebuild() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::default();
        let f = ramp();
        cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap();
        cache.release(&mut device).unwrap();
        assert_eq!(device.live_textures(), 0);
        assert!(cache.update(&mut device, OPACITY, &f, &inputs([0.0, 1.0])).unwrap());
        cache.retain(&mut device, |k| k.kind != TableKind::ScalarOpacity).unwrap();
        assert!(cache.is_empty());
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn uploaded_texels_match_samples() {
        let mut device = HeadlessDevice::default();
        let mut cache = LookupTableCache::new(4);
        let mut color = ColorTransferFunction::new();
        color.ensure_default([0.0, 3.0]);
        let key = TableKey::new(TableKind::Color, 0);
        cache.update(&mut device, key, &color, &inputs([0.0, 3.0])).unwrap();
        let table = cache.get(key).unwrap();
        assert_eq!(table.width(), 4);
        let texels: &[f32] = bytemuck::cast_slice(device.texels(table.texture().unwrap()).unwrap());
        assert_eq!(texels, table.samples());
        assert_relative_eq!(texels[4], 1.0 / 3.0);
    }
}
