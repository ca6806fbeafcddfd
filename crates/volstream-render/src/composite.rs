//! Scenes made of several independent volumes.
//!
//! Each volume keeps its own mapper, tables and blocks. Volumes are ordered
//! back to front by their world bounds, then each volume draws its own
//! blocks back to front.

use glam::Mat4;
use volstream_core::{Version, Volume};
use volstream_gpu::TextureDevice;

use crate::camera::Camera;
use crate::error::{RenderError, Result};
use crate::mapper::{DrawRequest, FrameStats, VolumeMapper};
use crate::property::VolumeProperty;
use crate::sort::{sort_back_to_front, SortView};

/// Input of one sub-volume for a frame.
pub struct CompositeInput<'a> {
    pub volume: &'a Volume,
    pub property: &'a mut VolumeProperty,
}

/// Renders several volumes in a consistent back-to-front order.
#[derive(Default)]
pub struct CompositeMapper {
    mappers: Vec<VolumeMapper>,
    order: Vec<usize>,
    sort_key: Option<(Version, Vec<Version>)>,
}

impl CompositeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sub-mapper, returning its index.
    pub fn add_mapper(&mut self, mapper: VolumeMapper) -> usize {
        self.mappers.push(mapper);
        self.sort_key = None;
        self.mappers.len() - 1
    }

    pub fn mappers(&self) -> &[VolumeMapper] {
        &self.mappers
    }

    pub fn mapper_mut(&mut self, index: usize) -> Option<&mut VolumeMapper> {
        self.mappers.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    /// Sub-mapper order of the last frame, farthest first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Render every sub-volume. `inputs[i]` feeds mapper `i`; `draw`
    /// receives the mapper index with each block draw.
    pub fn render<F>(
        &mut self,
        device: &mut dyn TextureDevice,
        inputs: &mut [CompositeInput<'_>],
        camera: &Camera,
        mut draw: F,
    ) -> Result<Vec<FrameStats>>
    where
        F: FnMut(usize, &DrawRequest<'_>) -> Result<()>,
    {
        if inputs.len() != self.mappers.len() {
            return Err(RenderError::InvalidConfig(format!(
                "{} inputs for {} volumes",
                inputs.len(),
                self.mappers.len()
            )));
        }

        let mut rebuilt = Vec::with_capacity(self.mappers.len());
        for (mapper, input) in self.mappers.iter_mut().zip(inputs.iter_mut()) {
            rebuilt.push(mapper.prepare(device, input.volume, input.property)?);
        }
        self.sort_mappers(camera);

        let mut stats = vec![FrameStats::default(); self.mappers.len()];
        for &index in &self.order {
            let input = &inputs[index];
            let mut frame = self.mappers[index].draw_blocks(
                device,
                input.volume,
                &*input.property,
                camera,
                |request| draw(index, request),
            )?;
            frame.tables_rebuilt = rebuilt[index];
            stats[index] = frame;
        }
        Ok(stats)
    }

    /// Destroy the textures of every sub-mapper.
    pub fn release_graphics_resources(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        for mapper in &mut self.mappers {
            mapper.release_graphics_resources(device)?;
        }
        Ok(())
    }

    fn sort_mappers(&mut self, camera: &Camera) {
        let key: (Version, Vec<Version>) = (
            camera.version(),
            self.mappers.iter().map(VolumeMapper::layout_version).collect(),
        );
        if self.sort_key.as_ref() == Some(&key) {
            return;
        }
        let view = SortView::from_camera(camera, &Mat4::IDENTITY);
        self.order = sort_back_to_front(&self.mappers, &view);
        self.sort_key = Some(key);
    }
}
