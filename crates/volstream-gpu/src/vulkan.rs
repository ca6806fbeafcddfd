//! Vulkan implementation of [`TextureDevice`].
//!
//! Every texture is an optimally tiled image kept in
//! `SHADER_READ_ONLY_OPTIMAL` between uploads. Uploads go through a staging
//! buffer that only grows, and block on a fence so that
//! [`TextureDevice::upload`] returns with the copy complete.

use crate::command::TransferCommands;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{GpuImage, StagingBuffer};
use crate::texture::{
    validate_upload, ChannelKind, Filter, HostLayout, SamplerState, TexelFormat, TextureDesc,
    TextureDevice, TextureDimension, TextureHandle, TextureLimits, TextureRegion,
};
use ash::vk;
use hashbrown::HashMap;

/// Vulkan format for a texel layout.
pub fn vk_format(format: TexelFormat) -> vk::Format {
    use ChannelKind as K;
    match (format.kind, format.channels) {
        (K::Unorm8, 1) => vk::Format::R8_UNORM,
        (K::Unorm8, 2) => vk::Format::R8G8_UNORM,
        (K::Unorm8, 3) => vk::Format::R8G8B8_UNORM,
        (K::Unorm8, _) => vk::Format::R8G8B8A8_UNORM,
        (K::Snorm8, 1) => vk::Format::R8_SNORM,
        (K::Snorm8, 2) => vk::Format::R8G8_SNORM,
        (K::Snorm8, 3) => vk::Format::R8G8B8_SNORM,
        (K::Snorm8, _) => vk::Format::R8G8B8A8_SNORM,
        (K::Unorm16, 1) => vk::Format::R16_UNORM,
        (K::Unorm16, 2) => vk::Format::R16G16_UNORM,
        (K::Unorm16, 3) => vk::Format::R16G16B16_UNORM,
        (K::Unorm16, _) => vk::Format::R16G16B16A16_UNORM,
        (K::Snorm16, 1) => vk::Format::R16_SNORM,
        (K::Snorm16, 2) => vk::Format::R16G16_SNORM,
        (K::Snorm16, 3) => vk::Format::R16G16B16_SNORM,
        (K::Snorm16, _) => vk::Format::R16G16B16A16_SNORM,
        (K::Float32, 1) => vk::Format::R32_SFLOAT,
        (K::Float32, 2) => vk::Format::R32G32_SFLOAT,
        (K::Float32, 3) => vk::Format::R32G32B32_SFLOAT,
        (K::Float32, _) => vk::Format::R32G32B32A32_SFLOAT,
    }
}

fn vk_filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

fn image_type(dimension: TextureDimension) -> (vk::ImageType, vk::ImageViewType) {
    match dimension {
        TextureDimension::D2 => (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D),
        TextureDimension::D3 => (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D),
    }
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

struct VulkanTexture {
    desc: TextureDesc,
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

/// Texture device backed by a [`GpuContext`].
pub struct VulkanTextureDevice<'a> {
    context: &'a GpuContext,
    commands: TransferCommands,
    staging: Option<StagingBuffer>,
    textures: HashMap<TextureHandle, VulkanTexture>,
    next_handle: u32,
    bytes_resident: u64,
}

impl<'a> VulkanTextureDevice<'a> {
    /// Create a texture device on `context`'s queue.
    pub fn new(context: &'a GpuContext) -> Result<Self> {
        let commands = unsafe { TransferCommands::new(context.device(), context.queue_family())? };
        tracing::debug!("Texture device on {}", context.describe());
        Ok(Self {
            context,
            commands,
            staging: None,
            textures: HashMap::new(),
            next_handle: 1,
            bytes_resident: 0,
        })
    }

    /// Image view and sampler of a live texture, ready for a descriptor write.
    pub fn descriptor_info(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.textures.get(&texture).map(|t| {
            vk::DescriptorImageInfo::default()
                .image_view(t.view)
                .sampler(t.sampler)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        })
    }

    fn create_sampler(&self, state: SamplerState) -> Result<vk::Sampler> {
        let filter = vk_filter(state.filter);
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0);
        let sampler = unsafe { self.context.device().create_sampler(&info, None)? };
        Ok(sampler)
    }

    fn transition(
        &self,
        image: vk::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> Result<()> {
        let device = self.context.device();
        unsafe {
            self.commands.submit_and_wait(device, self.context.queue(), |cmd| {
                record_transition(device, cmd, image, from, to);
            })
        }
    }

    fn release(&mut self, texture: VulkanTexture) -> Result<()> {
        let device = self.context.device();
        let mut image = texture.image;
        unsafe {
            device.destroy_sampler(texture.sampler, None);
            device.destroy_image_view(texture.view, None);
        }
        self.bytes_resident -= image.allocation_size();
        self.context.allocator().lock().free_image(&mut image)
    }

    /// Make sure the staging buffer holds at least `bytes`.
    fn reserve_staging(&mut self, bytes: u64) -> Result<()> {
        if self.staging.as_ref().is_some_and(|s| s.fits(bytes)) {
            return Ok(());
        }
        let mut allocator = self.context.allocator().lock();
        if let Some(mut old) = self.staging.take() {
            allocator.free_staging_buffer(&mut old)?;
        }
        let staging = allocator.create_staging_buffer(bytes)?;
        tracing::debug!("Staging buffer grown to {} bytes", staging.size());
        self.staging = Some(staging);
        Ok(())
    }
}

unsafe fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) {
    let (src_access, src_stage) = match from {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
    };
    let (dst_access, dst_stage) = match to {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        _ => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    };
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(from)
        .new_layout(to)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(COLOR_RANGE);
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

impl TextureDevice for VulkanTextureDevice<'_> {
    fn limits(&self) -> TextureLimits {
        self.context.texture_limits()
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn probe_texture(&self, desc: &TextureDesc) -> Result<()> {
        self.limits().check(desc)?;

        let (ty, _) = image_type(desc.dimension);
        let rejected = |reason: String| GpuError::ProxyRejected {
            size: desc.size,
            format: desc.format.to_string(),
            reason,
        };
        let properties = self
            .context
            .image_format_properties(vk_format(desc.format), ty)
            .map_err(|e| rejected(e.to_string()))?;

        let max = properties.max_extent;
        if desc.size.x > max.width || desc.size.y > max.height || desc.size.z > max.depth {
            return Err(rejected(format!(
                "format allows at most {}x{}x{}",
                max.width, max.height, max.depth
            )));
        }
        if desc.byte_size() > properties.max_resource_size {
            return Err(rejected(format!(
                "{} bytes exceeds resource limit {}",
                desc.byte_size(),
                properties.max_resource_size
            )));
        }
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        self.probe_texture(desc)?;

        let format = vk_format(desc.format);
        let (ty, view_ty) = image_type(desc.dimension);
        let extent = vk::Extent3D {
            width: desc.size.x,
            height: desc.size.y,
            depth: desc.size.z,
        };
        let create_info = vk::ImageCreateInfo::default()
            .image_type(ty)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = self
            .context
            .allocator()
            .lock()
            .create_image(&create_info, &desc.label)?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(view_ty)
            .format(format)
            .subresource_range(COLOR_RANGE);
        let view = match unsafe { self.context.device().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.context.allocator().lock().free_image(&mut image)?;
                return Err(e.into());
            }
        };
        let sampler = self.create_sampler(SamplerState::default())?;

        let texture = VulkanTexture {
            desc: desc.clone(),
            image,
            view,
            sampler,
        };
        self.bytes_resident += texture.image.allocation_size();
        if let Err(e) = self.transition(
            texture.image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ) {
            self.release(texture)?;
            return Err(e);
        }

        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        tracing::debug!(
            "Created texture '{}' {} {} ({} bytes)",
            desc.label,
            desc.size,
            desc.format,
            desc.byte_size()
        );
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn upload(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        layout: &HostLayout,
        data: &[u8],
    ) -> Result<()> {
        let target = self
            .textures
            .get(&texture)
            .ok_or(GpuError::UnknownTexture(texture.0))?;
        validate_upload(&target.desc, region, layout, data.len())?;
        let image = target.image.image;

        let span = layout.span_bytes(region.size, target.desc.format.bytes_per_texel());
        self.reserve_staging(span as u64)?;

        let copy = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(layout.row_length)
            .buffer_image_height(layout.image_height)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D {
                x: region.offset.x as i32,
                y: region.offset.y as i32,
                z: region.offset.z as i32,
            })
            .image_extent(vk::Extent3D {
                width: region.size.x,
                height: region.size.y,
                depth: region.size.z,
            });

        let device = self.context.device();
        let staging = self
            .staging
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Staging buffer missing".to_string()))?;
        staging.write(&data[..span])?;
        let buffer = staging.buffer;
        unsafe {
            self.commands.submit_and_wait(device, self.context.queue(), |cmd| {
                record_transition(
                    device,
                    cmd,
                    image,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy],
                );
                record_transition(
                    device,
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            })
        }
    }

    fn set_sampler(&mut self, texture: TextureHandle, sampler: SamplerState) -> Result<()> {
        let new_sampler = self.create_sampler(sampler)?;
        let Some(target) = self.textures.get_mut(&texture) else {
            unsafe { self.context.device().destroy_sampler(new_sampler, None) };
            return Err(GpuError::UnknownTexture(texture.0));
        };
        let old = std::mem::replace(&mut target.sampler, new_sampler);
        unsafe { self.context.device().destroy_sampler(old, None) };
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()> {
        let removed = self
            .textures
            .remove(&texture)
            .ok_or(GpuError::UnknownTexture(texture.0))?;
        self.context.wait_idle()?;
        self.release(removed)
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(&texture).map(|t| &t.desc)
    }

    fn bytes_resident(&self) -> u64 {
        self.bytes_resident
    }
}

impl Drop for VulkanTextureDevice<'_> {
    fn drop(&mut self) {
        let _ = self.context.wait_idle();
        let textures: Vec<_> = self.textures.drain().map(|(_, t)| t).collect();
        for texture in textures {
            if let Err(e) = self.release(texture) {
                tracing::warn!("Failed to release texture: {e}");
            }
        }
        if let Some(mut staging) = self.staging.take() {
            if let Err(e) = self.context.allocator().lock().free_staging_buffer(&mut staging) {
                tracing::warn!("Failed to free staging buffer: {e}");
            }
        }
        unsafe { self.commands.destroy(self.context.device()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mapping_covers_all_widths() {
        let f = |kind, channels| vk_format(TexelFormat::new(kind, channels).unwrap());
        assert_eq!(f(ChannelKind::Unorm8, 1), vk::Format::R8_UNORM);
        assert_eq!(f(ChannelKind::Snorm16, 2), vk::Format::R16G16_SNORM);
        assert_eq!(f(ChannelKind::Float32, 4), vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(f(ChannelKind::Unorm16, 3), vk::Format::R16G16B16_UNORM);
    }
}
