use std::sync::{Arc, Mutex};

use strato_gpu::format::{format_info, mip_level_count, mip_level_extent, Extent3d, FormatInfo};
use strato_gpu::state::{
    AccessFlags, BufferUsage, ImageCreateFlags, ImageLayout, ImageTiling, ImageUsage, MemoryFlags,
    PipelineStages,
};
use strato_gpu::{
    BufferCreateInfo, GpuBuffer, GpuDevice, GpuImage, GpuPhysicalSlice, ImageCreateInfo, ImageType,
};

use crate::buffer::enabled_shader_stages;
use crate::error::{ApiError, ApiResult};
use crate::format::{decode_sample_count, lookup_format, FormatMode};
use crate::resource::{BindFlags, CpuAccessFlags, MiscFlags, ResourceDimension, Usage};

/// Creation parameters for a one-dimensional texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Texture1dDesc {
    pub width: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: MiscFlags,
}

/// Creation parameters for a two-dimensional texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Texture2dDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: MiscFlags,
}

/// Creation parameters for a three-dimensional texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Texture3dDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub format: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: MiscFlags,
}

/// Dimension-independent texture description shared by all three
/// public texture kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommonTextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub sample_count: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: MiscFlags,
}

impl From<&Texture1dDesc> for CommonTextureDesc {
    fn from(desc: &Texture1dDesc) -> Self {
        CommonTextureDesc {
            width: desc.width,
            height: 1,
            depth: 1,
            mip_levels: desc.mip_levels,
            array_size: desc.array_size,
            format: desc.format,
            sample_count: 1,
            usage: desc.usage,
            bind_flags: desc.bind_flags,
            cpu_access_flags: desc.cpu_access_flags,
            misc_flags: desc.misc_flags,
        }
    }
}

impl From<&Texture2dDesc> for CommonTextureDesc {
    fn from(desc: &Texture2dDesc) -> Self {
        CommonTextureDesc {
            width: desc.width,
            height: desc.height,
            depth: 1,
            mip_levels: desc.mip_levels,
            array_size: desc.array_size,
            format: desc.format,
            sample_count: desc.sample_count,
            usage: desc.usage,
            bind_flags: desc.bind_flags,
            cpu_access_flags: desc.cpu_access_flags,
            misc_flags: desc.misc_flags,
        }
    }
}

impl From<&Texture3dDesc> for CommonTextureDesc {
    fn from(desc: &Texture3dDesc) -> Self {
        CommonTextureDesc {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            mip_levels: desc.mip_levels,
            array_size: 1,
            format: desc.format,
            sample_count: 1,
            usage: desc.usage,
            bind_flags: desc.bind_flags,
            cpu_access_flags: desc.cpu_access_flags,
            misc_flags: desc.misc_flags,
        }
    }
}

/// How map calls reach the texture contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureMapMode {
    /// The texture cannot be mapped.
    None,
    /// The image is linear and host visible, so maps expose the image
    /// memory itself.
    Direct,
    /// Maps go through a host-visible staging buffer that is copied to
    /// or from the image around the map.
    Buffer,
}

/// An image resource of any dimension. Holds the backend image plus
/// the optional staging buffer maps are routed through.
pub struct Texture {
    dimension: ResourceDimension,
    desc: CommonTextureDesc,
    image: Arc<dyn GpuImage>,
    map_mode: TextureMapMode,
    mapped_buffer: Option<Arc<dyn GpuBuffer>>,
    /// Current staging allocation. Discard maps swap in fresh backing.
    mapped_slice: Mutex<Option<GpuPhysicalSlice>>,
    /// Subresource index of the active map, if any.
    mapped_subresource: Mutex<Option<u32>>,
}

impl Texture {
    pub(crate) fn new(
        gpu: &Arc<dyn GpuDevice>,
        dimension: ResourceDimension,
        desc: &CommonTextureDesc,
    ) -> ApiResult<Self> {
        let format = lookup_format(desc.format, format_mode(desc)).ok_or_else(|| {
            ApiError::invalid_arg(format!("unmapped texture format: {}", desc.format))
        })?;

        let mut flags = ImageCreateFlags::MUTABLE_FORMAT;

        if desc.misc_flags.contains(MiscFlags::TEXTURECUBE) {
            flags |= ImageCreateFlags::CUBE_COMPATIBLE;
        }

        if dimension == ResourceDimension::Texture3d {
            flags |= ImageCreateFlags::ARRAY_2D_COMPATIBLE;
        }

        let mut info = ImageCreateInfo {
            image_type: image_type(dimension),
            format,
            extent: Extent3d {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            },
            mip_levels: desc.mip_levels,
            array_layers: desc.array_size,
            sample_count: desc.sample_count,
            tiling: ImageTiling::Optimal,
            usage: ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST,
            stages: PipelineStages::TRANSFER,
            access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
            flags,
            layout: ImageLayout::General,
        };

        if desc.bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            info.usage |= ImageUsage::SAMPLED;
            info.stages |= enabled_shader_stages();
            info.access |= AccessFlags::SHADER_READ;
        }

        if desc.bind_flags.contains(BindFlags::RENDER_TARGET) {
            info.usage |= ImageUsage::COLOR_ATTACHMENT;
            info.stages |= PipelineStages::COLOR_ATTACHMENT_OUTPUT;
            info.access |= AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE;
        }

        if desc.bind_flags.contains(BindFlags::DEPTH_STENCIL) {
            info.usage |= ImageUsage::DEPTH_STENCIL_ATTACHMENT;
            info.stages |=
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS;
            info.access |= AccessFlags::DEPTH_STENCIL_READ | AccessFlags::DEPTH_STENCIL_WRITE;
        }

        let map_mode = determine_map_mode(gpu.as_ref(), desc, &info);

        let memory = match map_mode {
            TextureMapMode::Direct => {
                // Direct mapping keeps the image linear and writes land
                // in image memory straight from the application.
                info.tiling = ImageTiling::Linear;
                info.stages |= PipelineStages::HOST;

                if desc.cpu_access_flags.contains(CpuAccessFlags::WRITE) {
                    info.access |= AccessFlags::HOST_WRITE;
                }

                if desc.cpu_access_flags.contains(CpuAccessFlags::READ) {
                    info.access |= AccessFlags::HOST_READ;
                }

                MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT | MemoryFlags::HOST_CACHED
            }
            _ => {
                info.layout = optimize_layout(info.usage);
                MemoryFlags::DEVICE_LOCAL
            }
        };

        if !gpu.image_format_supported(&info, info.tiling) {
            return Err(ApiError::Unsupported(format!(
                "image not supported: format {:?}, samples {}, usage {:?}",
                info.format, info.sample_count, info.usage
            )));
        }

        let image = gpu.create_image(&info, memory)?;

        let mapped_buffer = match map_mode {
            TextureMapMode::Buffer => Some(create_mapped_buffer(gpu, &info)?),
            _ => None,
        };
        let mapped_slice = mapped_buffer.as_ref().map(|b| b.physical_slice());

        Ok(Texture {
            dimension,
            desc: *desc,
            image,
            map_mode,
            mapped_buffer,
            mapped_slice: Mutex::new(mapped_slice),
            mapped_subresource: Mutex::new(None),
        })
    }

    pub fn dimension(&self) -> ResourceDimension {
        self.dimension
    }

    pub fn desc(&self) -> &CommonTextureDesc {
        &self.desc
    }

    pub fn image(&self) -> &Arc<dyn GpuImage> {
        &self.image
    }

    pub fn map_mode(&self) -> TextureMapMode {
        self.map_mode
    }

    pub(crate) fn mapped_buffer(&self) -> Option<&Arc<dyn GpuBuffer>> {
        self.mapped_buffer.as_ref()
    }

    pub(crate) fn mapped_slice(&self) -> Option<GpuPhysicalSlice> {
        self.mapped_slice.lock().unwrap().clone()
    }

    pub(crate) fn set_mapped_slice(&self, slice: GpuPhysicalSlice) {
        *self.mapped_slice.lock().unwrap() = Some(slice);
    }

    pub(crate) fn set_mapped_subresource(&self, subresource: u32) {
        *self.mapped_subresource.lock().unwrap() = Some(subresource);
    }

    pub(crate) fn take_mapped_subresource(&self) -> Option<u32> {
        self.mapped_subresource.lock().unwrap().take()
    }

    pub fn subresource_count(&self) -> u32 {
        self.desc.mip_levels * self.desc.array_size
    }

    pub fn format_info(&self) -> FormatInfo {
        format_info(self.image.info().format)
    }

    pub fn mip_extent(&self, mip_level: u32) -> Extent3d {
        self.image.mip_level_extent(mip_level)
    }
}

/// Byte pitches of one tightly packed subresource level.
pub(crate) fn packed_pitches(info: &FormatInfo, extent: Extent3d) -> (u32, u32) {
    let blocks = info.block_count(extent);
    let row_pitch = info.element_size * blocks.width;
    let depth_pitch = row_pitch * blocks.height;
    (row_pitch, depth_pitch)
}

/// Byte size of one tightly packed subresource level.
pub(crate) fn packed_size(info: &FormatInfo, extent: Extent3d) -> u64 {
    let blocks = info.block_count(extent);
    u64::from(info.element_size)
        * u64::from(blocks.width)
        * u64::from(blocks.height)
        * u64::from(blocks.depth)
}

/// Resolves how typeless format codes should be interpreted for this
/// texture.
pub(crate) fn format_mode(desc: &CommonTextureDesc) -> FormatMode {
    if desc.bind_flags.contains(BindFlags::RENDER_TARGET) {
        return FormatMode::Color;
    }

    if desc.bind_flags.contains(BindFlags::DEPTH_STENCIL) {
        return FormatMode::Depth;
    }

    FormatMode::Any
}

/// Fixes up mip counts and validates the sample count before a texture
/// is created.
pub(crate) fn normalize_texture_desc(desc: &mut CommonTextureDesc) -> ApiResult<()> {
    if decode_sample_count(desc.sample_count).is_none() {
        return Err(ApiError::invalid_arg(format!(
            "invalid sample count: {}",
            desc.sample_count
        )));
    }

    let extent = Extent3d {
        width: desc.width,
        height: desc.height,
        depth: desc.depth,
    };

    let max_mip_count = if desc.sample_count <= 1 {
        mip_level_count(extent)
    } else {
        1
    };

    if desc.mip_levels == 0 || desc.mip_levels > max_mip_count {
        desc.mip_levels = max_mip_count;
    }

    Ok(())
}

fn image_type(dimension: ResourceDimension) -> ImageType {
    match dimension {
        ResourceDimension::Texture1d => ImageType::Dim1,
        ResourceDimension::Texture3d => ImageType::Dim3,
        _ => ImageType::Dim2,
    }
}

fn determine_map_mode(
    gpu: &dyn GpuDevice,
    desc: &CommonTextureDesc,
    info: &ImageCreateInfo,
) -> TextureMapMode {
    if desc.cpu_access_flags.is_empty() {
        return TextureMapMode::None;
    }

    // Dynamic textures are updated every frame; routing them through
    // the staging buffer avoids stalling on a linear image in use.
    if desc.usage == Usage::Dynamic {
        return TextureMapMode::Buffer;
    }

    let mut linear_info = *info;
    linear_info.tiling = ImageTiling::Linear;

    if gpu.image_format_supported(&linear_info, ImageTiling::Linear) {
        TextureMapMode::Direct
    } else {
        TextureMapMode::Buffer
    }
}

fn optimize_layout(usage: ImageUsage) -> ImageLayout {
    let filtered = usage - (ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST);

    // Attachment-only images never leave their attachment layout.
    if filtered == ImageUsage::COLOR_ATTACHMENT {
        return ImageLayout::ColorAttachmentOptimal;
    }

    if filtered == ImageUsage::DEPTH_STENCIL_ATTACHMENT {
        return ImageLayout::DepthStencilAttachmentOptimal;
    }

    let filtered =
        filtered - (ImageUsage::COLOR_ATTACHMENT | ImageUsage::DEPTH_STENCIL_ATTACHMENT);

    if filtered == ImageUsage::SAMPLED {
        return if usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            ImageLayout::DepthStencilReadOnlyOptimal
        } else {
            ImageLayout::ShaderReadOnlyOptimal
        };
    }

    ImageLayout::General
}

/// Staging buffer backing map calls in buffer mode. Sized for the
/// largest subresource, which is always mip zero.
fn create_mapped_buffer(
    gpu: &Arc<dyn GpuDevice>,
    info: &ImageCreateInfo,
) -> Result<Arc<dyn GpuBuffer>, strato_gpu::GpuError> {
    let format = format_info(info.format);

    let buffer_info = BufferCreateInfo {
        size: packed_size(&format, info.extent),
        usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        stages: PipelineStages::TRANSFER | PipelineStages::HOST,
        access: AccessFlags::TRANSFER_READ
            | AccessFlags::TRANSFER_WRITE
            | AccessFlags::HOST_READ
            | AccessFlags::HOST_WRITE,
    };

    gpu.create_buffer(
        &buffer_info,
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::dxgi;
    use strato_gpu::trace::TraceDevice;

    fn device() -> Arc<dyn GpuDevice> {
        TraceDevice::new()
    }

    fn desc_2d(width: u32, height: u32) -> CommonTextureDesc {
        CommonTextureDesc {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_size: 1,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            sample_count: 1,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: MiscFlags::empty(),
        }
    }

    #[test]
    fn mip_count_normalization_fills_full_chain() {
        let mut desc = desc_2d(256, 64);
        desc.mip_levels = 0;
        normalize_texture_desc(&mut desc).unwrap();
        assert_eq!(desc.mip_levels, 9);

        let mut desc = desc_2d(256, 64);
        desc.mip_levels = 100;
        normalize_texture_desc(&mut desc).unwrap();
        assert_eq!(desc.mip_levels, 9);

        let mut desc = desc_2d(256, 64);
        desc.sample_count = 4;
        desc.mip_levels = 0;
        normalize_texture_desc(&mut desc).unwrap();
        assert_eq!(desc.mip_levels, 1);
    }

    #[test]
    fn staging_textures_prefer_direct_mapping() {
        let gpu = device();

        let mut desc = desc_2d(64, 64);
        desc.usage = Usage::Staging;
        desc.bind_flags = BindFlags::empty();
        desc.cpu_access_flags = CpuAccessFlags::READ | CpuAccessFlags::WRITE;

        let tex = Texture::new(&gpu, ResourceDimension::Texture2d, &desc).unwrap();
        assert_eq!(tex.map_mode(), TextureMapMode::Direct);
        assert!(tex.mapped_buffer().is_none());

        // A mipped staging texture cannot be linear, so it falls back
        // to the staging buffer.
        let mut desc = desc_2d(64, 64);
        desc.usage = Usage::Staging;
        desc.bind_flags = BindFlags::empty();
        desc.cpu_access_flags = CpuAccessFlags::READ | CpuAccessFlags::WRITE;
        desc.mip_levels = 7;

        let tex = Texture::new(&gpu, ResourceDimension::Texture2d, &desc).unwrap();
        assert_eq!(tex.map_mode(), TextureMapMode::Buffer);
        let staging = tex.mapped_buffer().unwrap();
        assert_eq!(staging.info().size, 64 * 64 * 4);
    }

    #[test]
    fn attachment_only_images_keep_attachment_layout() {
        assert_eq!(
            optimize_layout(
                ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST | ImageUsage::COLOR_ATTACHMENT
            ),
            ImageLayout::ColorAttachmentOptimal
        );
        assert_eq!(
            optimize_layout(ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::TRANSFER_DST),
            ImageLayout::DepthStencilAttachmentOptimal
        );
        assert_eq!(
            optimize_layout(ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST),
            ImageLayout::ShaderReadOnlyOptimal
        );
        assert_eq!(
            optimize_layout(ImageUsage::SAMPLED | ImageUsage::DEPTH_STENCIL_ATTACHMENT),
            ImageLayout::DepthStencilReadOnlyOptimal
        );
        assert_eq!(
            optimize_layout(ImageUsage::SAMPLED | ImageUsage::COLOR_ATTACHMENT),
            ImageLayout::ShaderReadOnlyOptimal
        );
    }
}
