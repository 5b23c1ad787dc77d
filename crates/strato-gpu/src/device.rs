//! Device trait: resource creation and command list submission.

use std::sync::Arc;

use crate::context::{GpuCommandList, GpuContext};
use crate::format::Format;
use crate::resource::{
    BufferCreateInfo, BufferViewCreateInfo, GpuBuffer, GpuBufferView, GpuImage, GpuImageView,
    GpuQuery, GpuSampler, GpuShader, ImageCreateInfo, ImageViewCreateInfo, QueryKind,
};
use crate::state::{FormatFeatures, ImageTiling, MemoryFlags, SamplerCreateInfo, ShaderStage};

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: u64 },
    #[error("format {format:?} lacks required features {needed:?}")]
    UnsupportedFormat {
        format: Format,
        needed: FormatFeatures,
    },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// A logical device. Creation methods may be called from any thread.
pub trait GpuDevice: Send + Sync {
    fn create_buffer(
        &self,
        info: &BufferCreateInfo,
        memory: MemoryFlags,
    ) -> Result<Arc<dyn GpuBuffer>, GpuError>;

    fn create_image(
        &self,
        info: &ImageCreateInfo,
        memory: MemoryFlags,
    ) -> Result<Arc<dyn GpuImage>, GpuError>;

    fn create_image_view(
        &self,
        image: &Arc<dyn GpuImage>,
        info: &ImageViewCreateInfo,
    ) -> Result<Arc<dyn GpuImageView>, GpuError>;

    fn create_buffer_view(
        &self,
        buffer: &Arc<dyn GpuBuffer>,
        info: &BufferViewCreateInfo,
    ) -> Result<Arc<dyn GpuBufferView>, GpuError>;

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<Arc<dyn GpuSampler>, GpuError>;

    fn create_shader(
        &self,
        stage: ShaderStage,
        code: &[u8],
    ) -> Result<Arc<dyn GpuShader>, GpuError>;

    fn create_query(&self, kind: QueryKind) -> Result<Arc<dyn GpuQuery>, GpuError>;

    /// A recording context. Each context owns its recording state; command
    /// lists move between contexts and [`GpuDevice::submit_command_list`].
    fn create_context(&self) -> Box<dyn GpuContext>;

    fn create_command_list(&self) -> GpuCommandList;

    /// Queues a finished command list for execution. Submission order is
    /// execution order.
    fn submit_command_list(&self, cmd_list: GpuCommandList);

    /// Features the device supports for `format`.
    fn format_features(&self, format: Format) -> FormatFeatures;

    /// Whether an image with the given properties can be created with the
    /// given tiling.
    fn image_format_supported(&self, info: &ImageCreateInfo, tiling: ImageTiling) -> bool;
}
