use std::sync::{Arc, Mutex};

use strato_gpu::state::{AccessFlags, BufferUsage, MemoryFlags, PipelineStages};
use strato_gpu::{BufferCreateInfo, GpuBuffer, GpuBufferSlice, GpuDevice, GpuPhysicalSlice};

use crate::error::{ApiError, ApiResult};
use crate::resource::{BindFlags, CpuAccessFlags, MiscFlags, Usage};

/// Creation parameters for a linear memory resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferDesc {
    pub byte_width: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: MiscFlags,
}

/// Shader stages resources may be visible to. The layer always exposes
/// the full vertex/geometry/pixel pipeline.
pub(crate) fn enabled_shader_stages() -> PipelineStages {
    PipelineStages::VERTEX_SHADER | PipelineStages::GEOMETRY_SHADER | PipelineStages::PIXEL_SHADER
}

/// A linear memory resource. The backing allocation can be replaced by
/// discard maps, so consumers bind logical slices which resolve to the
/// current allocation on the worker thread.
pub struct Buffer {
    desc: BufferDesc,
    buffer: Arc<dyn GpuBuffer>,
    /// The allocation handed out by the most recent map. Discard maps
    /// swap in fresh backing here before the rename command is emitted.
    mapped: Mutex<GpuPhysicalSlice>,
}

impl Buffer {
    pub(crate) fn validate_desc(desc: &BufferDesc) -> ApiResult<()> {
        if desc.byte_width == 0 {
            return Err(ApiError::invalid_arg("buffer size must not be zero"));
        }

        if desc.bind_flags.contains(BindFlags::CONSTANT_BUFFER) && desc.byte_width % 16 != 0 {
            return Err(ApiError::invalid_arg(format!(
                "constant buffer size {} is not a multiple of 16",
                desc.byte_width
            )));
        }

        Ok(())
    }

    pub(crate) fn new(gpu: &Arc<dyn GpuDevice>, desc: &BufferDesc) -> ApiResult<Self> {
        Self::validate_desc(desc)?;

        let mut info = BufferCreateInfo {
            size: u64::from(desc.byte_width),
            usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            stages: PipelineStages::TRANSFER,
            access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
        };

        if desc.bind_flags.contains(BindFlags::VERTEX_BUFFER) {
            info.usage |= BufferUsage::VERTEX_BUFFER;
            info.stages |= PipelineStages::VERTEX_INPUT;
            info.access |= AccessFlags::VERTEX_ATTRIBUTE_READ;
        }

        if desc.bind_flags.contains(BindFlags::INDEX_BUFFER) {
            info.usage |= BufferUsage::INDEX_BUFFER;
            info.stages |= PipelineStages::VERTEX_INPUT;
            info.access |= AccessFlags::INDEX_READ;
        }

        if desc.bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
            info.usage |= BufferUsage::UNIFORM_BUFFER;
            info.stages |= enabled_shader_stages();
            info.access |= AccessFlags::UNIFORM_READ;
        }

        if desc.bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            info.usage |= BufferUsage::UNIFORM_TEXEL_BUFFER;
            info.stages |= enabled_shader_stages();
            info.access |= AccessFlags::SHADER_READ;
        }

        if desc.bind_flags.contains(BindFlags::STREAM_OUTPUT) {
            info.usage |= BufferUsage::STREAM_OUTPUT;
            info.stages |= PipelineStages::STREAM_OUTPUT;
            info.access |= AccessFlags::STREAM_OUTPUT_WRITE;
        }

        if desc.cpu_access_flags.contains(CpuAccessFlags::WRITE) {
            info.stages |= PipelineStages::HOST;
            info.access |= AccessFlags::HOST_WRITE;
        }

        if desc.cpu_access_flags.contains(CpuAccessFlags::READ) {
            info.stages |= PipelineStages::HOST;
            info.access |= AccessFlags::HOST_READ;
        }

        let buffer = gpu.create_buffer(&info, memory_flags(desc))?;
        let mapped = buffer.physical_slice();

        Ok(Buffer {
            desc: *desc,
            buffer,
            mapped: Mutex::new(mapped),
        })
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn gpu_buffer(&self) -> &Arc<dyn GpuBuffer> {
        &self.buffer
    }

    /// Logical slice spanning the whole buffer.
    pub fn slice(&self) -> GpuBufferSlice {
        GpuBufferSlice::whole(Arc::clone(&self.buffer))
    }

    pub fn is_host_visible(&self) -> bool {
        self.buffer
            .memory_flags()
            .contains(MemoryFlags::HOST_VISIBLE)
    }

    pub(crate) fn mapped_slice(&self) -> GpuPhysicalSlice {
        self.mapped.lock().unwrap().clone()
    }

    pub(crate) fn set_mapped_slice(&self, slice: GpuPhysicalSlice) {
        *self.mapped.lock().unwrap() = slice;
    }
}

/// Memory placement for a buffer. Constant buffers stay host visible
/// even with default usage since titles update them every frame.
fn memory_flags(desc: &BufferDesc) -> MemoryFlags {
    if desc.usage == Usage::Default && desc.bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
        return MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT;
    }

    match desc.usage {
        Usage::Default | Usage::Immutable => MemoryFlags::DEVICE_LOCAL,
        Usage::Dynamic => MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        Usage::Staging => {
            MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT | MemoryFlags::HOST_CACHED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_gpu::trace::TraceDevice;

    fn device() -> Arc<dyn GpuDevice> {
        TraceDevice::new()
    }

    #[test]
    fn bind_flags_select_backend_usage() {
        let gpu = device();
        let desc = BufferDesc {
            byte_width: 256,
            usage: Usage::Default,
            bind_flags: BindFlags::VERTEX_BUFFER | BindFlags::SHADER_RESOURCE,
            ..Default::default()
        };
        let buffer = Buffer::new(&gpu, &desc).unwrap();

        let info = buffer.gpu_buffer().info();
        assert!(info.usage.contains(BufferUsage::VERTEX_BUFFER));
        assert!(info.usage.contains(BufferUsage::UNIFORM_TEXEL_BUFFER));
        assert!(info.stages.contains(PipelineStages::VERTEX_INPUT));
        assert!(info.access.contains(AccessFlags::SHADER_READ));
        assert!(!buffer.is_host_visible());
    }

    #[test]
    fn default_constant_buffers_stay_host_visible() {
        let gpu = device();
        let desc = BufferDesc {
            byte_width: 64,
            usage: Usage::Default,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            ..Default::default()
        };
        let buffer = Buffer::new(&gpu, &desc).unwrap();
        assert!(buffer.is_host_visible());
    }
}
