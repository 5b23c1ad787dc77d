//! Backend resource objects.
//!
//! Resources are exposed as trait objects so the translation layers can run
//! against any backend, including the in-memory recording backend used by
//! tests. Two identities matter here and must not be conflated:
//!
//! - a *buffer* ([`GpuBuffer`]) is the logical object bound to the
//!   pipeline, and
//! - an *allocation* ([`GpuAllocation`]) is one physical backing store.
//!
//! A buffer can be renamed onto a fresh allocation while the GPU still
//! reads the old one; that is what makes write-discard mapping cheap.
//! [`GpuBufferSlice`] references the logical buffer and resolves to the
//! then-current allocation when a command executes; [`GpuPhysicalSlice`]
//! pins one specific allocation, which is what a map hands out.

use std::sync::Arc;

use crate::format::{Extent3d, Format};
use crate::state::{
    AccessFlags, AspectFlags, BufferUsage, ImageCreateFlags, ImageLayout, ImageTiling, ImageUsage,
    MemoryFlags, PipelineStages, SamplerCreateInfo, ShaderStage,
};

/// One physical backing store with host access.
///
/// Reads and writes take `&self`; implementations synchronize internally so
/// a mapped allocation can be filled while the object is shared.
pub trait GpuAllocation: Send + Sync {
    /// Identifier unique per device, stable for the allocation's lifetime.
    fn id(&self) -> u64;
    fn len(&self) -> u64;
    fn write(&self, offset: u64, data: &[u8]);
    fn read(&self, offset: u64, out: &mut [u8]);
}

/// A byte range of one specific allocation.
#[derive(Clone)]
pub struct GpuPhysicalSlice {
    allocation: Arc<dyn GpuAllocation>,
    offset: u64,
    length: u64,
}

impl GpuPhysicalSlice {
    pub fn new(allocation: Arc<dyn GpuAllocation>, offset: u64, length: u64) -> Self {
        debug_assert!(offset + length <= allocation.len());
        Self {
            allocation,
            offset,
            length,
        }
    }

    /// The whole of `allocation`.
    pub fn whole(allocation: Arc<dyn GpuAllocation>) -> Self {
        let length = allocation.len();
        Self {
            allocation,
            offset: 0,
            length,
        }
    }

    pub fn allocation(&self) -> &Arc<dyn GpuAllocation> {
        &self.allocation
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// A sub-range of this slice.
    pub fn subslice(&self, offset: u64, length: u64) -> Self {
        debug_assert!(offset + length <= self.length);
        Self {
            allocation: Arc::clone(&self.allocation),
            offset: self.offset + offset,
            length,
        }
    }

    /// Whether two slices name the same bytes of the same allocation.
    pub fn matches(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.allocation, &other.allocation)
            && self.offset == other.offset
            && self.length == other.length
    }

    pub fn write(&self, offset: u64, data: &[u8]) {
        debug_assert!(offset + data.len() as u64 <= self.length);
        self.allocation.write(self.offset + offset, data);
    }

    pub fn read(&self, offset: u64, out: &mut [u8]) {
        debug_assert!(offset + out.len() as u64 <= self.length);
        self.allocation.read(self.offset + offset, out);
    }
}

impl std::fmt::Debug for GpuPhysicalSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuPhysicalSlice")
            .field("allocation", &self.allocation.id())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub size: u64,
    pub usage: BufferUsage,
    /// Stages that may access the buffer over its lifetime.
    pub stages: PipelineStages,
    /// Access types those stages may perform.
    pub access: AccessFlags,
}

/// A logical buffer object.
pub trait GpuBuffer: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn info(&self) -> &BufferCreateInfo;

    fn memory_flags(&self) -> MemoryFlags;

    /// The allocation currently backing the buffer.
    fn physical_slice(&self) -> GpuPhysicalSlice;

    /// Allocates a fresh backing store of the same size. The buffer keeps
    /// pointing at its current allocation until a rename command naming the
    /// new slice executes on the timeline.
    fn alloc_physical_slice(&self) -> GpuPhysicalSlice;

    /// Whether any submitted, unretired work still references the buffer.
    fn is_in_use(&self) -> bool;
}

/// A byte range of a logical buffer.
///
/// The range resolves against whatever allocation backs the buffer at the
/// time a command consuming it executes, so slices captured before a rename
/// see the renamed contents.
#[derive(Clone)]
pub struct GpuBufferSlice {
    buffer: Arc<dyn GpuBuffer>,
    offset: u64,
    length: u64,
}

impl GpuBufferSlice {
    pub fn new(buffer: Arc<dyn GpuBuffer>, offset: u64, length: u64) -> Self {
        debug_assert!(offset + length <= buffer.info().size);
        Self {
            buffer,
            offset,
            length,
        }
    }

    /// The whole of `buffer`.
    pub fn whole(buffer: Arc<dyn GpuBuffer>) -> Self {
        let length = buffer.info().size;
        Self {
            buffer,
            offset: 0,
            length,
        }
    }

    pub fn buffer(&self) -> &Arc<dyn GpuBuffer> {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn subslice(&self, offset: u64, length: u64) -> Self {
        debug_assert!(offset + length <= self.length);
        Self {
            buffer: Arc::clone(&self.buffer),
            offset: self.offset + offset,
            length,
        }
    }

    /// Whether two slices name the same range of the same buffer. This is
    /// the identity binding elision compares.
    pub fn matches(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.offset == other.offset
            && self.length == other.length
    }

    /// Resolves the slice against the buffer's current backing store.
    pub fn physical(&self) -> GpuPhysicalSlice {
        self.buffer.physical_slice().subslice(self.offset, self.length)
    }
}

impl std::fmt::Debug for GpuBufferSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBufferSlice")
            .field("buffer", &self.buffer.id())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Dim1,
    Dim2,
    Dim3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub image_type: ImageType,
    pub format: Format,
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub tiling: ImageTiling,
    pub usage: ImageUsage,
    pub stages: PipelineStages,
    pub access: AccessFlags,
    pub flags: ImageCreateFlags,
    /// Layout the image is kept in between uses.
    pub layout: ImageLayout,
}

/// Byte layout of one subresource of a linearly tiled image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubresourceLayout {
    pub offset: u64,
    pub size: u64,
    pub row_pitch: u64,
    pub depth_pitch: u64,
}

/// A single mip level of a contiguous layer range, as addressed by copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSubresourceLayers {
    pub aspects: AspectFlags,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// A range of mip levels and array layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSubresourceRange {
    pub aspects: AspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

pub trait GpuImage: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn info(&self) -> &ImageCreateInfo;

    fn memory_flags(&self) -> MemoryFlags;

    /// Extent of the given mip level.
    fn mip_level_extent(&self, level: u32) -> Extent3d {
        crate::format::mip_level_extent(self.info().extent, level)
    }

    /// Byte layout of one subresource. Only meaningful for linear tiling.
    fn subresource_layout(
        &self,
        aspects: AspectFlags,
        mip_level: u32,
        array_layer: u32,
    ) -> SubresourceLayout;

    /// Host-visible backing memory, when the image was allocated in
    /// mappable memory.
    fn host_memory(&self) -> Option<GpuPhysicalSlice>;

    /// Whether any submitted, unretired work still references the image.
    fn is_in_use(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageViewType {
    Dim1,
    Dim1Array,
    Dim2,
    Dim2Array,
    Dim3,
    CubeArray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    pub view_type: ImageViewType,
    pub format: Format,
    pub aspects: AspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

pub trait GpuImageView: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn image(&self) -> &Arc<dyn GpuImage>;

    fn info(&self) -> &ImageViewCreateInfo;

    /// The subresources the view covers, as a copy/clear range.
    fn subresources(&self) -> ImageSubresourceRange {
        let info = self.info();
        ImageSubresourceRange {
            aspects: info.aspects,
            base_mip_level: info.base_mip_level,
            level_count: info.level_count,
            base_array_layer: info.base_array_layer,
            layer_count: info.layer_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferViewCreateInfo {
    pub format: Format,
    pub offset: u64,
    pub length: u64,
}

pub trait GpuBufferView: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn info(&self) -> &BufferViewCreateInfo;
}

pub trait GpuSampler: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn info(&self) -> &SamplerCreateInfo;
}

/// A compiled shader module. Translation of the module's code is the
/// backend's concern; the layers above only route modules to stages.
pub trait GpuShader: Send + Sync {
    fn stage(&self) -> ShaderStage;
    /// Content hash of the module's code.
    fn hash(&self) -> u64;
}

/// A resource bound to a shader stage's resource slots.
#[derive(Clone)]
pub enum ShaderResource {
    Image(Arc<dyn GpuImageView>),
    Buffer(Arc<dyn GpuBufferView>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Signaled when all previously submitted work has executed.
    Event,
    Occlusion {
        precise: bool,
    },
    Timestamp,
    PipelineStatistics,
}

/// Counters collected by a pipeline-statistics query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStatistics {
    pub input_assembly_vertices: u64,
    pub input_assembly_primitives: u64,
    pub vertex_shader_invocations: u64,
    pub geometry_shader_invocations: u64,
    pub geometry_shader_primitives: u64,
    pub clipping_invocations: u64,
    pub clipping_primitives: u64,
    pub pixel_shader_invocations: u64,
}

/// The value a query resolves to once it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryData {
    Event,
    Occlusion { samples_passed: u64 },
    Timestamp { ticks: u64 },
    PipelineStatistics(PipelineStatistics),
}

pub trait GpuQuery: Send + Sync {
    /// Identifier unique per device.
    fn id(&self) -> u64;

    fn kind(&self) -> QueryKind;

    /// The query's result, or `None` while it is still pending on the
    /// timeline.
    fn data(&self) -> Option<QueryData>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct TestAllocation {
        bytes: Mutex<Vec<u8>>,
    }

    impl GpuAllocation for TestAllocation {
        fn id(&self) -> u64 {
            0
        }

        fn len(&self) -> u64 {
            self.bytes.lock().unwrap().len() as u64
        }

        fn write(&self, offset: u64, data: &[u8]) {
            let mut bytes = self.bytes.lock().unwrap();
            let offset = offset as usize;
            bytes[offset..offset + data.len()].copy_from_slice(data);
        }

        fn read(&self, offset: u64, out: &mut [u8]) {
            let bytes = self.bytes.lock().unwrap();
            let offset = offset as usize;
            out.copy_from_slice(&bytes[offset..offset + out.len()]);
        }
    }

    #[test]
    fn physical_subslice_offsets_compose() {
        let alloc: Arc<dyn GpuAllocation> = Arc::new(TestAllocation {
            bytes: Mutex::new(vec![0u8; 64]),
        });

        let slice = GpuPhysicalSlice::new(Arc::clone(&alloc), 16, 32);
        let sub = slice.subslice(8, 4);
        sub.write(0, &[1, 2, 3, 4]);

        let mut direct = [0u8; 4];
        alloc.read(24, &mut direct);
        assert_eq!(direct, [1, 2, 3, 4]);
    }

    #[test]
    fn physical_identity_is_allocation_and_range() {
        let alloc: Arc<dyn GpuAllocation> = Arc::new(TestAllocation {
            bytes: Mutex::new(vec![0u8; 64]),
        });
        let other: Arc<dyn GpuAllocation> = Arc::new(TestAllocation {
            bytes: Mutex::new(vec![0u8; 64]),
        });

        let a = GpuPhysicalSlice::new(Arc::clone(&alloc), 0, 64);
        let b = GpuPhysicalSlice::new(Arc::clone(&alloc), 0, 64);
        let c = GpuPhysicalSlice::new(Arc::clone(&alloc), 0, 32);
        let d = GpuPhysicalSlice::new(other, 0, 64);

        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&d));
    }
}
