use std::sync::Arc;

use bitflags::bitflags;
use strato_gpu::GpuPhysicalSlice;

use crate::buffer::Buffer;
use crate::texture::Texture;

/// Memory pool and access pattern declared at resource creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Usage {
    #[default]
    Default,
    Immutable,
    Dynamic,
    Staging,
}

bitflags! {
    /// Pipeline stages a resource may be bound to.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER   = 0x1;
        const INDEX_BUFFER    = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const STREAM_OUTPUT   = 0x10;
        const RENDER_TARGET   = 0x20;
        const DEPTH_STENCIL   = 0x40;
    }
}

bitflags! {
    /// CPU access requested for mapping.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct CpuAccessFlags: u32 {
        const WRITE = 0x10000;
        const READ  = 0x20000;
    }
}

bitflags! {
    /// Miscellaneous resource properties.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct MiscFlags: u32 {
        const GENERATE_MIPS   = 0x1;
        const SHARED          = 0x2;
        const TEXTURECUBE     = 0x4;
        const SHARED_KEYEDMUTEX = 0x10;
        const GDI_COMPATIBLE  = 0x20;
    }
}

/// Access requested by a map call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapMode {
    Read,
    Write,
    ReadWrite,
    /// Write that may hand back fresh backing memory instead of waiting
    /// for pending reads of the old contents.
    WriteDiscard,
    /// Write with a promise not to touch data the device may still read.
    WriteNoOverwrite,
}

bitflags! {
    /// Behavior flags accepted by map calls.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        /// Fail with a busy status instead of blocking on the device.
        const DO_NOT_WAIT = 0x100000;
    }
}

impl MapMode {
    pub fn wants_read(self) -> bool {
        matches!(self, MapMode::Read | MapMode::ReadWrite)
    }

    pub fn wants_write(self) -> bool {
        !matches!(self, MapMode::Read)
    }
}

/// Initial contents for one subresource at creation time.
#[derive(Clone, Copy, Debug)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    /// Byte distance between rows of a texture subresource.
    pub row_pitch: u32,
    /// Byte distance between depth slices of a 3D subresource.
    pub depth_pitch: u32,
}

/// A texel region within a subresource. The right, bottom and back
/// bounds are exclusive. Buffers use only the left and right bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

/// Host-accessible memory handed out by a successful map call.
#[derive(Clone, Debug)]
pub struct MappedSubresource {
    pub data: GpuPhysicalSlice,
    pub row_pitch: u32,
    pub depth_pitch: u32,
}

/// Kind of a resource as exposed to view creation and copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceDimension {
    Buffer,
    Texture1d,
    Texture2d,
    Texture3d,
}

/// A resource reference as accepted by view creation and copy
/// operations.
#[derive(Clone)]
pub enum Resource {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
}

impl Resource {
    pub fn dimension(&self) -> ResourceDimension {
        match self {
            Resource::Buffer(_) => ResourceDimension::Buffer,
            Resource::Texture(t) => t.dimension(),
        }
    }

    pub fn texture(&self) -> Option<&Arc<Texture>> {
        match self {
            Resource::Texture(t) => Some(t),
            Resource::Buffer(_) => None,
        }
    }
}

impl From<Arc<Buffer>> for Resource {
    fn from(buffer: Arc<Buffer>) -> Self {
        Resource::Buffer(buffer)
    }
}

impl From<Arc<Texture>> for Resource {
    fn from(texture: Arc<Texture>) -> Self {
        Resource::Texture(texture)
    }
}

/// Linearizes a (mip, layer) pair into the subresource index used by
/// map and copy entry points.
pub fn calc_subresource(mip_slice: u32, array_slice: u32, mip_levels: u32) -> u32 {
    mip_slice + array_slice * mip_levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subresource_index_is_mip_major() {
        assert_eq!(calc_subresource(0, 0, 10), 0);
        assert_eq!(calc_subresource(3, 2, 10), 23);
        // Decomposition used by map calls.
        let index = calc_subresource(3, 2, 10);
        assert_eq!(index % 10, 3);
        assert_eq!(index / 10, 2);
    }
}
