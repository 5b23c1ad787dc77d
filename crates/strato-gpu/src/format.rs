//! Backend pixel formats and per-format metadata.
//!
//! Formats are named after their channel layout, not after any particular
//! graphics API. The set is intentionally limited to what the translation
//! layers sitting on top of this crate actually map to.

use crate::state::AspectFlags;

/// Texel format of an image, buffer view or vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,

    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    R32G32B32Float,
    R32G32B32Uint,
    R32G32B32Sint,
    R16G16B16A16Float,
    R16G16B16A16Unorm,
    R16G16B16A16Snorm,
    R16G16B16A16Uint,
    R16G16B16A16Sint,
    R32G32Float,
    R32G32Uint,
    R32G32Sint,
    R10G10B10A2Unorm,
    R10G10B10A2Uint,
    R11G11B10Float,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    R8G8B8A8Snorm,
    R8G8B8A8Uint,
    R8G8B8A8Sint,
    R16G16Float,
    R16G16Unorm,
    R16G16Snorm,
    R16G16Uint,
    R16G16Sint,
    R32Float,
    R32Uint,
    R32Sint,
    R8G8Unorm,
    R8G8Snorm,
    R8G8Uint,
    R8G8Sint,
    R16Float,
    R16Unorm,
    R16Snorm,
    R16Uint,
    R16Sint,
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    A8Unorm,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,

    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,

    Bc1Unorm,
    Bc1Srgb,
    Bc2Unorm,
    Bc2Srgb,
    Bc3Unorm,
    Bc3Srgb,
    Bc4Unorm,
    Bc4Snorm,
    Bc5Unorm,
    Bc5Snorm,
}

/// Static properties of a [`Format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// Size in bytes of one texel, or of one block for compressed formats.
    pub element_size: u32,
    /// Texel footprint of one element. `(1, 1)` for uncompressed formats.
    pub block_extent: (u32, u32),
    /// Aspects present in images of this format.
    pub aspects: AspectFlags,
}

impl FormatInfo {
    const fn color(element_size: u32) -> Self {
        Self {
            element_size,
            block_extent: (1, 1),
            aspects: AspectFlags::COLOR,
        }
    }

    const fn compressed(element_size: u32) -> Self {
        Self {
            element_size,
            block_extent: (4, 4),
            aspects: AspectFlags::COLOR,
        }
    }

    const fn depth(element_size: u32, aspects: AspectFlags) -> Self {
        Self {
            element_size,
            block_extent: (1, 1),
            aspects,
        }
    }

    /// Whether the format stores texels in compressed blocks.
    pub fn is_compressed(&self) -> bool {
        self.block_extent != (1, 1)
    }

    /// Number of blocks covering `extent` texels, per axis.
    pub fn block_count(&self, extent: Extent3d) -> Extent3d {
        let (bw, bh) = self.block_extent;
        Extent3d {
            width: extent.width.div_ceil(bw),
            height: extent.height.div_ceil(bh),
            depth: extent.depth,
        }
    }
}

/// Looks up the static properties of `format`.
pub fn format_info(format: Format) -> FormatInfo {
    use Format::*;

    const DS: AspectFlags = AspectFlags::DEPTH.union(AspectFlags::STENCIL);

    match format {
        Undefined => FormatInfo::color(0),

        R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => FormatInfo::color(16),
        R32G32B32Float | R32G32B32Uint | R32G32B32Sint => FormatInfo::color(12),
        R16G16B16A16Float | R16G16B16A16Unorm | R16G16B16A16Snorm | R16G16B16A16Uint
        | R16G16B16A16Sint => FormatInfo::color(8),
        R32G32Float | R32G32Uint | R32G32Sint => FormatInfo::color(8),
        R10G10B10A2Unorm | R10G10B10A2Uint | R11G11B10Float => FormatInfo::color(4),
        R8G8B8A8Unorm | R8G8B8A8Srgb | R8G8B8A8Snorm | R8G8B8A8Uint | R8G8B8A8Sint => {
            FormatInfo::color(4)
        }
        R16G16Float | R16G16Unorm | R16G16Snorm | R16G16Uint | R16G16Sint => FormatInfo::color(4),
        R32Float | R32Uint | R32Sint => FormatInfo::color(4),
        R8G8Unorm | R8G8Snorm | R8G8Uint | R8G8Sint => FormatInfo::color(2),
        R16Float | R16Unorm | R16Snorm | R16Uint | R16Sint => FormatInfo::color(2),
        R8Unorm | R8Snorm | R8Uint | R8Sint | A8Unorm => FormatInfo::color(1),
        B8G8R8A8Unorm | B8G8R8A8Srgb => FormatInfo::color(4),

        D16Unorm => FormatInfo::depth(2, AspectFlags::DEPTH),
        D24UnormS8Uint => FormatInfo::depth(4, DS),
        D32Float => FormatInfo::depth(4, AspectFlags::DEPTH),
        D32FloatS8Uint => FormatInfo::depth(8, DS),

        Bc1Unorm | Bc1Srgb | Bc4Unorm | Bc4Snorm => FormatInfo::compressed(8),
        Bc2Unorm | Bc2Srgb | Bc3Unorm | Bc3Srgb | Bc5Unorm | Bc5Snorm => {
            FormatInfo::compressed(16)
        }
    }
}

/// Three-dimensional extent in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Three-dimensional offset in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Offset3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Number of mip levels in a full chain for the given base extent.
pub fn mip_level_count(extent: Extent3d) -> u32 {
    let max = extent.width.max(extent.height).max(extent.depth).max(1);
    32 - max.leading_zeros()
}

/// Extent of mip level `level`, given the level-zero extent.
pub fn mip_level_extent(extent: Extent3d, level: u32) -> Extent3d {
    Extent3d {
        width: (extent.width >> level).max(1),
        height: (extent.height >> level).max(1),
        depth: (extent.depth >> level).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_covers_largest_axis() {
        let extent = Extent3d {
            width: 256,
            height: 64,
            depth: 1,
        };
        assert_eq!(mip_level_count(extent), 9);

        let tall = Extent3d {
            width: 1,
            height: 1024,
            depth: 1,
        };
        assert_eq!(mip_level_count(tall), 11);

        let unit = Extent3d {
            width: 1,
            height: 1,
            depth: 1,
        };
        assert_eq!(mip_level_count(unit), 1);
    }

    #[test]
    fn mip_extent_never_reaches_zero() {
        let extent = Extent3d {
            width: 256,
            height: 64,
            depth: 1,
        };
        let tail = mip_level_extent(extent, 8);
        assert_eq!(
            tail,
            Extent3d {
                width: 1,
                height: 1,
                depth: 1
            }
        );
    }

    #[test]
    fn block_counts_round_up_for_compressed_formats() {
        let info = format_info(Format::Bc1Unorm);
        let blocks = info.block_count(Extent3d {
            width: 13,
            height: 5,
            depth: 1,
        });
        assert_eq!(
            blocks,
            Extent3d {
                width: 4,
                height: 2,
                depth: 1
            }
        );
        assert_eq!(info.element_size, 8);
    }
}
