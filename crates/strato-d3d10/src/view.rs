use std::sync::Arc;

use strato_gpu::format::format_info;
use strato_gpu::{
    BufferViewCreateInfo, GpuImageView, ImageViewCreateInfo, ImageViewType, ShaderResource,
};

use crate::error::{ApiError, ApiResult};
use crate::format::{dxgi, lookup_format, FormatMode};
use crate::resource::{Resource, ResourceDimension};
use crate::texture::format_mode;

/// Shader resource view shape. The variant selects the view type; the
/// resource type only restricts which variants are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SrvDimension {
    Buffer {
        first_element: u32,
        num_elements: u32,
    },
    Texture1d {
        most_detailed_mip: u32,
        mip_levels: u32,
    },
    Texture1dArray {
        most_detailed_mip: u32,
        mip_levels: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2d {
        most_detailed_mip: u32,
        mip_levels: u32,
    },
    Texture2dArray {
        most_detailed_mip: u32,
        mip_levels: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2dMs,
    Texture2dMsArray {
        first_array_slice: u32,
        array_size: u32,
    },
    Texture3d {
        most_detailed_mip: u32,
        mip_levels: u32,
    },
    TextureCube {
        most_detailed_mip: u32,
        mip_levels: u32,
    },
    TextureCubeArray {
        most_detailed_mip: u32,
        mip_levels: u32,
        first_2d_array_face: u32,
        num_cubes: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SrvDesc {
    pub format: u32,
    pub dimension: SrvDimension,
}

/// Render target view shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtvDimension {
    Buffer {
        first_element: u32,
        num_elements: u32,
    },
    Texture1d {
        mip_slice: u32,
    },
    Texture1dArray {
        mip_slice: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2d {
        mip_slice: u32,
    },
    Texture2dArray {
        mip_slice: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2dMs,
    Texture2dMsArray {
        first_array_slice: u32,
        array_size: u32,
    },
    Texture3d {
        mip_slice: u32,
        first_w_slice: u32,
        w_size: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RtvDesc {
    pub format: u32,
    pub dimension: RtvDimension,
}

/// Depth-stencil view shape. No buffer or 3D variants exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsvDimension {
    Texture1d {
        mip_slice: u32,
    },
    Texture1dArray {
        mip_slice: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2d {
        mip_slice: u32,
    },
    Texture2dArray {
        mip_slice: u32,
        first_array_slice: u32,
        array_size: u32,
    },
    Texture2dMs,
    Texture2dMsArray {
        first_array_slice: u32,
        array_size: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DsvDesc {
    pub format: u32,
    pub dimension: DsvDimension,
}

impl SrvDesc {
    /// Derives a view covering every subresource. Buffers carry no
    /// format, so a view of one cannot be derived.
    pub fn from_resource(resource: &Resource) -> ApiResult<SrvDesc> {
        let texture = match resource {
            Resource::Buffer(_) => {
                return Err(ApiError::invalid_arg(
                    "buffer shader resource views need an explicit description",
                ))
            }
            Resource::Texture(t) => t,
        };

        let desc = texture.desc();

        let dimension = match texture.dimension() {
            ResourceDimension::Texture1d => {
                if desc.array_size == 1 {
                    SrvDimension::Texture1d {
                        most_detailed_mip: 0,
                        mip_levels: desc.mip_levels,
                    }
                } else {
                    SrvDimension::Texture1dArray {
                        most_detailed_mip: 0,
                        mip_levels: desc.mip_levels,
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture2d => {
                if desc.sample_count > 1 {
                    if desc.array_size == 1 {
                        SrvDimension::Texture2dMs
                    } else {
                        SrvDimension::Texture2dMsArray {
                            first_array_slice: 0,
                            array_size: desc.array_size,
                        }
                    }
                } else if desc
                    .misc_flags
                    .contains(crate::resource::MiscFlags::TEXTURECUBE)
                {
                    if desc.array_size == 6 {
                        SrvDimension::TextureCube {
                            most_detailed_mip: 0,
                            mip_levels: desc.mip_levels,
                        }
                    } else {
                        SrvDimension::TextureCubeArray {
                            most_detailed_mip: 0,
                            mip_levels: desc.mip_levels,
                            first_2d_array_face: 0,
                            num_cubes: desc.array_size / 6,
                        }
                    }
                } else if desc.array_size == 1 {
                    SrvDimension::Texture2d {
                        most_detailed_mip: 0,
                        mip_levels: desc.mip_levels,
                    }
                } else {
                    SrvDimension::Texture2dArray {
                        most_detailed_mip: 0,
                        mip_levels: desc.mip_levels,
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture3d => SrvDimension::Texture3d {
                most_detailed_mip: 0,
                mip_levels: desc.mip_levels,
            },
            ResourceDimension::Buffer => unreachable!(),
        };

        Ok(SrvDesc {
            format: desc.format,
            dimension,
        })
    }

    /// Validates the view shape against the resource and fills in
    /// inherited or clamped fields.
    pub fn normalize(&mut self, resource: &Resource) -> ApiResult<()> {
        let (format, mip_count, layer_count) = match resource {
            Resource::Buffer(_) => {
                if !matches!(self.dimension, SrvDimension::Buffer { .. }) {
                    return Err(ApiError::invalid_arg(
                        "incompatible view dimension for a buffer",
                    ));
                }
                return Ok(());
            }
            Resource::Texture(t) => {
                let compatible = match t.dimension() {
                    ResourceDimension::Texture1d => matches!(
                        self.dimension,
                        SrvDimension::Texture1d { .. } | SrvDimension::Texture1dArray { .. }
                    ),
                    ResourceDimension::Texture2d => matches!(
                        self.dimension,
                        SrvDimension::Texture2d { .. }
                            | SrvDimension::Texture2dArray { .. }
                            | SrvDimension::Texture2dMs
                            | SrvDimension::Texture2dMsArray { .. }
                            | SrvDimension::TextureCube { .. }
                            | SrvDimension::TextureCubeArray { .. }
                    ),
                    ResourceDimension::Texture3d => {
                        matches!(self.dimension, SrvDimension::Texture3d { .. })
                    }
                    ResourceDimension::Buffer => false,
                };

                if !compatible {
                    return Err(ApiError::invalid_arg(format!(
                        "incompatible view dimension for {:?}",
                        t.dimension()
                    )));
                }

                (t.desc().format, t.desc().mip_levels, t.desc().array_size)
            }
        };

        if self.format == dxgi::FORMAT_UNKNOWN {
            self.format = format;
        }

        match &mut self.dimension {
            SrvDimension::Texture1d {
                most_detailed_mip,
                mip_levels,
            }
            | SrvDimension::Texture2d {
                most_detailed_mip,
                mip_levels,
            }
            | SrvDimension::Texture3d {
                most_detailed_mip,
                mip_levels,
            }
            | SrvDimension::TextureCube {
                most_detailed_mip,
                mip_levels,
            } => clamp_range(most_detailed_mip, mip_levels, mip_count),
            SrvDimension::Texture1dArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            }
            | SrvDimension::Texture2dArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            } => {
                clamp_range(most_detailed_mip, mip_levels, mip_count);
                clamp_range(first_array_slice, array_size, layer_count);
            }
            SrvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => clamp_range(first_array_slice, array_size, layer_count),
            SrvDimension::TextureCubeArray {
                most_detailed_mip,
                mip_levels,
                first_2d_array_face,
                num_cubes,
            } => {
                clamp_range(most_detailed_mip, mip_levels, mip_count);
                let remaining = layer_count.saturating_sub(*first_2d_array_face) / 6;
                if *num_cubes > remaining {
                    *num_cubes = remaining;
                }
            }
            SrvDimension::Buffer { .. } | SrvDimension::Texture2dMs => {}
        }

        Ok(())
    }

    /// Buffer view parameters for a buffer-backed view. An unknown
    /// format means a structured buffer, exposed as 32-bit elements.
    pub(crate) fn buffer_view_info(&self) -> ApiResult<BufferViewCreateInfo> {
        let (first_element, num_elements) = match self.dimension {
            SrvDimension::Buffer {
                first_element,
                num_elements,
            } => (first_element, num_elements),
            _ => {
                return Err(ApiError::invalid_arg(
                    "buffer views require the buffer view dimension",
                ))
            }
        };

        if self.format == dxgi::FORMAT_UNKNOWN {
            use strato_gpu::format::Format;
            return Ok(BufferViewCreateInfo {
                format: Format::R32Uint,
                offset: 4 * u64::from(first_element),
                length: 4 * u64::from(num_elements),
            });
        }

        let format = lookup_format(self.format, FormatMode::Color)
            .ok_or_else(|| ApiError::invalid_arg(format!("unmapped format: {}", self.format)))?;
        let info = format_info(format);

        if info.is_compressed() {
            return Err(ApiError::invalid_arg(
                "compressed formats are not allowed for buffer views",
            ));
        }

        Ok(BufferViewCreateInfo {
            format,
            offset: u64::from(info.element_size) * u64::from(first_element),
            length: u64::from(info.element_size) * u64::from(num_elements),
        })
    }

    /// Image view parameters for a texture-backed view.
    pub(crate) fn image_view_info(&self, mode: FormatMode) -> ApiResult<ImageViewCreateInfo> {
        let format = lookup_format(self.format, mode)
            .ok_or_else(|| ApiError::invalid_arg(format!("unmapped format: {}", self.format)))?;

        let mut info = ImageViewCreateInfo {
            view_type: ImageViewType::Dim2,
            format,
            aspects: format_info(format).aspects,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        match self.dimension {
            SrvDimension::Texture1d {
                most_detailed_mip,
                mip_levels,
            } => {
                info.view_type = ImageViewType::Dim1;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
            }
            SrvDimension::Texture1dArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim1Array;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            SrvDimension::Texture2d {
                most_detailed_mip,
                mip_levels,
            } => {
                info.view_type = ImageViewType::Dim2;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
            }
            SrvDimension::Texture2dArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            SrvDimension::Texture2dMs => {
                info.view_type = ImageViewType::Dim2;
            }
            SrvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            SrvDimension::Texture3d {
                most_detailed_mip,
                mip_levels,
            } => {
                info.view_type = ImageViewType::Dim3;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
            }
            // Plain cube views are exposed as single-entry cube arrays
            // so backends only need the one cube view type.
            SrvDimension::TextureCube {
                most_detailed_mip,
                mip_levels,
            } => {
                info.view_type = ImageViewType::CubeArray;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
                info.layer_count = 6;
            }
            SrvDimension::TextureCubeArray {
                most_detailed_mip,
                mip_levels,
                first_2d_array_face,
                num_cubes,
            } => {
                info.view_type = ImageViewType::CubeArray;
                info.base_mip_level = most_detailed_mip;
                info.level_count = mip_levels;
                info.base_array_layer = first_2d_array_face;
                info.layer_count = num_cubes * 6;
            }
            SrvDimension::Buffer { .. } => {
                return Err(ApiError::invalid_arg(
                    "buffer view dimension used with a texture",
                ))
            }
        }

        Ok(info)
    }
}

impl RtvDesc {
    pub fn from_resource(resource: &Resource) -> ApiResult<RtvDesc> {
        let texture = match resource {
            Resource::Buffer(buffer) => {
                return Ok(RtvDesc {
                    format: dxgi::FORMAT_UNKNOWN,
                    dimension: RtvDimension::Buffer {
                        first_element: 0,
                        num_elements: buffer.desc().byte_width,
                    },
                })
            }
            Resource::Texture(t) => t,
        };

        let desc = texture.desc();

        let dimension = match texture.dimension() {
            ResourceDimension::Texture1d => {
                if desc.array_size == 1 {
                    RtvDimension::Texture1d { mip_slice: 0 }
                } else {
                    RtvDimension::Texture1dArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture2d => {
                if desc.sample_count == 1 {
                    if desc.array_size == 1 {
                        RtvDimension::Texture2d { mip_slice: 0 }
                    } else {
                        RtvDimension::Texture2dArray {
                            mip_slice: 0,
                            first_array_slice: 0,
                            array_size: desc.array_size,
                        }
                    }
                } else if desc.array_size == 1 {
                    RtvDimension::Texture2dMs
                } else {
                    RtvDimension::Texture2dMsArray {
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture3d => RtvDimension::Texture3d {
                mip_slice: 0,
                first_w_slice: 0,
                w_size: desc.depth,
            },
            ResourceDimension::Buffer => unreachable!(),
        };

        Ok(RtvDesc {
            format: desc.format,
            dimension,
        })
    }

    pub fn normalize(&mut self, resource: &Resource) -> ApiResult<()> {
        let texture = match resource {
            Resource::Buffer(_) => {
                if !matches!(self.dimension, RtvDimension::Buffer { .. }) {
                    return Err(ApiError::invalid_arg(
                        "incompatible view dimension for a buffer",
                    ));
                }
                return Ok(());
            }
            Resource::Texture(t) => t,
        };

        let compatible = match texture.dimension() {
            ResourceDimension::Texture1d => matches!(
                self.dimension,
                RtvDimension::Texture1d { .. } | RtvDimension::Texture1dArray { .. }
            ),
            ResourceDimension::Texture2d => matches!(
                self.dimension,
                RtvDimension::Texture2d { .. }
                    | RtvDimension::Texture2dArray { .. }
                    | RtvDimension::Texture2dMs
                    | RtvDimension::Texture2dMsArray { .. }
            ),
            ResourceDimension::Texture3d => {
                matches!(self.dimension, RtvDimension::Texture3d { .. })
            }
            ResourceDimension::Buffer => false,
        };

        if !compatible {
            return Err(ApiError::invalid_arg(format!(
                "incompatible view dimension for {:?}",
                texture.dimension()
            )));
        }

        // 3D render targets attach W slices, so they clamp against the
        // depth instead of the layer count.
        let layer_count = match texture.dimension() {
            ResourceDimension::Texture3d => texture.desc().depth,
            _ => texture.desc().array_size,
        };

        if self.format == dxgi::FORMAT_UNKNOWN {
            self.format = texture.desc().format;
        }

        match &mut self.dimension {
            RtvDimension::Texture1dArray {
                first_array_slice,
                array_size,
                ..
            }
            | RtvDimension::Texture2dArray {
                first_array_slice,
                array_size,
                ..
            }
            | RtvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => clamp_range(first_array_slice, array_size, layer_count),
            RtvDimension::Texture3d {
                first_w_slice,
                w_size,
                ..
            } => clamp_range(first_w_slice, w_size, layer_count),
            _ => {}
        }

        Ok(())
    }

    pub(crate) fn image_view_info(&self) -> ApiResult<ImageViewCreateInfo> {
        let format = lookup_format(self.format, FormatMode::Color)
            .ok_or_else(|| ApiError::invalid_arg(format!("unmapped format: {}", self.format)))?;

        let mut info = ImageViewCreateInfo {
            view_type: ImageViewType::Dim2,
            format,
            aspects: format_info(format).aspects,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        match self.dimension {
            RtvDimension::Texture1d { mip_slice } => {
                info.view_type = ImageViewType::Dim1;
                info.base_mip_level = mip_slice;
            }
            RtvDimension::Texture1dArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim1Array;
                info.base_mip_level = mip_slice;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            RtvDimension::Texture2d { mip_slice } => {
                info.view_type = ImageViewType::Dim2;
                info.base_mip_level = mip_slice;
            }
            RtvDimension::Texture2dArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_mip_level = mip_slice;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            RtvDimension::Texture2dMs => {
                info.view_type = ImageViewType::Dim2;
            }
            RtvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            // A 3D attachment binds a range of W slices as 2D layers.
            RtvDimension::Texture3d {
                mip_slice,
                first_w_slice,
                w_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_mip_level = mip_slice;
                info.base_array_layer = first_w_slice;
                info.layer_count = w_size;
            }
            RtvDimension::Buffer { .. } => {
                return Err(ApiError::invalid_arg(
                    "buffer view dimension used with a texture",
                ))
            }
        }

        Ok(info)
    }
}

impl DsvDesc {
    pub fn from_resource(resource: &Resource) -> ApiResult<DsvDesc> {
        let texture = match resource {
            Resource::Buffer(_) => {
                return Err(ApiError::invalid_arg(
                    "depth-stencil views cannot target buffers",
                ))
            }
            Resource::Texture(t) => t,
        };

        let desc = texture.desc();

        let dimension = match texture.dimension() {
            ResourceDimension::Texture1d => {
                if desc.array_size == 1 {
                    DsvDimension::Texture1d { mip_slice: 0 }
                } else {
                    DsvDimension::Texture1dArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture2d => {
                if desc.sample_count == 1 {
                    if desc.array_size == 1 {
                        DsvDimension::Texture2d { mip_slice: 0 }
                    } else {
                        DsvDimension::Texture2dArray {
                            mip_slice: 0,
                            first_array_slice: 0,
                            array_size: desc.array_size,
                        }
                    }
                } else if desc.array_size == 1 {
                    DsvDimension::Texture2dMs
                } else {
                    DsvDimension::Texture2dMsArray {
                        first_array_slice: 0,
                        array_size: desc.array_size,
                    }
                }
            }
            ResourceDimension::Texture3d => {
                return Err(ApiError::invalid_arg(
                    "depth-stencil views cannot target 3D textures",
                ))
            }
            ResourceDimension::Buffer => unreachable!(),
        };

        Ok(DsvDesc {
            format: desc.format,
            dimension,
        })
    }

    pub fn normalize(&mut self, resource: &Resource) -> ApiResult<()> {
        let texture = match resource {
            Resource::Buffer(_) => {
                return Err(ApiError::invalid_arg(
                    "depth-stencil views cannot target buffers",
                ))
            }
            Resource::Texture(t) => t,
        };

        let compatible = match texture.dimension() {
            ResourceDimension::Texture1d => matches!(
                self.dimension,
                DsvDimension::Texture1d { .. } | DsvDimension::Texture1dArray { .. }
            ),
            ResourceDimension::Texture2d => matches!(
                self.dimension,
                DsvDimension::Texture2d { .. }
                    | DsvDimension::Texture2dArray { .. }
                    | DsvDimension::Texture2dMs
                    | DsvDimension::Texture2dMsArray { .. }
            ),
            _ => false,
        };

        if !compatible {
            return Err(ApiError::invalid_arg(format!(
                "incompatible view dimension for {:?}",
                texture.dimension()
            )));
        }

        if self.format == dxgi::FORMAT_UNKNOWN {
            self.format = texture.desc().format;
        }

        let layer_count = texture.desc().array_size;

        match &mut self.dimension {
            DsvDimension::Texture1dArray {
                first_array_slice,
                array_size,
                ..
            }
            | DsvDimension::Texture2dArray {
                first_array_slice,
                array_size,
                ..
            }
            | DsvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => clamp_range(first_array_slice, array_size, layer_count),
            _ => {}
        }

        Ok(())
    }

    pub(crate) fn image_view_info(&self) -> ApiResult<ImageViewCreateInfo> {
        let format = lookup_format(self.format, FormatMode::Depth)
            .ok_or_else(|| ApiError::invalid_arg(format!("unmapped format: {}", self.format)))?;

        let mut info = ImageViewCreateInfo {
            view_type: ImageViewType::Dim2,
            format,
            aspects: format_info(format).aspects,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        match self.dimension {
            DsvDimension::Texture1d { mip_slice } => {
                info.view_type = ImageViewType::Dim1;
                info.base_mip_level = mip_slice;
            }
            DsvDimension::Texture1dArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim1Array;
                info.base_mip_level = mip_slice;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            DsvDimension::Texture2d { mip_slice } => {
                info.view_type = ImageViewType::Dim2;
                info.base_mip_level = mip_slice;
            }
            DsvDimension::Texture2dArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_mip_level = mip_slice;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
            DsvDimension::Texture2dMs => {
                info.view_type = ImageViewType::Dim2;
            }
            DsvDimension::Texture2dMsArray {
                first_array_slice,
                array_size,
            } => {
                info.view_type = ImageViewType::Dim2Array;
                info.base_array_layer = first_array_slice;
                info.layer_count = array_size;
            }
        }

        Ok(info)
    }
}

/// Clamps a (first, count) range against the available entry count.
fn clamp_range(first: &mut u32, count: &mut u32, available: u32) {
    let remaining = available.saturating_sub(*first);
    if *count > remaining {
        *count = remaining;
    }
}

/// A resource view usable as a shader input.
pub struct ShaderResourceView {
    resource: Resource,
    desc: SrvDesc,
    view: ShaderResource,
}

impl ShaderResourceView {
    pub(crate) fn new(resource: Resource, desc: SrvDesc, view: ShaderResource) -> Self {
        Self {
            resource,
            desc,
            view,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn desc(&self) -> &SrvDesc {
        &self.desc
    }

    pub(crate) fn gpu_view(&self) -> &ShaderResource {
        &self.view
    }
}

/// A color attachment view. Views of buffer resources carry no backend
/// view; binding or clearing them does nothing.
pub struct RenderTargetView {
    resource: Resource,
    desc: RtvDesc,
    view: Option<Arc<dyn GpuImageView>>,
}

impl RenderTargetView {
    pub(crate) fn new(
        resource: Resource,
        desc: RtvDesc,
        view: Option<Arc<dyn GpuImageView>>,
    ) -> Self {
        Self {
            resource,
            desc,
            view,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn desc(&self) -> &RtvDesc {
        &self.desc
    }

    pub(crate) fn gpu_view(&self) -> Option<&Arc<dyn GpuImageView>> {
        self.view.as_ref()
    }
}

/// A depth-stencil attachment view.
pub struct DepthStencilView {
    resource: Resource,
    desc: DsvDesc,
    view: Arc<dyn GpuImageView>,
}

impl DepthStencilView {
    pub(crate) fn new(resource: Resource, desc: DsvDesc, view: Arc<dyn GpuImageView>) -> Self {
        Self {
            resource,
            desc,
            view,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn desc(&self) -> &DsvDesc {
        &self.desc
    }

    pub(crate) fn gpu_view(&self) -> &Arc<dyn GpuImageView> {
        &self.view
    }
}

/// Format interpretation for SRV creation on textures.
pub(crate) fn srv_format_mode(resource: &Resource) -> FormatMode {
    match resource {
        Resource::Texture(t) => format_mode(t.desc()),
        Resource::Buffer(_) => FormatMode::Color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::dxgi;
    use crate::resource::{BindFlags, CpuAccessFlags, MiscFlags, Usage};
    use crate::texture::{CommonTextureDesc, Texture};
    use strato_gpu::trace::TraceDevice;
    use strato_gpu::GpuDevice;

    fn texture_2d_array(layers: u32, mips: u32) -> Resource {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let desc = CommonTextureDesc {
            width: 64,
            height: 64,
            depth: 1,
            mip_levels: mips,
            array_size: layers,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            sample_count: 1,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: MiscFlags::empty(),
        };
        Resource::Texture(Arc::new(
            Texture::new(&gpu, ResourceDimension::Texture2d, &desc).unwrap(),
        ))
    }

    #[test]
    fn derived_view_covers_all_subresources() {
        let resource = texture_2d_array(4, 3);
        let desc = SrvDesc::from_resource(&resource).unwrap();
        assert_eq!(desc.format, dxgi::FORMAT_R8G8B8A8_UNORM);
        assert_eq!(
            desc.dimension,
            SrvDimension::Texture2dArray {
                most_detailed_mip: 0,
                mip_levels: 3,
                first_array_slice: 0,
                array_size: 4,
            }
        );
    }

    #[test]
    fn normalize_clamps_layer_ranges() {
        let resource = texture_2d_array(4, 1);
        let mut desc = RtvDesc {
            format: dxgi::FORMAT_UNKNOWN,
            dimension: RtvDimension::Texture2dArray {
                mip_slice: 0,
                first_array_slice: 2,
                array_size: 100,
            },
        };
        desc.normalize(&resource).unwrap();
        assert_eq!(desc.format, dxgi::FORMAT_R8G8B8A8_UNORM);
        assert_eq!(
            desc.dimension,
            RtvDimension::Texture2dArray {
                mip_slice: 0,
                first_array_slice: 2,
                array_size: 2,
            }
        );
    }

    #[test]
    fn normalize_rejects_mismatched_dimension() {
        let resource = texture_2d_array(1, 1);
        let mut desc = SrvDesc {
            format: dxgi::FORMAT_UNKNOWN,
            dimension: SrvDimension::Texture3d {
                most_detailed_mip: 0,
                mip_levels: 1,
            },
        };
        assert!(desc.normalize(&resource).is_err());
    }

    #[test]
    fn cube_views_use_the_cube_array_type() {
        let desc = SrvDesc {
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            dimension: SrvDimension::TextureCube {
                most_detailed_mip: 0,
                mip_levels: 1,
            },
        };
        let info = desc.image_view_info(FormatMode::Any).unwrap();
        assert_eq!(info.view_type, ImageViewType::CubeArray);
        assert_eq!(info.layer_count, 6);
    }
}
