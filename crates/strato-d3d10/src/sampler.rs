use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strato_gpu::GpuDevice;
use strato_gpu::GpuSampler;
use strato_gpu::state::{
    AddressMode, BorderColor, Filter, MipmapMode, SamplerCreateInfo,
};
use tracing::error;

use crate::depth_stencil::decode_compare_op;
use crate::error::{ApiError, ApiResult};

/// Raw sampler enum codes as they appear in descriptors. Filters are
/// bit-encoded: 0x01 selects linear mip, 0x04 linear mag, 0x10 linear
/// min, 0x40 anisotropic and 0x80 comparison filtering.
pub mod d3d10 {
    pub const FILTER_MIN_MAG_MIP_POINT: u32 = 0x00;
    pub const FILTER_MIN_MAG_MIP_LINEAR: u32 = 0x15;
    pub const FILTER_ANISOTROPIC: u32 = 0x55;
    pub const FILTER_COMPARISON_MIN_MAG_MIP_LINEAR: u32 = 0x95;

    pub const TEXTURE_ADDRESS_WRAP: u32 = 1;
    pub const TEXTURE_ADDRESS_MIRROR: u32 = 2;
    pub const TEXTURE_ADDRESS_CLAMP: u32 = 3;
    pub const TEXTURE_ADDRESS_BORDER: u32 = 4;
    pub const TEXTURE_ADDRESS_MIRROR_ONCE: u32 = 5;
}

const FILTER_BIT_MIP_LINEAR: u32 = 0x01;
const FILTER_BIT_MAG_LINEAR: u32 = 0x04;
const FILTER_BIT_MIN_LINEAR: u32 = 0x10;
const FILTER_BIT_ANISOTROPIC: u32 = 0x40;
const FILTER_BIT_COMPARISON: u32 = 0x80;

/// Bits outside this mask make a filter value invalid.
const FILTER_VALID_MASK: u32 = FILTER_BIT_MIP_LINEAR
    | FILTER_BIT_MAG_LINEAR
    | FILTER_BIT_MIN_LINEAR
    | FILTER_BIT_ANISOTROPIC
    | FILTER_BIT_COMPARISON;

/// Sampler descriptor.
#[derive(Clone, Copy, Debug)]
pub struct SamplerDesc {
    pub filter: u32,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: d3d10::FILTER_MIN_MAG_MIP_LINEAR,
            address_u: d3d10::TEXTURE_ADDRESS_CLAMP,
            address_v: d3d10::TEXTURE_ADDRESS_CLAMP,
            address_w: d3d10::TEXTURE_ADDRESS_CLAMP,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            comparison_func: crate::depth_stencil::d3d10::COMPARISON_NEVER,
            border_color: [1.0; 4],
            min_lod: f32::MIN,
            max_lod: f32::MAX,
        }
    }
}

impl PartialEq for SamplerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self.address_u == other.address_u
            && self.address_v == other.address_v
            && self.address_w == other.address_w
            && self.mip_lod_bias.to_bits() == other.mip_lod_bias.to_bits()
            && self.max_anisotropy == other.max_anisotropy
            && self.comparison_func == other.comparison_func
            && color_bits(&self.border_color) == color_bits(&other.border_color)
            && self.min_lod.to_bits() == other.min_lod.to_bits()
            && self.max_lod.to_bits() == other.max_lod.to_bits()
    }
}

impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        self.mip_lod_bias.to_bits().hash(state);
        self.max_anisotropy.hash(state);
        self.comparison_func.hash(state);
        color_bits(&self.border_color).hash(state);
        self.min_lod.to_bits().hash(state);
        self.max_lod.to_bits().hash(state);
    }
}

fn color_bits(color: &[f32; 4]) -> [u32; 4] {
    [
        color[0].to_bits(),
        color[1].to_bits(),
        color[2].to_bits(),
        color[3].to_bits(),
    ]
}

/// Immutable sampler state object backed by a device sampler.
pub struct SamplerState {
    desc: SamplerDesc,
    sampler: Arc<dyn GpuSampler>,
}

impl SamplerState {
    pub(crate) fn validate_desc(desc: &SamplerDesc) -> ApiResult<()> {
        if desc.filter & !FILTER_VALID_MASK != 0 {
            return Err(ApiError::invalid_arg(format!(
                "invalid sampler filter 0x{:x}",
                desc.filter
            )));
        }
        Ok(())
    }

    pub(crate) fn new(gpu: &Arc<dyn GpuDevice>, desc: &SamplerDesc) -> ApiResult<Self> {
        let filter = desc.filter;

        let mut info = SamplerCreateInfo {
            mag_filter: filter_from_bit(filter, FILTER_BIT_MAG_LINEAR),
            min_filter: filter_from_bit(filter, FILTER_BIT_MIN_LINEAR),
            mipmap_mode: if filter & FILTER_BIT_MIP_LINEAR != 0 {
                MipmapMode::Linear
            } else {
                MipmapMode::Nearest
            },
            address_mode_u: decode_address_mode(desc.address_u),
            address_mode_v: decode_address_mode(desc.address_v),
            address_mode_w: decode_address_mode(desc.address_w),
            mip_lod_bias: desc.mip_lod_bias,
            min_lod: desc.min_lod,
            max_lod: desc.max_lod,
            enable_anisotropy: filter & FILTER_BIT_ANISOTROPIC != 0,
            max_anisotropy: (desc.max_anisotropy as f32).clamp(1.0, 16.0),
            enable_compare: filter & FILTER_BIT_COMPARISON != 0,
            compare_op: decode_compare_op(desc.comparison_func),
            border_color: BorderColor::TransparentBlack,
        };

        // The border color only matters if any coordinate can actually
        // hit the border.
        let uses_border = [desc.address_u, desc.address_v, desc.address_w]
            .contains(&d3d10::TEXTURE_ADDRESS_BORDER);
        if uses_border {
            info.border_color = decode_border_color(&desc.border_color);
        }

        let sampler = gpu.create_sampler(&info)?;
        Ok(Self {
            desc: *desc,
            sampler,
        })
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    pub(crate) fn gpu_sampler(&self) -> &Arc<dyn GpuSampler> {
        &self.sampler
    }
}

fn filter_from_bit(filter: u32, bit: u32) -> Filter {
    if filter & bit != 0 {
        Filter::Linear
    } else {
        Filter::Nearest
    }
}

fn decode_address_mode(value: u32) -> AddressMode {
    match value {
        d3d10::TEXTURE_ADDRESS_WRAP => AddressMode::Repeat,
        d3d10::TEXTURE_ADDRESS_MIRROR => AddressMode::MirroredRepeat,
        d3d10::TEXTURE_ADDRESS_CLAMP => AddressMode::ClampToEdge,
        d3d10::TEXTURE_ADDRESS_BORDER => AddressMode::ClampToBorder,
        d3d10::TEXTURE_ADDRESS_MIRROR_ONCE => AddressMode::MirrorClampToEdge,
        other => {
            if other != 0 {
                error!(value = other, "invalid texture address mode");
            }
            AddressMode::Repeat
        }
    }
}

fn decode_border_color(color: &[f32; 4]) -> BorderColor {
    match *color {
        [0.0, 0.0, 0.0, 0.0] => BorderColor::TransparentBlack,
        [0.0, 0.0, 0.0, 1.0] => BorderColor::OpaqueBlack,
        [1.0, 1.0, 1.0, 1.0] => BorderColor::OpaqueWhite,
        _ => BorderColor::Custom(color_bits(color)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_gpu::trace::TraceDevice;

    #[test]
    fn filter_bits_select_linear_stages() {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let state = SamplerState::new(
            &gpu,
            &SamplerDesc {
                filter: d3d10::FILTER_ANISOTROPIC,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(state.desc().filter, d3d10::FILTER_ANISOTROPIC);

        assert!(SamplerState::validate_desc(&SamplerDesc {
            filter: 0x200,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn border_color_is_ignored_without_border_addressing() {
        let desc = SamplerDesc {
            border_color: [0.25, 0.5, 0.75, 1.0],
            ..Default::default()
        };
        let border = SamplerDesc {
            address_u: d3d10::TEXTURE_ADDRESS_BORDER,
            ..desc
        };
        // Same color, but only the bordered variant decodes it.
        assert_eq!(
            decode_border_color(&border.border_color),
            BorderColor::Custom(color_bits(&border.border_color))
        );
        assert_ne!(desc, border);
    }

    #[test]
    fn well_known_border_colors_map_to_named_variants() {
        assert_eq!(
            decode_border_color(&[0.0, 0.0, 0.0, 1.0]),
            BorderColor::OpaqueBlack
        );
        assert_eq!(
            decode_border_color(&[1.0; 4]),
            BorderColor::OpaqueWhite
        );
    }

    #[test]
    fn anisotropy_is_clamped_to_hardware_range() {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let state = SamplerState::new(
            &gpu,
            &SamplerDesc {
                max_anisotropy: 64,
                ..Default::default()
            },
        );
        assert!(state.is_ok());
    }
}
