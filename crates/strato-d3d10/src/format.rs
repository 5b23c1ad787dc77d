use strato_gpu::format::Format;

/// Raw format codes as they appear in legacy descriptors.
pub mod dxgi {
    pub const FORMAT_UNKNOWN: u32 = 0;
    pub const FORMAT_R32G32B32A32_TYPELESS: u32 = 1;
    pub const FORMAT_R32G32B32A32_FLOAT: u32 = 2;
    pub const FORMAT_R32G32B32A32_UINT: u32 = 3;
    pub const FORMAT_R32G32B32A32_SINT: u32 = 4;
    pub const FORMAT_R32G32B32_TYPELESS: u32 = 5;
    pub const FORMAT_R32G32B32_FLOAT: u32 = 6;
    pub const FORMAT_R32G32B32_UINT: u32 = 7;
    pub const FORMAT_R32G32B32_SINT: u32 = 8;
    pub const FORMAT_R16G16B16A16_TYPELESS: u32 = 9;
    pub const FORMAT_R16G16B16A16_FLOAT: u32 = 10;
    pub const FORMAT_R16G16B16A16_UNORM: u32 = 11;
    pub const FORMAT_R16G16B16A16_UINT: u32 = 12;
    pub const FORMAT_R16G16B16A16_SNORM: u32 = 13;
    pub const FORMAT_R16G16B16A16_SINT: u32 = 14;
    pub const FORMAT_R32G32_TYPELESS: u32 = 15;
    pub const FORMAT_R32G32_FLOAT: u32 = 16;
    pub const FORMAT_R32G32_UINT: u32 = 17;
    pub const FORMAT_R32G32_SINT: u32 = 18;
    pub const FORMAT_R32G8X24_TYPELESS: u32 = 19;
    pub const FORMAT_D32_FLOAT_S8X24_UINT: u32 = 20;
    pub const FORMAT_R32_FLOAT_X8X24_TYPELESS: u32 = 21;
    pub const FORMAT_X32_TYPELESS_G8X24_UINT: u32 = 22;
    pub const FORMAT_R10G10B10A2_TYPELESS: u32 = 23;
    pub const FORMAT_R10G10B10A2_UNORM: u32 = 24;
    pub const FORMAT_R10G10B10A2_UINT: u32 = 25;
    pub const FORMAT_R11G11B10_FLOAT: u32 = 26;
    pub const FORMAT_R8G8B8A8_TYPELESS: u32 = 27;
    pub const FORMAT_R8G8B8A8_UNORM: u32 = 28;
    pub const FORMAT_R8G8B8A8_UNORM_SRGB: u32 = 29;
    pub const FORMAT_R8G8B8A8_UINT: u32 = 30;
    pub const FORMAT_R8G8B8A8_SNORM: u32 = 31;
    pub const FORMAT_R8G8B8A8_SINT: u32 = 32;
    pub const FORMAT_R16G16_TYPELESS: u32 = 33;
    pub const FORMAT_R16G16_FLOAT: u32 = 34;
    pub const FORMAT_R16G16_UNORM: u32 = 35;
    pub const FORMAT_R16G16_UINT: u32 = 36;
    pub const FORMAT_R16G16_SNORM: u32 = 37;
    pub const FORMAT_R16G16_SINT: u32 = 38;
    pub const FORMAT_R32_TYPELESS: u32 = 39;
    pub const FORMAT_D32_FLOAT: u32 = 40;
    pub const FORMAT_R32_FLOAT: u32 = 41;
    pub const FORMAT_R32_UINT: u32 = 42;
    pub const FORMAT_R32_SINT: u32 = 43;
    pub const FORMAT_R24G8_TYPELESS: u32 = 44;
    pub const FORMAT_D24_UNORM_S8_UINT: u32 = 45;
    pub const FORMAT_R24_UNORM_X8_TYPELESS: u32 = 46;
    pub const FORMAT_X24_TYPELESS_G8_UINT: u32 = 47;
    pub const FORMAT_R8G8_TYPELESS: u32 = 48;
    pub const FORMAT_R8G8_UNORM: u32 = 49;
    pub const FORMAT_R8G8_UINT: u32 = 50;
    pub const FORMAT_R8G8_SNORM: u32 = 51;
    pub const FORMAT_R8G8_SINT: u32 = 52;
    pub const FORMAT_R16_TYPELESS: u32 = 53;
    pub const FORMAT_R16_FLOAT: u32 = 54;
    pub const FORMAT_D16_UNORM: u32 = 55;
    pub const FORMAT_R16_UNORM: u32 = 56;
    pub const FORMAT_R16_UINT: u32 = 57;
    pub const FORMAT_R16_SNORM: u32 = 58;
    pub const FORMAT_R16_SINT: u32 = 59;
    pub const FORMAT_R8_TYPELESS: u32 = 60;
    pub const FORMAT_R8_UNORM: u32 = 61;
    pub const FORMAT_R8_UINT: u32 = 62;
    pub const FORMAT_R8_SNORM: u32 = 63;
    pub const FORMAT_R8_SINT: u32 = 64;
    pub const FORMAT_A8_UNORM: u32 = 65;
    pub const FORMAT_BC1_TYPELESS: u32 = 70;
    pub const FORMAT_BC1_UNORM: u32 = 71;
    pub const FORMAT_BC1_UNORM_SRGB: u32 = 72;
    pub const FORMAT_BC2_TYPELESS: u32 = 73;
    pub const FORMAT_BC2_UNORM: u32 = 74;
    pub const FORMAT_BC2_UNORM_SRGB: u32 = 75;
    pub const FORMAT_BC3_TYPELESS: u32 = 76;
    pub const FORMAT_BC3_UNORM: u32 = 77;
    pub const FORMAT_BC3_UNORM_SRGB: u32 = 78;
    pub const FORMAT_BC4_TYPELESS: u32 = 79;
    pub const FORMAT_BC4_UNORM: u32 = 80;
    pub const FORMAT_BC4_SNORM: u32 = 81;
    pub const FORMAT_BC5_TYPELESS: u32 = 82;
    pub const FORMAT_BC5_UNORM: u32 = 83;
    pub const FORMAT_BC5_SNORM: u32 = 84;
    pub const FORMAT_B8G8R8A8_UNORM: u32 = 87;
    pub const FORMAT_B8G8R8A8_TYPELESS: u32 = 90;
    pub const FORMAT_B8G8R8A8_UNORM_SRGB: u32 = 91;
}

/// Disambiguates how a typeless format code should resolve. Resources
/// that can only ever hold depth data pick the depth interpretation,
/// render targets the color one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatMode {
    Any,
    Color,
    Depth,
}

/// Resolves a raw format code to a backend format. Typeless families
/// resolve to their unorm/float member unless `mode` forces the depth
/// interpretation. Unknown or unmapped codes yield `None`.
pub fn lookup_format(format: u32, mode: FormatMode) -> Option<Format> {
    use dxgi::*;

    let format = match format {
        FORMAT_R32G32B32A32_TYPELESS | FORMAT_R32G32B32A32_FLOAT => Format::R32G32B32A32Float,
        FORMAT_R32G32B32A32_UINT => Format::R32G32B32A32Uint,
        FORMAT_R32G32B32A32_SINT => Format::R32G32B32A32Sint,
        FORMAT_R32G32B32_TYPELESS | FORMAT_R32G32B32_FLOAT => Format::R32G32B32Float,
        FORMAT_R32G32B32_UINT => Format::R32G32B32Uint,
        FORMAT_R32G32B32_SINT => Format::R32G32B32Sint,
        FORMAT_R16G16B16A16_TYPELESS | FORMAT_R16G16B16A16_UNORM => Format::R16G16B16A16Unorm,
        FORMAT_R16G16B16A16_FLOAT => Format::R16G16B16A16Float,
        FORMAT_R16G16B16A16_UINT => Format::R16G16B16A16Uint,
        FORMAT_R16G16B16A16_SNORM => Format::R16G16B16A16Snorm,
        FORMAT_R16G16B16A16_SINT => Format::R16G16B16A16Sint,
        FORMAT_R32G32_TYPELESS | FORMAT_R32G32_FLOAT => Format::R32G32Float,
        FORMAT_R32G32_UINT => Format::R32G32Uint,
        FORMAT_R32G32_SINT => Format::R32G32Sint,
        FORMAT_R32G8X24_TYPELESS
        | FORMAT_D32_FLOAT_S8X24_UINT
        | FORMAT_R32_FLOAT_X8X24_TYPELESS
        | FORMAT_X32_TYPELESS_G8X24_UINT => Format::D32FloatS8Uint,
        FORMAT_R10G10B10A2_TYPELESS | FORMAT_R10G10B10A2_UNORM => Format::R10G10B10A2Unorm,
        FORMAT_R10G10B10A2_UINT => Format::R10G10B10A2Uint,
        FORMAT_R11G11B10_FLOAT => Format::R11G11B10Float,
        FORMAT_R8G8B8A8_TYPELESS | FORMAT_R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
        FORMAT_R8G8B8A8_UNORM_SRGB => Format::R8G8B8A8Srgb,
        FORMAT_R8G8B8A8_UINT => Format::R8G8B8A8Uint,
        FORMAT_R8G8B8A8_SNORM => Format::R8G8B8A8Snorm,
        FORMAT_R8G8B8A8_SINT => Format::R8G8B8A8Sint,
        FORMAT_R16G16_TYPELESS | FORMAT_R16G16_UNORM => Format::R16G16Unorm,
        FORMAT_R16G16_FLOAT => Format::R16G16Float,
        FORMAT_R16G16_UINT => Format::R16G16Uint,
        FORMAT_R16G16_SNORM => Format::R16G16Snorm,
        FORMAT_R16G16_SINT => Format::R16G16Sint,
        FORMAT_R32_TYPELESS => match mode {
            FormatMode::Depth => Format::D32Float,
            _ => Format::R32Float,
        },
        FORMAT_D32_FLOAT => Format::D32Float,
        FORMAT_R32_FLOAT => Format::R32Float,
        FORMAT_R32_UINT => Format::R32Uint,
        FORMAT_R32_SINT => Format::R32Sint,
        FORMAT_R24G8_TYPELESS
        | FORMAT_D24_UNORM_S8_UINT
        | FORMAT_R24_UNORM_X8_TYPELESS
        | FORMAT_X24_TYPELESS_G8_UINT => Format::D24UnormS8Uint,
        FORMAT_R8G8_TYPELESS | FORMAT_R8G8_UNORM => Format::R8G8Unorm,
        FORMAT_R8G8_UINT => Format::R8G8Uint,
        FORMAT_R8G8_SNORM => Format::R8G8Snorm,
        FORMAT_R8G8_SINT => Format::R8G8Sint,
        FORMAT_R16_TYPELESS => match mode {
            FormatMode::Depth => Format::D16Unorm,
            _ => Format::R16Unorm,
        },
        FORMAT_R16_FLOAT => Format::R16Float,
        FORMAT_D16_UNORM => Format::D16Unorm,
        FORMAT_R16_UNORM => Format::R16Unorm,
        FORMAT_R16_UINT => Format::R16Uint,
        FORMAT_R16_SNORM => Format::R16Snorm,
        FORMAT_R16_SINT => Format::R16Sint,
        FORMAT_R8_TYPELESS | FORMAT_R8_UNORM => Format::R8Unorm,
        FORMAT_R8_UINT => Format::R8Uint,
        FORMAT_R8_SNORM => Format::R8Snorm,
        FORMAT_R8_SINT => Format::R8Sint,
        FORMAT_A8_UNORM => Format::A8Unorm,
        FORMAT_BC1_TYPELESS | FORMAT_BC1_UNORM => Format::Bc1Unorm,
        FORMAT_BC1_UNORM_SRGB => Format::Bc1Srgb,
        FORMAT_BC2_TYPELESS | FORMAT_BC2_UNORM => Format::Bc2Unorm,
        FORMAT_BC2_UNORM_SRGB => Format::Bc2Srgb,
        FORMAT_BC3_TYPELESS | FORMAT_BC3_UNORM => Format::Bc3Unorm,
        FORMAT_BC3_UNORM_SRGB => Format::Bc3Srgb,
        FORMAT_BC4_TYPELESS | FORMAT_BC4_UNORM => Format::Bc4Unorm,
        FORMAT_BC4_SNORM => Format::Bc4Snorm,
        FORMAT_BC5_TYPELESS | FORMAT_BC5_UNORM => Format::Bc5Unorm,
        FORMAT_BC5_SNORM => Format::Bc5Snorm,
        FORMAT_B8G8R8A8_TYPELESS | FORMAT_B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
        FORMAT_B8G8R8A8_UNORM_SRGB => Format::B8G8R8A8Srgb,
        _ => return None,
    };

    Some(format)
}

/// Validates a multisample count from a descriptor.
pub fn decode_sample_count(count: u32) -> Option<u32> {
    match count {
        1 | 2 | 4 | 8 | 16 | 32 => Some(count),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeless_resolution_follows_mode() {
        assert_eq!(
            lookup_format(dxgi::FORMAT_R32_TYPELESS, FormatMode::Color),
            Some(Format::R32Float)
        );
        assert_eq!(
            lookup_format(dxgi::FORMAT_R32_TYPELESS, FormatMode::Depth),
            Some(Format::D32Float)
        );
        assert_eq!(
            lookup_format(dxgi::FORMAT_R24G8_TYPELESS, FormatMode::Any),
            Some(Format::D24UnormS8Uint)
        );
    }

    #[test]
    fn unknown_codes_do_not_resolve() {
        assert_eq!(lookup_format(dxgi::FORMAT_UNKNOWN, FormatMode::Any), None);
        assert_eq!(lookup_format(0xDEAD, FormatMode::Any), None);
    }

    #[test]
    fn sample_counts_are_powers_of_two() {
        assert_eq!(decode_sample_count(4), Some(4));
        assert_eq!(decode_sample_count(0), None);
        assert_eq!(decode_sample_count(3), None);
    }
}
