use strato_gpu::state::{BlendFactor, BlendMode, BlendOp, ColorWriteMask, MultisampleState};
use tracing::error;

use crate::state::MAX_RENDER_TARGETS;

/// Raw blend enum codes as they appear in descriptors.
pub mod d3d10 {
    pub const BLEND_ZERO: u32 = 1;
    pub const BLEND_ONE: u32 = 2;
    pub const BLEND_SRC_COLOR: u32 = 3;
    pub const BLEND_INV_SRC_COLOR: u32 = 4;
    pub const BLEND_SRC_ALPHA: u32 = 5;
    pub const BLEND_INV_SRC_ALPHA: u32 = 6;
    pub const BLEND_DEST_ALPHA: u32 = 7;
    pub const BLEND_INV_DEST_ALPHA: u32 = 8;
    pub const BLEND_DEST_COLOR: u32 = 9;
    pub const BLEND_INV_DEST_COLOR: u32 = 10;
    pub const BLEND_SRC_ALPHA_SAT: u32 = 11;
    pub const BLEND_BLEND_FACTOR: u32 = 14;
    pub const BLEND_INV_BLEND_FACTOR: u32 = 15;
    pub const BLEND_SRC1_COLOR: u32 = 16;
    pub const BLEND_INV_SRC1_COLOR: u32 = 17;
    pub const BLEND_SRC1_ALPHA: u32 = 18;
    pub const BLEND_INV_SRC1_ALPHA: u32 = 19;

    pub const BLEND_OP_ADD: u32 = 1;
    pub const BLEND_OP_SUBTRACT: u32 = 2;
    pub const BLEND_OP_REV_SUBTRACT: u32 = 3;
    pub const BLEND_OP_MIN: u32 = 4;
    pub const BLEND_OP_MAX: u32 = 5;

    pub const COLOR_WRITE_ENABLE_ALL: u8 = 0xF;
}

/// Blend configuration for one render target slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub render_target_write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: d3d10::BLEND_ONE,
            dest_blend: d3d10::BLEND_ZERO,
            blend_op: d3d10::BLEND_OP_ADD,
            src_blend_alpha: d3d10::BLEND_ONE,
            dest_blend_alpha: d3d10::BLEND_ZERO,
            blend_op_alpha: d3d10::BLEND_OP_ADD,
            render_target_write_mask: d3d10::COLOR_WRITE_ENABLE_ALL,
        }
    }
}

/// Output-merger blend descriptor with per-target settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_target: [RenderTargetBlendDesc; MAX_RENDER_TARGETS],
}

/// Immutable blend state object. The descriptor is decoded once at
/// creation; binding only replays the translated modes.
pub struct BlendState {
    desc: BlendDesc,
    blend_modes: [BlendMode; MAX_RENDER_TARGETS],
    alpha_to_coverage: bool,
}

impl BlendState {
    pub(crate) fn new(desc: &BlendDesc) -> Self {
        // Without independent blend the settings of target zero apply
        // to every slot, which is also what the backend requires.
        let blend_modes = std::array::from_fn(|i| {
            decode_blend_mode(if desc.independent_blend_enable {
                &desc.render_target[i]
            } else {
                &desc.render_target[0]
            })
        });

        Self {
            desc: *desc,
            blend_modes,
            alpha_to_coverage: desc.alpha_to_coverage_enable,
        }
    }

    pub fn desc(&self) -> &BlendDesc {
        &self.desc
    }

    pub(crate) fn blend_modes(&self) -> &[BlendMode; MAX_RENDER_TARGETS] {
        &self.blend_modes
    }

    /// The sample mask is dynamic state supplied at bind time.
    pub(crate) fn multisample_state(&self, sample_mask: u32) -> MultisampleState {
        MultisampleState {
            sample_mask,
            enable_alpha_to_coverage: self.alpha_to_coverage,
        }
    }
}

fn decode_blend_mode(desc: &RenderTargetBlendDesc) -> BlendMode {
    BlendMode {
        enable_blending: desc.blend_enable,
        color_src_factor: decode_blend_factor(desc.src_blend, false),
        color_dst_factor: decode_blend_factor(desc.dest_blend, false),
        color_blend_op: decode_blend_op(desc.blend_op),
        alpha_src_factor: decode_blend_factor(desc.src_blend_alpha, true),
        alpha_dst_factor: decode_blend_factor(desc.dest_blend_alpha, true),
        alpha_blend_op: decode_blend_op(desc.blend_op_alpha),
        write_mask: ColorWriteMask::from_bits_truncate(u32::from(desc.render_target_write_mask)),
    }
}

fn decode_blend_factor(value: u32, is_alpha: bool) -> BlendFactor {
    match value {
        d3d10::BLEND_ZERO => BlendFactor::Zero,
        d3d10::BLEND_ONE => BlendFactor::One,
        d3d10::BLEND_SRC_COLOR => BlendFactor::SrcColor,
        d3d10::BLEND_INV_SRC_COLOR => BlendFactor::OneMinusSrcColor,
        d3d10::BLEND_SRC_ALPHA => BlendFactor::SrcAlpha,
        d3d10::BLEND_INV_SRC_ALPHA => BlendFactor::OneMinusSrcAlpha,
        d3d10::BLEND_DEST_ALPHA => BlendFactor::DstAlpha,
        d3d10::BLEND_INV_DEST_ALPHA => BlendFactor::OneMinusDstAlpha,
        d3d10::BLEND_DEST_COLOR => BlendFactor::DstColor,
        d3d10::BLEND_INV_DEST_COLOR => BlendFactor::OneMinusDstColor,
        d3d10::BLEND_SRC_ALPHA_SAT => BlendFactor::SrcAlphaSaturate,
        d3d10::BLEND_BLEND_FACTOR if is_alpha => BlendFactor::ConstantAlpha,
        d3d10::BLEND_BLEND_FACTOR => BlendFactor::ConstantColor,
        d3d10::BLEND_INV_BLEND_FACTOR if is_alpha => BlendFactor::OneMinusConstantAlpha,
        d3d10::BLEND_INV_BLEND_FACTOR => BlendFactor::OneMinusConstantColor,
        d3d10::BLEND_SRC1_COLOR => BlendFactor::Src1Color,
        d3d10::BLEND_INV_SRC1_COLOR => BlendFactor::OneMinusSrc1Color,
        d3d10::BLEND_SRC1_ALPHA => BlendFactor::Src1Alpha,
        d3d10::BLEND_INV_SRC1_ALPHA => BlendFactor::OneMinusSrc1Alpha,
        other => {
            // Zero slips through silently so zeroed descriptors do not
            // spam the log.
            if other != 0 {
                error!(value = other, "invalid blend factor");
            }
            BlendFactor::Zero
        }
    }
}

fn decode_blend_op(value: u32) -> BlendOp {
    match value {
        d3d10::BLEND_OP_ADD => BlendOp::Add,
        d3d10::BLEND_OP_SUBTRACT => BlendOp::Subtract,
        d3d10::BLEND_OP_REV_SUBTRACT => BlendOp::ReverseSubtract,
        d3d10::BLEND_OP_MIN => BlendOp::Min,
        d3d10::BLEND_OP_MAX => BlendOp::Max,
        other => {
            if other != 0 {
                error!(value = other, "invalid blend op");
            }
            BlendOp::Add
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependent_blend_replicates_target_zero() {
        let mut desc = BlendDesc::default();
        desc.render_target[0].blend_enable = true;
        desc.render_target[0].src_blend = d3d10::BLEND_SRC_ALPHA;
        desc.render_target[0].dest_blend = d3d10::BLEND_INV_SRC_ALPHA;
        desc.render_target[3].blend_enable = false;
        desc.render_target[3].src_blend = d3d10::BLEND_ONE;

        let state = BlendState::new(&desc);
        for mode in state.blend_modes() {
            assert!(mode.enable_blending);
            assert_eq!(mode.color_src_factor, BlendFactor::SrcAlpha);
            assert_eq!(mode.color_dst_factor, BlendFactor::OneMinusSrcAlpha);
        }
    }

    #[test]
    fn independent_blend_keeps_per_target_modes() {
        let mut desc = BlendDesc::default();
        desc.independent_blend_enable = true;
        desc.render_target[2].blend_enable = true;

        let state = BlendState::new(&desc);
        assert!(!state.blend_modes()[0].enable_blending);
        assert!(state.blend_modes()[2].enable_blending);
    }

    #[test]
    fn zeroed_blend_fields_decode_to_safe_defaults() {
        let desc = BlendDesc {
            render_target: [RenderTargetBlendDesc {
                blend_enable: false,
                src_blend: 0,
                dest_blend: 0,
                blend_op: 0,
                src_blend_alpha: 0,
                dest_blend_alpha: 0,
                blend_op_alpha: 0,
                render_target_write_mask: 0xF,
            }; MAX_RENDER_TARGETS],
            ..Default::default()
        };

        let state = BlendState::new(&desc);
        assert_eq!(state.blend_modes()[0].color_blend_op, BlendOp::Add);
        assert_eq!(state.blend_modes()[0].color_src_factor, BlendFactor::Zero);
    }

    #[test]
    fn blend_factor_alpha_variants_swap_constant_color() {
        assert_eq!(
            decode_blend_factor(d3d10::BLEND_BLEND_FACTOR, false),
            BlendFactor::ConstantColor
        );
        assert_eq!(
            decode_blend_factor(d3d10::BLEND_BLEND_FACTOR, true),
            BlendFactor::ConstantAlpha
        );
    }
}
