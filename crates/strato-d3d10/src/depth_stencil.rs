use strato_gpu::state::{
    CompareOp, DepthStencilState as GpuDepthStencilState, StencilOp, StencilOpState,
};
use tracing::error;

/// Raw depth/stencil enum codes as they appear in descriptors.
pub mod d3d10 {
    pub const DEPTH_WRITE_MASK_ZERO: u32 = 0;
    pub const DEPTH_WRITE_MASK_ALL: u32 = 1;

    pub const COMPARISON_NEVER: u32 = 1;
    pub const COMPARISON_LESS: u32 = 2;
    pub const COMPARISON_EQUAL: u32 = 3;
    pub const COMPARISON_LESS_EQUAL: u32 = 4;
    pub const COMPARISON_GREATER: u32 = 5;
    pub const COMPARISON_NOT_EQUAL: u32 = 6;
    pub const COMPARISON_GREATER_EQUAL: u32 = 7;
    pub const COMPARISON_ALWAYS: u32 = 8;

    pub const STENCIL_OP_KEEP: u32 = 1;
    pub const STENCIL_OP_ZERO: u32 = 2;
    pub const STENCIL_OP_REPLACE: u32 = 3;
    pub const STENCIL_OP_INCR_SAT: u32 = 4;
    pub const STENCIL_OP_DECR_SAT: u32 = 5;
    pub const STENCIL_OP_INVERT: u32 = 6;
    pub const STENCIL_OP_INCR: u32 = 7;
    pub const STENCIL_OP_DECR: u32 = 8;
}

/// Stencil behaviour for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub stencil_fail_op: u32,
    pub stencil_depth_fail_op: u32,
    pub stencil_pass_op: u32,
    pub stencil_func: u32,
}

impl Default for StencilOpDesc {
    fn default() -> Self {
        Self {
            stencil_fail_op: d3d10::STENCIL_OP_KEEP,
            stencil_depth_fail_op: d3d10::STENCIL_OP_KEEP,
            stencil_pass_op: d3d10::STENCIL_OP_KEEP,
            stencil_func: d3d10::COMPARISON_ALWAYS,
        }
    }
}

/// Depth/stencil descriptor. The stencil reference value is dynamic
/// state and not part of the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: u32,
    pub depth_func: u32,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: d3d10::DEPTH_WRITE_MASK_ALL,
            depth_func: d3d10::COMPARISON_LESS,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilOpDesc::default(),
            back_face: StencilOpDesc::default(),
        }
    }
}

/// Immutable depth/stencil state object.
pub struct DepthStencilState {
    desc: DepthStencilDesc,
    state: GpuDepthStencilState,
}

impl DepthStencilState {
    pub(crate) fn new(desc: &DepthStencilDesc) -> Self {
        let state = GpuDepthStencilState {
            enable_depth_test: desc.depth_enable,
            enable_depth_write: desc.depth_write_mask == d3d10::DEPTH_WRITE_MASK_ALL,
            enable_stencil_test: desc.stencil_enable,
            depth_compare_op: decode_compare_op(desc.depth_func),
            stencil_front: decode_stencil_op_state(desc, &desc.front_face),
            stencil_back: decode_stencil_op_state(desc, &desc.back_face),
        };

        Self { desc: *desc, state }
    }

    pub fn desc(&self) -> &DepthStencilDesc {
        &self.desc
    }

    pub(crate) fn gpu_state(&self) -> &GpuDepthStencilState {
        &self.state
    }
}

fn decode_stencil_op_state(desc: &DepthStencilDesc, face: &StencilOpDesc) -> StencilOpState {
    let mut state = StencilOpState {
        fail_op: StencilOp::Keep,
        pass_op: StencilOp::Keep,
        depth_fail_op: StencilOp::Keep,
        compare_op: CompareOp::Always,
        compare_mask: u32::from(desc.stencil_read_mask),
        write_mask: u32::from(desc.stencil_write_mask),
    };

    if desc.stencil_enable {
        state.fail_op = decode_stencil_op(face.stencil_fail_op);
        state.pass_op = decode_stencil_op(face.stencil_pass_op);
        state.depth_fail_op = decode_stencil_op(face.stencil_depth_fail_op);
        state.compare_op = decode_compare_op(face.stencil_func);
    }

    state
}

pub(crate) fn decode_compare_op(value: u32) -> CompareOp {
    match value {
        d3d10::COMPARISON_NEVER => CompareOp::Never,
        d3d10::COMPARISON_LESS => CompareOp::Less,
        d3d10::COMPARISON_EQUAL => CompareOp::Equal,
        d3d10::COMPARISON_LESS_EQUAL => CompareOp::LessOrEqual,
        d3d10::COMPARISON_GREATER => CompareOp::Greater,
        d3d10::COMPARISON_NOT_EQUAL => CompareOp::NotEqual,
        d3d10::COMPARISON_GREATER_EQUAL => CompareOp::GreaterOrEqual,
        d3d10::COMPARISON_ALWAYS => CompareOp::Always,
        other => {
            if other != 0 {
                error!(value = other, "invalid comparison function");
            }
            CompareOp::Never
        }
    }
}

fn decode_stencil_op(value: u32) -> StencilOp {
    match value {
        d3d10::STENCIL_OP_KEEP => StencilOp::Keep,
        d3d10::STENCIL_OP_ZERO => StencilOp::Zero,
        d3d10::STENCIL_OP_REPLACE => StencilOp::Replace,
        d3d10::STENCIL_OP_INCR_SAT => StencilOp::IncrementClamp,
        d3d10::STENCIL_OP_DECR_SAT => StencilOp::DecrementClamp,
        d3d10::STENCIL_OP_INVERT => StencilOp::Invert,
        d3d10::STENCIL_OP_INCR => StencilOp::IncrementWrap,
        d3d10::STENCIL_OP_DECR => StencilOp::DecrementWrap,
        other => {
            if other != 0 {
                error!(value = other, "invalid stencil op");
            }
            StencilOp::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mask_gates_depth_writes() {
        let desc = DepthStencilDesc {
            depth_write_mask: d3d10::DEPTH_WRITE_MASK_ZERO,
            ..Default::default()
        };
        let state = DepthStencilState::new(&desc);
        assert!(state.gpu_state().enable_depth_test);
        assert!(!state.gpu_state().enable_depth_write);
    }

    #[test]
    fn disabled_stencil_keeps_face_ops_inert() {
        let desc = DepthStencilDesc {
            front_face: StencilOpDesc {
                stencil_fail_op: d3d10::STENCIL_OP_INVERT,
                stencil_pass_op: d3d10::STENCIL_OP_REPLACE,
                stencil_depth_fail_op: d3d10::STENCIL_OP_DECR,
                stencil_func: d3d10::COMPARISON_NEVER,
            },
            ..Default::default()
        };
        let state = DepthStencilState::new(&desc);
        let front = &state.gpu_state().stencil_front;
        assert_eq!(front.fail_op, StencilOp::Keep);
        assert_eq!(front.pass_op, StencilOp::Keep);
        assert_eq!(front.compare_op, CompareOp::Always);
    }

    #[test]
    fn stencil_masks_are_widened_from_bytes() {
        let desc = DepthStencilDesc {
            stencil_enable: true,
            stencil_read_mask: 0x0F,
            stencil_write_mask: 0xF0,
            ..Default::default()
        };
        let state = DepthStencilState::new(&desc);
        assert_eq!(state.gpu_state().stencil_front.compare_mask, 0x0F);
        assert_eq!(state.gpu_state().stencil_front.write_mask, 0xF0);
    }
}
