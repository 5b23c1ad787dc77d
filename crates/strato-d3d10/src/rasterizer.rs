use std::hash::{Hash, Hasher};

use strato_gpu::state::{
    CullMode, DepthBias, FrontFace, PolygonMode, RasterizerState as GpuRasterizerState,
};
use tracing::{error, warn};

/// Raw rasterizer enum codes as they appear in descriptors.
pub mod d3d10 {
    pub const FILL_WIREFRAME: u32 = 2;
    pub const FILL_SOLID: u32 = 3;

    pub const CULL_NONE: u32 = 1;
    pub const CULL_FRONT: u32 = 2;
    pub const CULL_BACK: u32 = 3;
}

/// Rasterizer descriptor.
#[derive(Clone, Copy, Debug)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: d3d10::FILL_SOLID,
            cull_mode: d3d10::CULL_BACK,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
        }
    }
}

impl PartialEq for RasterizerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fill_mode == other.fill_mode
            && self.cull_mode == other.cull_mode
            && self.front_counter_clockwise == other.front_counter_clockwise
            && self.depth_bias == other.depth_bias
            && self.depth_bias_clamp.to_bits() == other.depth_bias_clamp.to_bits()
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.depth_clip_enable == other.depth_clip_enable
            && self.scissor_enable == other.scissor_enable
            && self.multisample_enable == other.multisample_enable
            && self.antialiased_line_enable == other.antialiased_line_enable
    }
}

impl Eq for RasterizerDesc {}

impl Hash for RasterizerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_counter_clockwise.hash(state);
        self.depth_bias.hash(state);
        self.depth_bias_clamp.to_bits().hash(state);
        self.slope_scaled_depth_bias.to_bits().hash(state);
        self.depth_clip_enable.hash(state);
        self.scissor_enable.hash(state);
        self.multisample_enable.hash(state);
        self.antialiased_line_enable.hash(state);
    }
}

/// Immutable rasterizer state object. Scissor enablement stays on the
/// descriptor and is consumed when scissor rectangles are applied.
pub struct RasterizerState {
    desc: RasterizerDesc,
    state: GpuRasterizerState,
}

impl RasterizerState {
    pub(crate) fn new(desc: &RasterizerDesc) -> Self {
        let mut state = GpuRasterizerState {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: if desc.front_counter_clockwise {
                FrontFace::CounterClockwise
            } else {
                FrontFace::Clockwise
            },
            // The bias values are part of the immutable state, so it
            // costs nothing to leave the bias stage enabled.
            enable_depth_bias: true,
            enable_depth_clamp: !desc.depth_clip_enable,
            depth_bias: DepthBias {
                constant_factor: desc.depth_bias as f32,
                clamp: desc.depth_bias_clamp,
                slope_factor: desc.slope_scaled_depth_bias,
            },
        };

        match desc.fill_mode {
            d3d10::FILL_WIREFRAME => state.polygon_mode = PolygonMode::Line,
            d3d10::FILL_SOLID => state.polygon_mode = PolygonMode::Fill,
            other => error!(value = other, "invalid fill mode"),
        }

        match desc.cull_mode {
            d3d10::CULL_NONE => state.cull_mode = CullMode::None,
            d3d10::CULL_FRONT => state.cull_mode = CullMode::Front,
            d3d10::CULL_BACK => state.cull_mode = CullMode::Back,
            other => error!(value = other, "invalid cull mode"),
        }

        if !desc.depth_clip_enable {
            warn!("depth clamp not properly supported");
        }

        if desc.antialiased_line_enable {
            error!("antialiased lines not supported");
        }

        Self { desc: *desc, state }
    }

    pub fn desc(&self) -> &RasterizerDesc {
        &self.desc
    }

    pub(crate) fn gpu_state(&self) -> &GpuRasterizerState {
        &self.state
    }

    pub(crate) fn scissor_enabled(&self) -> bool {
        self.desc.scissor_enable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winding_order_follows_descriptor() {
        let state = RasterizerState::new(&RasterizerDesc::default());
        assert_eq!(state.gpu_state().front_face, FrontFace::Clockwise);

        let state = RasterizerState::new(&RasterizerDesc {
            front_counter_clockwise: true,
            ..Default::default()
        });
        assert_eq!(state.gpu_state().front_face, FrontFace::CounterClockwise);
    }

    #[test]
    fn depth_clip_disables_map_to_depth_clamp() {
        let state = RasterizerState::new(&RasterizerDesc {
            depth_clip_enable: false,
            ..Default::default()
        });
        assert!(state.gpu_state().enable_depth_clamp);
    }

    #[test]
    fn bias_values_carry_into_backend_state() {
        let state = RasterizerState::new(&RasterizerDesc {
            depth_bias: -4,
            slope_scaled_depth_bias: 1.5,
            ..Default::default()
        });
        let bias = state.gpu_state().depth_bias;
        assert_eq!(bias.constant_factor, -4.0);
        assert_eq!(bias.slope_factor, 1.5);
    }

    #[test]
    fn descriptor_hash_distinguishes_float_fields() {
        use std::collections::hash_map::DefaultHasher;

        let a = RasterizerDesc::default();
        let b = RasterizerDesc {
            depth_bias_clamp: 0.5,
            ..Default::default()
        };
        assert_ne!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }
}
