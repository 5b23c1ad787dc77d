use std::sync::Arc;

use strato_gpu::state::{InputAssemblyState, PrimitiveTopology};
use tracing::error;

use crate::blend::BlendState;
use crate::buffer::Buffer;
use crate::depth_stencil::DepthStencilState;
use crate::input_layout::InputLayout;
use crate::query::Query;
use crate::rasterizer::RasterizerState;
use crate::sampler::SamplerState;
use crate::shader::{GeometryShader, PixelShader, VertexShader};
use crate::view::{DepthStencilView, RenderTargetView, ShaderResourceView};

pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_CONSTANT_BUFFER_SLOTS: usize = 14;
pub const MAX_SAMPLER_SLOTS: usize = 16;
pub const MAX_SHADER_RESOURCE_SLOTS: usize = 128;
pub const MAX_VERTEX_BUFFER_SLOTS: usize = 16;
pub const MAX_VIEWPORT_SLOTS: usize = 16;
pub const MAX_SO_TARGETS: usize = 4;

/// Scissor extent used while the scissor test is logically disabled.
pub(crate) const VIEWPORT_BOUNDS_MAX: u32 = 16383;

/// Raw primitive topology codes and dynamic state defaults.
pub mod d3d10 {
    pub const PRIMITIVE_TOPOLOGY_UNDEFINED: u32 = 0;
    pub const PRIMITIVE_TOPOLOGY_POINTLIST: u32 = 1;
    pub const PRIMITIVE_TOPOLOGY_LINELIST: u32 = 2;
    pub const PRIMITIVE_TOPOLOGY_LINESTRIP: u32 = 3;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLELIST: u32 = 4;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLESTRIP: u32 = 5;
    pub const PRIMITIVE_TOPOLOGY_LINELIST_ADJ: u32 = 10;
    pub const PRIMITIVE_TOPOLOGY_LINESTRIP_ADJ: u32 = 11;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLELIST_ADJ: u32 = 12;
    pub const PRIMITIVE_TOPOLOGY_TRIANGLESTRIP_ADJ: u32 = 13;

    pub const DEFAULT_SAMPLE_MASK: u32 = 0xFFFF_FFFF;
    pub const DEFAULT_STENCIL_REFERENCE: u32 = 0;

    pub const CLEAR_DEPTH: u32 = 0x1;
    pub const CLEAR_STENCIL: u32 = 0x2;
}

/// A viewport in window coordinates with a top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub top_left_x: i32,
    pub top_left_y: i32,
    pub width: u32,
    pub height: u32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// A scissor rectangle given by its edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Constant buffer binding. Offset and length count 16-byte constants,
/// a length of zero leaves the slot empty.
#[derive(Clone, Default)]
pub struct ConstantBufferBinding {
    pub buffer: Option<Arc<Buffer>>,
    pub constant_offset: u32,
    pub constant_count: u32,
}

#[derive(Clone, Default)]
pub struct VertexBufferBinding {
    pub buffer: Option<Arc<Buffer>>,
    pub offset: u32,
    pub stride: u32,
}

#[derive(Clone, Default)]
pub struct IndexBufferBinding {
    pub buffer: Option<Arc<Buffer>>,
    pub offset: u32,
    pub format: u32,
}

#[derive(Clone, Default)]
pub struct SoTargetBinding {
    pub buffer: Option<Arc<Buffer>>,
    pub offset: u32,
}

/// Per-stage bindings. All three programmable stages track the same
/// slot sets.
pub(crate) struct StageState<S> {
    pub shader: Option<Arc<S>>,
    pub constant_buffers: [ConstantBufferBinding; MAX_CONSTANT_BUFFER_SLOTS],
    pub samplers: [Option<Arc<SamplerState>>; MAX_SAMPLER_SLOTS],
    pub shader_resources: [Option<Arc<ShaderResourceView>>; MAX_SHADER_RESOURCE_SLOTS],
}

impl<S> Default for StageState<S> {
    fn default() -> Self {
        Self {
            shader: None,
            constant_buffers: std::array::from_fn(|_| ConstantBufferBinding::default()),
            samplers: std::array::from_fn(|_| None),
            shader_resources: std::array::from_fn(|_| None),
        }
    }
}

#[derive(Default)]
pub(crate) struct IaState {
    pub input_layout: Option<Arc<InputLayout>>,
    pub primitive_topology: u32,
    pub vertex_buffers: [VertexBufferBinding; MAX_VERTEX_BUFFER_SLOTS],
    pub index_buffer: IndexBufferBinding,
}

pub(crate) struct OmState {
    pub render_target_views: [Option<Arc<RenderTargetView>>; MAX_RENDER_TARGETS],
    pub depth_stencil_view: Option<Arc<DepthStencilView>>,
    pub blend_state: Option<Arc<BlendState>>,
    pub depth_stencil_state: Option<Arc<DepthStencilState>>,
    pub blend_factor: [f32; 4],
    pub sample_mask: u32,
    pub stencil_ref: u32,
}

impl Default for OmState {
    fn default() -> Self {
        Self {
            render_target_views: Default::default(),
            depth_stencil_view: None,
            blend_state: None,
            depth_stencil_state: None,
            blend_factor: [1.0; 4],
            sample_mask: d3d10::DEFAULT_SAMPLE_MASK,
            stencil_ref: d3d10::DEFAULT_STENCIL_REFERENCE,
        }
    }
}

#[derive(Default)]
pub(crate) struct RsState {
    pub state: Option<Arc<RasterizerState>>,
    pub num_viewports: u32,
    pub num_scissors: u32,
    pub viewports: [Viewport; MAX_VIEWPORT_SLOTS],
    pub scissors: [Rect; MAX_VIEWPORT_SLOTS],
}

#[derive(Default)]
pub(crate) struct SoState {
    pub targets: [SoTargetBinding; MAX_SO_TARGETS],
}

#[derive(Default)]
pub(crate) struct PrState {
    pub predicate: Option<Arc<Query>>,
    pub value: bool,
}

/// The complete tracked pipeline state.
#[derive(Default)]
pub(crate) struct ContextState {
    pub vs: StageState<VertexShader>,
    pub gs: StageState<GeometryShader>,
    pub ps: StageState<PixelShader>,

    pub ia: IaState,
    pub om: OmState,
    pub rs: RsState,
    pub so: SoState,
    pub pr: PrState,
}

/// Translates a raw topology code. Undefined input is the caller's
/// concern; unknown codes fall back to the default assembly state.
pub(crate) fn decode_input_assembly_state(topology: u32) -> InputAssemblyState {
    let (topology, restart) = match topology {
        d3d10::PRIMITIVE_TOPOLOGY_POINTLIST => (PrimitiveTopology::PointList, false),
        d3d10::PRIMITIVE_TOPOLOGY_LINELIST => (PrimitiveTopology::LineList, false),
        d3d10::PRIMITIVE_TOPOLOGY_LINESTRIP => (PrimitiveTopology::LineStrip, true),
        d3d10::PRIMITIVE_TOPOLOGY_TRIANGLELIST => (PrimitiveTopology::TriangleList, false),
        d3d10::PRIMITIVE_TOPOLOGY_TRIANGLESTRIP => (PrimitiveTopology::TriangleStrip, true),
        d3d10::PRIMITIVE_TOPOLOGY_LINELIST_ADJ => (PrimitiveTopology::LineListAdjacent, false),
        d3d10::PRIMITIVE_TOPOLOGY_LINESTRIP_ADJ => (PrimitiveTopology::LineStripAdjacent, true),
        d3d10::PRIMITIVE_TOPOLOGY_TRIANGLELIST_ADJ => {
            (PrimitiveTopology::TriangleListAdjacent, false)
        }
        d3d10::PRIMITIVE_TOPOLOGY_TRIANGLESTRIP_ADJ => {
            (PrimitiveTopology::TriangleStripAdjacent, true)
        }
        other => {
            error!(value = other, "invalid primitive topology");
            (PrimitiveTopology::PointList, false)
        }
    };

    InputAssemblyState {
        topology,
        enable_primitive_restart: restart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_uses_api_defaults() {
        let state = ContextState::default();
        assert_eq!(state.om.blend_factor, [1.0; 4]);
        assert_eq!(state.om.sample_mask, d3d10::DEFAULT_SAMPLE_MASK);
        assert_eq!(state.ia.primitive_topology, d3d10::PRIMITIVE_TOPOLOGY_UNDEFINED);
        assert_eq!(state.rs.num_viewports, 0);
    }

    #[test]
    fn strip_topologies_enable_primitive_restart() {
        let strip = decode_input_assembly_state(d3d10::PRIMITIVE_TOPOLOGY_TRIANGLESTRIP);
        assert!(strip.enable_primitive_restart);
        assert_eq!(strip.topology, PrimitiveTopology::TriangleStrip);

        let list = decode_input_assembly_state(d3d10::PRIMITIVE_TOPOLOGY_TRIANGLELIST);
        assert!(!list.enable_primitive_restart);
    }
}
