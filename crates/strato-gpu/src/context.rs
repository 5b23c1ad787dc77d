//! Recording context trait.
//!
//! A [`GpuContext`] records commands into the command list it currently
//! owns. All binding methods are idempotent from the backend's point of
//! view; deciding whether a bind is redundant is the caller's job, the
//! context records whatever it is told.

use std::any::Any;
use std::sync::Arc;

use crate::format::{Extent3d, Offset3d};
use crate::resource::{
    GpuBuffer, GpuBufferSlice, GpuImage, GpuImageView, GpuPhysicalSlice, GpuQuery, GpuShader,
    ImageSubresourceLayers, ImageSubresourceRange, ShaderResource,
};
use crate::state::{
    BlendMode, ClearValue, DepthStencilState, ImageLayout, IndexType, InputAssemblyState,
    InputAttribute, InputBinding, MultisampleState, RasterizerState, Rect2d, ShaderStage,
    Viewport,
};

/// An opaque, backend-defined command list.
///
/// Command lists are created by the device, filled by a context between
/// `begin_recording` and `end_recording`, and handed back to the device for
/// submission. The payload type is the backend's business.
pub struct GpuCommandList {
    payload: Box<dyn Any + Send>,
}

impl GpuCommandList {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &(dyn Any + Send) {
        &*self.payload
    }

    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }
}

/// A color or depth-stencil attachment together with the layout it is
/// rendered in.
#[derive(Clone)]
pub struct RenderAttachment {
    pub view: Arc<dyn GpuImageView>,
    pub layout: ImageLayout,
}

/// The complete attachment set for subsequent draws.
#[derive(Clone, Default)]
pub struct RenderTargets {
    pub colors: Vec<Option<RenderAttachment>>,
    pub depth: Option<RenderAttachment>,
}

pub trait GpuContext: Send {
    /// Makes `cmd_list` the recording target.
    fn begin_recording(&mut self, cmd_list: GpuCommandList);

    /// Takes the current command list out of the context.
    fn end_recording(&mut self) -> GpuCommandList;

    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Arc<dyn GpuShader>>);

    fn bind_uniform_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<GpuBufferSlice>);

    fn bind_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        resource: Option<ShaderResource>,
    );

    fn bind_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<Arc<dyn crate::resource::GpuSampler>>,
    );

    /// Binds a vertex buffer range; `stride` is the per-element stride in
    /// bytes. `None` unbinds the slot.
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: Option<GpuBufferSlice>, stride: u32);

    fn bind_index_buffer(&mut self, buffer: Option<GpuBufferSlice>, index_type: IndexType);

    fn bind_render_targets(&mut self, targets: RenderTargets);

    /// Binds a stream-output target range; writes during draws append to it.
    fn bind_stream_output_buffer(&mut self, slot: u32, buffer: Option<GpuBufferSlice>);

    fn set_input_layout(&mut self, attributes: Vec<InputAttribute>, bindings: Vec<InputBinding>);

    fn set_input_assembly_state(&mut self, state: InputAssemblyState);

    /// Blend configuration for one color attachment.
    fn set_blend_mode(&mut self, attachment: u32, mode: BlendMode);

    fn set_multisample_state(&mut self, state: MultisampleState);

    fn set_blend_constants(&mut self, constants: [f32; 4]);

    fn set_depth_stencil_state(&mut self, state: DepthStencilState);

    fn set_stencil_reference(&mut self, reference: u32);

    fn set_rasterizer_state(&mut self, state: RasterizerState);

    /// Sets viewports and their scissor rectangles. Both slices have the
    /// same length; scissoring that is logically disabled is expressed with
    /// maximum-extent rectangles.
    fn set_viewports(&mut self, viewports: Vec<Viewport>, scissors: Vec<Rect2d>);

    fn begin_query(&mut self, query: Arc<dyn GpuQuery>);

    fn end_query(&mut self, query: Arc<dyn GpuQuery>);

    fn write_timestamp(&mut self, query: Arc<dyn GpuQuery>);

    /// Signals an event query once all prior commands have executed.
    fn signal_event(&mut self, query: Arc<dyn GpuQuery>);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Copies `src` into `dst`. The slices have equal length.
    fn copy_buffer(&mut self, dst: GpuBufferSlice, src: GpuBufferSlice);

    fn copy_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        src_image: Arc<dyn GpuImage>,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    );

    /// Copies tightly packed texel rows from `src` into an image region.
    fn copy_buffer_to_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        extent: Extent3d,
        src: GpuBufferSlice,
    );

    fn copy_image_to_buffer(
        &mut self,
        dst: GpuBufferSlice,
        src_image: Arc<dyn GpuImage>,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    );

    /// Resolves a multisampled subresource into a single-sampled one.
    fn resolve_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        src_image: Arc<dyn GpuImage>,
        region: ImageSubresourceLayers,
        format: crate::format::Format,
    );

    /// Clears the subresources of a render target or depth-stencil view.
    fn clear_render_target(
        &mut self,
        view: Arc<dyn GpuImageView>,
        clear_rect: Rect2d,
        aspects: crate::state::AspectFlags,
        value: ClearValue,
    );

    fn clear_color_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        value: ClearValue,
        range: ImageSubresourceRange,
    );

    fn clear_depth_stencil_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        value: ClearValue,
        range: ImageSubresourceRange,
    );

    /// Transitions subresources into their steady-state layout without
    /// writing them.
    fn init_image(&mut self, image: Arc<dyn GpuImage>, range: ImageSubresourceRange);

    /// Writes `data` into a buffer range on the timeline. `data` has the
    /// slice's length.
    fn update_buffer(&mut self, buffer: GpuBufferSlice, data: &[u8]);

    /// Writes tightly packed texel data into an image region on the
    /// timeline. `row_pitch` and `depth_pitch` describe `data`.
    #[allow(clippy::too_many_arguments)]
    fn update_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        layers: ImageSubresourceLayers,
        offset: Offset3d,
        extent: Extent3d,
        data: &[u8],
        row_pitch: u64,
        depth_pitch: u64,
    );

    /// Renames `buffer` onto `slice`. Commands executing after this see the
    /// new backing store; commands before it keep the old one.
    fn invalidate_buffer(&mut self, buffer: Arc<dyn GpuBuffer>, slice: GpuPhysicalSlice);

    /// Fills mip levels above the range's base level by downsampling.
    fn generate_mips(&mut self, image: Arc<dyn GpuImage>, range: ImageSubresourceRange);
}
