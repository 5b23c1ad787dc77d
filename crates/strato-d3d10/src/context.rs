//! The immediate rendering context.
//!
//! Pipeline methods keep a shadow copy of the application-visible state
//! and only queue backend commands when a call actually changes it.
//! Redundant rebinds, which legacy applications issue constantly, never
//! reach the worker thread.

use std::sync::Arc;

use strato_gpu::format::{Extent3d, Offset3d};
use strato_gpu::state::{
    AspectFlags, ClearValue, ImageLayout, IndexType, Rect2d, ShaderStage,
    Viewport as GpuViewport,
};
use strato_gpu::{
    GpuBufferSlice, GpuImageView, GpuSampler, ImageSubresourceLayers, RenderAttachment,
    RenderTargets, ShaderResource,
};
use tracing::{error, warn};

use crate::blend::BlendState;
use crate::buffer::Buffer;
use crate::depth_stencil::DepthStencilState;
use crate::device::{Device, MAX_PENDING_DRAWS};
use crate::error::{ApiError, ApiResult};
use crate::format::{dxgi, lookup_format, FormatMode};
use crate::input_layout::InputLayout;
use crate::query::{
    d3d10::{QUERY_EVENT, QUERY_TIMESTAMP},
    GetDataFlags, Query, QueryResult,
};
use crate::rasterizer::RasterizerState;
use crate::resource::{MapFlags, MapMode, Resource, ResourceBox, ResourceDimension};
use crate::sampler::SamplerState;
use crate::shader::{GeometryShader, PixelShader, VertexShader};
use crate::state::{
    d3d10, decode_input_assembly_state, ConstantBufferBinding, ContextState, IndexBufferBinding,
    Rect, SoTargetBinding, VertexBufferBinding, Viewport, MAX_CONSTANT_BUFFER_SLOTS,
    MAX_RENDER_TARGETS, MAX_SAMPLER_SLOTS, MAX_SHADER_RESOURCE_SLOTS, MAX_SO_TARGETS,
    MAX_VERTEX_BUFFER_SLOTS, MAX_VIEWPORT_SLOTS, VIEWPORT_BOUNDS_MAX,
};
use crate::view::{DepthStencilView, RenderTargetView, ShaderResourceView};

fn same_object<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Constant buffer bindings address 16-byte constants.
fn constant_buffer_slice(binding: &ConstantBufferBinding) -> Option<GpuBufferSlice> {
    binding.buffer.as_ref().map(|buffer| {
        GpuBufferSlice::new(
            Arc::clone(buffer.gpu_buffer()),
            u64::from(binding.constant_offset) * 16,
            u64::from(binding.constant_count) * 16,
        )
    })
}

fn shader_resource_binding(view: &Option<Arc<ShaderResourceView>>) -> Option<ShaderResource> {
    view.as_ref().map(|view| view.gpu_view().clone())
}

fn sampler_binding(sampler: &Option<Arc<SamplerState>>) -> Option<Arc<dyn GpuSampler>> {
    sampler.as_ref().map(|s| Arc::clone(s.gpu_sampler()))
}

/// Full extent of the view's most detailed mip level.
fn view_clear_rect(view: &Arc<dyn GpuImageView>) -> Rect2d {
    let extent = view.image().mip_level_extent(view.info().base_mip_level);
    Rect2d {
        x: 0,
        y: 0,
        width: extent.width,
        height: extent.height,
    }
}

/// Repacks texel rows laid out with caller pitches into the tight
/// layout update commands expect.
fn pack_image_data(
    dst: &mut [u8],
    src: &[u8],
    blocks: Extent3d,
    element_size: u32,
    src_row_pitch: u32,
    src_depth_pitch: u32,
) {
    let row_len = (blocks.width * element_size) as usize;
    let dst_depth_pitch = row_len * blocks.height as usize;

    for z in 0..blocks.depth as usize {
        for y in 0..blocks.height as usize {
            let src_offset = z * src_depth_pitch as usize + y * src_row_pitch as usize;
            let dst_offset = z * dst_depth_pitch + y * row_len;
            dst[dst_offset..dst_offset + row_len]
                .copy_from_slice(&src[src_offset..src_offset + row_len]);
        }
    }
}

/// The three programmable stages track identical slot sets, so their
/// setters, getters and restore paths are stamped out per stage.
macro_rules! shader_stage_methods {
    (
        $stage:expr, $field:ident, $shader_ty:ty,
        $set_shader:ident, $get_shader:ident,
        $set_constant_buffers:ident, $get_constant_buffers:ident,
        $set_shader_resources:ident, $get_shader_resources:ident,
        $set_samplers:ident, $get_samplers:ident,
        $restore_bindings:ident
    ) => {
        pub fn $set_shader(&mut self, shader: Option<&Arc<$shader_ty>>) {
            if same_object(self.state.$field.shader.as_ref(), shader) {
                return;
            }
            self.state.$field.shader = shader.cloned();

            let module = shader.map(|shader| Arc::clone(shader.gpu_shader()));
            self.emit(move |ctx| ctx.bind_shader($stage, module));
        }

        pub fn $get_shader(&self) -> Option<Arc<$shader_ty>> {
            self.state.$field.shader.clone()
        }

        pub fn $set_constant_buffers(&mut self, start_slot: u32, buffers: &[Option<Arc<Buffer>>]) {
            debug_assert!(start_slot as usize + buffers.len() <= MAX_CONSTANT_BUFFER_SLOTS);

            for (i, buffer) in buffers.iter().enumerate() {
                let slot = start_slot as usize + i;
                let constant_count = buffer.as_ref().map_or(0, |b| b.desc().byte_width / 16);

                let current = &self.state.$field.constant_buffers[slot];
                if same_object(current.buffer.as_ref(), buffer.as_ref())
                    && current.constant_offset == 0
                    && current.constant_count == constant_count
                {
                    continue;
                }

                let binding = ConstantBufferBinding {
                    buffer: buffer.clone(),
                    constant_offset: 0,
                    constant_count,
                };
                let slice = constant_buffer_slice(&binding);
                self.state.$field.constant_buffers[slot] = binding;
                self.emit(move |ctx| ctx.bind_uniform_buffer($stage, slot as u32, slice));
            }
        }

        pub fn $get_constant_buffers(&self, start_slot: u32, buffers: &mut [Option<Arc<Buffer>>]) {
            for (i, out) in buffers.iter_mut().enumerate() {
                let slot = start_slot as usize + i;
                *out = self
                    .state
                    .$field
                    .constant_buffers
                    .get(slot)
                    .and_then(|binding| binding.buffer.clone());
            }
        }

        pub fn $set_shader_resources(
            &mut self,
            start_slot: u32,
            views: &[Option<Arc<ShaderResourceView>>],
        ) {
            debug_assert!(start_slot as usize + views.len() <= MAX_SHADER_RESOURCE_SLOTS);

            for (i, view) in views.iter().enumerate() {
                let slot = start_slot as usize + i;
                if same_object(self.state.$field.shader_resources[slot].as_ref(), view.as_ref()) {
                    continue;
                }
                self.state.$field.shader_resources[slot] = view.clone();

                let resource = shader_resource_binding(view);
                self.emit(move |ctx| ctx.bind_shader_resource($stage, slot as u32, resource));
            }
        }

        pub fn $get_shader_resources(
            &self,
            start_slot: u32,
            views: &mut [Option<Arc<ShaderResourceView>>],
        ) {
            for (i, out) in views.iter_mut().enumerate() {
                let slot = start_slot as usize + i;
                *out = self.state.$field.shader_resources.get(slot).cloned().flatten();
            }
        }

        pub fn $set_samplers(&mut self, start_slot: u32, samplers: &[Option<Arc<SamplerState>>]) {
            debug_assert!(start_slot as usize + samplers.len() <= MAX_SAMPLER_SLOTS);

            for (i, sampler) in samplers.iter().enumerate() {
                let slot = start_slot as usize + i;
                if same_object(self.state.$field.samplers[slot].as_ref(), sampler.as_ref()) {
                    continue;
                }
                self.state.$field.samplers[slot] = sampler.clone();

                let gpu_sampler = sampler_binding(sampler);
                self.emit(move |ctx| ctx.bind_sampler($stage, slot as u32, gpu_sampler));
            }
        }

        pub fn $get_samplers(&self, start_slot: u32, samplers: &mut [Option<Arc<SamplerState>>]) {
            for (i, out) in samplers.iter_mut().enumerate() {
                let slot = start_slot as usize + i;
                *out = self.state.$field.samplers.get(slot).cloned().flatten();
            }
        }

        fn $restore_bindings(&mut self) {
            for slot in 0..MAX_CONSTANT_BUFFER_SLOTS {
                let slice = constant_buffer_slice(&self.state.$field.constant_buffers[slot]);
                self.emit(move |ctx| ctx.bind_uniform_buffer($stage, slot as u32, slice));
            }
            for slot in 0..MAX_SAMPLER_SLOTS {
                let sampler = sampler_binding(&self.state.$field.samplers[slot]);
                self.emit(move |ctx| ctx.bind_sampler($stage, slot as u32, sampler));
            }
            for slot in 0..MAX_SHADER_RESOURCE_SLOTS {
                let resource = shader_resource_binding(&self.state.$field.shader_resources[slot]);
                self.emit(move |ctx| ctx.bind_shader_resource($stage, slot as u32, resource));
            }
        }
    };
}

impl Device {
    shader_stage_methods!(
        ShaderStage::Vertex, vs, VertexShader,
        vs_set_shader, vs_get_shader,
        vs_set_constant_buffers, vs_get_constant_buffers,
        vs_set_shader_resources, vs_get_shader_resources,
        vs_set_samplers, vs_get_samplers,
        restore_vs_bindings
    );

    shader_stage_methods!(
        ShaderStage::Geometry, gs, GeometryShader,
        gs_set_shader, gs_get_shader,
        gs_set_constant_buffers, gs_get_constant_buffers,
        gs_set_shader_resources, gs_get_shader_resources,
        gs_set_samplers, gs_get_samplers,
        restore_gs_bindings
    );

    shader_stage_methods!(
        ShaderStage::Pixel, ps, PixelShader,
        ps_set_shader, ps_get_shader,
        ps_set_constant_buffers, ps_get_constant_buffers,
        ps_set_shader_resources, ps_get_shader_resources,
        ps_set_samplers, ps_get_samplers,
        restore_ps_bindings
    );

    // ---------------------------------------------------------------
    // Input assembler
    // ---------------------------------------------------------------

    pub fn ia_set_input_layout(&mut self, layout: Option<&Arc<InputLayout>>) {
        if same_object(self.state.ia.input_layout.as_ref(), layout) {
            return;
        }
        self.state.ia.input_layout = layout.cloned();
        self.apply_input_layout();
    }

    pub fn ia_get_input_layout(&self) -> Option<Arc<InputLayout>> {
        self.state.ia.input_layout.clone()
    }

    pub fn ia_set_primitive_topology(&mut self, topology: u32) {
        if self.state.ia.primitive_topology == topology {
            return;
        }
        self.state.ia.primitive_topology = topology;
        self.apply_primitive_topology();
    }

    pub fn ia_get_primitive_topology(&self) -> u32 {
        self.state.ia.primitive_topology
    }

    pub fn ia_set_vertex_buffers(&mut self, start_slot: u32, buffers: &[VertexBufferBinding]) {
        debug_assert!(start_slot as usize + buffers.len() <= MAX_VERTEX_BUFFER_SLOTS);

        for (i, binding) in buffers.iter().enumerate() {
            let slot = start_slot as usize + i;
            let current = &self.state.ia.vertex_buffers[slot];
            if same_object(current.buffer.as_ref(), binding.buffer.as_ref())
                && current.offset == binding.offset
                && current.stride == binding.stride
            {
                continue;
            }
            self.state.ia.vertex_buffers[slot] = binding.clone();
            self.bind_vertex_buffer(slot);
        }
    }

    pub fn ia_get_vertex_buffers(&self, start_slot: u32, buffers: &mut [VertexBufferBinding]) {
        for (i, out) in buffers.iter_mut().enumerate() {
            let slot = start_slot as usize + i;
            *out = self
                .state
                .ia
                .vertex_buffers
                .get(slot)
                .cloned()
                .unwrap_or_default();
        }
    }

    pub fn ia_set_index_buffer(&mut self, buffer: Option<&Arc<Buffer>>, format: u32, offset: u32) {
        let current = &self.state.ia.index_buffer;
        if same_object(current.buffer.as_ref(), buffer)
            && current.offset == offset
            && current.format == format
        {
            return;
        }
        self.state.ia.index_buffer = IndexBufferBinding {
            buffer: buffer.cloned(),
            offset,
            format,
        };
        self.bind_index_buffer();
    }

    pub fn ia_get_index_buffer(&self) -> IndexBufferBinding {
        self.state.ia.index_buffer.clone()
    }

    // ---------------------------------------------------------------
    // Output merger
    // ---------------------------------------------------------------

    pub fn om_set_render_targets(
        &mut self,
        views: &[Option<Arc<RenderTargetView>>],
        depth: Option<&Arc<DepthStencilView>>,
    ) {
        debug_assert!(views.len() <= MAX_RENDER_TARGETS);

        if self.draw_count >= MAX_PENDING_DRAWS {
            self.flush();
        }

        let mut changed = false;

        for slot in 0..MAX_RENDER_TARGETS {
            let view = views.get(slot).and_then(|view| view.as_ref());
            if !same_object(self.state.om.render_target_views[slot].as_ref(), view) {
                self.state.om.render_target_views[slot] = view.cloned();
                changed = true;
            }
        }

        if !same_object(self.state.om.depth_stencil_view.as_ref(), depth) {
            self.state.om.depth_stencil_view = depth.cloned();
            changed = true;
        }

        if changed {
            self.bind_framebuffer();
        }
    }

    pub fn om_get_render_targets(
        &self,
        views: &mut [Option<Arc<RenderTargetView>>],
        depth: &mut Option<Arc<DepthStencilView>>,
    ) {
        for (slot, out) in views.iter_mut().enumerate() {
            *out = self
                .state
                .om
                .render_target_views
                .get(slot)
                .cloned()
                .flatten();
        }
        *depth = self.state.om.depth_stencil_view.clone();
    }

    pub fn om_set_blend_state(
        &mut self,
        state: Option<&Arc<BlendState>>,
        blend_factor: Option<&[f32; 4]>,
        sample_mask: u32,
    ) {
        if !same_object(self.state.om.blend_state.as_ref(), state)
            || self.state.om.sample_mask != sample_mask
        {
            self.state.om.blend_state = state.cloned();
            self.state.om.sample_mask = sample_mask;
            self.apply_blend_state();
        }

        if let Some(&factor) = blend_factor {
            if self.state.om.blend_factor != factor {
                self.state.om.blend_factor = factor;
                self.apply_blend_factor();
            }
        }
    }

    pub fn om_get_blend_state(&self) -> (Option<Arc<BlendState>>, [f32; 4], u32) {
        (
            self.state.om.blend_state.clone(),
            self.state.om.blend_factor,
            self.state.om.sample_mask,
        )
    }

    pub fn om_set_depth_stencil_state(
        &mut self,
        state: Option<&Arc<DepthStencilState>>,
        stencil_ref: u32,
    ) {
        if !same_object(self.state.om.depth_stencil_state.as_ref(), state) {
            self.state.om.depth_stencil_state = state.cloned();
            self.apply_depth_stencil_state();
        }

        if self.state.om.stencil_ref != stencil_ref {
            self.state.om.stencil_ref = stencil_ref;
            self.apply_stencil_ref();
        }
    }

    pub fn om_get_depth_stencil_state(&self) -> (Option<Arc<DepthStencilState>>, u32) {
        (
            self.state.om.depth_stencil_state.clone(),
            self.state.om.stencil_ref,
        )
    }

    // ---------------------------------------------------------------
    // Rasterizer
    // ---------------------------------------------------------------

    pub fn rs_set_state(&mut self, state: Option<&Arc<RasterizerState>>) {
        if same_object(self.state.rs.state.as_ref(), state) {
            return;
        }
        self.state.rs.state = state.cloned();
        self.apply_rasterizer_state();

        // Scissor enablement lives in the rasterizer state, so the
        // viewport set depends on it.
        self.apply_viewport_state();
    }

    pub fn rs_get_state(&self) -> Option<Arc<RasterizerState>> {
        self.state.rs.state.clone()
    }

    pub fn rs_set_viewports(&mut self, viewports: &[Viewport]) {
        debug_assert!(viewports.len() <= MAX_VIEWPORT_SLOTS);

        let count = viewports.len().min(MAX_VIEWPORT_SLOTS);
        let mut changed = self.state.rs.num_viewports as usize != count;

        for (i, viewport) in viewports.iter().take(count).enumerate() {
            if self.state.rs.viewports[i] != *viewport {
                self.state.rs.viewports[i] = *viewport;
                changed = true;
            }
        }
        self.state.rs.num_viewports = count as u32;

        if changed {
            self.apply_viewport_state();
        }
    }

    /// Fills `viewports` with the bound viewports, zeroing entries past
    /// the bound count, and returns that count.
    pub fn rs_get_viewports(&self, viewports: &mut [Viewport]) -> u32 {
        for (i, out) in viewports.iter_mut().enumerate() {
            *out = if i < self.state.rs.num_viewports as usize {
                self.state.rs.viewports[i]
            } else {
                Viewport::default()
            };
        }
        self.state.rs.num_viewports
    }

    pub fn rs_set_scissor_rects(&mut self, rects: &[Rect]) {
        debug_assert!(rects.len() <= MAX_VIEWPORT_SLOTS);

        let count = rects.len().min(MAX_VIEWPORT_SLOTS);
        let mut changed = self.state.rs.num_scissors as usize != count;

        for (i, rect) in rects.iter().take(count).enumerate() {
            if self.state.rs.scissors[i] != *rect {
                self.state.rs.scissors[i] = *rect;
                changed = true;
            }
        }
        self.state.rs.num_scissors = count as u32;

        // The scissor set only reaches the backend while the bound
        // rasterizer state enables the scissor test.
        let scissor_enabled = self
            .state
            .rs
            .state
            .as_ref()
            .is_some_and(|state| state.scissor_enabled());

        if changed && scissor_enabled {
            self.apply_viewport_state();
        }
    }

    pub fn rs_get_scissor_rects(&self, rects: &mut [Rect]) -> u32 {
        for (i, out) in rects.iter_mut().enumerate() {
            *out = if i < self.state.rs.num_scissors as usize {
                self.state.rs.scissors[i]
            } else {
                Rect::default()
            };
        }
        self.state.rs.num_scissors
    }

    // ---------------------------------------------------------------
    // Stream output
    // ---------------------------------------------------------------

    pub fn so_set_targets(&mut self, targets: &[SoTargetBinding]) {
        debug_assert!(targets.len() <= MAX_SO_TARGETS);

        // Slots past the supplied set are unbound.
        for slot in 0..MAX_SO_TARGETS {
            let binding = targets.get(slot).cloned().unwrap_or_default();
            let current = &self.state.so.targets[slot];
            if same_object(current.buffer.as_ref(), binding.buffer.as_ref())
                && current.offset == binding.offset
            {
                continue;
            }
            self.state.so.targets[slot] = binding;
            self.bind_stream_output_buffer(slot);
        }
    }

    pub fn so_get_targets(&self, targets: &mut [SoTargetBinding]) {
        for (slot, out) in targets.iter_mut().enumerate() {
            *out = self
                .state
                .so
                .targets
                .get(slot)
                .cloned()
                .unwrap_or_default();
        }
    }

    // ---------------------------------------------------------------
    // Predication
    // ---------------------------------------------------------------

    /// Predicates are tracked so applications can read them back, but
    /// draws always render.
    pub fn set_predication(&mut self, predicate: Option<&Arc<Query>>, value: bool) {
        self.state.pr.predicate = predicate.cloned();
        self.state.pr.value = value;

        if predicate.is_some() && !self.predication_warned {
            self.predication_warned = true;
            warn!("predication is not forwarded; draws render unconditionally");
        }
    }

    pub fn get_predication(&self) -> (Option<Arc<Query>>, bool) {
        (self.state.pr.predicate.clone(), self.state.pr.value)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn begin_query(&mut self, query: &Arc<Query>) {
        if !query.is_scoped() {
            return;
        }
        if let Some(gpu) = query.gpu_query() {
            let gpu = Arc::clone(gpu);
            self.emit(move |ctx| ctx.begin_query(gpu));
        }
    }

    pub fn end_query(&mut self, query: &Arc<Query>) {
        let Some(gpu) = query.gpu_query() else {
            return;
        };
        let gpu = Arc::clone(gpu);

        if query.is_scoped() {
            self.emit(move |ctx| ctx.end_query(gpu));
        } else if query.kind() == QUERY_EVENT {
            self.emit(move |ctx| ctx.signal_event(gpu));
        } else if query.kind() == QUERY_TIMESTAMP {
            self.emit(move |ctx| ctx.write_timestamp(gpu));
        }
    }

    /// Polls a query. Without [`GetDataFlags::DO_NOT_FLUSH`] the pending
    /// command stream is submitted first so the result can make progress.
    pub fn get_query_data(
        &mut self,
        query: &Arc<Query>,
        flags: GetDataFlags,
    ) -> ApiResult<QueryResult> {
        if !flags.contains(GetDataFlags::DO_NOT_FLUSH) {
            self.flush();
        }

        query.data().ok_or(ApiError::WouldBlock)
    }

    // ---------------------------------------------------------------
    // Draws
    // ---------------------------------------------------------------

    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) {
        self.emit(move |ctx| ctx.draw(vertex_count, 1, start_vertex, 0));
        self.draw_count += 1;
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.emit(move |ctx| ctx.draw_indexed(index_count, 1, start_index, base_vertex, 0));
        self.draw_count += 1;
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.emit(move |ctx| {
            ctx.draw(
                vertex_count_per_instance,
                instance_count,
                start_vertex,
                start_instance,
            );
        });
        self.draw_count += 1;
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.emit(move |ctx| {
            ctx.draw_indexed(
                index_count_per_instance,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            );
        });
        self.draw_count += 1;
    }

    /// Drawing from stream output counters has no translation.
    pub fn draw_auto(&mut self) {
        static WARNED: std::sync::Once = std::sync::Once::new();
        WARNED.call_once(|| error!("draw_auto is not supported"));
    }

    // ---------------------------------------------------------------
    // Copies and updates
    // ---------------------------------------------------------------

    pub fn copy_resource(&mut self, dst: &Resource, src: &Resource) {
        match (dst, src) {
            (Resource::Buffer(dst), Resource::Buffer(src)) => {
                if dst.desc().byte_width != src.desc().byte_width {
                    error!("copied buffers differ in size");
                    return;
                }
                let dst_slice = dst.slice();
                let src_slice = src.slice();
                self.emit(move |ctx| ctx.copy_buffer(dst_slice, src_slice));
            }
            (Resource::Texture(dst), Resource::Texture(src)) => {
                if dst.dimension() != src.dimension() {
                    error!("copied resources differ in dimension");
                    return;
                }

                let dst_aspects = dst.format_info().aspects;
                let src_aspects = src.format_info().aspects;

                for level in 0..src.desc().mip_levels {
                    let extent = src.mip_extent(level);
                    let dst_layers = ImageSubresourceLayers {
                        aspects: dst_aspects,
                        mip_level: level,
                        base_array_layer: 0,
                        layer_count: dst.desc().array_size,
                    };
                    let src_layers = ImageSubresourceLayers {
                        aspects: src_aspects,
                        mip_level: level,
                        base_array_layer: 0,
                        layer_count: src.desc().array_size,
                    };

                    let dst_image = Arc::clone(dst.image());
                    let src_image = Arc::clone(src.image());
                    self.emit(move |ctx| {
                        ctx.copy_image(
                            dst_image,
                            dst_layers,
                            Offset3d::default(),
                            src_image,
                            src_layers,
                            Offset3d::default(),
                            extent,
                        );
                    });
                }
            }
            _ => {
                error!("copied resources differ in dimension");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn copy_subresource_region(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        dst_x: u32,
        dst_y: u32,
        dst_z: u32,
        src: &Resource,
        src_subresource: u32,
        src_box: Option<&ResourceBox>,
    ) {
        match (dst, src) {
            (Resource::Buffer(dst), Resource::Buffer(src)) => {
                let mut offset = 0u64;
                let mut length = u64::from(src.desc().byte_width);

                if let Some(region) = src_box {
                    if region.left > region.right {
                        return;
                    }
                    offset = u64::from(region.left);
                    length = u64::from(region.right - region.left);
                }

                let dst_slice = dst.slice().subslice(u64::from(dst_x), length);
                let src_slice = src.slice().subslice(offset, length);
                self.emit(move |ctx| ctx.copy_buffer(dst_slice, src_slice));
            }
            (Resource::Texture(dst), Resource::Texture(src)) => {
                // 2D and 3D textures may copy into each other one slice
                // at a time; all other dimension mixes are invalid.
                let slice_copy = dst.dimension() != src.dimension();
                let compatible = !slice_copy
                    || (dst.dimension() == ResourceDimension::Texture2d
                        && src.dimension() == ResourceDimension::Texture3d)
                    || (dst.dimension() == ResourceDimension::Texture3d
                        && src.dimension() == ResourceDimension::Texture2d);
                if !compatible {
                    error!("copied resources differ in dimension");
                    return;
                }

                let dst_mip = dst_subresource % dst.desc().mip_levels;
                let dst_layer = dst_subresource / dst.desc().mip_levels;
                let src_mip = src_subresource % src.desc().mip_levels;
                let src_layer = src_subresource / src.desc().mip_levels;

                let dst_offset = Offset3d {
                    x: dst_x as i32,
                    y: dst_y as i32,
                    z: dst_z as i32,
                };
                let mut src_offset = Offset3d::default();
                let mut extent = src.mip_extent(src_mip);

                if let Some(region) = src_box {
                    if region.left >= region.right
                        || region.top >= region.bottom
                        || region.front >= region.back
                    {
                        return;
                    }
                    src_offset = Offset3d {
                        x: region.left as i32,
                        y: region.top as i32,
                        z: region.front as i32,
                    };
                    extent = Extent3d {
                        width: region.right - region.left,
                        height: region.bottom - region.top,
                        depth: region.back - region.front,
                    };
                }

                if slice_copy {
                    extent.depth = 1;
                }

                let dst_layers = ImageSubresourceLayers {
                    aspects: dst.format_info().aspects,
                    mip_level: dst_mip,
                    base_array_layer: dst_layer,
                    layer_count: 1,
                };
                let src_layers = ImageSubresourceLayers {
                    aspects: src.format_info().aspects,
                    mip_level: src_mip,
                    base_array_layer: src_layer,
                    layer_count: 1,
                };

                let dst_image = Arc::clone(dst.image());
                let src_image = Arc::clone(src.image());
                self.emit(move |ctx| {
                    ctx.copy_image(
                        dst_image,
                        dst_layers,
                        dst_offset,
                        src_image,
                        src_layers,
                        src_offset,
                        extent,
                    );
                });
            }
            _ => {
                error!("copied resources differ in dimension");
            }
        }
    }

    pub fn update_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        dst_box: Option<&ResourceBox>,
        data: &[u8],
        row_pitch: u32,
        depth_pitch: u32,
    ) {
        match dst {
            Resource::Buffer(buffer) => {
                let byte_width = u64::from(buffer.desc().byte_width);
                let mut offset = 0u64;
                let mut size = byte_width;

                if let Some(region) = dst_box {
                    if region.right < region.left {
                        error!("destination box is out of bounds");
                        return;
                    }
                    offset = u64::from(region.left);
                    size = u64::from(region.right - region.left);
                }

                if offset + size > byte_width {
                    error!("destination box is out of bounds");
                    return;
                }
                if size == 0 {
                    return;
                }

                // A full-size update of a mappable buffer is a discard
                // map, which renames the backing store instead of
                // synchronizing with the timeline.
                if size == byte_width && buffer.is_host_visible() {
                    let buffer = Arc::clone(buffer);
                    if let Ok(mapped) =
                        self.map_buffer(&buffer, MapMode::WriteDiscard, MapFlags::empty())
                    {
                        mapped.data.write(0, &data[..size as usize]);
                        self.unmap_buffer(&buffer);
                    }
                } else {
                    let mut staging = self.update_allocator.alloc(size as usize);
                    staging
                        .as_mut_bytes()
                        .copy_from_slice(&data[..size as usize]);

                    let slice = buffer.slice().subslice(offset, size);
                    self.emit(move |ctx| ctx.update_buffer(slice, staging.as_bytes()));
                }
            }
            Resource::Texture(texture) => {
                let info = texture.format_info();
                let mip_level = dst_subresource % texture.desc().mip_levels;
                let array_layer = dst_subresource / texture.desc().mip_levels;

                let mut offset = Offset3d::default();
                let mut extent = texture.mip_extent(mip_level);

                if let Some(region) = dst_box {
                    if region.left >= region.right
                        || region.top >= region.bottom
                        || region.front >= region.back
                    {
                        return;
                    }
                    offset = Offset3d {
                        x: region.left as i32,
                        y: region.top as i32,
                        z: region.front as i32,
                    };
                    extent = Extent3d {
                        width: region.right - region.left,
                        height: region.bottom - region.top,
                        depth: region.back - region.front,
                    };
                }

                let layers = ImageSubresourceLayers {
                    aspects: AspectFlags::COLOR,
                    mip_level,
                    base_array_layer: array_layer,
                    layer_count: 1,
                };

                let blocks = info.block_count(extent);
                let bytes_per_row = u64::from(blocks.width) * u64::from(info.element_size);
                let bytes_per_layer = u64::from(blocks.height) * bytes_per_row;
                let bytes_total = u64::from(blocks.depth) * bytes_per_layer;

                let mut staging = self.update_allocator.alloc(bytes_total as usize);
                pack_image_data(
                    staging.as_mut_bytes(),
                    data,
                    blocks,
                    info.element_size,
                    row_pitch,
                    depth_pitch,
                );

                let image = Arc::clone(texture.image());
                self.emit(move |ctx| {
                    ctx.update_image(
                        image,
                        layers,
                        offset,
                        extent,
                        staging.as_bytes(),
                        bytes_per_row,
                        bytes_per_layer,
                    );
                });
            }
        }
    }

    pub fn resolve_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        src: &Resource,
        src_subresource: u32,
        format: u32,
    ) {
        let (Some(dst), Some(src)) = (dst.texture(), src.texture()) else {
            error!("resolve requires two-dimensional textures");
            return;
        };
        if dst.dimension() != ResourceDimension::Texture2d
            || src.dimension() != ResourceDimension::Texture2d
        {
            error!("resolve requires two-dimensional textures");
            return;
        }
        if dst.desc().sample_count != 1 {
            error!("resolve destination must not be multisampled");
            return;
        }

        let dst_mip = dst_subresource % dst.desc().mip_levels;
        let dst_layer = dst_subresource / dst.desc().mip_levels;
        let src_mip = src_subresource % src.desc().mip_levels;
        let src_layer = src_subresource / src.desc().mip_levels;

        let dst_layers = ImageSubresourceLayers {
            aspects: dst.format_info().aspects,
            mip_level: dst_mip,
            base_array_layer: dst_layer,
            layer_count: 1,
        };
        let src_layers = ImageSubresourceLayers {
            aspects: src.format_info().aspects,
            mip_level: src_mip,
            base_array_layer: src_layer,
            layer_count: 1,
        };

        let dst_image = Arc::clone(dst.image());
        let src_image = Arc::clone(src.image());

        if src.desc().sample_count == 1 {
            // Resolving a single-sampled source is a plain copy.
            let extent = dst.mip_extent(dst_mip);
            self.emit(move |ctx| {
                ctx.copy_image(
                    dst_image,
                    dst_layers,
                    Offset3d::default(),
                    src_image,
                    src_layers,
                    Offset3d::default(),
                    extent,
                );
            });
        } else {
            let Some(resolve_format) = lookup_format(format, FormatMode::Any) else {
                error!(format, "unknown resolve format");
                return;
            };
            self.emit(move |ctx| {
                ctx.resolve_image(dst_image, src_image, dst_layers, resolve_format);
            });
        }
    }

    pub fn generate_mips(&mut self, view: &Arc<ShaderResourceView>) {
        match view.gpu_view() {
            ShaderResource::Buffer(_) => {
                error!("mip generation called on a buffer");
            }
            ShaderResource::Image(image_view) => {
                let image = Arc::clone(image_view.image());
                let range = image_view.subresources();
                self.emit(move |ctx| ctx.generate_mips(image, range));
            }
        }
    }

    // ---------------------------------------------------------------
    // Clears
    // ---------------------------------------------------------------

    pub fn clear_render_target_view(
        &mut self,
        view: Option<&Arc<RenderTargetView>>,
        color: [f32; 4],
    ) {
        let Some(view) = view else {
            return;
        };

        // Views without a backend object (buffer render targets) clear
        // nothing.
        let Some(gpu_view) = view.gpu_view() else {
            return;
        };

        let value = ClearValue {
            color,
            ..ClearValue::default()
        };
        let rect = view_clear_rect(gpu_view);
        let gpu_view = Arc::clone(gpu_view);
        self.emit(move |ctx| ctx.clear_render_target(gpu_view, rect, AspectFlags::COLOR, value));
    }

    pub fn clear_depth_stencil_view(
        &mut self,
        view: Option<&Arc<DepthStencilView>>,
        flags: u32,
        depth: f32,
        stencil: u8,
    ) {
        let Some(view) = view else {
            return;
        };

        let mut aspects = AspectFlags::empty();
        if flags & d3d10::CLEAR_DEPTH != 0 {
            aspects |= AspectFlags::DEPTH;
        }
        if flags & d3d10::CLEAR_STENCIL != 0 {
            aspects |= AspectFlags::STENCIL;
        }
        aspects &= view.gpu_view().info().aspects;

        let value = ClearValue {
            depth,
            stencil: u32::from(stencil),
            ..ClearValue::default()
        };
        let rect = view_clear_rect(view.gpu_view());
        let gpu_view = Arc::clone(view.gpu_view());
        self.emit(move |ctx| ctx.clear_render_target(gpu_view, rect, aspects, value));
    }

    // ---------------------------------------------------------------
    // State reset
    // ---------------------------------------------------------------

    /// Returns the context to its default state and pushes that state
    /// to the backend.
    pub fn clear_state(&mut self) {
        self.state = ContextState::default();

        // The documented post-clear blend factor is zero, unlike the
        // initial device state.
        self.state.om.blend_factor = [0.0; 4];

        self.restore_state();
    }

    fn restore_state(&mut self) {
        self.bind_framebuffer();

        let vs = self
            .state
            .vs
            .shader
            .as_ref()
            .map(|shader| Arc::clone(shader.gpu_shader()));
        self.emit(move |ctx| ctx.bind_shader(ShaderStage::Vertex, vs));

        let gs = self
            .state
            .gs
            .shader
            .as_ref()
            .map(|shader| Arc::clone(shader.gpu_shader()));
        self.emit(move |ctx| ctx.bind_shader(ShaderStage::Geometry, gs));

        let ps = self
            .state
            .ps
            .shader
            .as_ref()
            .map(|shader| Arc::clone(shader.gpu_shader()));
        self.emit(move |ctx| ctx.bind_shader(ShaderStage::Pixel, ps));

        self.apply_input_layout();
        self.apply_primitive_topology();
        self.apply_blend_state();
        self.apply_blend_factor();
        self.apply_depth_stencil_state();
        self.apply_stencil_ref();
        self.apply_rasterizer_state();
        self.apply_viewport_state();

        self.bind_index_buffer();
        for slot in 0..MAX_VERTEX_BUFFER_SLOTS {
            self.bind_vertex_buffer(slot);
        }
        for slot in 0..MAX_SO_TARGETS {
            self.bind_stream_output_buffer(slot);
        }

        self.restore_vs_bindings();
        self.restore_gs_bindings();
        self.restore_ps_bindings();
    }

    // ---------------------------------------------------------------
    // Text filter
    // ---------------------------------------------------------------

    pub fn set_text_filter_size(&mut self, _width: u32, _height: u32) {
        warn!("text filters are not supported");
    }

    pub fn get_text_filter_size(&self) -> (u32, u32) {
        warn!("text filters are not supported");
        (0, 0)
    }

    // ---------------------------------------------------------------
    // Backend binding
    // ---------------------------------------------------------------

    fn bind_framebuffer(&mut self) {
        let mut colors = Vec::with_capacity(MAX_RENDER_TARGETS);
        for view in &self.state.om.render_target_views {
            colors.push(
                view.as_ref()
                    .and_then(|view| view.gpu_view())
                    .map(|gpu_view| RenderAttachment {
                        view: Arc::clone(gpu_view),
                        layout: ImageLayout::ColorAttachmentOptimal,
                    }),
            );
        }
        let depth = self
            .state
            .om
            .depth_stencil_view
            .as_ref()
            .map(|view| RenderAttachment {
                view: Arc::clone(view.gpu_view()),
                layout: ImageLayout::DepthStencilAttachmentOptimal,
            });

        let targets = RenderTargets { colors, depth };
        self.emit(move |ctx| ctx.bind_render_targets(targets));
    }

    fn bind_vertex_buffer(&mut self, slot: usize) {
        let binding = &self.state.ia.vertex_buffers[slot];
        let stride = if binding.buffer.is_some() {
            binding.stride
        } else {
            0
        };
        let slice = binding.buffer.as_ref().map(|buffer| {
            let offset = u64::from(binding.offset);
            let length = u64::from(buffer.desc().byte_width).saturating_sub(offset);
            GpuBufferSlice::new(Arc::clone(buffer.gpu_buffer()), offset, length)
        });
        self.emit(move |ctx| ctx.bind_vertex_buffer(slot as u32, slice, stride));
    }

    fn bind_index_buffer(&mut self) {
        let binding = &self.state.ia.index_buffer;

        let index_type = match binding.format {
            dxgi::FORMAT_R16_UINT => IndexType::Uint16,
            dxgi::FORMAT_R32_UINT => IndexType::Uint32,
            other => {
                if binding.buffer.is_some() {
                    error!(format = other, "invalid index buffer format");
                }
                IndexType::Uint32
            }
        };

        let slice = binding.buffer.as_ref().map(|buffer| {
            let offset = u64::from(binding.offset);
            let length = u64::from(buffer.desc().byte_width).saturating_sub(offset);
            GpuBufferSlice::new(Arc::clone(buffer.gpu_buffer()), offset, length)
        });
        self.emit(move |ctx| ctx.bind_index_buffer(slice, index_type));
    }

    fn bind_stream_output_buffer(&mut self, slot: usize) {
        let binding = &self.state.so.targets[slot];
        let slice = binding.buffer.as_ref().map(|buffer| {
            let offset = u64::from(binding.offset);
            let length = u64::from(buffer.desc().byte_width).saturating_sub(offset);
            GpuBufferSlice::new(Arc::clone(buffer.gpu_buffer()), offset, length)
        });
        self.emit(move |ctx| ctx.bind_stream_output_buffer(slot as u32, slice));
    }

    fn apply_input_layout(&mut self) {
        let (attributes, bindings) = match &self.state.ia.input_layout {
            Some(layout) => (layout.attributes().to_vec(), layout.bindings().to_vec()),
            None => (Vec::new(), Vec::new()),
        };
        self.emit(move |ctx| ctx.set_input_layout(attributes, bindings));
    }

    fn apply_primitive_topology(&mut self) {
        if self.state.ia.primitive_topology == d3d10::PRIMITIVE_TOPOLOGY_UNDEFINED {
            return;
        }
        let ia_state = decode_input_assembly_state(self.state.ia.primitive_topology);
        self.emit(move |ctx| ctx.set_input_assembly_state(ia_state));
    }

    fn apply_blend_state(&mut self) {
        let state = self
            .state
            .om
            .blend_state
            .as_ref()
            .unwrap_or(&self.default_blend_state);
        let modes = *state.blend_modes();
        let multisample = state.multisample_state(self.state.om.sample_mask);

        self.emit(move |ctx| {
            for (attachment, mode) in modes.iter().enumerate() {
                ctx.set_blend_mode(attachment as u32, *mode);
            }
            ctx.set_multisample_state(multisample);
        });
    }

    fn apply_blend_factor(&mut self) {
        let factor = self.state.om.blend_factor;
        self.emit(move |ctx| ctx.set_blend_constants(factor));
    }

    fn apply_depth_stencil_state(&mut self) {
        let state = self
            .state
            .om
            .depth_stencil_state
            .as_ref()
            .unwrap_or(&self.default_depth_stencil_state);
        let gpu_state = *state.gpu_state();
        self.emit(move |ctx| ctx.set_depth_stencil_state(gpu_state));
    }

    fn apply_stencil_ref(&mut self) {
        let reference = self.state.om.stencil_ref;
        self.emit(move |ctx| ctx.set_stencil_reference(reference));
    }

    fn apply_rasterizer_state(&mut self) {
        let state = self
            .state
            .rs
            .state
            .as_ref()
            .unwrap_or(&self.default_rasterizer_state);
        let gpu_state = *state.gpu_state();
        self.emit(move |ctx| ctx.set_rasterizer_state(gpu_state));
    }

    fn apply_viewport_state(&mut self) {
        let count = self.state.rs.num_viewports as usize;
        if count == 0 {
            return;
        }

        let scissor_enabled = self
            .state
            .rs
            .state
            .as_ref()
            .is_some_and(|state| state.scissor_enabled());

        let mut viewports = Vec::with_capacity(count);
        let mut scissors = Vec::with_capacity(count);

        for i in 0..count {
            let vp = self.state.rs.viewports[i];

            // The backend's clip space has its y axis pointing up, so
            // viewports flip: the origin moves to the bottom edge and
            // the height turns negative.
            viewports.push(GpuViewport {
                x: vp.top_left_x as f32,
                y: (vp.top_left_y + vp.height as i32) as f32,
                width: vp.width as f32,
                height: -(vp.height as f32),
                min_depth: vp.min_depth,
                max_depth: vp.max_depth,
            });

            let scissor = if scissor_enabled && i < self.state.rs.num_scissors as usize {
                let rect = self.state.rs.scissors[i];
                Rect2d {
                    x: rect.left,
                    y: rect.top,
                    width: (rect.right - rect.left).max(0) as u32,
                    height: (rect.bottom - rect.top).max(0) as u32,
                }
            } else {
                Rect2d {
                    x: 0,
                    y: 0,
                    width: VIEWPORT_BOUNDS_MAX,
                    height: VIEWPORT_BOUNDS_MAX,
                }
            };
            scissors.push(scissor);
        }

        self.emit(move |ctx| ctx.set_viewports(viewports, scissors));
    }
}

#[cfg(test)]
mod tests {
    use strato_gpu::trace::{TraceDevice, TraceOp};
    use strato_gpu::GpuDevice;

    use super::*;
    use crate::buffer::BufferDesc;
    use crate::device::create_device;
    use crate::format::dxgi;
    use crate::query::QueryDesc;
    use crate::resource::{BindFlags, CpuAccessFlags, MiscFlags, Usage};
    use crate::state::d3d10::{
        PRIMITIVE_TOPOLOGY_TRIANGLELIST, PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    };

    fn device() -> (Arc<TraceDevice>, Device) {
        let gpu = TraceDevice::new();
        let device = create_device(Arc::clone(&gpu) as Arc<dyn GpuDevice>, "test").unwrap();
        (gpu, device)
    }

    fn constant_buffer(device: &Device, byte_width: u32) -> Arc<Buffer> {
        device
            .create_buffer(
                &BufferDesc {
                    byte_width,
                    usage: Usage::Default,
                    bind_flags: BindFlags::CONSTANT_BUFFER,
                    cpu_access_flags: CpuAccessFlags::empty(),
                    misc_flags: MiscFlags::empty(),
                },
                None,
            )
            .unwrap()
    }

    fn drain(gpu: &TraceDevice, device: &mut Device) -> Vec<TraceOp> {
        device.flush();
        device.synchronize();
        gpu.take_submissions().into_iter().flatten().collect()
    }

    #[test]
    fn redundant_binds_are_skipped() {
        let (gpu, mut device) = device();
        let buffer = constant_buffer(&device, 64);

        let binding = [Some(Arc::clone(&buffer))];
        device.vs_set_constant_buffers(0, &binding);
        device.vs_set_constant_buffers(0, &binding);
        device.ia_set_primitive_topology(PRIMITIVE_TOPOLOGY_TRIANGLELIST);
        device.ia_set_primitive_topology(PRIMITIVE_TOPOLOGY_TRIANGLELIST);

        let ops = drain(&gpu, &mut device);

        let cb_binds = ops
            .iter()
            .filter(|op| matches!(op, TraceOp::BindUniformBuffer { slot: 0, .. }))
            .count();
        assert_eq!(cb_binds, 1);

        let ia_sets = ops
            .iter()
            .filter(|op| matches!(op, TraceOp::SetInputAssemblyState(_)))
            .count();
        assert_eq!(ia_sets, 1);
    }

    #[test]
    fn constant_buffer_slices_cover_whole_buffer() {
        let (gpu, mut device) = device();
        let buffer = constant_buffer(&device, 256);

        device.vs_set_constant_buffers(3, &[Some(buffer)]);
        let ops = drain(&gpu, &mut device);

        let bind = ops
            .iter()
            .find_map(|op| match op {
                TraceOp::BindUniformBuffer {
                    stage: ShaderStage::Vertex,
                    slot: 3,
                    buffer,
                } => Some(*buffer),
                _ => None,
            })
            .unwrap();
        let (_, offset, length) = bind.unwrap();
        assert_eq!(offset, 0);
        assert_eq!(length, 256);
    }

    #[test]
    fn strip_topology_enables_primitive_restart() {
        let (gpu, mut device) = device();

        device.ia_set_primitive_topology(PRIMITIVE_TOPOLOGY_TRIANGLESTRIP);
        let ops = drain(&gpu, &mut device);

        let state = ops
            .iter()
            .find_map(|op| match op {
                TraceOp::SetInputAssemblyState(state) => Some(*state),
                _ => None,
            })
            .unwrap();
        assert!(state.enable_primitive_restart);
    }

    #[test]
    fn viewports_are_flipped_for_the_backend() {
        let (gpu, mut device) = device();

        device.rs_set_viewports(&[Viewport {
            top_left_x: 10,
            top_left_y: 20,
            width: 100,
            height: 50,
            min_depth: 0.0,
            max_depth: 1.0,
        }]);

        let ops = drain(&gpu, &mut device);
        let viewports = ops
            .iter()
            .find_map(|op| match op {
                TraceOp::SetViewports { viewports, .. } => Some(viewports.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(viewports.len(), 1);
        assert_eq!(viewports[0].x, 10.0);
        assert_eq!(viewports[0].y, 70.0);
        assert_eq!(viewports[0].width, 100.0);
        assert_eq!(viewports[0].height, -50.0);
    }

    #[test]
    fn scissors_default_to_the_viewport_bounds() {
        let (gpu, mut device) = device();

        device.rs_set_viewports(&[Viewport {
            width: 64,
            height: 64,
            max_depth: 1.0,
            ..Viewport::default()
        }]);
        device.rs_set_scissor_rects(&[Rect {
            left: 4,
            top: 4,
            right: 8,
            bottom: 8,
        }]);

        // No rasterizer state bound, so the scissor test is off and the
        // rect must not reach the backend.
        let ops = drain(&gpu, &mut device);
        let scissors = ops
            .iter()
            .find_map(|op| match op {
                TraceOp::SetViewports { scissors, .. } => Some(scissors.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(scissors[0].width, VIEWPORT_BOUNDS_MAX);
        assert_eq!(scissors[0].height, VIEWPORT_BOUNDS_MAX);
    }

    #[test]
    fn clear_state_resets_the_blend_factor_to_zero() {
        let (gpu, mut device) = device();

        device.om_set_blend_state(None, Some(&[0.25; 4]), 0xFFFF_FFFF);
        device.clear_state();

        let ops = drain(&gpu, &mut device);
        let last_factor = ops
            .iter()
            .rev()
            .find_map(|op| match op {
                TraceOp::SetBlendConstants(factor) => Some(*factor),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_factor, [0.0; 4]);

        let (_, factor, _) = device.om_get_blend_state();
        assert_eq!(factor, [0.0; 4]);
    }

    #[test]
    fn update_subresource_writes_partial_buffer_ranges() {
        let (gpu, mut device) = device();
        let buffer = constant_buffer(&device, 64);
        let resource = Resource::from(Arc::clone(&buffer));

        let data = [7u8; 16];
        let region = ResourceBox {
            left: 16,
            right: 32,
            ..ResourceBox::default()
        };
        device.update_subresource(&resource, 0, Some(&region), &data, 0, 0);

        let ops = drain(&gpu, &mut device);
        assert!(ops
            .iter()
            .any(|op| matches!(op, TraceOp::UpdateBuffer { .. })));

        let mut contents = vec![0u8; 16];
        buffer.slice().physical().read(16, &mut contents);
        assert_eq!(contents, data);
    }

    #[test]
    fn degenerate_boxes_are_dropped() {
        let (gpu, mut device) = device();
        let buffer = constant_buffer(&device, 64);
        let resource = Resource::from(buffer);

        let region = ResourceBox {
            left: 32,
            right: 32,
            ..ResourceBox::default()
        };
        device.update_subresource(&resource, 0, Some(&region), &[], 0, 0);

        let ops = drain(&gpu, &mut device);
        assert!(!ops
            .iter()
            .any(|op| matches!(op, TraceOp::UpdateBuffer { .. })));
    }

    #[test]
    fn event_queries_signal_on_end() {
        let (gpu, mut device) = device();
        let query = device
            .create_query(&QueryDesc {
                query: QUERY_EVENT,
                misc_flags: 0,
            })
            .unwrap();

        device.begin_query(&query);
        device.end_query(&query);

        let ops = drain(&gpu, &mut device);
        assert!(!ops
            .iter()
            .any(|op| matches!(op, TraceOp::BeginQuery { .. })));
        assert!(ops
            .iter()
            .any(|op| matches!(op, TraceOp::SignalEvent { .. })));

        // The trace backend resolves events once the signal executed.
        assert_eq!(
            device.get_query_data(&query, GetDataFlags::empty()).ok(),
            Some(QueryResult::Event)
        );
    }

    #[test]
    fn stream_output_targets_rebind_per_slot() {
        let (gpu, mut device) = device();
        let buffer = device
            .create_buffer(
                &BufferDesc {
                    byte_width: 1024,
                    usage: Usage::Default,
                    bind_flags: BindFlags::STREAM_OUTPUT,
                    cpu_access_flags: CpuAccessFlags::empty(),
                    misc_flags: MiscFlags::empty(),
                },
                None,
            )
            .unwrap();

        device.so_set_targets(&[SoTargetBinding {
            buffer: Some(Arc::clone(&buffer)),
            offset: 16,
        }]);

        let ops = drain(&gpu, &mut device);
        let bind = ops
            .iter()
            .find_map(|op| match op {
                TraceOp::BindStreamOutputBuffer { slot: 0, buffer } => Some(*buffer),
                _ => None,
            })
            .unwrap();
        let (_, offset, length) = bind.unwrap();
        assert_eq!(offset, 16);
        assert_eq!(length, 1008);

        // Re-setting the same target set emits nothing new.
        device.so_set_targets(&[SoTargetBinding {
            buffer: Some(Arc::clone(&buffer)),
            offset: 16,
        }]);
        let ops = drain(&gpu, &mut device);
        assert!(!ops
            .iter()
            .any(|op| matches!(op, TraceOp::BindStreamOutputBuffer { .. })));

        let mut bound = [SoTargetBinding::default()];
        device.so_get_targets(&mut bound);
        assert_eq!(bound[0].offset, 16);
    }

    #[test]
    fn index_buffer_format_selects_the_index_type() {
        let (gpu, mut device) = device();
        let buffer = device
            .create_buffer(
                &BufferDesc {
                    byte_width: 128,
                    usage: Usage::Default,
                    bind_flags: BindFlags::INDEX_BUFFER,
                    cpu_access_flags: CpuAccessFlags::empty(),
                    misc_flags: MiscFlags::empty(),
                },
                None,
            )
            .unwrap();

        device.ia_set_index_buffer(Some(&buffer), dxgi::FORMAT_R16_UINT, 0);
        let ops = drain(&gpu, &mut device);
        assert!(ops.iter().any(|op| matches!(
            op,
            TraceOp::BindIndexBuffer {
                index_type: IndexType::Uint16,
                ..
            }
        )));
    }
}
