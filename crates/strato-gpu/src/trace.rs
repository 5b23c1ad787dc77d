//! In-memory recording backend.
//!
//! [`TraceDevice`] implements the full device interface without talking to
//! any real GPU. Contexts record every command as a [`TraceOp`]; submitted
//! command lists stay on the device, where tests inspect the op stream.
//!
//! Data-bearing commands (buffer updates, copies, renames) also apply their
//! transfer against host-side backing stores when they are recorded, so
//! upload and readback paths can be verified end to end. Draws, clears and
//! resolves are recorded but not materialized.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::context::{GpuCommandList, GpuContext, RenderTargets};
use crate::device::{GpuDevice, GpuError};
use crate::format::{format_info, mip_level_extent, Extent3d, Format, Offset3d};
use crate::resource::{
    BufferCreateInfo, BufferViewCreateInfo, GpuAllocation, GpuBuffer, GpuBufferSlice,
    GpuBufferView, GpuImage, GpuImageView, GpuPhysicalSlice, GpuQuery, GpuSampler, GpuShader,
    ImageCreateInfo, ImageSubresourceLayers, ImageSubresourceRange, ImageViewCreateInfo,
    PipelineStatistics, QueryData, QueryKind, ShaderResource, SubresourceLayout,
};
use crate::state::{
    AspectFlags, BlendMode, ClearValue, DepthStencilState, FormatFeatures, ImageTiling,
    ImageUsage, IndexType, InputAssemblyState, InputAttribute, InputBinding, MemoryFlags,
    MultisampleState, RasterizerState, Rect2d, SamplerCreateInfo, ShaderStage, Viewport,
};

/// A recorded command. Buffer ranges appear as `(buffer id, offset, length)`
/// triples; images, views, samplers and queries appear by id; shaders by
/// content hash.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceOp {
    BindShader {
        stage: ShaderStage,
        shader: Option<u64>,
    },
    BindUniformBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: Option<(u64, u64, u64)>,
    },
    BindShaderResource {
        stage: ShaderStage,
        slot: u32,
        resource: Option<u64>,
    },
    BindSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: Option<u64>,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: Option<(u64, u64, u64)>,
        stride: u32,
    },
    BindIndexBuffer {
        buffer: Option<(u64, u64, u64)>,
        index_type: IndexType,
    },
    BindRenderTargets {
        colors: Vec<Option<u64>>,
        depth: Option<u64>,
    },
    BindStreamOutputBuffer {
        slot: u32,
        buffer: Option<(u64, u64, u64)>,
    },
    SetInputLayout {
        attributes: Vec<InputAttribute>,
        bindings: Vec<InputBinding>,
    },
    SetInputAssemblyState(InputAssemblyState),
    SetBlendMode {
        attachment: u32,
        mode: BlendMode,
    },
    SetMultisampleState(MultisampleState),
    SetBlendConstants([f32; 4]),
    SetDepthStencilState(DepthStencilState),
    SetStencilReference(u32),
    SetRasterizerState(RasterizerState),
    SetViewports {
        viewports: Vec<Viewport>,
        scissors: Vec<Rect2d>,
    },
    BeginQuery {
        query: u64,
    },
    EndQuery {
        query: u64,
    },
    WriteTimestamp {
        query: u64,
    },
    SignalEvent {
        query: u64,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    CopyBuffer {
        dst: (u64, u64, u64),
        src: (u64, u64, u64),
    },
    CopyImage {
        dst_image: u64,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        src_image: u64,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    },
    CopyBufferToImage {
        dst_image: u64,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        extent: Extent3d,
        src: (u64, u64, u64),
    },
    CopyImageToBuffer {
        dst: (u64, u64, u64),
        src_image: u64,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    },
    ResolveImage {
        dst_image: u64,
        src_image: u64,
        region: ImageSubresourceLayers,
        format: Format,
    },
    ClearRenderTarget {
        view: u64,
        clear_rect: Rect2d,
        aspects: AspectFlags,
        value: ClearValue,
    },
    ClearColorImage {
        image: u64,
        value: ClearValue,
        range: ImageSubresourceRange,
    },
    ClearDepthStencilImage {
        image: u64,
        value: ClearValue,
        range: ImageSubresourceRange,
    },
    InitImage {
        image: u64,
        range: ImageSubresourceRange,
    },
    UpdateBuffer {
        buffer: (u64, u64, u64),
    },
    UpdateImage {
        image: u64,
        layers: ImageSubresourceLayers,
        offset: Offset3d,
        extent: Extent3d,
    },
    InvalidateBuffer {
        buffer: u64,
        allocation: u64,
    },
    GenerateMips {
        image: u64,
        range: ImageSubresourceRange,
    },
}

/// Payload type of command lists created by [`TraceDevice`].
#[derive(Default)]
pub struct TraceCommandList {
    pub ops: Vec<TraceOp>,
}

struct TraceShared {
    next_id: AtomicU64,
    submitted: Mutex<Vec<Vec<TraceOp>>>,
    buffers: Mutex<HashMap<u64, Weak<TraceBuffer>>>,
    images: Mutex<HashMap<u64, Weak<TraceImage>>>,
    queries: Mutex<HashMap<u64, Weak<TraceQuery>>>,
    in_use: Mutex<std::collections::HashSet<u64>>,
}

impl TraceShared {
    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_in_use(&self, id: u64) -> bool {
        self.in_use.lock().unwrap().contains(&id)
    }
}

struct TraceAllocation {
    id: u64,
    bytes: Mutex<Vec<u8>>,
}

impl TraceAllocation {
    fn new(id: u64, size: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            bytes: Mutex::new(vec![0; size as usize]),
        })
    }
}

impl GpuAllocation for TraceAllocation {
    fn id(&self) -> u64 {
        self.id
    }

    fn len(&self) -> u64 {
        self.bytes.lock().unwrap().len() as u64
    }

    fn write(&self, offset: u64, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap();
        let offset = offset as usize;
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read(&self, offset: u64, out: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap();
        let offset = offset as usize;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }
}

struct TraceBuffer {
    id: u64,
    info: BufferCreateInfo,
    memory_flags: MemoryFlags,
    shared: Arc<TraceShared>,
    current: Mutex<GpuPhysicalSlice>,
}

impl GpuBuffer for TraceBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn info(&self) -> &BufferCreateInfo {
        &self.info
    }

    fn memory_flags(&self) -> MemoryFlags {
        self.memory_flags
    }

    fn physical_slice(&self) -> GpuPhysicalSlice {
        self.current.lock().unwrap().clone()
    }

    fn alloc_physical_slice(&self) -> GpuPhysicalSlice {
        let allocation = TraceAllocation::new(self.shared.alloc_id(), self.info.size);
        GpuPhysicalSlice::whole(allocation)
    }

    fn is_in_use(&self) -> bool {
        self.shared.is_in_use(self.id)
    }
}

struct TraceImage {
    id: u64,
    info: ImageCreateInfo,
    memory_flags: MemoryFlags,
    shared: Arc<TraceShared>,
    backing: Arc<TraceAllocation>,
    layouts: Vec<SubresourceLayout>,
}

impl TraceImage {
    fn new(shared: &Arc<TraceShared>, info: &ImageCreateInfo, memory: MemoryFlags) -> Arc<Self> {
        let fmt = format_info(info.format);
        let mut layouts = Vec::with_capacity((info.array_layers * info.mip_levels) as usize);
        let mut offset = 0u64;
        for _layer in 0..info.array_layers {
            for mip in 0..info.mip_levels {
                let blocks = fmt.block_count(mip_level_extent(info.extent, mip));
                let row_pitch = u64::from(blocks.width) * u64::from(fmt.element_size);
                let depth_pitch = row_pitch * u64::from(blocks.height);
                let size = depth_pitch * u64::from(blocks.depth) * u64::from(info.sample_count);
                layouts.push(SubresourceLayout {
                    offset,
                    size,
                    row_pitch,
                    depth_pitch,
                });
                offset += size;
            }
        }

        Arc::new(Self {
            id: shared.alloc_id(),
            info: *info,
            memory_flags: memory,
            shared: Arc::clone(shared),
            backing: TraceAllocation::new(shared.alloc_id(), offset),
            layouts,
        })
    }

    fn layout(&self, mip_level: u32, array_layer: u32) -> SubresourceLayout {
        self.layouts[(array_layer * self.info.mip_levels + mip_level) as usize]
    }

    /// Writes one layer's region from `data`, whose rows are laid out with
    /// the given pitches.
    fn write_region(
        &self,
        mip_level: u32,
        array_layer: u32,
        offset: Offset3d,
        extent: Extent3d,
        data: &[u8],
        row_pitch: u64,
        depth_pitch: u64,
    ) {
        let fmt = format_info(self.info.format);
        let blocks = fmt.block_count(extent);
        let row_len = (u64::from(blocks.width) * u64::from(fmt.element_size)) as usize;
        let x0 = u64::from(offset.x as u32 / fmt.block_extent.0) * u64::from(fmt.element_size);
        let y0 = u64::from(offset.y as u32 / fmt.block_extent.1);
        let layout = self.layout(mip_level, array_layer);

        for z in 0..u64::from(extent.depth) {
            for row in 0..u64::from(blocks.height) {
                let src = (z * depth_pitch + row * row_pitch) as usize;
                let dst = layout.offset
                    + (u64::from(offset.z as u32) + z) * layout.depth_pitch
                    + (y0 + row) * layout.row_pitch
                    + x0;
                self.backing.write(dst, &data[src..src + row_len]);
            }
        }
    }

    /// Reads one layer's region into `out` with the given pitches.
    fn read_region(
        &self,
        mip_level: u32,
        array_layer: u32,
        offset: Offset3d,
        extent: Extent3d,
        out: &mut [u8],
        row_pitch: u64,
        depth_pitch: u64,
    ) {
        let fmt = format_info(self.info.format);
        let blocks = fmt.block_count(extent);
        let row_len = (u64::from(blocks.width) * u64::from(fmt.element_size)) as usize;
        let x0 = u64::from(offset.x as u32 / fmt.block_extent.0) * u64::from(fmt.element_size);
        let y0 = u64::from(offset.y as u32 / fmt.block_extent.1);
        let layout = self.layout(mip_level, array_layer);

        for z in 0..u64::from(extent.depth) {
            for row in 0..u64::from(blocks.height) {
                let src = layout.offset
                    + (u64::from(offset.z as u32) + z) * layout.depth_pitch
                    + (y0 + row) * layout.row_pitch
                    + x0;
                let dst = (z * depth_pitch + row * row_pitch) as usize;
                self.backing.read(src, &mut out[dst..dst + row_len]);
            }
        }
    }
}

impl GpuImage for TraceImage {
    fn id(&self) -> u64 {
        self.id
    }

    fn info(&self) -> &ImageCreateInfo {
        &self.info
    }

    fn memory_flags(&self) -> MemoryFlags {
        self.memory_flags
    }

    fn subresource_layout(
        &self,
        _aspects: AspectFlags,
        mip_level: u32,
        array_layer: u32,
    ) -> SubresourceLayout {
        self.layout(mip_level, array_layer)
    }

    fn host_memory(&self) -> Option<GpuPhysicalSlice> {
        if self.memory_flags.contains(MemoryFlags::HOST_VISIBLE) {
            let backing: Arc<dyn GpuAllocation> = Arc::clone(&self.backing) as _;
            Some(GpuPhysicalSlice::whole(backing))
        } else {
            None
        }
    }

    fn is_in_use(&self) -> bool {
        self.shared.is_in_use(self.id)
    }
}

struct TraceImageView {
    id: u64,
    image: Arc<dyn GpuImage>,
    info: ImageViewCreateInfo,
}

impl GpuImageView for TraceImageView {
    fn id(&self) -> u64 {
        self.id
    }

    fn image(&self) -> &Arc<dyn GpuImage> {
        &self.image
    }

    fn info(&self) -> &ImageViewCreateInfo {
        &self.info
    }
}

struct TraceBufferView {
    id: u64,
    info: BufferViewCreateInfo,
}

impl GpuBufferView for TraceBufferView {
    fn id(&self) -> u64 {
        self.id
    }

    fn info(&self) -> &BufferViewCreateInfo {
        &self.info
    }
}

struct TraceSampler {
    id: u64,
    info: SamplerCreateInfo,
}

impl GpuSampler for TraceSampler {
    fn id(&self) -> u64 {
        self.id
    }

    fn info(&self) -> &SamplerCreateInfo {
        &self.info
    }
}

struct TraceShader {
    stage: ShaderStage,
    hash: u64,
}

impl GpuShader for TraceShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn hash(&self) -> u64 {
        self.hash
    }
}

struct TraceQuery {
    id: u64,
    kind: QueryKind,
    data: Mutex<Option<QueryData>>,
}

impl GpuQuery for TraceQuery {
    fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> QueryKind {
        self.kind
    }

    fn data(&self) -> Option<QueryData> {
        *self.data.lock().unwrap()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn slice_key(slice: &GpuBufferSlice) -> (u64, u64, u64) {
    (slice.buffer().id(), slice.offset(), slice.length())
}

/// The recording device. Cheap to create; every resource lives in host
/// memory.
pub struct TraceDevice {
    shared: Arc<TraceShared>,
}

impl TraceDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(TraceShared {
                next_id: AtomicU64::new(1),
                submitted: Mutex::new(Vec::new()),
                buffers: Mutex::new(HashMap::new()),
                images: Mutex::new(HashMap::new()),
                queries: Mutex::new(HashMap::new()),
                in_use: Mutex::new(std::collections::HashSet::new()),
            }),
        })
    }

    /// All submitted command lists, in submission order.
    pub fn submissions(&self) -> Vec<Vec<TraceOp>> {
        self.shared.submitted.lock().unwrap().clone()
    }

    /// Drains the submission log.
    pub fn take_submissions(&self) -> Vec<Vec<TraceOp>> {
        std::mem::take(&mut self.shared.submitted.lock().unwrap())
    }

    pub fn submission_count(&self) -> usize {
        self.shared.submitted.lock().unwrap().len()
    }

    /// All ops across all submissions, flattened in execution order.
    pub fn ops(&self) -> Vec<TraceOp> {
        self.shared
            .submitted
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Marks or clears a resource as busy on the fake timeline. Resources
    /// report not-in-use unless a test marks them.
    pub fn set_in_use(&self, id: u64, in_use: bool) {
        let mut set = self.shared.in_use.lock().unwrap();
        if in_use {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    fn set_query_data(&self, id: u64, value: Option<QueryData>) {
        if let Some(query) = self
            .shared
            .queries
            .lock()
            .unwrap()
            .get(&id)
            .and_then(Weak::upgrade)
        {
            *query.data.lock().unwrap() = value;
        }
    }
}

impl GpuDevice for TraceDevice {
    fn create_buffer(
        &self,
        info: &BufferCreateInfo,
        memory: MemoryFlags,
    ) -> Result<Arc<dyn GpuBuffer>, GpuError> {
        let allocation = TraceAllocation::new(self.shared.alloc_id(), info.size);
        let buffer = Arc::new(TraceBuffer {
            id: self.shared.alloc_id(),
            info: *info,
            memory_flags: memory,
            shared: Arc::clone(&self.shared),
            current: Mutex::new(GpuPhysicalSlice::whole(allocation)),
        });
        self.shared
            .buffers
            .lock()
            .unwrap()
            .insert(buffer.id, Arc::downgrade(&buffer));
        trace!(id = buffer.id, size = info.size, "created buffer");
        Ok(buffer)
    }

    fn create_image(
        &self,
        info: &ImageCreateInfo,
        memory: MemoryFlags,
    ) -> Result<Arc<dyn GpuImage>, GpuError> {
        if info.format == Format::Undefined {
            return Err(GpuError::UnsupportedFormat {
                format: info.format,
                needed: FormatFeatures::empty(),
            });
        }
        if !self.image_format_supported(info, info.tiling) {
            return Err(GpuError::Unsupported(format!(
                "image properties not supported: {info:?}"
            )));
        }
        let image = TraceImage::new(&self.shared, info, memory);
        self.shared
            .images
            .lock()
            .unwrap()
            .insert(image.id, Arc::downgrade(&image));
        trace!(id = image.id, format = ?info.format, "created image");
        Ok(image)
    }

    fn create_image_view(
        &self,
        image: &Arc<dyn GpuImage>,
        info: &ImageViewCreateInfo,
    ) -> Result<Arc<dyn GpuImageView>, GpuError> {
        Ok(Arc::new(TraceImageView {
            id: self.shared.alloc_id(),
            image: Arc::clone(image),
            info: *info,
        }))
    }

    fn create_buffer_view(
        &self,
        _buffer: &Arc<dyn GpuBuffer>,
        info: &BufferViewCreateInfo,
    ) -> Result<Arc<dyn GpuBufferView>, GpuError> {
        Ok(Arc::new(TraceBufferView {
            id: self.shared.alloc_id(),
            info: *info,
        }))
    }

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<Arc<dyn GpuSampler>, GpuError> {
        Ok(Arc::new(TraceSampler {
            id: self.shared.alloc_id(),
            info: *info,
        }))
    }

    fn create_shader(
        &self,
        stage: ShaderStage,
        code: &[u8],
    ) -> Result<Arc<dyn GpuShader>, GpuError> {
        if code.is_empty() {
            return Err(GpuError::Unsupported("empty shader module".into()));
        }
        Ok(Arc::new(TraceShader {
            stage,
            hash: fnv1a(code),
        }))
    }

    fn create_query(&self, kind: QueryKind) -> Result<Arc<dyn GpuQuery>, GpuError> {
        let query = Arc::new(TraceQuery {
            id: self.shared.alloc_id(),
            kind,
            data: Mutex::new(None),
        });
        self.shared
            .queries
            .lock()
            .unwrap()
            .insert(query.id, Arc::downgrade(&query));
        Ok(query)
    }

    fn create_context(&self) -> Box<dyn GpuContext> {
        Box::new(TraceContext {
            shared: Arc::clone(&self.shared),
            current: None,
        })
    }

    fn create_command_list(&self) -> GpuCommandList {
        GpuCommandList::new(Box::new(TraceCommandList::default()))
    }

    fn submit_command_list(&self, cmd_list: GpuCommandList) {
        let list = cmd_list
            .into_payload()
            .downcast::<TraceCommandList>()
            .expect("foreign command list");

        // Submission retires query commands.
        let ticks = self.shared.submitted.lock().unwrap().len() as u64 + 1;
        for op in &list.ops {
            match op {
                TraceOp::BeginQuery { query } => self.set_query_data(*query, None),
                TraceOp::EndQuery { query } => {
                    let data = self
                        .shared
                        .queries
                        .lock()
                        .unwrap()
                        .get(query)
                        .and_then(Weak::upgrade)
                        .map(|q| match q.kind {
                            QueryKind::Event => QueryData::Event,
                            QueryKind::Occlusion { .. } => {
                                QueryData::Occlusion { samples_passed: 0 }
                            }
                            QueryKind::Timestamp => QueryData::Timestamp { ticks },
                            QueryKind::PipelineStatistics => {
                                QueryData::PipelineStatistics(PipelineStatistics::default())
                            }
                        });
                    if data.is_some() {
                        self.set_query_data(*query, data);
                    }
                }
                TraceOp::WriteTimestamp { query } => {
                    self.set_query_data(*query, Some(QueryData::Timestamp { ticks }));
                }
                TraceOp::SignalEvent { query } => {
                    self.set_query_data(*query, Some(QueryData::Event));
                }
                _ => {}
            }
        }

        self.shared.submitted.lock().unwrap().push(list.ops);
    }

    fn format_features(&self, format: Format) -> FormatFeatures {
        if format == Format::Undefined {
            return FormatFeatures::empty();
        }
        let info = format_info(format);
        if info.aspects.intersects(AspectFlags::DEPTH | AspectFlags::STENCIL) {
            FormatFeatures::SAMPLED_IMAGE
                | FormatFeatures::DEPTH_STENCIL_ATTACHMENT
                | FormatFeatures::MULTISAMPLE
        } else if info.is_compressed() {
            FormatFeatures::SAMPLED_IMAGE
        } else {
            FormatFeatures::SAMPLED_IMAGE
                | FormatFeatures::COLOR_ATTACHMENT
                | FormatFeatures::COLOR_ATTACHMENT_BLEND
                | FormatFeatures::UNIFORM_TEXEL_BUFFER
                | FormatFeatures::VERTEX_BUFFER
                | FormatFeatures::LINEAR_TILING
                | FormatFeatures::MULTISAMPLE
        }
    }

    fn image_format_supported(&self, info: &ImageCreateInfo, tiling: ImageTiling) -> bool {
        let features = self.format_features(info.format);
        if info.usage.contains(ImageUsage::SAMPLED)
            && !features.contains(FormatFeatures::SAMPLED_IMAGE)
        {
            return false;
        }
        if info.usage.contains(ImageUsage::COLOR_ATTACHMENT)
            && !features.contains(FormatFeatures::COLOR_ATTACHMENT)
        {
            return false;
        }
        if info.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT)
            && !features.contains(FormatFeatures::DEPTH_STENCIL_ATTACHMENT)
        {
            return false;
        }
        if info.sample_count > 1 && !features.contains(FormatFeatures::MULTISAMPLE) {
            return false;
        }
        if tiling == ImageTiling::Linear {
            // Linear images are limited to what maps usefully to host
            // memory: single-sample, single-subresource color data.
            return features.contains(FormatFeatures::LINEAR_TILING)
                && info.sample_count == 1
                && info.mip_levels == 1
                && info.array_layers == 1;
        }
        true
    }
}

struct TraceContext {
    shared: Arc<TraceShared>,
    current: Option<TraceCommandList>,
}

impl TraceContext {
    fn record(&mut self, op: TraceOp) {
        self.current
            .as_mut()
            .expect("context is not recording")
            .ops
            .push(op);
    }

    fn trace_buffer(&self, id: u64) -> Option<Arc<TraceBuffer>> {
        self.shared.buffers.lock().unwrap().get(&id).and_then(Weak::upgrade)
    }

    fn trace_image(&self, image: &Arc<dyn GpuImage>) -> Option<Arc<TraceImage>> {
        self.shared
            .images
            .lock()
            .unwrap()
            .get(&image.id())
            .and_then(Weak::upgrade)
    }
}

impl GpuContext for TraceContext {
    fn begin_recording(&mut self, cmd_list: GpuCommandList) {
        let list = cmd_list
            .into_payload()
            .downcast::<TraceCommandList>()
            .expect("foreign command list");
        self.current = Some(*list);
    }

    fn end_recording(&mut self) -> GpuCommandList {
        let list = self.current.take().expect("context is not recording");
        GpuCommandList::new(Box::new(list))
    }

    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Arc<dyn GpuShader>>) {
        self.record(TraceOp::BindShader {
            stage,
            shader: shader.map(|s| s.hash()),
        });
    }

    fn bind_uniform_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: Option<GpuBufferSlice>,
    ) {
        self.record(TraceOp::BindUniformBuffer {
            stage,
            slot,
            buffer: buffer.as_ref().map(slice_key),
        });
    }

    fn bind_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        resource: Option<ShaderResource>,
    ) {
        let resource = resource.map(|r| match r {
            ShaderResource::Image(view) => view.id(),
            ShaderResource::Buffer(view) => view.id(),
        });
        self.record(TraceOp::BindShaderResource {
            stage,
            slot,
            resource,
        });
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<Arc<dyn GpuSampler>>) {
        self.record(TraceOp::BindSampler {
            stage,
            slot,
            sampler: sampler.map(|s| s.id()),
        });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: Option<GpuBufferSlice>, stride: u32) {
        self.record(TraceOp::BindVertexBuffer {
            slot,
            buffer: buffer.as_ref().map(slice_key),
            stride,
        });
    }

    fn bind_index_buffer(&mut self, buffer: Option<GpuBufferSlice>, index_type: IndexType) {
        self.record(TraceOp::BindIndexBuffer {
            buffer: buffer.as_ref().map(slice_key),
            index_type,
        });
    }

    fn bind_render_targets(&mut self, targets: RenderTargets) {
        self.record(TraceOp::BindRenderTargets {
            colors: targets
                .colors
                .iter()
                .map(|c| c.as_ref().map(|a| a.view.id()))
                .collect(),
            depth: targets.depth.as_ref().map(|a| a.view.id()),
        });
    }

    fn bind_stream_output_buffer(&mut self, slot: u32, buffer: Option<GpuBufferSlice>) {
        self.record(TraceOp::BindStreamOutputBuffer {
            slot,
            buffer: buffer.as_ref().map(slice_key),
        });
    }

    fn set_input_layout(&mut self, attributes: Vec<InputAttribute>, bindings: Vec<InputBinding>) {
        self.record(TraceOp::SetInputLayout {
            attributes,
            bindings,
        });
    }

    fn set_input_assembly_state(&mut self, state: InputAssemblyState) {
        self.record(TraceOp::SetInputAssemblyState(state));
    }

    fn set_blend_mode(&mut self, attachment: u32, mode: BlendMode) {
        self.record(TraceOp::SetBlendMode { attachment, mode });
    }

    fn set_multisample_state(&mut self, state: MultisampleState) {
        self.record(TraceOp::SetMultisampleState(state));
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) {
        self.record(TraceOp::SetBlendConstants(constants));
    }

    fn set_depth_stencil_state(&mut self, state: DepthStencilState) {
        self.record(TraceOp::SetDepthStencilState(state));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.record(TraceOp::SetStencilReference(reference));
    }

    fn set_rasterizer_state(&mut self, state: RasterizerState) {
        self.record(TraceOp::SetRasterizerState(state));
    }

    fn set_viewports(&mut self, viewports: Vec<Viewport>, scissors: Vec<Rect2d>) {
        self.record(TraceOp::SetViewports {
            viewports,
            scissors,
        });
    }

    fn begin_query(&mut self, query: Arc<dyn GpuQuery>) {
        self.record(TraceOp::BeginQuery { query: query.id() });
    }

    fn end_query(&mut self, query: Arc<dyn GpuQuery>) {
        self.record(TraceOp::EndQuery { query: query.id() });
    }

    fn write_timestamp(&mut self, query: Arc<dyn GpuQuery>) {
        self.record(TraceOp::WriteTimestamp { query: query.id() });
    }

    fn signal_event(&mut self, query: Arc<dyn GpuQuery>) {
        self.record(TraceOp::SignalEvent { query: query.id() });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.record(TraceOp::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(TraceOp::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn copy_buffer(&mut self, dst: GpuBufferSlice, src: GpuBufferSlice) {
        let mut data = vec![0u8; src.length() as usize];
        src.physical().read(0, &mut data);
        dst.physical().write(0, &data);
        self.record(TraceOp::CopyBuffer {
            dst: slice_key(&dst),
            src: slice_key(&src),
        });
    }

    fn copy_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        src_image: Arc<dyn GpuImage>,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    ) {
        if let (Some(dst), Some(src)) = (self.trace_image(&dst_image), self.trace_image(&src_image))
        {
            let fmt = format_info(src.info.format);
            let blocks = fmt.block_count(extent);
            let row_pitch = u64::from(blocks.width) * u64::from(fmt.element_size);
            let depth_pitch = row_pitch * u64::from(blocks.height);
            let mut data = vec![0u8; (depth_pitch * u64::from(blocks.depth)) as usize];
            for layer in 0..dst_layers.layer_count {
                src.read_region(
                    src_layers.mip_level,
                    src_layers.base_array_layer + layer,
                    src_offset,
                    extent,
                    &mut data,
                    row_pitch,
                    depth_pitch,
                );
                dst.write_region(
                    dst_layers.mip_level,
                    dst_layers.base_array_layer + layer,
                    dst_offset,
                    extent,
                    &data,
                    row_pitch,
                    depth_pitch,
                );
            }
        }
        self.record(TraceOp::CopyImage {
            dst_image: dst_image.id(),
            dst_layers,
            dst_offset,
            src_image: src_image.id(),
            src_layers,
            src_offset,
            extent,
        });
    }

    fn copy_buffer_to_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        dst_layers: ImageSubresourceLayers,
        dst_offset: Offset3d,
        extent: Extent3d,
        src: GpuBufferSlice,
    ) {
        if let Some(dst) = self.trace_image(&dst_image) {
            let fmt = format_info(dst.info.format);
            let blocks = fmt.block_count(extent);
            let row_pitch = u64::from(blocks.width) * u64::from(fmt.element_size);
            let depth_pitch = row_pitch * u64::from(blocks.height);
            let layer_size = depth_pitch * u64::from(blocks.depth);
            let mut data = vec![0u8; layer_size as usize];
            let physical = src.physical();
            for layer in 0..dst_layers.layer_count {
                physical.read(u64::from(layer) * layer_size, &mut data);
                dst.write_region(
                    dst_layers.mip_level,
                    dst_layers.base_array_layer + layer,
                    dst_offset,
                    extent,
                    &data,
                    row_pitch,
                    depth_pitch,
                );
            }
        }
        self.record(TraceOp::CopyBufferToImage {
            dst_image: dst_image.id(),
            dst_layers,
            dst_offset,
            extent,
            src: slice_key(&src),
        });
    }

    fn copy_image_to_buffer(
        &mut self,
        dst: GpuBufferSlice,
        src_image: Arc<dyn GpuImage>,
        src_layers: ImageSubresourceLayers,
        src_offset: Offset3d,
        extent: Extent3d,
    ) {
        if let Some(src) = self.trace_image(&src_image) {
            let fmt = format_info(src.info.format);
            let blocks = fmt.block_count(extent);
            let row_pitch = u64::from(blocks.width) * u64::from(fmt.element_size);
            let depth_pitch = row_pitch * u64::from(blocks.height);
            let layer_size = depth_pitch * u64::from(blocks.depth);
            let mut data = vec![0u8; layer_size as usize];
            let physical = dst.physical();
            for layer in 0..src_layers.layer_count {
                src.read_region(
                    src_layers.mip_level,
                    src_layers.base_array_layer + layer,
                    src_offset,
                    extent,
                    &mut data,
                    row_pitch,
                    depth_pitch,
                );
                physical.write(u64::from(layer) * layer_size, &data);
            }
        }
        self.record(TraceOp::CopyImageToBuffer {
            dst: slice_key(&dst),
            src_image: src_image.id(),
            src_layers,
            src_offset,
            extent,
        });
    }

    fn resolve_image(
        &mut self,
        dst_image: Arc<dyn GpuImage>,
        src_image: Arc<dyn GpuImage>,
        region: ImageSubresourceLayers,
        format: Format,
    ) {
        self.record(TraceOp::ResolveImage {
            dst_image: dst_image.id(),
            src_image: src_image.id(),
            region,
            format,
        });
    }

    fn clear_render_target(
        &mut self,
        view: Arc<dyn GpuImageView>,
        clear_rect: Rect2d,
        aspects: AspectFlags,
        value: ClearValue,
    ) {
        self.record(TraceOp::ClearRenderTarget {
            view: view.id(),
            clear_rect,
            aspects,
            value,
        });
    }

    fn clear_color_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        value: ClearValue,
        range: ImageSubresourceRange,
    ) {
        self.record(TraceOp::ClearColorImage {
            image: image.id(),
            value,
            range,
        });
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        value: ClearValue,
        range: ImageSubresourceRange,
    ) {
        self.record(TraceOp::ClearDepthStencilImage {
            image: image.id(),
            value,
            range,
        });
    }

    fn init_image(&mut self, image: Arc<dyn GpuImage>, range: ImageSubresourceRange) {
        self.record(TraceOp::InitImage {
            image: image.id(),
            range,
        });
    }

    fn update_buffer(&mut self, buffer: GpuBufferSlice, data: &[u8]) {
        buffer.physical().write(0, data);
        self.record(TraceOp::UpdateBuffer {
            buffer: slice_key(&buffer),
        });
    }

    fn update_image(
        &mut self,
        image: Arc<dyn GpuImage>,
        layers: ImageSubresourceLayers,
        offset: Offset3d,
        extent: Extent3d,
        data: &[u8],
        row_pitch: u64,
        depth_pitch: u64,
    ) {
        if let Some(dst) = self.trace_image(&image) {
            let layer_stride = depth_pitch * u64::from(extent.depth);
            for layer in 0..layers.layer_count {
                let base = (u64::from(layer) * layer_stride) as usize;
                dst.write_region(
                    layers.mip_level,
                    layers.base_array_layer + layer,
                    offset,
                    extent,
                    &data[base..],
                    row_pitch,
                    depth_pitch,
                );
            }
        }
        self.record(TraceOp::UpdateImage {
            image: image.id(),
            layers,
            offset,
            extent,
        });
    }

    fn invalidate_buffer(&mut self, buffer: Arc<dyn GpuBuffer>, slice: GpuPhysicalSlice) {
        let allocation = slice.allocation().id();
        if let Some(target) = self.trace_buffer(buffer.id()) {
            *target.current.lock().unwrap() = slice;
        }
        self.record(TraceOp::InvalidateBuffer {
            buffer: buffer.id(),
            allocation,
        });
    }

    fn generate_mips(&mut self, image: Arc<dyn GpuImage>, range: ImageSubresourceRange) {
        self.record(TraceOp::GenerateMips {
            image: image.id(),
            range,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AccessFlags, BufferUsage, ImageCreateFlags, ImageLayout, PipelineStages};

    fn test_buffer_info(size: u64) -> BufferCreateInfo {
        BufferCreateInfo {
            size,
            usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            stages: PipelineStages::TRANSFER,
            access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
        }
    }

    fn test_image_info(extent: Extent3d) -> ImageCreateInfo {
        ImageCreateInfo {
            image_type: crate::resource::ImageType::Dim2,
            format: Format::R8G8B8A8Unorm,
            extent,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            tiling: ImageTiling::Optimal,
            usage: ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST,
            stages: PipelineStages::TRANSFER,
            access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
            flags: ImageCreateFlags::empty(),
            layout: ImageLayout::General,
        }
    }

    #[test]
    fn recorded_ops_surface_in_submission_order() {
        let device = TraceDevice::new();
        let mut ctx = device.create_context();

        ctx.begin_recording(device.create_command_list());
        ctx.set_stencil_reference(7);
        ctx.draw(3, 1, 0, 0);
        device.submit_command_list(ctx.end_recording());

        assert_eq!(
            device.ops(),
            vec![
                TraceOp::SetStencilReference(7),
                TraceOp::Draw {
                    vertex_count: 3,
                    instance_count: 1,
                    first_vertex: 0,
                    first_instance: 0,
                },
            ]
        );
    }

    #[test]
    fn buffer_rename_redirects_later_writes() {
        let device = TraceDevice::new();
        let mut ctx = device.create_context();
        ctx.begin_recording(device.create_command_list());

        let buffer = device
            .create_buffer(&test_buffer_info(4), MemoryFlags::HOST_VISIBLE)
            .unwrap();
        let slice = GpuBufferSlice::whole(Arc::clone(&buffer));
        let before = buffer.physical_slice();

        ctx.update_buffer(slice.clone(), &[1, 1, 1, 1]);

        let renamed = buffer.alloc_physical_slice();
        ctx.invalidate_buffer(Arc::clone(&buffer), renamed.clone());
        ctx.update_buffer(slice, &[2, 2, 2, 2]);

        let mut old = [0u8; 4];
        before.read(0, &mut old);
        assert_eq!(old, [1, 1, 1, 1]);

        let mut new = [0u8; 4];
        buffer.physical_slice().read(0, &mut new);
        assert_eq!(new, [2, 2, 2, 2]);
        assert!(buffer.physical_slice().matches(&renamed));
    }

    #[test]
    fn event_query_signals_on_submit() {
        let device = TraceDevice::new();
        let mut ctx = device.create_context();
        ctx.begin_recording(device.create_command_list());

        let query = device.create_query(QueryKind::Event).unwrap();
        ctx.signal_event(Arc::clone(&query));
        assert_eq!(query.data(), None);

        device.submit_command_list(ctx.end_recording());
        assert_eq!(query.data(), Some(QueryData::Event));
    }

    #[test]
    fn image_data_round_trips_through_buffer_copies() {
        let device = TraceDevice::new();
        let mut ctx = device.create_context();
        ctx.begin_recording(device.create_command_list());

        let extent = Extent3d {
            width: 4,
            height: 2,
            depth: 1,
        };
        let image = device
            .create_image(&test_image_info(extent), MemoryFlags::DEVICE_LOCAL)
            .unwrap();
        let readback = device
            .create_buffer(&test_buffer_info(32), MemoryFlags::HOST_VISIBLE)
            .unwrap();

        let texels: Vec<u8> = (0..32).collect();
        let layers = ImageSubresourceLayers {
            aspects: AspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        ctx.update_image(
            Arc::clone(&image),
            layers,
            Offset3d::default(),
            extent,
            &texels,
            16,
            32,
        );
        ctx.copy_image_to_buffer(
            GpuBufferSlice::whole(Arc::clone(&readback)),
            Arc::clone(&image),
            layers,
            Offset3d::default(),
            extent,
        );

        let mut out = vec![0u8; 32];
        readback.physical_slice().read(0, &mut out);
        assert_eq!(out, texels);
    }
}
