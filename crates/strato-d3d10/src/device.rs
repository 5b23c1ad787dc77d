//! Device construction, object creation and the command stream plumbing
//! shared with the immediate context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use strato_gpu::format::{Extent3d, Format, Offset3d};
use strato_gpu::state::{
    AccessFlags, AspectFlags, ClearValue, FormatFeatures, ImageCreateFlags, ImageLayout,
    ImageTiling, ImageUsage, PipelineStages, ShaderStage,
};
use strato_gpu::{
    CsChunk, CsThread, DataAllocator, GpuBufferSlice, GpuContext, GpuDevice, GpuShader,
    ImageCreateInfo, ImageSubresourceLayers, ImageSubresourceRange, ImageType, ShaderResource,
};
use tracing::{error, warn};

use crate::blend::{BlendDesc, BlendState};
use crate::buffer::{Buffer, BufferDesc};
use crate::depth_stencil::{DepthStencilDesc, DepthStencilState};
use crate::error::{ApiError, ApiResult};
use crate::format::{decode_sample_count, dxgi, lookup_format, FormatMode};
use crate::input_layout::{InputElementDesc, InputLayout};
use crate::options::{OptionFlags, Options};
use crate::query::{d3d10::QUERY_OCCLUSION_PREDICATE, Query, QueryDesc};
use crate::rasterizer::{RasterizerDesc, RasterizerState};
use crate::resource::{
    calc_subresource, BindFlags, MapFlags, MapMode, MappedSubresource, Resource,
    ResourceDimension, SubresourceData, Usage,
};
use crate::sampler::{SamplerDesc, SamplerState};
use crate::shader::{
    GeometryShader, InputSignature, PassthroughCompiler, PixelShader, ShaderCompiler,
    SoDeclarationEntry, VertexShader,
};
use crate::state::ContextState;
use crate::state_cache::StateObjectCache;
use crate::texture::{
    normalize_texture_desc, packed_pitches, packed_size, CommonTextureDesc, Texture,
    Texture1dDesc, Texture2dDesc, Texture3dDesc, TextureMapMode,
};
use crate::view::{
    srv_format_mode, DepthStencilView, DsvDesc, RenderTargetView, RtvDesc, ShaderResourceView,
    SrvDesc,
};

/// Number of commands recorded to the resource initialization context
/// before it gets submitted on its own.
const INIT_COMMAND_THRESHOLD: u64 = 50;

/// Number of draws recorded since the last submission above which a render
/// target change submits the pending command stream.
pub(crate) const MAX_PENDING_DRAWS: u32 = 500;

bitflags::bitflags! {
    /// Per-format capability bits reported by [`Device::check_format_support`].
    ///
    /// The bit values match the legacy `D3D10_FORMAT_SUPPORT` encoding so
    /// they can be handed back to applications unmodified.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FormatSupport: u32 {
        const BUFFER                  = 0x1;
        const IA_VERTEX_BUFFER        = 0x2;
        const IA_INDEX_BUFFER         = 0x4;
        const SO_BUFFER               = 0x8;
        const TEXTURE1D               = 0x10;
        const TEXTURE2D               = 0x20;
        const TEXTURE3D               = 0x40;
        const TEXTURECUBE             = 0x80;
        const SHADER_LOAD             = 0x100;
        const SHADER_SAMPLE           = 0x200;
        const SHADER_SAMPLE_COMPARISON = 0x400;
        const MIP                     = 0x1000;
        const MIP_AUTOGEN             = 0x2000;
        const RENDER_TARGET           = 0x4000;
        const BLENDABLE               = 0x8000;
        const DEPTH_STENCIL           = 0x10000;
        const CPU_LOCKABLE            = 0x20000;
        const MULTISAMPLE_RESOLVE     = 0x40000;
        const DISPLAY                 = 0x80000;
        const CAST_WITHIN_BIT_LAYOUT  = 0x100000;
        const MULTISAMPLE_RENDERTARGET = 0x200000;
        const MULTISAMPLE_LOAD        = 0x400000;
        const SHADER_GATHER           = 0x800000;
    }
}

/// Context used to upload initial resource contents. It records off the
/// application thread's command stream so resource creation never has to
/// synchronize with rendering.
struct InitContext {
    context: Box<dyn GpuContext>,
    pending_commands: u64,
}

/// The legacy device and its immediate context.
///
/// Object creation methods take `&self` and may be called from any thread.
/// Pipeline, draw and map methods take `&mut self`; they translate calls
/// into backend commands and hand them to the command stream worker in
/// chunks.
pub struct Device {
    pub(crate) gpu: Arc<dyn GpuDevice>,
    options: Options,
    compiler: Arc<dyn ShaderCompiler>,

    pub(crate) state: ContextState,
    pub(crate) cs_chunk: CsChunk,
    cs_thread: CsThread,
    cs_is_busy: bool,
    pub(crate) draw_count: u32,
    pub(crate) update_allocator: DataAllocator,

    init_context: Mutex<InitContext>,

    pub(crate) default_blend_state: Arc<BlendState>,
    pub(crate) default_depth_stencil_state: Arc<DepthStencilState>,
    pub(crate) default_rasterizer_state: Arc<RasterizerState>,

    blend_states: StateObjectCache<BlendDesc, BlendState>,
    depth_stencil_states: StateObjectCache<DepthStencilDesc, DepthStencilState>,
    rasterizer_states: StateObjectCache<RasterizerDesc, RasterizerState>,
    sampler_states: StateObjectCache<SamplerDesc, SamplerState>,
    shader_modules: Mutex<HashMap<(ShaderStage, Vec<u8>), Arc<dyn GpuShader>>>,

    device_removed_warned: AtomicBool,
    pub(crate) predication_warned: bool,
}

/// Creates a device with application options looked up for `exe_name` and
/// no shader translation stage.
pub fn create_device(gpu: Arc<dyn GpuDevice>, exe_name: &str) -> ApiResult<Device> {
    Device::new(
        gpu,
        Arc::new(PassthroughCompiler::default()),
        Options::for_executable(exe_name),
    )
}

impl Device {
    pub fn new(
        gpu: Arc<dyn GpuDevice>,
        compiler: Arc<dyn ShaderCompiler>,
        options: Options,
    ) -> ApiResult<Self> {
        let cs_thread = CsThread::new(gpu.create_context());

        let mut init_context = gpu.create_context();
        init_context.begin_recording(gpu.create_command_list());

        let blend_states = StateObjectCache::new();
        let depth_stencil_states = StateObjectCache::new();
        let rasterizer_states = StateObjectCache::new();

        let default_blend_desc = BlendDesc::default();
        let default_blend_state =
            blend_states.get_or_create(&default_blend_desc, || Ok(BlendState::new(&default_blend_desc)))?;

        let default_depth_stencil_desc = DepthStencilDesc::default();
        let default_depth_stencil_state = depth_stencil_states
            .get_or_create(&default_depth_stencil_desc, || {
                Ok(DepthStencilState::new(&default_depth_stencil_desc))
            })?;

        let default_rasterizer_desc = RasterizerDesc::default();
        let default_rasterizer_state = rasterizer_states
            .get_or_create(&default_rasterizer_desc, || {
                Ok(RasterizerState::new(&default_rasterizer_desc))
            })?;

        let mut device = Self {
            gpu: Arc::clone(&gpu),
            options,
            compiler,
            state: ContextState::default(),
            cs_chunk: CsChunk::new(),
            cs_thread,
            cs_is_busy: false,
            draw_count: 0,
            update_allocator: DataAllocator::new(),
            init_context: Mutex::new(InitContext {
                context: init_context,
                pending_commands: 0,
            }),
            default_blend_state,
            default_depth_stencil_state,
            default_rasterizer_state,
            blend_states,
            depth_stencil_states,
            rasterizer_states,
            sampler_states: StateObjectCache::new(),
            shader_modules: Mutex::new(HashMap::new()),
            device_removed_warned: AtomicBool::new(false),
            predication_warned: false,
        };

        // The worker owns the recording context, so the initial command
        // list is opened through the stream like any other command.
        device.emit(move |ctx| ctx.begin_recording(gpu.create_command_list()));

        Ok(device)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // ---------------------------------------------------------------
    // Resource creation
    // ---------------------------------------------------------------

    pub fn create_buffer(
        &self,
        desc: &BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> ApiResult<Arc<Buffer>> {
        let buffer = Arc::new(Buffer::new(&self.gpu, desc)?);

        if let Some(data) = initial_data {
            let size = desc.byte_width as usize;
            if data.len() < size {
                return Err(ApiError::invalid_arg(format!(
                    "initial data holds {} bytes, buffer needs {}",
                    data.len(),
                    size
                )));
            }
            self.init_buffer(&buffer, &data[..size]);
        }

        Ok(buffer)
    }

    pub fn create_texture_1d(
        &self,
        desc: &Texture1dDesc,
        initial_data: &[SubresourceData],
    ) -> ApiResult<Arc<Texture>> {
        self.create_texture(
            ResourceDimension::Texture1d,
            CommonTextureDesc::from(desc),
            initial_data,
        )
    }

    pub fn create_texture_2d(
        &self,
        desc: &Texture2dDesc,
        initial_data: &[SubresourceData],
    ) -> ApiResult<Arc<Texture>> {
        self.create_texture(
            ResourceDimension::Texture2d,
            CommonTextureDesc::from(desc),
            initial_data,
        )
    }

    pub fn create_texture_3d(
        &self,
        desc: &Texture3dDesc,
        initial_data: &[SubresourceData],
    ) -> ApiResult<Arc<Texture>> {
        self.create_texture(
            ResourceDimension::Texture3d,
            CommonTextureDesc::from(desc),
            initial_data,
        )
    }

    fn create_texture(
        &self,
        dimension: ResourceDimension,
        mut desc: CommonTextureDesc,
        initial_data: &[SubresourceData],
    ) -> ApiResult<Arc<Texture>> {
        normalize_texture_desc(&mut desc)?;
        let texture = Arc::new(Texture::new(&self.gpu, dimension, &desc)?);
        self.init_texture(&texture, initial_data)?;
        Ok(texture)
    }

    // ---------------------------------------------------------------
    // Validation probes
    // ---------------------------------------------------------------

    // Callers passing a null output pointer in the legacy interface get
    // descriptor validation with nothing created.

    pub fn validate_buffer_desc(&self, desc: &BufferDesc) -> ApiResult<()> {
        Buffer::validate_desc(desc)
    }

    pub fn validate_texture_1d_desc(&self, desc: &Texture1dDesc) -> ApiResult<()> {
        let mut desc = CommonTextureDesc::from(desc);
        normalize_texture_desc(&mut desc)
    }

    pub fn validate_texture_2d_desc(&self, desc: &Texture2dDesc) -> ApiResult<()> {
        let mut desc = CommonTextureDesc::from(desc);
        normalize_texture_desc(&mut desc)
    }

    pub fn validate_texture_3d_desc(&self, desc: &Texture3dDesc) -> ApiResult<()> {
        let mut desc = CommonTextureDesc::from(desc);
        normalize_texture_desc(&mut desc)
    }

    // ---------------------------------------------------------------
    // View creation
    // ---------------------------------------------------------------

    pub fn create_shader_resource_view(
        &self,
        resource: &Resource,
        desc: Option<&SrvDesc>,
    ) -> ApiResult<Arc<ShaderResourceView>> {
        let desc = match desc {
            Some(user) => {
                let mut desc = user.clone();
                desc.normalize(resource)?;
                desc
            }
            None => SrvDesc::from_resource(resource)?,
        };

        if !resource_bind_flags(resource).contains(BindFlags::SHADER_RESOURCE) {
            warn!("resource was created without the shader resource bind flag");
            return Err(ApiError::invalid_arg(
                "resource does not allow shader resource views",
            ));
        }

        let view = match resource {
            Resource::Buffer(buffer) => {
                let info = desc.buffer_view_info()?;
                ShaderResource::Buffer(self.gpu.create_buffer_view(buffer.gpu_buffer(), &info)?)
            }
            Resource::Texture(texture) => {
                let info = desc.image_view_info(srv_format_mode(resource))?;
                ShaderResource::Image(self.gpu.create_image_view(texture.image(), &info)?)
            }
        };

        Ok(Arc::new(ShaderResourceView::new(
            resource.clone(),
            desc,
            view,
        )))
    }

    pub fn create_render_target_view(
        &self,
        resource: &Resource,
        desc: Option<&RtvDesc>,
    ) -> ApiResult<Arc<RenderTargetView>> {
        let desc = match desc {
            Some(user) => {
                let mut desc = user.clone();
                desc.normalize(resource)?;
                desc
            }
            None => RtvDesc::from_resource(resource)?,
        };

        // The legacy interface permits render target views of buffers;
        // nothing this layer targets can consume one, so the view exists
        // but binds nothing.
        let Some(texture) = resource.texture() else {
            warn!("render target view of a buffer has no effect");
            return Ok(Arc::new(RenderTargetView::new(resource.clone(), desc, None)));
        };

        if !texture.desc().bind_flags.contains(BindFlags::RENDER_TARGET) {
            warn!("resource was created without the render target bind flag");
            return Err(ApiError::invalid_arg(
                "resource does not allow render target views",
            ));
        }

        let info = desc.image_view_info()?;
        let view = self.gpu.create_image_view(texture.image(), &info)?;

        Ok(Arc::new(RenderTargetView::new(
            resource.clone(),
            desc,
            Some(view),
        )))
    }

    pub fn create_depth_stencil_view(
        &self,
        resource: &Resource,
        desc: Option<&DsvDesc>,
    ) -> ApiResult<Arc<DepthStencilView>> {
        let Some(texture) = resource.texture() else {
            warn!("depth-stencil views require a texture resource");
            return Err(ApiError::invalid_arg(
                "depth-stencil view of a buffer",
            ));
        };

        let desc = match desc {
            Some(user) => {
                let mut desc = user.clone();
                desc.normalize(resource)?;
                desc
            }
            None => DsvDesc::from_resource(resource)?,
        };

        if !texture.desc().bind_flags.contains(BindFlags::DEPTH_STENCIL) {
            warn!("resource was created without the depth-stencil bind flag");
            return Err(ApiError::invalid_arg(
                "resource does not allow depth-stencil views",
            ));
        }

        let info = desc.image_view_info()?;
        let view = self.gpu.create_image_view(texture.image(), &info)?;

        Ok(Arc::new(DepthStencilView::new(resource.clone(), desc, view)))
    }

    // ---------------------------------------------------------------
    // Shader and input layout creation
    // ---------------------------------------------------------------

    pub fn create_input_layout(
        &self,
        elements: &[InputElementDesc],
        signature: &InputSignature,
    ) -> ApiResult<Arc<InputLayout>> {
        Ok(Arc::new(InputLayout::new(signature, elements)?))
    }

    pub fn create_vertex_shader(&self, bytecode: &[u8]) -> ApiResult<Arc<VertexShader>> {
        let module = self.create_shader_module(ShaderStage::Vertex, bytecode)?;
        Ok(Arc::new(VertexShader::new(module)))
    }

    pub fn create_geometry_shader(&self, bytecode: &[u8]) -> ApiResult<Arc<GeometryShader>> {
        let module = self.create_shader_module(ShaderStage::Geometry, bytecode)?;
        Ok(Arc::new(GeometryShader::new(module)))
    }

    pub fn create_geometry_shader_with_stream_output(
        &self,
        _bytecode: &[u8],
        _declaration: &[SoDeclarationEntry],
        _output_stream_stride: u32,
    ) -> ApiResult<Arc<GeometryShader>> {
        error!("geometry shaders with stream output are not translated");
        Err(ApiError::NotImplemented(
            "geometry shader stream output",
        ))
    }

    pub fn create_pixel_shader(&self, bytecode: &[u8]) -> ApiResult<Arc<PixelShader>> {
        let module = self.create_shader_module(ShaderStage::Pixel, bytecode)?;
        Ok(Arc::new(PixelShader::new(module)))
    }

    /// Compiles `bytecode` for `stage`, reusing the module if the same
    /// bytecode was compiled before.
    fn create_shader_module(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> ApiResult<Arc<dyn GpuShader>> {
        let mut modules = self.shader_modules.lock().unwrap();

        let key = (stage, bytecode.to_vec());
        if let Some(module) = modules.get(&key) {
            return Ok(Arc::clone(module));
        }

        let code = self.compiler.compile(stage, bytecode).map_err(|err| {
            error!(error = %err, ?stage, "shader compilation failed");
            ApiError::invalid_arg(err.to_string())
        })?;

        let module = self.gpu.create_shader(stage, &code)?;
        modules.insert(key, Arc::clone(&module));
        Ok(module)
    }

    // ---------------------------------------------------------------
    // State object creation
    // ---------------------------------------------------------------

    pub fn create_blend_state(&self, desc: Option<&BlendDesc>) -> ApiResult<Arc<BlendState>> {
        let desc = desc.cloned().unwrap_or_default();
        self.blend_states
            .get_or_create(&desc, || Ok(BlendState::new(&desc)))
    }

    pub fn create_depth_stencil_state(
        &self,
        desc: Option<&DepthStencilDesc>,
    ) -> ApiResult<Arc<DepthStencilState>> {
        let desc = desc.cloned().unwrap_or_default();
        self.depth_stencil_states
            .get_or_create(&desc, || Ok(DepthStencilState::new(&desc)))
    }

    pub fn create_rasterizer_state(
        &self,
        desc: Option<&RasterizerDesc>,
    ) -> ApiResult<Arc<RasterizerState>> {
        let desc = desc.cloned().unwrap_or_default();
        self.rasterizer_states
            .get_or_create(&desc, || Ok(RasterizerState::new(&desc)))
    }

    pub fn create_sampler_state(&self, desc: &SamplerDesc) -> ApiResult<Arc<SamplerState>> {
        SamplerState::validate_desc(desc)?;
        self.sampler_states
            .get_or_create(desc, || SamplerState::new(&self.gpu, desc))
    }

    // ---------------------------------------------------------------
    // Queries and predicates
    // ---------------------------------------------------------------

    pub fn create_query(&self, desc: &QueryDesc) -> ApiResult<Arc<Query>> {
        Ok(Arc::new(Query::new(&self.gpu, desc)?))
    }

    pub fn create_predicate(&self, desc: &QueryDesc) -> ApiResult<Arc<Query>> {
        if desc.query != QUERY_OCCLUSION_PREDICATE {
            return Err(ApiError::invalid_arg(format!(
                "predicates require an occlusion predicate query, got kind {}",
                desc.query
            )));
        }
        Ok(Arc::new(Query::new(&self.gpu, desc)?))
    }

    // ---------------------------------------------------------------
    // Capability queries
    // ---------------------------------------------------------------

    pub fn check_format_support(&self, format: u32) -> ApiResult<FormatSupport> {
        let gpu_format = lookup_format(format, FormatMode::Any)
            .ok_or_else(|| ApiError::invalid_arg(format!("unknown format: {format}")))?;

        let features = self.gpu.format_features(gpu_format);
        let mut support = FormatSupport::empty();

        if features.contains(FormatFeatures::UNIFORM_TEXEL_BUFFER) {
            support |= FormatSupport::BUFFER;
        }

        if features.contains(FormatFeatures::VERTEX_BUFFER) {
            support |= FormatSupport::IA_VERTEX_BUFFER | FormatSupport::SO_BUFFER;
        }

        if format == dxgi::FORMAT_R16_UINT || format == dxgi::FORMAT_R32_UINT {
            support |= FormatSupport::IA_INDEX_BUFFER;
        }

        if features.contains(FormatFeatures::SAMPLED_IMAGE) {
            if self.image_type_supported(gpu_format, ImageType::Dim1) {
                support |= FormatSupport::TEXTURE1D;
            }
            if self.image_type_supported(gpu_format, ImageType::Dim2) {
                support |= FormatSupport::TEXTURE2D;
            }
            if self.image_type_supported(gpu_format, ImageType::Dim3) {
                support |= FormatSupport::TEXTURE3D;
            }

            support |= FormatSupport::MIP
                | FormatSupport::CPU_LOCKABLE
                | FormatSupport::CAST_WITHIN_BIT_LAYOUT
                | FormatSupport::TEXTURECUBE
                | FormatSupport::SHADER_LOAD
                | FormatSupport::SHADER_GATHER
                | FormatSupport::SHADER_SAMPLE;

            if lookup_format(format, FormatMode::Depth).is_some() {
                support |= FormatSupport::SHADER_SAMPLE_COMPARISON;
            }
        }

        if features.contains(FormatFeatures::COLOR_ATTACHMENT) {
            support |= FormatSupport::RENDER_TARGET | FormatSupport::MIP_AUTOGEN;
        }

        if features.contains(FormatFeatures::COLOR_ATTACHMENT_BLEND) {
            support |= FormatSupport::BLENDABLE;
        }

        if features.contains(FormatFeatures::DEPTH_STENCIL_ATTACHMENT) {
            support |= FormatSupport::DEPTH_STENCIL;
        }

        if matches!(
            format,
            dxgi::FORMAT_R8G8B8A8_UNORM
                | dxgi::FORMAT_R8G8B8A8_UNORM_SRGB
                | dxgi::FORMAT_B8G8R8A8_UNORM
                | dxgi::FORMAT_B8G8R8A8_UNORM_SRGB
                | dxgi::FORMAT_R16G16B16A16_FLOAT
                | dxgi::FORMAT_R10G10B10A2_UNORM
        ) {
            support |= FormatSupport::DISPLAY;
        }

        if features.contains(FormatFeatures::MULTISAMPLE) {
            support |= FormatSupport::MULTISAMPLE_RENDERTARGET
                | FormatSupport::MULTISAMPLE_RESOLVE
                | FormatSupport::MULTISAMPLE_LOAD;
        }

        Ok(support)
    }

    /// Number of quality levels available for the format at the given
    /// sample count. Either every count maps to one level or the count is
    /// unsupported.
    pub fn check_multisample_quality_levels(
        &self,
        format: u32,
        sample_count: u32,
    ) -> ApiResult<u32> {
        let gpu_format = lookup_format(format, FormatMode::Any).ok_or_else(|| {
            error!(format, "multisample support queried for unknown format");
            ApiError::invalid_arg(format!("unknown format: {format}"))
        })?;

        let samples = decode_sample_count(sample_count).ok_or_else(|| {
            ApiError::invalid_arg(format!("invalid sample count: {sample_count}"))
        })?;

        let info = ImageCreateInfo {
            image_type: ImageType::Dim2,
            format: gpu_format,
            extent: Extent3d {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            sample_count: samples,
            tiling: ImageTiling::Optimal,
            usage: ImageUsage::SAMPLED,
            stages: PipelineStages::empty(),
            access: AccessFlags::empty(),
            flags: ImageCreateFlags::empty(),
            layout: ImageLayout::General,
        };

        let levels = if self.gpu.image_format_supported(&info, ImageTiling::Optimal) {
            1
        } else {
            0
        };
        Ok(levels)
    }

    fn image_type_supported(&self, format: Format, image_type: ImageType) -> bool {
        let info = ImageCreateInfo {
            image_type,
            format,
            extent: Extent3d {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            tiling: ImageTiling::Optimal,
            usage: ImageUsage::SAMPLED,
            stages: PipelineStages::empty(),
            access: AccessFlags::empty(),
            flags: ImageCreateFlags::empty(),
            layout: ImageLayout::General,
        };
        self.gpu.image_format_supported(&info, ImageTiling::Optimal)
    }

    // ---------------------------------------------------------------
    // Operations without a translation
    // ---------------------------------------------------------------

    pub fn create_counter(&self) -> ApiResult<()> {
        error!("hardware counters are not supported");
        Err(ApiError::NotImplemented("hardware counters"))
    }

    pub fn check_counter(&self) -> ApiResult<()> {
        error!("hardware counters are not supported");
        Err(ApiError::NotImplemented("hardware counters"))
    }

    pub fn open_shared_resource(&self) -> ApiResult<Resource> {
        error!("shared resources are not supported");
        Err(ApiError::NotImplemented("shared resources"))
    }

    pub fn set_exception_mode(&self, _flags: u32) -> ApiResult<()> {
        error!("exception modes are not supported");
        Err(ApiError::NotImplemented("exception modes"))
    }

    /// Device loss is not tracked; the device always reports itself alive.
    pub fn device_removed_reason(&self) -> ApiResult<()> {
        if !self.device_removed_warned.swap(true, Ordering::Relaxed) {
            warn!("device removal is not tracked");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Mapping
    // ---------------------------------------------------------------

    pub fn map_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        mode: MapMode,
        flags: MapFlags,
    ) -> ApiResult<MappedSubresource> {
        if !buffer.is_host_visible() {
            error!("cannot map a buffer in device-local memory");
            return Err(ApiError::invalid_arg("buffer is not CPU accessible"));
        }

        let slice = match mode {
            MapMode::WriteDiscard => {
                // Rename the buffer so commands already on the timeline
                // keep reading the old backing store.
                let physical = buffer.gpu_buffer().alloc_physical_slice();
                buffer.set_mapped_slice(physical.clone());

                let gpu_buffer = Arc::clone(buffer.gpu_buffer());
                let renamed = physical.clone();
                self.emit(move |ctx| ctx.invalidate_buffer(gpu_buffer, renamed));
                physical
            }
            MapMode::WriteNoOverwrite => buffer.mapped_slice(),
            _ => {
                let gpu_buffer = Arc::clone(buffer.gpu_buffer());
                if !self.wait_for_resource(move || gpu_buffer.is_in_use(), flags) {
                    return Err(ApiError::WouldBlock);
                }
                buffer.mapped_slice()
            }
        };

        Ok(MappedSubresource {
            data: slice,
            row_pitch: buffer.desc().byte_width,
            depth_pitch: buffer.desc().byte_width,
        })
    }

    /// Buffers stay mapped for their lifetime, so releasing a mapping is
    /// a no-op.
    pub fn unmap_buffer(&mut self, _buffer: &Arc<Buffer>) {}

    pub fn map_texture(
        &mut self,
        texture: &Arc<Texture>,
        subresource: u32,
        mode: MapMode,
        flags: MapFlags,
    ) -> ApiResult<MappedSubresource> {
        let desc = texture.desc();
        let info = texture.format_info();

        if subresource >= texture.subresource_count() {
            return Err(ApiError::invalid_arg(format!(
                "subresource {subresource} out of range"
            )));
        }

        if info.aspects != AspectFlags::COLOR {
            error!("cannot map a depth-stencil texture");
            return Err(ApiError::invalid_arg(
                "depth-stencil textures cannot be mapped",
            ));
        }

        // Subresource indices enumerate mip levels first, then layers.
        let mip_level = subresource % desc.mip_levels;
        let array_layer = subresource / desc.mip_levels;

        let mapped = match texture.map_mode() {
            TextureMapMode::None => {
                error!("cannot map a texture without CPU access");
                return Err(ApiError::invalid_arg("texture is not CPU accessible"));
            }
            TextureMapMode::Direct => {
                let image = Arc::clone(texture.image());
                if !self.wait_for_resource(move || image.is_in_use(), flags) {
                    return Err(ApiError::WouldBlock);
                }

                let layout =
                    texture
                        .image()
                        .subresource_layout(info.aspects, mip_level, array_layer);
                let memory = texture.image().host_memory().ok_or_else(|| {
                    ApiError::Unsupported("image memory is not host visible".into())
                })?;

                MappedSubresource {
                    data: memory.subslice(layout.offset, layout.size),
                    row_pitch: layout.row_pitch as u32,
                    depth_pitch: layout.depth_pitch as u32,
                }
            }
            TextureMapMode::Buffer => {
                let buffer = match texture.mapped_buffer() {
                    Some(buffer) => Arc::clone(buffer),
                    None => {
                        return Err(ApiError::Unsupported(
                            "texture has no staging buffer".into(),
                        ))
                    }
                };

                let extent = texture.mip_extent(mip_level);
                let (row_pitch, depth_pitch) = packed_pitches(&info, extent);

                let physical = if mode == MapMode::WriteDiscard {
                    let slice = buffer.alloc_physical_slice();
                    texture.set_mapped_slice(slice.clone());

                    let gpu_buffer = Arc::clone(&buffer);
                    let renamed = slice.clone();
                    self.emit(move |ctx| ctx.invalidate_buffer(gpu_buffer, renamed));
                    slice
                } else {
                    if desc.usage == Usage::Staging {
                        // Reads have to observe image writes made on the
                        // timeline, so pull the subresource down first.
                        let layers = ImageSubresourceLayers {
                            aspects: info.aspects,
                            mip_level,
                            base_array_layer: array_layer,
                            layer_count: 1,
                        };
                        let image = Arc::clone(texture.image());
                        let dst = GpuBufferSlice::new(
                            Arc::clone(&buffer),
                            0,
                            packed_size(&info, extent),
                        );
                        self.emit(move |ctx| {
                            ctx.copy_image_to_buffer(
                                dst,
                                image,
                                layers,
                                Offset3d::default(),
                                extent,
                            );
                        });

                        let wait_buffer = Arc::clone(&buffer);
                        self.wait_for_resource(move || wait_buffer.is_in_use(), MapFlags::empty());
                    }

                    let slice = buffer.physical_slice();
                    texture.set_mapped_slice(slice.clone());
                    slice
                };

                MappedSubresource {
                    data: physical,
                    row_pitch,
                    depth_pitch,
                }
            }
        };

        texture.set_mapped_subresource(subresource);
        Ok(mapped)
    }

    pub fn unmap_texture(&mut self, texture: &Arc<Texture>) {
        let Some(subresource) = texture.take_mapped_subresource() else {
            return;
        };

        if texture.map_mode() != TextureMapMode::Buffer {
            return;
        }

        let Some(buffer) = texture.mapped_buffer() else {
            return;
        };

        let desc = texture.desc();
        let info = texture.format_info();
        let mip_level = subresource % desc.mip_levels;
        let array_layer = subresource / desc.mip_levels;
        let extent = texture.mip_extent(mip_level);

        let layers = ImageSubresourceLayers {
            aspects: info.aspects,
            mip_level,
            base_array_layer: array_layer,
            layer_count: 1,
        };

        // The whole level is written back regardless of how it was mapped.
        let src = GpuBufferSlice::new(Arc::clone(buffer), 0, packed_size(&info, extent));
        let image = Arc::clone(texture.image());
        self.emit(move |ctx| {
            ctx.copy_buffer_to_image(image, layers, Offset3d::default(), extent, src);
        });
    }

    // ---------------------------------------------------------------
    // Resource initialization
    // ---------------------------------------------------------------

    fn init_buffer(&self, buffer: &Arc<Buffer>, data: &[u8]) {
        let mut init = self.init_context.lock().unwrap();
        init.context.update_buffer(buffer.slice(), data);
        self.track_init_commands(&mut init, 1);
    }

    fn init_texture(&self, texture: &Arc<Texture>, data: &[SubresourceData]) -> ApiResult<()> {
        let desc = texture.desc();
        let info = texture.format_info();
        let subresources = desc.mip_levels * desc.array_size;

        let mut init = self.init_context.lock().unwrap();

        if !data.is_empty() {
            if data.len() < subresources as usize {
                return Err(ApiError::invalid_arg(format!(
                    "initial data holds {} subresources, texture needs {subresources}",
                    data.len()
                )));
            }

            for layer in 0..desc.array_size {
                for level in 0..desc.mip_levels {
                    let index = calc_subresource(level, layer, desc.mip_levels) as usize;
                    let subresource = &data[index];

                    let layers = ImageSubresourceLayers {
                        aspects: info.aspects,
                        mip_level: level,
                        base_array_layer: layer,
                        layer_count: 1,
                    };

                    init.context.update_image(
                        Arc::clone(texture.image()),
                        layers,
                        Offset3d::default(),
                        texture.mip_extent(level),
                        subresource.data,
                        u64::from(subresource.row_pitch),
                        u64::from(subresource.depth_pitch),
                    );
                }
            }

            self.track_init_commands(&mut init, u64::from(subresources));
        } else {
            // Applications may read textures they never wrote, so fresh
            // images get defined contents.
            let range = ImageSubresourceRange {
                aspects: info.aspects,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: desc.array_size,
            };

            if info.is_compressed() {
                init.context
                    .init_image(Arc::clone(texture.image()), range);
            } else if info.aspects == AspectFlags::COLOR {
                init.context.clear_color_image(
                    Arc::clone(texture.image()),
                    ClearValue::default(),
                    range,
                );
            } else {
                init.context.clear_depth_stencil_image(
                    Arc::clone(texture.image()),
                    ClearValue {
                        depth: 1.0,
                        stencil: 0,
                        ..ClearValue::default()
                    },
                    range,
                );
            }

            self.track_init_commands(&mut init, 1);
        }

        Ok(())
    }

    fn track_init_commands(&self, init: &mut InitContext, count: u64) {
        init.pending_commands += count;
        if init.pending_commands >= INIT_COMMAND_THRESHOLD {
            self.submit_init_commands(init);
        }
    }

    fn submit_init_commands(&self, init: &mut InitContext) {
        let commands = init.context.end_recording();
        self.gpu.submit_command_list(commands);
        init.context.begin_recording(self.gpu.create_command_list());
        init.pending_commands = 0;
    }

    /// Submits any initialization commands that have not gone out yet.
    pub(crate) fn flush_init_context(&self) {
        let mut init = self.init_context.lock().unwrap();
        if init.pending_commands != 0 {
            self.submit_init_commands(&mut init);
        }
    }

    // ---------------------------------------------------------------
    // Command stream
    // ---------------------------------------------------------------

    /// Queues a command for the worker thread, handing off the current
    /// chunk first if it is full.
    pub(crate) fn emit(&mut self, command: impl FnOnce(&mut dyn GpuContext) + Send + 'static) {
        if self.cs_chunk.is_full() {
            self.flush_cs_chunk();
        }
        self.cs_chunk.push(Box::new(command));
    }

    pub(crate) fn flush_cs_chunk(&mut self) {
        if !self.cs_chunk.is_empty() {
            let chunk = std::mem::take(&mut self.cs_chunk);
            self.cs_thread.dispatch(chunk);
            self.cs_is_busy = true;
        }
    }

    /// Submits all pending commands to the backend queue.
    pub fn flush(&mut self) {
        self.flush_init_context();

        if self.cs_is_busy || !self.cs_chunk.is_empty() {
            let gpu = Arc::clone(&self.gpu);
            self.emit(move |ctx| {
                let commands = ctx.end_recording();
                gpu.submit_command_list(commands);
                ctx.begin_recording(gpu.create_command_list());
            });

            self.flush_cs_chunk();

            // The command stream is idle until new commands arrive.
            self.draw_count = 0;
            self.cs_is_busy = false;
        }
    }

    /// Blocks until the worker thread has executed every command queued
    /// so far.
    pub fn synchronize(&mut self) {
        self.flush_cs_chunk();
        self.cs_thread.synchronize();
    }

    /// Waits until `still_in_use` reports false. Returns `false` instead
    /// of waiting when the caller asked not to block and the option
    /// allowing that flag is set.
    pub(crate) fn wait_for_resource(
        &mut self,
        still_in_use: impl Fn() -> bool,
        mut flags: MapFlags,
    ) -> bool {
        if !self.options.test(OptionFlags::ALLOW_MAP_FLAG_NO_WAIT) {
            flags.remove(MapFlags::DO_NOT_WAIT);
        }

        // The wait below can only make progress once pending commands
        // have been handed to the backend.
        self.flush();
        self.synchronize();

        if still_in_use() {
            if flags.contains(MapFlags::DO_NOT_WAIT) {
                return false;
            }

            while still_in_use() {
                std::thread::yield_now();
            }
        }

        true
    }
}

fn resource_bind_flags(resource: &Resource) -> BindFlags {
    match resource {
        Resource::Buffer(buffer) => buffer.desc().bind_flags,
        Resource::Texture(texture) => texture.desc().bind_flags,
    }
}

#[cfg(test)]
mod tests {
    use strato_gpu::trace::TraceDevice;

    use super::*;
    use crate::format::dxgi;
    use crate::query::d3d10::{QUERY_EVENT, QUERY_OCCLUSION_PREDICATE};
    use crate::resource::CpuAccessFlags;

    fn device() -> Device {
        create_device(TraceDevice::new(), "test").unwrap()
    }

    #[test]
    fn state_objects_with_equal_descriptors_are_shared() {
        let device = device();

        let a = device.create_blend_state(None).unwrap();
        let b = device.create_blend_state(Some(&BlendDesc::default())).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &device.default_blend_state));

        let mut desc = BlendDesc::default();
        desc.render_target[0].blend_enable = true;
        let c = device.create_blend_state(Some(&desc)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn shader_modules_deduplicate_on_bytecode() {
        let device = device();

        let a = device.create_vertex_shader(&[1, 2, 3]).unwrap();
        let b = device.create_vertex_shader(&[1, 2, 3]).unwrap();
        let c = device.create_vertex_shader(&[4, 5, 6]).unwrap();

        assert!(Arc::ptr_eq(a.gpu_shader(), b.gpu_shader()));
        assert!(!Arc::ptr_eq(a.gpu_shader(), c.gpu_shader()));

        // The same bytecode compiled for another stage is a new module.
        let d = device.create_pixel_shader(&[1, 2, 3]).unwrap();
        assert!(!Arc::ptr_eq(a.gpu_shader(), d.gpu_shader()));
    }

    #[test]
    fn buffer_contents_round_trip_through_map() {
        let mut device = device();

        let desc = BufferDesc {
            byte_width: 64,
            usage: Usage::Staging,
            bind_flags: BindFlags::empty(),
            cpu_access_flags: CpuAccessFlags::READ | CpuAccessFlags::WRITE,
            misc_flags: Default::default(),
        };
        let data: Vec<u8> = (0..64).collect();
        let buffer = device.create_buffer(&desc, Some(&data)).unwrap();

        let mapped = device
            .map_buffer(&buffer, MapMode::Read, MapFlags::empty())
            .unwrap();
        let mut contents = vec![0u8; 64];
        mapped.data.read(0, &mut contents);
        device.unmap_buffer(&buffer);

        assert_eq!(contents, data);
    }

    #[test]
    fn discard_maps_rename_the_buffer() {
        let mut device = device();

        let desc = BufferDesc {
            byte_width: 16,
            usage: Usage::Dynamic,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            cpu_access_flags: CpuAccessFlags::WRITE,
            misc_flags: Default::default(),
        };
        let buffer = device.create_buffer(&desc, None).unwrap();
        let before = buffer.mapped_slice();

        let mapped = device
            .map_buffer(&buffer, MapMode::WriteDiscard, MapFlags::empty())
            .unwrap();
        device.unmap_buffer(&buffer);

        assert!(!mapped.data.matches(&before));
        assert!(mapped.data.matches(&buffer.mapped_slice()));
    }

    #[test]
    fn texture_upload_is_visible_after_synchronize() {
        let mut device = device();

        let desc = Texture2dDesc {
            width: 4,
            height: 2,
            mip_levels: 1,
            array_size: 1,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            sample_count: 1,
            sample_quality: 0,
            usage: Usage::Staging,
            bind_flags: BindFlags::empty(),
            cpu_access_flags: CpuAccessFlags::READ | CpuAccessFlags::WRITE,
            misc_flags: Default::default(),
        };

        let texel_bytes = 4 * 2 * 4;
        let data: Vec<u8> = (0..texel_bytes as u8).collect();
        let initial = [SubresourceData {
            data: &data,
            row_pitch: 16,
            depth_pitch: 32,
        }];
        let texture = device.create_texture_2d(&desc, &initial).unwrap();

        let mapped = device
            .map_texture(&texture, 0, MapMode::Read, MapFlags::empty())
            .unwrap();
        let mut contents = vec![0u8; texel_bytes];
        mapped.data.read(0, &mut contents);
        device.unmap_texture(&texture);

        assert_eq!(contents, data);
    }

    #[test]
    fn multisample_quality_levels_follow_backend_support() {
        let device = device();

        assert_eq!(
            device
                .check_multisample_quality_levels(dxgi::FORMAT_R8G8B8A8_UNORM, 4)
                .unwrap(),
            1
        );

        assert!(matches!(
            device.check_multisample_quality_levels(dxgi::FORMAT_R8G8B8A8_UNORM, 3),
            Err(ApiError::InvalidArgument(_))
        ));

        assert!(matches!(
            device.check_multisample_quality_levels(dxgi::FORMAT_UNKNOWN, 4),
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn format_support_reports_index_buffer_formats() {
        let device = device();

        let support = device.check_format_support(dxgi::FORMAT_R16_UINT).unwrap();
        assert!(support.contains(FormatSupport::IA_INDEX_BUFFER));
        assert!(support.contains(FormatSupport::IA_VERTEX_BUFFER | FormatSupport::SO_BUFFER));

        let support = device
            .check_format_support(dxgi::FORMAT_R8G8B8A8_UNORM)
            .unwrap();
        assert!(!support.contains(FormatSupport::IA_INDEX_BUFFER));
        assert!(support.contains(FormatSupport::RENDER_TARGET | FormatSupport::TEXTURE2D));

        let support = device
            .check_format_support(dxgi::FORMAT_D24_UNORM_S8_UINT)
            .unwrap();
        assert!(support.contains(FormatSupport::DEPTH_STENCIL));
        assert!(!support.contains(FormatSupport::RENDER_TARGET));
    }

    #[test]
    fn predicates_only_accept_occlusion_predicate_queries() {
        let device = device();

        let desc = QueryDesc {
            query: QUERY_EVENT,
            misc_flags: 0,
        };
        assert!(matches!(
            device.create_predicate(&desc),
            Err(ApiError::InvalidArgument(_))
        ));

        let desc = QueryDesc {
            query: QUERY_OCCLUSION_PREDICATE,
            misc_flags: 0,
        };
        assert!(device.create_predicate(&desc).is_ok());
    }

    #[test]
    fn validation_probes_reject_bad_descriptors_without_creating() {
        let device = device();

        let desc = BufferDesc {
            byte_width: 20,
            usage: Usage::Default,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: Default::default(),
        };
        assert!(matches!(
            device.validate_buffer_desc(&desc),
            Err(ApiError::InvalidArgument(_))
        ));

        let desc = Texture2dDesc {
            width: 16,
            height: 16,
            mip_levels: 1,
            array_size: 1,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            sample_count: 3,
            sample_quality: 0,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: Default::default(),
        };
        assert!(matches!(
            device.validate_texture_2d_desc(&desc),
            Err(ApiError::InvalidArgument(_))
        ));

        let mut desc = desc;
        desc.sample_count = 1;
        assert!(device.validate_texture_2d_desc(&desc).is_ok());
    }

    #[test]
    fn render_target_views_of_buffers_succeed_without_a_backend_view() {
        let device = device();

        let desc = BufferDesc {
            byte_width: 256,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: Default::default(),
        };
        let buffer = device.create_buffer(&desc, None).unwrap();
        let resource = Resource::from(buffer);

        // Titles request these unconditionally; the call succeeds but the
        // view binds nothing.
        let view = device.create_render_target_view(&resource, None).unwrap();
        assert!(view.gpu_view().is_none());
    }

    #[test]
    fn views_require_matching_bind_flags() {
        let device = device();

        let desc = Texture2dDesc {
            width: 16,
            height: 16,
            mip_levels: 1,
            array_size: 1,
            format: dxgi::FORMAT_R8G8B8A8_UNORM,
            sample_count: 1,
            sample_quality: 0,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: Default::default(),
        };
        let texture = device.create_texture_2d(&desc, &[]).unwrap();
        let resource = Resource::from(texture);

        assert!(device.create_shader_resource_view(&resource, None).is_ok());
        assert!(matches!(
            device.create_render_target_view(&resource, None),
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            device.create_depth_stencil_view(&resource, None),
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
