//! Pipeline state vocabulary shared between the backend traits and the
//! translation layers.
//!
//! These types mirror what an explicit, descriptor-driven GPU API expects:
//! fully decoded enums and packed flag sets, no legacy integer enumerants.

use bitflags::bitflags;

use crate::format::Format;

/// Shader pipeline stage. Only the stages the translation layers bind
/// resources to are represented here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Pixel,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Pixel];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
    MirrorClampToEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
    /// An arbitrary border color, for backends that support it.
    Custom([u32; 4]),
}

/// Assembled primitive type, including the adjacency variants geometry
/// shaders consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    LineListAdjacent,
    LineStripAdjacent,
    TriangleListAdjacent,
    TriangleStripAdjacent,
}

/// Layout an image must be in when accessed by a given binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
}

/// Index element width for indexed draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    Uint16,
    Uint32,
}

/// Memory placement of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageTiling {
    Optimal,
    Linear,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

bitflags! {
    /// Memory property requirements for a resource allocation.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct MemoryFlags: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
        const HOST_CACHED = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_BUFFER = 1 << 2;
        const UNIFORM_TEXEL_BUFFER = 1 << 3;
        const VERTEX_BUFFER = 1 << 4;
        const INDEX_BUFFER = 1 << 5;
        const STREAM_OUTPUT = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const COLOR_ATTACHMENT = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    /// Pipeline stages that may access a resource.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TRANSFER = 1 << 0;
        const HOST = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const GEOMETRY_SHADER = 1 << 4;
        const PIXEL_SHADER = 1 << 5;
        const EARLY_FRAGMENT_TESTS = 1 << 6;
        const LATE_FRAGMENT_TESTS = 1 << 7;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 8;
        const STREAM_OUTPUT = 1 << 9;
    }
}

bitflags! {
    /// Access types performed on a resource by the stages it is used in.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const TRANSFER_READ = 1 << 0;
        const TRANSFER_WRITE = 1 << 1;
        const HOST_READ = 1 << 2;
        const HOST_WRITE = 1 << 3;
        const VERTEX_ATTRIBUTE_READ = 1 << 4;
        const INDEX_READ = 1 << 5;
        const UNIFORM_READ = 1 << 6;
        const SHADER_READ = 1 << 7;
        const COLOR_ATTACHMENT_READ = 1 << 8;
        const COLOR_ATTACHMENT_WRITE = 1 << 9;
        const DEPTH_STENCIL_READ = 1 << 10;
        const DEPTH_STENCIL_WRITE = 1 << 11;
        const STREAM_OUTPUT_WRITE = 1 << 12;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct AspectFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Capabilities a device reports for a [`Format`].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FormatFeatures: u32 {
        const SAMPLED_IMAGE = 1 << 0;
        const COLOR_ATTACHMENT = 1 << 1;
        const COLOR_ATTACHMENT_BLEND = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const UNIFORM_TEXEL_BUFFER = 1 << 4;
        const VERTEX_BUFFER = 1 << 5;
        const LINEAR_TILING = 1 << 6;
        const MULTISAMPLE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ImageCreateFlags: u32 {
        /// 2D array views of this image may be sampled as cube maps.
        const CUBE_COMPATIBLE = 1 << 0;
        /// Slices of this 3D image may be attached as 2D array layers.
        const ARRAY_2D_COMPATIBLE = 1 << 1;
        /// Views may reinterpret the image with a compatible format.
        const MUTABLE_FORMAT = 1 << 2;
    }
}

/// Per-attachment blend configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendMode {
    pub enable_blending: bool,
    pub color_src_factor: BlendFactor,
    pub color_dst_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub alpha_src_factor: BlendFactor,
    pub alpha_dst_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub write_mask: ColorWriteMask,
}

impl Default for BlendMode {
    fn default() -> Self {
        Self {
            enable_blending: false,
            color_src_factor: BlendFactor::One,
            color_dst_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            alpha_src_factor: BlendFactor::One,
            alpha_dst_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            write_mask: ColorWriteMask::all(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultisampleState {
    pub sample_mask: u32,
    pub enable_alpha_to_coverage: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            sample_mask: u32::MAX,
            enable_alpha_to_coverage: false,
        }
    }
}

/// Stencil configuration for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0xFF,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilState {
    pub enable_depth_test: bool,
    pub enable_depth_write: bool,
    pub enable_stencil_test: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_front: StencilOpState,
    pub stencil_back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            enable_depth_test: true,
            enable_depth_write: true,
            enable_stencil_test: false,
            depth_compare_op: CompareOp::Less,
            stencil_front: StencilOpState::default(),
            stencil_back: StencilOpState::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub enable_depth_clamp: bool,
    pub enable_depth_bias: bool,
    pub depth_bias: DepthBias,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            enable_depth_clamp: false,
            enable_depth_bias: false,
            depth_bias: DepthBias::default(),
        }
    }
}

/// Viewport rectangle with explicit depth range. A negative `height` flips
/// the Y axis, which is how top-left-origin APIs are mapped onto a
/// bottom-left-origin backend.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Immutable sampler configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerCreateInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub enable_anisotropy: bool,
    pub max_anisotropy: f32,
    pub enable_compare: bool,
    pub compare_op: CompareOp,
    pub border_color: BorderColor,
}

/// One vertex attribute read by the vertex stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputAttribute {
    /// Shader input register the attribute feeds.
    pub location: u32,
    /// Vertex buffer binding slot the data comes from.
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRate {
    PerVertex,
    PerInstance,
}

/// One vertex buffer binding slot. The stride is dynamic state supplied at
/// buffer bind time, not part of the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputBinding {
    pub binding: u32,
    pub input_rate: InputRate,
    /// Instances sharing one element when `input_rate` is per-instance.
    pub step_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub enable_primitive_restart: bool,
}

/// Clear payload for render target and image clears. Only the fields
/// matching the cleared aspects are meaningful.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClearValue {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}
