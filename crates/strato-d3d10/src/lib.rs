//! `strato-d3d10` translates the legacy Direct3D 10.1 interface onto the
//! explicit backend API in `strato-gpu`.
//!
//! Currently this crate provides:
//! - Device and resource creation with descriptor validation and
//!   deduplicated pipeline state objects (see [`Device`]).
//! - The immediate rendering context: pipeline binding with redundant
//!   state elimination, draws, copies, clears and queries.
//! - Legacy descriptor and enum decoding for formats, blend,
//!   depth-stencil, rasterizer and sampler state (the `d3d10` and
//!   `dxgi` constant modules mirror the original numeric encodings).
//! - CPU access to resources through map, unmap and update operations.

mod context;
mod state_cache;

pub mod blend;
pub mod buffer;
pub mod depth_stencil;
pub mod device;
pub mod error;
pub mod format;
pub mod input_layout;
pub mod options;
pub mod query;
pub mod rasterizer;
pub mod resource;
pub mod sampler;
pub mod shader;
pub mod state;
pub mod texture;
pub mod view;

pub use blend::{BlendDesc, BlendState, RenderTargetBlendDesc};
pub use buffer::{Buffer, BufferDesc};
pub use depth_stencil::{DepthStencilDesc, DepthStencilState, StencilOpDesc};
pub use device::{create_device, Device, FormatSupport};
pub use error::{ApiError, ApiResult};
pub use input_layout::{InputElementDesc, InputLayout};
pub use options::{OptionFlags, Options};
pub use query::{GetDataFlags, Query, QueryDesc, QueryResult};
pub use rasterizer::{RasterizerDesc, RasterizerState};
pub use resource::{
    calc_subresource, BindFlags, CpuAccessFlags, MapFlags, MapMode, MappedSubresource, MiscFlags,
    Resource, ResourceBox, ResourceDimension, SubresourceData, Usage,
};
pub use sampler::{SamplerDesc, SamplerState};
pub use shader::{
    CompileError, GeometryShader, InputSignature, PassthroughCompiler, PixelShader,
    ShaderCompiler, SignatureEntry, SoDeclarationEntry, VertexShader,
};
pub use state::{
    ConstantBufferBinding, IndexBufferBinding, Rect, SoTargetBinding, VertexBufferBinding,
    Viewport,
};
pub use texture::{CommonTextureDesc, Texture, Texture1dDesc, Texture2dDesc, Texture3dDesc};
pub use view::{
    DepthStencilView, DsvDesc, DsvDimension, RenderTargetView, RtvDesc, RtvDimension,
    ShaderResourceView, SrvDesc, SrvDimension,
};
