//! `strato-gpu` is the backend abstraction the Strato translation layers
//! run on.
//!
//! Currently this crate provides:
//! - Device, context and resource traits modelling an explicit GPU API
//!   (see [`GpuDevice`] and [`GpuContext`]).
//! - Pipeline and binding state types shared by all backends (see [`state`]).
//! - Format metadata and mip arithmetic (see [`format`]).
//! - The command stream worker that replays deferred commands on a
//!   dedicated thread (see [`CsThread`]).
//! - A pooled allocator for transient upload payloads (see [`DataAllocator`]).
//! - An in-memory recording backend for tests (see [`trace::TraceDevice`]).

mod context;
mod cs;
mod data;
mod device;
mod resource;

pub mod format;
pub mod state;
pub mod trace;

pub use context::{GpuCommandList, GpuContext, RenderAttachment, RenderTargets};
pub use cs::{CsChunk, CsCommand, CsThread};
pub use data::{DataAllocator, DataSlice};
pub use device::{GpuDevice, GpuError};
pub use resource::{
    BufferCreateInfo, BufferViewCreateInfo, GpuAllocation, GpuBuffer, GpuBufferSlice,
    GpuBufferView, GpuImage, GpuImageView, GpuPhysicalSlice, GpuQuery, GpuSampler, GpuShader,
    ImageCreateInfo, ImageSubresourceLayers, ImageSubresourceRange, ImageType, ImageViewCreateInfo,
    ImageViewType, PipelineStatistics, QueryData, QueryKind, ShaderResource, SubresourceLayout,
};
