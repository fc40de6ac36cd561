//! wgpu plumbing for linked shader programs.
//!
//! - `context` owns the instance, device and surface, and rebuilds the
//!   swapchain and depth buffer when the window resizes.
//! - `program` turns a [`crate::shader::ShaderProgram`] into a render
//!   pipeline and keeps per-draw uniform snapshots in dynamic-offset arenas.
//! - `frame` records draws against the active program and encodes them into
//!   one render pass.

mod context;
mod frame;
mod program;

pub(crate) use context::GpuContext;
pub(crate) use frame::FrameRecorder;
pub(crate) use program::GpuProgram;
