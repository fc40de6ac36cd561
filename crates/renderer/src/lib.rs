//! Renderer crate for the normal mapping demo.
//!
//! The crate splits into a GPU-free core and the wgpu/winit plumbing that
//! drives it:
//!
//! ```text
//!   CLI / normalmap
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ render_frame()
//!                          │                                   │
//!                          │ ShaderProgram (naga IR, uniforms)  ├─▶ set_mat4("model") ─▶ draw quad
//!                          │ QuadMesh (tangent basis, lazy VBO) └─▶ set_mat4("model") ─▶ draw light
//!                          ▼
//!                     GpuProgram ──▶ FrameRecorder ──▶ surface
//! ```
//!
//! - [`shader`] compiles GLSL with naga, checks the stage interface, and
//!   exposes name-keyed uniform setters over a CPU shadow of every block.
//! - [`tangent`] and [`mesh`] compute the per-face tangent basis and the
//!   interleaved quad vertices.
//! - [`texture`] decodes images, picks the internal format, and uploads mips.
//! - [`camera`], [`input`] and [`scene`] hold per-frame state.
//!
//! Everything except the window path runs without a GPU, which is how the
//! `--check` mode of the binary validates shaders.

pub mod camera;
pub mod error;
mod gpu;
pub mod input;
pub mod mesh;
pub mod scene;
pub mod shader;
pub mod tangent;
pub mod texture;
mod types;
mod window;

use anyhow::Result;

pub use error::{BasisError, ShaderError, StageTag, TextureError};
pub use mesh::{QuadCorners, QuadMesh, QuadVertex, VertexBufferAllocator, QUAD_VERTEX_COUNT};
pub use shader::{ShaderPaths, ShaderProgram, ShaderSources, UniformLocation, UniformValue};
pub use tangent::TangentBasis;
pub use types::RendererConfig;

/// Entry point that owns the demo configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and runs until it is closed or Escape is pressed.
    pub fn run(&self) -> Result<()> {
        window::run_window(self.config.clone())
    }

    /// Reads, compiles and links the configured shaders without touching the
    /// GPU.
    pub fn check_shaders(&self) -> Result<ShaderProgram, ShaderError> {
        ShaderProgram::load("normal mapping", &self.config.shaders)
    }
}
