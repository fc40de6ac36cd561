use std::path::PathBuf;

use crate::shader::ShaderPaths;

/// Everything the windowed demo needs to start.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub surface_size: (u32, u32),
    pub title: String,
    pub shaders: ShaderPaths,
    pub diffuse_map: PathBuf,
    pub normal_map: PathBuf,
    /// Upload the diffuse map as sRGB. Normal maps always stay linear.
    pub gamma_correction: bool,
}
