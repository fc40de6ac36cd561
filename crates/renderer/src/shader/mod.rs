//! GLSL program loading, linking and uniform plumbing.
//!
//! A [`ShaderProgram`] holds the validated IR of a vertex/fragment pair, the
//! name → slot table recovered from it, and a CPU shadow of every uniform
//! block. The GPU side ([`crate::gpu::GpuProgram`]) builds its pipeline from
//! the IR and snapshots the shadow bytes for each draw.

mod link;
mod reflect;
mod stage;
mod uniforms;

use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use wgpu::naga;

use crate::error::{ShaderError, StageTag};

pub use reflect::{
    BlockMember, SamplerSlot, UniformBlock, UniformKind, UniformLayout, UniformLocation,
    BLOCK_GROUP, TEXTURE_GROUP,
};
pub use uniforms::{UniformMismatch, UniformStorage, UniformValue};

pub(crate) use stage::compile_stage;

/// On-disk locations of a program's stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub geometry: Option<PathBuf>,
}

impl ShaderPaths {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: impl Into<PathBuf>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }
}

/// Source text for each stage. Consumed by [`ShaderProgram::compile_and_link`].
#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
    pub geometry: Option<String>,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            geometry: None,
        }
    }

    pub fn read(paths: &ShaderPaths) -> Result<Self, ShaderError> {
        let vertex = read_stage(StageTag::Vertex, &paths.vertex)?;
        let fragment = read_stage(StageTag::Fragment, &paths.fragment)?;
        let geometry = paths
            .geometry
            .as_deref()
            .map(|path| read_stage(StageTag::Geometry, path))
            .transpose()?;
        Ok(Self {
            vertex,
            fragment,
            geometry,
        })
    }
}

fn read_stage(stage: StageTag, path: &Path) -> Result<String, ShaderError> {
    fs::read_to_string(path).map_err(|source| ShaderError::FileRead {
        stage,
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) struct LinkedStages {
    pub vertex: naga::Module,
    pub fragment: naga::Module,
}

/// A compiled and linked vertex/fragment program.
///
/// Setters resolve the uniform by name on every call. A name the program does
/// not declare is ignored without error so callers can push optional
/// uniforms unconditionally; a value whose type disagrees with the
/// declaration is dropped and logged at debug level.
pub struct ShaderProgram {
    label: String,
    stages: Option<LinkedStages>,
    layout: UniformLayout,
    storage: UniformStorage,
}

impl ShaderProgram {
    /// Reads, compiles and links the stages at `paths`.
    pub fn load(label: impl Into<String>, paths: &ShaderPaths) -> Result<Self, ShaderError> {
        let sources = ShaderSources::read(paths)?;
        Self::compile_and_link(label, sources)
    }

    /// Like [`ShaderProgram::load`], but logs any failure and hands back an
    /// unusable program instead. Draws issued with it are skipped.
    pub fn load_or_log(label: impl Into<String>, paths: &ShaderPaths) -> Self {
        let label = label.into();
        match Self::load(label.clone(), paths) {
            Ok(program) => program,
            Err(err) => {
                tracing::error!(
                    program = %label,
                    stage = %err.stage(),
                    error = %err,
                    "shader program unusable"
                );
                Self::unusable(label)
            }
        }
    }

    pub fn compile_and_link(
        label: impl Into<String>,
        sources: ShaderSources,
    ) -> Result<Self, ShaderError> {
        let label = label.into();
        let ShaderSources {
            vertex,
            fragment,
            geometry,
        } = sources;

        if let Some(geometry) = geometry {
            compile_stage(StageTag::Geometry, &geometry)?;
        }
        let vertex = compile_stage(StageTag::Vertex, &vertex)?;
        let fragment = compile_stage(StageTag::Fragment, &fragment)?;
        let layout = link::link(&vertex, &fragment)?;
        let storage = UniformStorage::for_layout(&layout);

        tracing::info!(
            program = %label,
            blocks = layout.blocks().len(),
            textures = layout.samplers().len(),
            "linked shader program"
        );
        Ok(Self {
            label,
            stages: Some(LinkedStages { vertex, fragment }),
            layout,
            storage,
        })
    }

    /// A program with no stages; every setter is a no-op and draws are skipped.
    pub fn unusable(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            stages: None,
            layout: UniformLayout::default(),
            storage: UniformStorage::default(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.stages.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.layout.location(name)
    }

    pub fn storage(&self) -> &UniformStorage {
        &self.storage
    }

    pub(crate) fn stages(&self) -> Option<&LinkedStages> {
        self.stages.as_ref()
    }

    fn set(&mut self, name: &str, value: UniformValue) {
        let Some(location) = self.layout.location(name) else {
            return;
        };
        if let Err(mismatch) = self.storage.write(location, value) {
            tracing::debug!(
                program = %self.label,
                uniform = name,
                expected = mismatch.expected,
                found = mismatch.found,
                "uniform type mismatch; value ignored"
            );
        }
    }

    pub fn read_uniform(&self, name: &str) -> Option<UniformValue> {
        self.layout
            .location(name)
            .and_then(|location| self.storage.read(location))
    }

    /// Texture unit a sampler uniform currently reads from.
    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        match self.layout.location(name)? {
            UniformLocation::Sampler { binding } => Some(self.storage.sampler_unit(binding)),
            UniformLocation::Block { .. } => None,
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, UniformValue::Bool(value));
    }

    /// Sets an `int` uniform. On a sampler this selects the texture unit.
    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set(name, UniformValue::Int(value));
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, UniformValue::Float(value));
    }

    pub fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.set(name, UniformValue::Vec2(value));
    }

    pub fn set_vec2_xy(&mut self, name: &str, x: f32, y: f32) {
        self.set_vec2(name, Vec2::new(x, y));
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set(name, UniformValue::Vec3(value));
    }

    pub fn set_vec3_xyz(&mut self, name: &str, x: f32, y: f32, z: f32) {
        self.set_vec3(name, Vec3::new(x, y, z));
    }

    pub fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.set(name, UniformValue::Vec4(value));
    }

    pub fn set_vec4_xyzw(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.set_vec4(name, Vec4::new(x, y, z, w));
    }

    pub fn set_mat2(&mut self, name: &str, value: Mat2) {
        self.set(name, UniformValue::Mat2(value));
    }

    pub fn set_mat3(&mut self, name: &str, value: Mat3) {
        self.set(name, UniformValue::Mat3(value));
    }

    pub fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.set(name, UniformValue::Mat4(value));
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.label)
            .field("usable", &self.is_usable())
            .field("layout", &self.layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r"#version 450
layout(location = 0) in vec3 aPos;
layout(location = 0) out vec3 vColor;

layout(std140, set = 0, binding = 0) uniform Frame {
    mat4 model;
    vec3 color;
    float scale;
} frame;

void main() {
    vColor = frame.color;
    gl_Position = frame.model * vec4(aPos * frame.scale, 1.0);
}
";

    const FRAGMENT: &str = r"#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 FragColor;

layout(set = 1, binding = 0) uniform texture2D tint;
layout(set = 1, binding = 1) uniform sampler tintSampler;

void main() {
    FragColor = vec4(vColor, 1.0) * texture(sampler2D(tint, tintSampler), vec2(0.5));
}
";

    fn program() -> ShaderProgram {
        ShaderProgram::compile_and_link("test", ShaderSources::new(VERTEX, FRAGMENT)).unwrap()
    }

    #[test]
    fn minimal_pair_yields_usable_program() {
        let program = program();
        assert!(program.is_usable());
        assert!(program.uniform_location("model").is_some());
        assert!(program.uniform_location("frame.scale").is_some());
        assert_eq!(program.texture_unit("tint"), Some(0));
    }

    #[test]
    fn malformed_fragment_reports_fragment_tag() {
        let sources = ShaderSources::new(VERTEX, "#version 450\nvoid main() { undefined_call(); }");
        let err = ShaderProgram::compile_and_link("broken", sources).unwrap_err();
        assert_eq!(err.stage(), StageTag::Fragment);
        assert!(err.to_string().starts_with("FRAGMENT"));
    }

    #[test]
    fn unknown_uniform_is_a_silent_no_op() {
        let mut program = program();
        program.set_vec3_xyz("color", 0.2, 0.4, 0.6);
        program.set_float("scale", 2.0);
        let before = program.storage().block_bytes(0).unwrap().to_vec();

        program.set_float("doesNotExist", 9.0);
        program.set_mat4("alsoMissing", Mat4::IDENTITY);

        assert_eq!(program.storage().block_bytes(0).unwrap(), before.as_slice());
        assert_eq!(
            program.read_uniform("color"),
            Some(UniformValue::Vec3(Vec3::new(0.2, 0.4, 0.6)))
        );
        assert_eq!(program.read_uniform("doesNotExist"), None);
    }

    #[test]
    fn mismatched_setter_leaves_value_unchanged() {
        let mut program = program();
        program.set_float("scale", 1.5);
        program.set_vec2_xy("scale", 3.0, 4.0);
        assert_eq!(program.read_uniform("scale"), Some(UniformValue::Float(1.5)));
    }

    #[test]
    fn set_int_on_sampler_selects_texture_unit() {
        let mut program = program();
        program.set_int("tint", 2);
        assert_eq!(program.texture_unit("tint"), Some(2));
        assert_eq!(program.texture_unit("color"), None);
    }

    #[test]
    fn unusable_program_ignores_everything() {
        let mut program = ShaderProgram::unusable("dead");
        program.set_float("scale", 1.0);
        assert!(!program.is_usable());
        assert_eq!(program.read_uniform("scale"), None);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let vertex = dir.path().join("shader.vert");
        fs::write(&vertex, VERTEX).unwrap();
        let paths = ShaderPaths::new(&vertex, dir.path().join("missing.frag"));

        let err = ShaderProgram::load("files", &paths).unwrap_err();
        assert!(matches!(
            err,
            ShaderError::FileRead {
                stage: StageTag::Fragment,
                ..
            }
        ));

        let fallback = ShaderProgram::load_or_log("files", &paths);
        assert!(!fallback.is_usable());
    }

    #[test]
    fn program_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let vertex = dir.path().join("shader.vert");
        let fragment = dir.path().join("shader.frag");
        fs::write(&vertex, VERTEX).unwrap();
        fs::write(&fragment, FRAGMENT).unwrap();

        let program = ShaderProgram::load_or_log("files", &ShaderPaths::new(&vertex, &fragment));
        assert!(program.is_usable());
        assert_eq!(program.label(), "files");
    }

    #[test]
    fn geometry_stage_is_rejected() {
        let mut sources = ShaderSources::new(VERTEX, FRAGMENT);
        sources.geometry = Some("#version 450\nvoid main() {}".to_string());
        let err = ShaderProgram::compile_and_link("geo", sources).unwrap_err();
        assert_eq!(err.stage(), StageTag::Geometry);
    }
}
