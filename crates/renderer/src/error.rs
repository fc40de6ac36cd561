use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Identifies which part of a program a diagnostic belongs to.
///
/// The `Display` form matches the tags printed by the classic GL loaders
/// (`VERTEX`, `FRAGMENT`, `GEOMETRY`, `PROGRAM`) so log scrapers keep working.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageTag {
    Vertex,
    Fragment,
    Geometry,
    Program,
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageTag::Vertex => f.write_str("VERTEX"),
            StageTag::Fragment => f.write_str("FRAGMENT"),
            StageTag::Geometry => f.write_str("GEOMETRY"),
            StageTag::Program => f.write_str("PROGRAM"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read {stage} shader source at {path}")]
    FileRead {
        stage: StageTag,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} shader failed to compile:\n{message}")]
    Compile { stage: StageTag, message: String },

    #[error("PROGRAM failed to link: {message}")]
    Link { message: String },
}

impl ShaderError {
    /// Stage tag attached to the failure; link failures report `PROGRAM`.
    pub fn stage(&self) -> StageTag {
        match self {
            ShaderError::FileRead { stage, .. } | ShaderError::Compile { stage, .. } => *stage,
            ShaderError::Link { .. } => StageTag::Program,
        }
    }

    pub(crate) fn link(message: impl Into<String>) -> Self {
        ShaderError::Link {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("texture failed to load at path: {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported channel count {channels}; expected 1, 3 or 4")]
    UnsupportedChannels { channels: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum BasisError {
    #[error("degenerate UV mapping (determinant {determinant}); tangent basis is undefined")]
    Degenerate { determinant: f32 },
}
