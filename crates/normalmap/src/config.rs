use std::fs;
use std::path::{Path, PathBuf};

use renderer::{RendererConfig, ShaderPaths};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (800, 600);
pub const DEFAULT_TITLE: &str = "Normal Mapping";
pub const DEFAULT_DIFFUSE: &str = "images/brickwall.jpg";
pub const DEFAULT_NORMAL: &str = "images/brickwall_normal.jpg";

const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/normal_mapping");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Demo settings from a TOML file or the command line. Unset fields fall
/// through to the next layer and finally to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    #[serde(default)]
    pub fragment: Option<PathBuf>,
    #[serde(default)]
    pub geometry: Option<PathBuf>,
    #[serde(default)]
    pub diffuse: Option<PathBuf>,
    #[serde(default)]
    pub normal: Option<PathBuf>,
    #[serde(default)]
    pub gamma: Option<bool>,
}

impl DemoConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: DemoConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Loads a config file; relative paths inside it resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = &self.size {
            parse_surface_size(size)?;
        }
        if matches!(&self.title, Some(title) if title.trim().is_empty()) {
            return Err(ConfigError::Invalid("title must not be empty".into()));
        }
        Ok(())
    }

    /// Fields set in `overrides` replace those in `self`.
    pub fn overlay(self, overrides: DemoConfig) -> DemoConfig {
        DemoConfig {
            size: overrides.size.or(self.size),
            title: overrides.title.or(self.title),
            vertex: overrides.vertex.or(self.vertex),
            fragment: overrides.fragment.or(self.fragment),
            geometry: overrides.geometry.or(self.geometry),
            diffuse: overrides.diffuse.or(self.diffuse),
            normal: overrides.normal.or(self.normal),
            gamma: overrides.gamma.or(self.gamma),
        }
    }

    pub fn into_renderer_config(self) -> Result<RendererConfig, ConfigError> {
        self.validate()?;
        let surface_size = match &self.size {
            Some(size) => parse_surface_size(size)?,
            None => DEFAULT_SURFACE_SIZE,
        };
        let mut shaders = ShaderPaths::new(
            self.vertex
                .unwrap_or_else(|| Path::new(SHADER_DIR).join("shader.vert")),
            self.fragment
                .unwrap_or_else(|| Path::new(SHADER_DIR).join("shader.frag")),
        );
        if let Some(geometry) = self.geometry {
            shaders = shaders.with_geometry(geometry);
        }

        Ok(RendererConfig {
            surface_size,
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            shaders,
            diffuse_map: self.diffuse.unwrap_or_else(|| PathBuf::from(DEFAULT_DIFFUSE)),
            normal_map: self.normal.unwrap_or_else(|| PathBuf::from(DEFAULT_NORMAL)),
            gamma_correction: self.gamma.unwrap_or(false),
        })
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.vertex,
            &mut self.fragment,
            &mut self.geometry,
            &mut self.diffuse,
            &mut self.normal,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

pub fn parse_surface_size(input: &str) -> Result<(u32, u32), ConfigError> {
    let trimmed = input.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| ConfigError::Invalid("expected WxH format, e.g. 800x600".into()))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid width in size '{trimmed}'")))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid height in size '{trimmed}'")))?;

    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(
            "surface dimensions must be greater than zero".into(),
        ));
    }

    Ok((width, height))
}
