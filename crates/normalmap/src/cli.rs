use std::path::PathBuf;

use clap::Parser;

use crate::config::DemoConfig;

#[derive(Parser, Debug, Default)]
#[command(
    name = "normalmap",
    author,
    version,
    about = "Tangent-space normal mapping demo"
)]
pub struct Args {
    /// TOML file with demo settings; command-line flags take precedence.
    #[arg(long, value_name = "PATH", env = "NORMALMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Vertex shader source.
    #[arg(long, value_name = "PATH")]
    pub vertex: Option<PathBuf>,

    /// Fragment shader source.
    #[arg(long, value_name = "PATH")]
    pub fragment: Option<PathBuf>,

    /// Geometry shader source. Accepted for completeness; the wgpu pipeline
    /// rejects it at compile time.
    #[arg(long, value_name = "PATH")]
    pub geometry: Option<PathBuf>,

    /// Diffuse (albedo) texture.
    #[arg(long, value_name = "PATH")]
    pub diffuse: Option<PathBuf>,

    /// Tangent-space normal map.
    #[arg(long, value_name = "PATH")]
    pub normal: Option<PathBuf>,

    /// Upload the diffuse texture as sRGB.
    #[arg(long)]
    pub gamma: bool,

    /// Compile and link the shaders, report the result, and exit.
    #[arg(long)]
    pub check: bool,
}

impl Args {
    /// Settings given on the command line, as an overlay for the config file.
    pub fn overrides(&self) -> DemoConfig {
        DemoConfig {
            size: self.size.clone(),
            title: None,
            vertex: self.vertex.clone(),
            fragment: self.fragment.clone(),
            geometry: self.geometry.clone(),
            diffuse: self.diffuse.clone(),
            normal: self.normal.clone(),
            gamma: self.gamma.then_some(true),
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let args = Args::try_parse_from([
            "normalmap",
            "--size",
            "640x480",
            "--fragment",
            "custom.frag",
            "--gamma",
        ])
        .unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.size.as_deref(), Some("640x480"));
        assert_eq!(overrides.fragment, Some(PathBuf::from("custom.frag")));
        assert_eq!(overrides.vertex, None);
        assert_eq!(overrides.gamma, Some(true));
    }

    #[test]
    fn absent_gamma_flag_defers_to_the_file() {
        let args = Args::try_parse_from(["normalmap", "--check"]).unwrap();
        assert!(args.check);
        assert_eq!(args.overrides().gamma, None);
    }
}
