use anyhow::{Context, Result};
use renderer::Renderer;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::config::DemoConfig;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let file = match &args.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading demo configuration");
            DemoConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => DemoConfig::default(),
    };
    let config = file
        .overlay(args.overrides())
        .into_renderer_config()
        .context("invalid demo settings")?;
    tracing::debug!(
        vertex = %config.shaders.vertex.display(),
        fragment = %config.shaders.fragment.display(),
        diffuse = %config.diffuse_map.display(),
        normal = %config.normal_map.display(),
        gamma = config.gamma_correction,
        "resolved demo settings"
    );

    let renderer = Renderer::new(config);
    if args.check {
        return check(&renderer);
    }
    renderer.run()
}

fn check(renderer: &Renderer) -> Result<()> {
    let program = renderer
        .check_shaders()
        .context("shader check failed")?;
    let mut names: Vec<_> = program.layout().names().collect();
    names.sort_unstable();
    println!("{}: ok", program.label());
    for name in names {
        println!("  {name}");
    }
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
