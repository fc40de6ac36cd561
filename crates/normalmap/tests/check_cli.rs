use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn normalmap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_normalmap"))
        .args(args)
        .env_remove("NORMALMAP_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to launch normalmap")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are valid UTF-8")
}

#[test]
fn bundled_shaders_pass_check() {
    let output = normalmap(&["--check"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "check failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    for name in ["model", "ubo.model", "lightPos", "viewPos", "diffuseMap", "normalMap"] {
        assert!(stdout.contains(name), "missing uniform {name} in:\n{stdout}");
    }
}

#[test]
fn malformed_fragment_is_reported_with_its_stage() {
    let dir = tempfile::tempdir().unwrap();
    let fragment = dir.path().join("broken.frag");
    fs::write(&fragment, "#version 450\nvoid main() { FragColor = ; }\n").unwrap();

    let output = normalmap(&["--check", "--fragment", path_arg(&fragment)]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("FRAGMENT"), "stderr was:\n{stderr}");
}

#[test]
fn unmatched_varying_is_a_link_failure() {
    let dir = tempfile::tempdir().unwrap();
    let fragment = dir.path().join("extra.frag");
    fs::write(
        &fragment,
        r"#version 450
layout(location = 7) in vec3 vMissing;
layout(location = 0) out vec4 FragColor;
void main() {
    FragColor = vec4(vMissing, 1.0);
}
",
    )
    .unwrap();

    let output = normalmap(&["--check", "--fragment", path_arg(&fragment)]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("PROGRAM"), "stderr was:\n{stderr}");
}

#[test]
fn config_file_paths_resolve_next_to_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("missing-stage.toml"), "vertex = \"nowhere.vert\"\n").unwrap();

    let config = dir.path().join("missing-stage.toml");
    let output = normalmap(&["--check", "--config", path_arg(&config)]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("VERTEX"), "stderr was:\n{stderr}");
    assert!(stderr.contains("nowhere.vert"), "stderr was:\n{stderr}");
}

#[test]
fn invalid_size_is_rejected() {
    let output = normalmap(&["--check", "--size", "0x0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("greater than zero"));
}
