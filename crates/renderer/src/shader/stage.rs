use wgpu::naga;

use crate::error::{ShaderError, StageTag};

/// Parses GLSL for one pipeline stage and validates the resulting module.
///
/// The source text is only borrowed; nothing of it is retained beyond the
/// returned IR.
pub(crate) fn compile_stage(stage: StageTag, source: &str) -> Result<naga::Module, ShaderError> {
    let naga_stage = match stage {
        StageTag::Vertex => naga::ShaderStage::Vertex,
        StageTag::Fragment => naga::ShaderStage::Fragment,
        StageTag::Geometry => {
            return Err(ShaderError::Compile {
                stage,
                message: "geometry shaders are not supported by the wgpu pipeline".to_string(),
            })
        }
        StageTag::Program => {
            return Err(ShaderError::Compile {
                stage,
                message: "PROGRAM is not a compilable stage".to_string(),
            })
        }
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga_stage);
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| ShaderError::Compile {
            stage,
            message: errors.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|error| ShaderError::Compile {
            stage,
            message: error.emit_to_string(source),
        })?;

    tracing::debug!(%stage, entry_points = module.entry_points.len(), "compiled shader stage");
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_source_is_tagged_with_its_stage() {
        let err = compile_stage(StageTag::Fragment, "#version 450\nvoid main( {").unwrap_err();
        match err {
            ShaderError::Compile { stage, message } => {
                assert_eq!(stage, StageTag::Fragment);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn geometry_stage_is_rejected() {
        let err = compile_stage(StageTag::Geometry, "#version 450\nvoid main() {}").unwrap_err();
        assert_eq!(err.stage(), StageTag::Geometry);
    }

    #[test]
    fn minimal_vertex_stage_compiles() {
        let module = compile_stage(
            StageTag::Vertex,
            "#version 450\nvoid main() { gl_Position = vec4(0.0, 0.0, 0.0, 1.0); }\n",
        )
        .unwrap();
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.entry_points[0].stage, naga::ShaderStage::Vertex);
    }
}
