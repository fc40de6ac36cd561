use std::collections::BTreeMap;

use wgpu::naga;

use super::reflect::{reflect_stage, SamplerSlot, UniformBlock, UniformLayout};
use crate::error::ShaderError;

/// Shape of a user-defined stage varying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Varying {
    kind: naga::ScalarKind,
    components: u32,
}

impl Varying {
    fn from_naga(inner: &naga::TypeInner) -> Option<Self> {
        match *inner {
            naga::TypeInner::Scalar(scalar) => Some(Self {
                kind: scalar.kind,
                components: 1,
            }),
            naga::TypeInner::Vector { size, scalar } => Some(Self {
                kind: scalar.kind,
                components: size as u32,
            }),
            _ => None,
        }
    }
}

/// Checks the vertex → fragment interface and merges both stages' resources
/// into one uniform layout.
pub(crate) fn link(
    vertex: &naga::Module,
    fragment: &naga::Module,
) -> Result<UniformLayout, ShaderError> {
    check_interface(vertex, fragment)?;

    let vertex_resources = reflect_stage(vertex, wgpu::ShaderStages::VERTEX)?;
    let fragment_resources = reflect_stage(fragment, wgpu::ShaderStages::FRAGMENT)?;

    let blocks = merge_blocks(vertex_resources.blocks, fragment_resources.blocks)?;
    let samplers = merge_samplers(vertex_resources.samplers, fragment_resources.samplers)?;
    Ok(UniformLayout::new(blocks, samplers))
}

fn check_interface(vertex: &naga::Module, fragment: &naga::Module) -> Result<(), ShaderError> {
    let outputs = {
        let entry = entry_point(vertex, naga::ShaderStage::Vertex)?;
        let mut outputs = BTreeMap::new();
        if let Some(result) = &entry.function.result {
            collect_locations(vertex, result.ty, result.binding.as_ref(), &mut outputs);
        }
        outputs
    };

    let inputs = {
        let entry = entry_point(fragment, naga::ShaderStage::Fragment)?;
        let mut inputs = BTreeMap::new();
        for argument in &entry.function.arguments {
            collect_locations(fragment, argument.ty, argument.binding.as_ref(), &mut inputs);
        }
        inputs
    };

    for (location, input) in &inputs {
        match outputs.get(location) {
            Some(output) if output == input => {}
            Some(output) => {
                return Err(ShaderError::link(format!(
                    "fragment input at location {location} is {input:?} but the vertex stage writes {output:?}"
                )))
            }
            None => {
                return Err(ShaderError::link(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                )))
            }
        }
    }

    tracing::trace!(
        vertex_outputs = outputs.len(),
        fragment_inputs = inputs.len(),
        "stage interface matched"
    );
    Ok(())
}

fn entry_point(
    module: &naga::Module,
    stage: naga::ShaderStage,
) -> Result<&naga::EntryPoint, ShaderError> {
    module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage)
        .ok_or_else(|| ShaderError::link(format!("no {stage:?} entry point")))
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeMap<u32, Varying>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            if let Some(varying) = Varying::from_naga(inner) {
                out.insert(*location, varying);
            }
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn merge_blocks(
    vertex: Vec<UniformBlock>,
    fragment: Vec<UniformBlock>,
) -> Result<Vec<UniformBlock>, ShaderError> {
    let mut merged: BTreeMap<u32, UniformBlock> = BTreeMap::new();
    for block in vertex.into_iter().chain(fragment) {
        match merged.get_mut(&block.binding) {
            Some(existing) => {
                if existing.members != block.members || existing.size != block.size {
                    return Err(ShaderError::link(format!(
                        "uniform block `{}` at binding {} differs between stages",
                        block.name, block.binding
                    )));
                }
                existing.visibility |= block.visibility;
            }
            None => {
                merged.insert(block.binding, block);
            }
        }
    }
    Ok(merged.into_values().collect())
}

fn merge_samplers(
    vertex: Vec<SamplerSlot>,
    fragment: Vec<SamplerSlot>,
) -> Result<Vec<SamplerSlot>, ShaderError> {
    let mut merged: BTreeMap<u32, SamplerSlot> = BTreeMap::new();
    for slot in vertex.into_iter().chain(fragment) {
        match merged.get_mut(&slot.texture_binding) {
            Some(existing) => {
                if existing.name != slot.name {
                    return Err(ShaderError::link(format!(
                        "texture binding {} is `{}` in one stage and `{}` in another",
                        slot.texture_binding, existing.name, slot.name
                    )));
                }
                existing.visibility |= slot.visibility;
            }
            None => {
                merged.insert(slot.texture_binding, slot);
            }
        }
    }
    Ok(merged.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageTag;
    use crate::shader::stage::compile_stage;

    fn compile_pair(vertex: &str, fragment: &str) -> (naga::Module, naga::Module) {
        (
            compile_stage(StageTag::Vertex, vertex).unwrap(),
            compile_stage(StageTag::Fragment, fragment).unwrap(),
        )
    }

    const VERTEX: &str = r"#version 450
layout(location = 0) in vec3 aPos;
layout(location = 0) out vec2 vUv;
layout(location = 1) out vec3 vNormal;

layout(std140, set = 0, binding = 0) uniform Shared {
    mat4 model;
    vec4 tint;
} shared_block;

void main() {
    vUv = aPos.xy;
    vNormal = vec3(0.0, 0.0, 1.0);
    gl_Position = shared_block.model * vec4(aPos, 1.0);
}
";

    #[test]
    fn matching_stages_link_and_share_blocks() {
        let fragment = r"#version 450
layout(location = 0) in vec2 vUv;
layout(location = 1) in vec3 vNormal;
layout(location = 0) out vec4 FragColor;

layout(std140, set = 0, binding = 0) uniform Shared {
    mat4 model;
    vec4 tint;
} shared_block;

void main() {
    FragColor = shared_block.tint * vec4(vNormal * vUv.x, 1.0);
}
";
        let (vertex, fragment) = compile_pair(VERTEX, fragment);
        let layout = link(&vertex, &fragment).unwrap();

        assert_eq!(layout.blocks().len(), 1);
        assert_eq!(
            layout.blocks()[0].visibility,
            wgpu::ShaderStages::VERTEX_FRAGMENT
        );
        assert!(layout.location("tint").is_some());
    }

    #[test]
    fn missing_vertex_output_fails_to_link() {
        let fragment = r"#version 450
layout(location = 5) in vec3 vExtra;
layout(location = 0) out vec4 FragColor;
void main() {
    FragColor = vec4(vExtra, 1.0);
}
";
        let (vertex, fragment) = compile_pair(VERTEX, fragment);
        let err = link(&vertex, &fragment).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert!(err.to_string().contains("location 5"));
    }

    #[test]
    fn mismatched_varying_type_fails_to_link() {
        let fragment = r"#version 450
layout(location = 0) in vec3 vUv;
layout(location = 0) out vec4 FragColor;
void main() {
    FragColor = vec4(vUv, 1.0);
}
";
        let (vertex, fragment) = compile_pair(VERTEX, fragment);
        assert!(matches!(
            link(&vertex, &fragment),
            Err(ShaderError::Link { .. })
        ));
    }

    #[test]
    fn conflicting_block_layouts_fail_to_link() {
        let fragment = r"#version 450
layout(location = 0) out vec4 FragColor;

layout(std140, set = 0, binding = 0) uniform Shared {
    vec4 tint;
} shared_block;

void main() {
    FragColor = shared_block.tint;
}
";
        let (vertex, fragment) = compile_pair(VERTEX, fragment);
        let err = link(&vertex, &fragment).unwrap_err();
        assert_eq!(err.stage(), StageTag::Program);
    }
}
