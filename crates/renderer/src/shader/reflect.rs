//! Resource reflection over validated naga modules.
//!
//! Resource conventions shared by every program:
//!
//! - bind group 0 holds `uniform` blocks (std140); each block gets its own
//!   binding and is fed through a dynamic offset.
//! - bind group 1 holds `texture2D` / `sampler` pairs; a texture sits on an
//!   even binding `2k` and its sampler on `2k + 1`.

use std::collections::{BTreeMap, HashMap};

use wgpu::naga;

use crate::error::ShaderError;

pub const BLOCK_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

/// Value shapes a uniform block member can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Int,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformKind {
    fn from_naga(inner: &naga::TypeInner) -> Option<Self> {
        use naga::{ScalarKind, TypeInner, VectorSize};

        match *inner {
            TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
                ScalarKind::Sint => Some(UniformKind::Int),
                ScalarKind::Uint => Some(UniformKind::Uint),
                ScalarKind::Float => Some(UniformKind::Float),
                _ => None,
            },
            TypeInner::Vector { size, scalar }
                if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
            {
                Some(match size {
                    VectorSize::Bi => UniformKind::Vec2,
                    VectorSize::Tri => UniformKind::Vec3,
                    VectorSize::Quad => UniformKind::Vec4,
                })
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } if scalar.width == 4 && columns == rows => Some(match columns {
                VectorSize::Bi => UniformKind::Mat2,
                VectorSize::Tri => UniformKind::Mat3,
                VectorSize::Quad => UniformKind::Mat4,
            }),
            _ => None,
        }
    }

    /// Bytes occupied inside a block, following naga's layout rules.
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Int | UniformKind::Uint | UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat2 | UniformKind::Mat3 | UniformKind::Mat4 => {
                self.column_stride() * self.columns()
            }
        }
    }

    pub(crate) fn columns(self) -> u32 {
        match self {
            UniformKind::Mat2 => 2,
            UniformKind::Mat3 => 3,
            UniformKind::Mat4 => 4,
            _ => 1,
        }
    }

    /// Distance between matrix columns; two-row columns pack to 8 bytes,
    /// three- and four-row columns align to 16.
    pub(crate) fn column_stride(self) -> u32 {
        match self {
            UniformKind::Mat2 => 8,
            UniformKind::Mat3 | UniformKind::Mat4 => 16,
            other => other.size(),
        }
    }
}

/// Resolved slot of a named uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformLocation {
    /// Member of the uniform block at `binding` in group 0.
    Block {
        binding: u32,
        offset: u32,
        kind: UniformKind,
    },
    /// Texture at `binding` in group 1; its value is a texture unit.
    Sampler { binding: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockMember {
    pub name: String,
    pub offset: u32,
    /// `None` for shapes the setters cannot address (arrays, nested structs).
    pub kind: Option<UniformKind>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformBlock {
    pub name: String,
    pub instance: Option<String>,
    pub binding: u32,
    pub size: u32,
    pub members: Vec<BlockMember>,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SamplerSlot {
    pub name: String,
    pub texture_binding: u32,
    pub sampler_binding: u32,
    pub visibility: wgpu::ShaderStages,
}

/// Resources declared by a single stage.
#[derive(Clone, Debug, Default)]
pub(crate) struct StageResources {
    pub blocks: Vec<UniformBlock>,
    pub samplers: Vec<SamplerSlot>,
}

pub(crate) fn reflect_stage(
    module: &naga::Module,
    visibility: wgpu::ShaderStages,
) -> Result<StageResources, ShaderError> {
    let mut resources = StageResources::default();
    let mut textures = BTreeMap::new();
    let mut samplers = BTreeMap::new();

    for (_, variable) in module.global_variables.iter() {
        let ty = &module.types[variable.ty];
        let label = variable
            .name
            .clone()
            .or_else(|| ty.name.clone())
            .unwrap_or_else(|| "<unnamed>".to_string());

        match variable.space {
            naga::AddressSpace::Uniform => {
                let binding = require_binding(variable, &label, BLOCK_GROUP, "uniform blocks")?;
                let naga::TypeInner::Struct { ref members, span } = ty.inner else {
                    return Err(ShaderError::link(format!(
                        "uniform `{label}` must be declared inside a uniform block"
                    )));
                };
                let members = members
                    .iter()
                    .filter_map(|member| {
                        let name = member.name.clone()?;
                        let kind = UniformKind::from_naga(&module.types[member.ty].inner);
                        if kind.is_none() {
                            tracing::trace!(block = %label, member = %name, "uniform member has no setter");
                        }
                        Some(BlockMember {
                            name,
                            offset: member.offset,
                            kind,
                        })
                    })
                    .collect();
                let block_name = ty.name.clone().unwrap_or_else(|| label.clone());
                let instance = variable.name.clone().filter(|name| *name != block_name);
                resources.blocks.push(UniformBlock {
                    name: block_name,
                    instance,
                    binding,
                    size: span,
                    members,
                    visibility,
                });
            }
            naga::AddressSpace::Handle => {
                let binding = require_binding(variable, &label, TEXTURE_GROUP, "textures and samplers")?;
                match ty.inner {
                    naga::TypeInner::Image {
                        dim: naga::ImageDimension::D2,
                        arrayed: false,
                        class: naga::ImageClass::Sampled { multi: false, .. },
                    } => {
                        textures.insert(binding, label);
                    }
                    naga::TypeInner::Sampler { comparison: false } => {
                        samplers.insert(binding, label);
                    }
                    _ => {
                        return Err(ShaderError::link(format!(
                            "resource `{label}` is not a 2D texture or filtering sampler"
                        )))
                    }
                }
            }
            naga::AddressSpace::Private | naga::AddressSpace::WorkGroup => {}
            other => {
                return Err(ShaderError::link(format!(
                    "resource `{label}` uses unsupported address space {other:?}"
                )))
            }
        }
    }

    for (binding, name) in textures {
        if binding % 2 != 0 {
            return Err(ShaderError::link(format!(
                "texture `{name}` must use an even binding in set {TEXTURE_GROUP}, found {binding}"
            )));
        }
        if samplers.remove(&(binding + 1)).is_none() {
            return Err(ShaderError::link(format!(
                "texture `{name}` at binding {binding} has no sampler at binding {}",
                binding + 1
            )));
        }
        resources.samplers.push(SamplerSlot {
            name,
            texture_binding: binding,
            sampler_binding: binding + 1,
            visibility,
        });
    }
    if let Some((binding, name)) = samplers.into_iter().next() {
        return Err(ShaderError::link(format!(
            "sampler `{name}` at binding {binding} is not paired with a texture"
        )));
    }

    resources.blocks.sort_by_key(|block| block.binding);
    Ok(resources)
}

fn require_binding(
    variable: &naga::GlobalVariable,
    label: &str,
    group: u32,
    what: &str,
) -> Result<u32, ShaderError> {
    match variable.binding {
        Some(naga::ResourceBinding { group: found, binding }) if found == group => Ok(binding),
        Some(naga::ResourceBinding { group: found, .. }) => Err(ShaderError::link(format!(
            "`{label}` is in set {found}; {what} belong in set {group}"
        ))),
        None => Err(ShaderError::link(format!(
            "`{label}` has no layout(set, binding) qualifier"
        ))),
    }
}

/// Name → slot table for a linked program.
///
/// Lookups return `None` for names the program does not declare; setters
/// treat that as "nothing to do", which lets callers push optional uniforms
/// without checking first.
#[derive(Clone, Debug, Default)]
pub struct UniformLayout {
    entries: HashMap<String, UniformLocation>,
    blocks: Vec<UniformBlock>,
    samplers: Vec<SamplerSlot>,
}

impl UniformLayout {
    pub(crate) fn new(blocks: Vec<UniformBlock>, samplers: Vec<SamplerSlot>) -> Self {
        let mut entries = HashMap::new();
        for block in &blocks {
            for member in &block.members {
                let Some(kind) = member.kind else { continue };
                let location = UniformLocation::Block {
                    binding: block.binding,
                    offset: member.offset,
                    kind,
                };
                if let Some(instance) = &block.instance {
                    entries.insert(format!("{instance}.{}", member.name), location);
                }
                if entries.contains_key(&member.name) {
                    tracing::debug!(
                        uniform = %member.name,
                        block = %block.name,
                        "uniform name already bound by an earlier block; use the qualified name"
                    );
                    continue;
                }
                entries.insert(member.name.clone(), location);
            }
        }
        for slot in &samplers {
            if entries.contains_key(&slot.name) {
                tracing::debug!(
                    sampler = %slot.name,
                    "sampler name already bound by a block member; keeping the member"
                );
                continue;
            }
            entries.insert(
                slot.name.clone(),
                UniformLocation::Sampler {
                    binding: slot.texture_binding,
                },
            );
        }

        Self {
            entries,
            blocks,
            samplers,
        }
    }

    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.entries.get(name).copied()
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    pub fn samplers(&self) -> &[SamplerSlot] {
        &self.samplers
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
