use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::ShaderError;
use crate::shader::{SamplerSlot, ShaderProgram, UniformBlock};
use crate::texture::{Texture, TextureUnits};

use super::context::DEPTH_FORMAT;

/// Texture bind groups kept across frames before the cache is dropped.
const TEXTURE_GROUP_CACHE_LIMIT: usize = 32;
const INITIAL_ARENA_SLOTS: u64 = 4;

/// CPU side of a uniform arena: one stride-aligned slot per draw.
#[derive(Clone, Debug)]
struct UniformStaging {
    block_size: u64,
    stride: u64,
    bytes: Vec<u8>,
}

impl UniformStaging {
    fn new(block_size: u64, alignment: u64) -> Self {
        let block_size = block_size.max(1);
        let alignment = alignment.max(1);
        Self {
            block_size,
            stride: block_size.div_ceil(alignment) * alignment,
            bytes: Vec::new(),
        }
    }

    /// Appends a snapshot and returns its dynamic offset. At most
    /// `block_size` bytes are copied; the rest of the slot stays zeroed.
    fn push(&mut self, snapshot: &[u8]) -> u32 {
        let offset = self.bytes.len();
        self.bytes.resize(offset + self.stride as usize, 0);
        let len = snapshot.len().min(self.block_size as usize);
        self.bytes[offset..offset + len].copy_from_slice(&snapshot[..len]);
        offset as u32
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }

    fn initial_capacity(&self) -> u64 {
        self.stride * INITIAL_ARENA_SLOTS
    }

    /// Buffer size needed when the staged bytes outgrow `capacity`.
    fn growth_target(&self, capacity: u64) -> Option<u64> {
        let needed = self.bytes.len() as u64;
        (needed > capacity).then(|| needed.next_power_of_two().max(self.initial_capacity()))
    }
}

/// Per-block GPU buffer fed from a [`UniformStaging`].
struct UniformArena {
    binding: u32,
    staging: UniformStaging,
    buffer: wgpu::Buffer,
}

impl UniformArena {
    fn new(device: &wgpu::Device, block: &UniformBlock, alignment: u64) -> Self {
        let staging = UniformStaging::new(u64::from(block.size), alignment);
        let buffer = create_arena_buffer(device, &block.name, staging.initial_capacity());
        Self {
            binding: block.binding,
            staging,
            buffer,
        }
    }

    /// Uploads staged snapshots; returns `true` when the buffer was replaced.
    fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> bool {
        let mut grown = false;
        if let Some(size) = self.staging.growth_target(self.buffer.size()) {
            tracing::debug!(block = label, size, "growing uniform arena");
            self.buffer = create_arena_buffer(device, label, size);
            grown = true;
        }
        if !self.staging.bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staging.bytes);
        }
        grown
    }
}

fn create_arena_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{label} uniform arena")),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Uniform offsets and texture selection captured for one draw.
pub(crate) struct DrawBindings {
    pub dynamic_offsets: Vec<u32>,
    pub texture_key: Vec<u64>,
}

/// GPU half of a [`ShaderProgram`]: render pipeline plus the buffers and bind
/// groups that feed it.
pub(crate) struct GpuProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    block_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    arenas: Vec<UniformArena>,
    block_group: wgpu::BindGroup,
    samplers: Vec<SamplerSlot>,
    placeholder: Texture,
    texture_groups: HashMap<Vec<u64>, wgpu::BindGroup>,
}

impl GpuProgram {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        program: &ShaderProgram,
        color_format: wgpu::TextureFormat,
        vertex_layout: wgpu::VertexBufferLayout<'_>,
    ) -> Result<Self, ShaderError> {
        let stages = program.stages().ok_or_else(|| {
            ShaderError::link(format!("program `{}` has no linked stages", program.label()))
        })?;
        let label = program.label().to_string();
        let layout = program.layout();

        let block_entries: Vec<_> = layout
            .blocks()
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: block.visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(u64::from(block.size)),
                },
                count: None,
            })
            .collect();
        let block_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform block layout"),
            entries: &block_entries,
        });

        let mut texture_entries = Vec::with_capacity(layout.samplers().len() * 2);
        for slot in layout.samplers() {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.texture_binding,
                visibility: slot.visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.sampler_binding,
                visibility: slot.visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &[&block_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} vertex")),
            source: wgpu::ShaderSource::Naga(Cow::Owned(stages.vertex.clone())),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} fragment")),
            source: wgpu::ShaderSource::Naga(Cow::Owned(stages.fragment.clone())),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[vertex_layout],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::link(format!(
                "pipeline creation for `{label}` failed: {error}"
            )));
        }

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let arenas: Vec<_> = layout
            .blocks()
            .iter()
            .map(|block| UniformArena::new(device, block, alignment))
            .collect();
        let block_group = create_block_group(device, &block_layout, &arenas);
        let placeholder = Texture::placeholder(device, queue, "unbound texture unit");

        tracing::debug!(program = %label, blocks = arenas.len(), "created GPU program");
        Ok(Self {
            label,
            pipeline,
            block_layout,
            texture_layout,
            arenas,
            block_group,
            samplers: layout.samplers().to_vec(),
            placeholder,
            texture_groups: HashMap::new(),
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub(crate) fn block_group(&self) -> &wgpu::BindGroup {
        &self.block_group
    }

    pub(crate) fn texture_group(&self, key: &[u64]) -> Option<&wgpu::BindGroup> {
        self.texture_groups.get(key)
    }

    /// Drops last frame's snapshots.
    pub(crate) fn begin_frame(&mut self) {
        for arena in &mut self.arenas {
            arena.staging.clear();
        }
        if self.texture_groups.len() > TEXTURE_GROUP_CACHE_LIMIT {
            self.texture_groups.clear();
        }
    }

    /// Snapshots `program`'s uniforms and resolves its sampler units.
    pub(crate) fn prepare_draw(
        &mut self,
        device: &wgpu::Device,
        program: &ShaderProgram,
        units: &TextureUnits,
    ) -> DrawBindings {
        let storage = program.storage();
        let dynamic_offsets = self
            .arenas
            .iter_mut()
            .map(|arena| {
                let bytes = storage.block_bytes(arena.binding).unwrap_or(&[]);
                arena.staging.push(bytes)
            })
            .collect();

        let textures: Vec<&Texture> = self
            .samplers
            .iter()
            .map(|slot| {
                units
                    .get(storage.sampler_unit(slot.texture_binding))
                    .unwrap_or(&self.placeholder)
            })
            .collect();
        let texture_key: Vec<u64> = textures.iter().map(|texture| texture.id).collect();

        if !self.texture_groups.contains_key(&texture_key) {
            let mut entries = Vec::with_capacity(self.samplers.len() * 2);
            for (slot, texture) in self.samplers.iter().zip(&textures) {
                entries.push(wgpu::BindGroupEntry {
                    binding: slot.texture_binding,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: slot.sampler_binding,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
            let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("texture bind group"),
                layout: &self.texture_layout,
                entries: &entries,
            });
            self.texture_groups.insert(texture_key.clone(), group);
        }

        DrawBindings {
            dynamic_offsets,
            texture_key,
        }
    }

    /// Uploads this frame's snapshots, rebuilding the block bind group if an
    /// arena had to grow.
    pub(crate) fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut rebuild = false;
        for arena in &mut self.arenas {
            rebuild |= arena.flush(device, queue, &self.label);
        }
        if rebuild {
            self.block_group = create_block_group(device, &self.block_layout, &self.arenas);
        }
    }
}

fn create_block_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    arenas: &[UniformArena],
) -> wgpu::BindGroup {
    let entries: Vec<_> = arenas
        .iter()
        .map(|arena| wgpu::BindGroupEntry {
            binding: arena.binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &arena.buffer,
                offset: 0,
                size: wgpu::BufferSize::new(arena.staging.block_size),
            }),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("uniform block bind group"),
        layout,
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIGNMENT: u64 = 256;

    fn block(fill: u8, len: usize) -> Vec<u8> {
        vec![fill; len]
    }

    #[test]
    fn each_draw_gets_its_own_aligned_slot() {
        let mut staging = UniformStaging::new(208, ALIGNMENT);
        let quad = block(0xAA, 208);
        let light = block(0x55, 208);

        let first = staging.push(&quad);
        let second = staging.push(&light);

        assert_ne!(first, second);
        assert_eq!(u64::from(first) % ALIGNMENT, 0);
        assert_eq!(u64::from(second) % ALIGNMENT, 0);

        let first = first as usize;
        let second = second as usize;
        assert_eq!(&staging.bytes[first..first + 208], quad.as_slice());
        assert_eq!(&staging.bytes[second..second + 208], light.as_slice());
        // Padding between the block and the next slot stays zeroed.
        assert!(staging.bytes[first + 208..second].iter().all(|b| *b == 0));
    }

    #[test]
    fn oversized_snapshot_is_truncated_to_the_block() {
        let mut staging = UniformStaging::new(16, ALIGNMENT);
        staging.push(&block(0xFF, 64));
        assert_eq!(staging.bytes.len(), ALIGNMENT as usize);
        assert!(staging.bytes[..16].iter().all(|b| *b == 0xFF));
        assert!(staging.bytes[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn arena_grows_to_next_power_of_two() {
        let mut staging = UniformStaging::new(208, ALIGNMENT);
        let capacity = staging.initial_capacity();
        for _ in 0..INITIAL_ARENA_SLOTS {
            staging.push(&block(1, 208));
        }
        assert_eq!(staging.growth_target(capacity), None);

        staging.push(&block(2, 208));
        let staged = staging.bytes.len() as u64;
        assert_eq!(staged, 5 * ALIGNMENT);
        assert_eq!(staging.growth_target(capacity), Some(staged.next_power_of_two()));
        assert_eq!(staging.growth_target(capacity), Some(2048));
    }

    #[test]
    fn clearing_starts_the_next_frame_at_offset_zero() {
        let mut staging = UniformStaging::new(64, ALIGNMENT);
        staging.push(&block(1, 64));
        staging.push(&block(2, 64));
        staging.clear();
        assert_eq!(staging.push(&block(3, 64)), 0);
    }
}
