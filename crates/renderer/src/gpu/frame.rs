use std::ops::Range;

use crate::shader::ShaderProgram;
use crate::texture::TextureUnits;

use super::context::GpuContext;
use super::program::{DrawBindings, GpuProgram};

struct RecordedDraw {
    program: usize,
    vertex_buffer: wgpu::Buffer,
    vertices: Range<u32>,
    bindings: DrawBindings,
}

/// Collects draws for one frame, then encodes them into a single pass.
///
/// Each draw snapshots the active program's uniforms at the moment it is
/// recorded, so uniforms may be changed between draws the same way they
/// would be between immediate-mode draw calls.
pub(crate) struct FrameRecorder<'a> {
    device: &'a wgpu::Device,
    programs: &'a mut [GpuProgram],
    active: Option<usize>,
    draws: Vec<RecordedDraw>,
}

impl<'a> FrameRecorder<'a> {
    pub(crate) fn new(device: &'a wgpu::Device, programs: &'a mut [GpuProgram]) -> Self {
        for program in programs.iter_mut() {
            program.begin_frame();
        }
        Self {
            device,
            programs,
            active: None,
            draws: Vec::new(),
        }
    }

    /// Makes `index` the program used by subsequent draws.
    pub(crate) fn use_program(&mut self, index: usize) {
        if index < self.programs.len() {
            self.active = Some(index);
        } else {
            tracing::warn!(index, "no GPU program at index; draws will be skipped");
            self.active = None;
        }
    }

    pub(crate) fn draw(
        &mut self,
        source: &ShaderProgram,
        units: &TextureUnits,
        vertex_buffer: &wgpu::Buffer,
        vertices: Range<u32>,
    ) {
        let Some(index) = self.active else {
            tracing::trace!("draw skipped; no active program");
            return;
        };
        if !source.is_usable() {
            return;
        }
        let bindings = self.programs[index].prepare_draw(self.device, source, units);
        self.draws.push(RecordedDraw {
            program: index,
            vertex_buffer: vertex_buffer.clone(),
            vertices,
            bindings,
        });
    }

    pub(crate) fn submit(
        self,
        ctx: &GpuContext,
        clear: wgpu::Color,
    ) -> Result<(), wgpu::SurfaceError> {
        for program in self.programs.iter_mut() {
            program.flush(&ctx.device, &ctx.queue);
        }

        let frame = ctx.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for draw in &self.draws {
                let program = &self.programs[draw.program];
                let Some(textures) = program.texture_group(&draw.bindings.texture_key) else {
                    tracing::warn!(program = program.label(), "texture bind group missing; draw skipped");
                    continue;
                };
                pass.set_pipeline(program.pipeline());
                pass.set_bind_group(0, program.block_group(), &draw.bindings.dynamic_offsets);
                pass.set_bind_group(1, textures, &[]);
                pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                pass.draw(draw.vertices.clone(), 0..1);
            }
        }

        ctx.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}
