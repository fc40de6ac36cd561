//! Interleaved quad geometry with a per-face tangent basis.
//!
//! ```text
//! QuadVertex (56 bytes)
//! ┌───────────┬───────────┬─────────┬───────────┬───────────┐
//! │ position  │ normal    │ uv      │ tangent   │ bitangent │
//! │ [f32; 3]  │ [f32; 3]  │ [f32; 2]│ [f32; 3]  │ [f32; 3]  │
//! │ offset 0  │ offset 12 │ off. 24 │ offset 32 │ offset 44 │
//! │ loc 0     │ loc 1     │ loc 2   │ loc 3     │ loc 4     │
//! └───────────┴───────────┴─────────┴───────────┴───────────┘
//! ```

use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use wgpu::util::DeviceExt;

use crate::error::BasisError;
use crate::tangent::TangentBasis;

/// Number of vertices emitted for a quad (two triangles, no index buffer).
pub const QUAD_VERTEX_COUNT: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x3,
        4 => Float32x3
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    fn new(position: Vec3, normal: Vec3, uv: Vec2, basis: &TangentBasis) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
            tangent: basis.tangent.to_array(),
            bitangent: basis.bitangent.to_array(),
        }
    }
}

/// Corner description of a quad.
///
/// Corners run counter-clockwise from the top-left: `p1` top-left, `p2`
/// bottom-left, `p3` bottom-right, `p4` top-right. The quad is split into
/// the triangles `(p1, p2, p3)` and `(p1, p3, p4)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadCorners {
    pub positions: [Vec3; 4],
    pub uvs: [Vec2; 4],
    pub normal: Vec3,
}

impl QuadCorners {
    /// Unit quad facing +Z spanning `[-1, 1]` with UVs covering `[0, 1]`.
    pub fn unit() -> Self {
        Self {
            positions: [
                Vec3::new(-1.0, 1.0, 0.0),
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
            ],
            uvs: [
                Vec2::new(0.0, 1.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ],
            normal: Vec3::Z,
        }
    }

    /// Tangent bases for both triangles, in draw order.
    pub fn triangle_bases(&self) -> Result<[TangentBasis; 2], BasisError> {
        TRIANGLES.map_result(|corners| {
            TangentBasis::from_triangle(
                corners.map(|index| self.positions[index]),
                corners.map(|index| self.uvs[index]),
            )
        })
    }

    /// Emits the six interleaved vertices; every vertex of a triangle shares
    /// that triangle's basis.
    pub fn vertices(&self) -> Result<[QuadVertex; 6], BasisError> {
        let bases = self.triangle_bases()?;
        let mut vertices = [QuadVertex::zeroed(); 6];
        for (triangle, (corners, basis)) in TRIANGLES.0.iter().zip(bases.iter()).enumerate() {
            for (slot, &corner) in corners.iter().enumerate() {
                vertices[triangle * 3 + slot] = QuadVertex::new(
                    self.positions[corner],
                    self.normal,
                    self.uvs[corner],
                    basis,
                );
            }
        }
        Ok(vertices)
    }
}

impl Default for QuadCorners {
    fn default() -> Self {
        Self::unit()
    }
}

struct TriangleCorners([[usize; 3]; 2]);

const TRIANGLES: TriangleCorners = TriangleCorners([[0, 1, 2], [0, 2, 3]]);

impl TriangleCorners {
    fn map_result<T, E>(
        &self,
        mut f: impl FnMut([usize; 3]) -> Result<T, E>,
    ) -> Result<[T; 2], E> {
        Ok([f(self.0[0])?, f(self.0[1])?])
    }
}

/// Creates GPU vertex buffers. Implemented for `wgpu::Device`; tests swap in
/// a counting allocator.
pub trait VertexBufferAllocator {
    type Buffer;

    fn allocate_vertex_buffer(&self, label: &str, contents: &[u8]) -> Self::Buffer;
}

impl VertexBufferAllocator for wgpu::Device {
    type Buffer = wgpu::Buffer;

    fn allocate_vertex_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::VERTEX,
        })
    }
}

/// Owner of the lazily uploaded quad buffer.
///
/// The buffer is created on first use and reused for every later draw. The
/// once-cell publishes the "built" state and the handle together, so two
/// threads racing on the first build still allocate exactly one buffer.
pub struct QuadMesh<B> {
    corners: QuadCorners,
    buffer: OnceLock<B>,
}

impl<B> QuadMesh<B> {
    pub fn new(corners: QuadCorners) -> Self {
        Self {
            corners,
            buffer: OnceLock::new(),
        }
    }

    pub fn is_built(&self) -> bool {
        self.buffer.get().is_some()
    }

    pub fn buffer_or_build<A>(&self, allocator: &A) -> Result<&B, BasisError>
    where
        A: VertexBufferAllocator<Buffer = B>,
    {
        if let Some(buffer) = self.buffer.get() {
            return Ok(buffer);
        }

        let vertices = self.corners.vertices()?;
        Ok(self.buffer.get_or_init(|| {
            tracing::debug!(
                vertices = vertices.len(),
                stride = std::mem::size_of::<QuadVertex>(),
                "uploading quad vertex buffer"
            );
            allocator.allocate_vertex_buffer("quad vertex buffer", bytemuck::cast_slice(&vertices))
        }))
    }
}

impl<B> Default for QuadMesh<B> {
    fn default() -> Self {
        Self::new(QuadCorners::unit())
    }
}
