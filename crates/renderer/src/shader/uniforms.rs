use std::collections::BTreeMap;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use super::reflect::{UniformKind, UniformLayout, UniformLocation};

/// A value pushed through one of the program setters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Bool(_) => "bool",
            UniformValue::Int(_) => "int",
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::Mat2(_) => "mat2",
            UniformValue::Mat3(_) => "mat3",
            UniformValue::Mat4(_) => "mat4",
        }
    }
}

/// A setter whose value does not fit the declared uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformMismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

fn kind_name(kind: UniformKind) -> &'static str {
    match kind {
        UniformKind::Int => "int",
        UniformKind::Uint => "uint",
        UniformKind::Float => "float",
        UniformKind::Vec2 => "vec2",
        UniformKind::Vec3 => "vec3",
        UniformKind::Vec4 => "vec4",
        UniformKind::Mat2 => "mat2",
        UniformKind::Mat3 => "mat3",
        UniformKind::Mat4 => "mat4",
    }
}

/// CPU-side shadow of every uniform block plus the texture unit assigned to
/// each sampler slot. Frames copy these bytes out at draw time.
#[derive(Clone, Debug, Default)]
pub struct UniformStorage {
    blocks: BTreeMap<u32, Vec<u8>>,
    sampler_units: BTreeMap<u32, u32>,
}

impl UniformStorage {
    pub fn for_layout(layout: &UniformLayout) -> Self {
        let blocks = layout
            .blocks()
            .iter()
            .map(|block| (block.binding, vec![0u8; block.size as usize]))
            .collect();
        let sampler_units = layout
            .samplers()
            .iter()
            .map(|slot| (slot.texture_binding, 0))
            .collect();
        Self {
            blocks,
            sampler_units,
        }
    }

    pub fn write(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), UniformMismatch> {
        match location {
            UniformLocation::Sampler { binding } => {
                let unit = match value {
                    UniformValue::Int(unit) if unit >= 0 => unit as u32,
                    UniformValue::Bool(flag) => u32::from(flag),
                    other => {
                        return Err(UniformMismatch {
                            expected: "sampler unit",
                            found: other.type_name(),
                        })
                    }
                };
                self.sampler_units.insert(binding, unit);
                Ok(())
            }
            UniformLocation::Block {
                binding,
                offset,
                kind,
            } => {
                let mismatch = UniformMismatch {
                    expected: kind_name(kind),
                    found: value.type_name(),
                };
                let Some(bytes) = self.blocks.get_mut(&binding) else {
                    return Err(mismatch);
                };
                let offset = offset as usize;
                match (kind, value) {
                    (UniformKind::Int, UniformValue::Int(v)) => put(bytes, offset, &v.to_ne_bytes()),
                    (UniformKind::Int | UniformKind::Uint, UniformValue::Bool(v)) => {
                        put(bytes, offset, &u32::from(v).to_ne_bytes())
                    }
                    (UniformKind::Uint, UniformValue::Int(v)) if v >= 0 => {
                        put(bytes, offset, &(v as u32).to_ne_bytes())
                    }
                    (UniformKind::Float, UniformValue::Float(v)) => {
                        put(bytes, offset, &v.to_ne_bytes())
                    }
                    (UniformKind::Vec2, UniformValue::Vec2(v)) => {
                        put(bytes, offset, bytemuck::bytes_of(&v.to_array()))
                    }
                    (UniformKind::Vec3, UniformValue::Vec3(v)) => {
                        put(bytes, offset, bytemuck::bytes_of(&v.to_array()))
                    }
                    (UniformKind::Vec4, UniformValue::Vec4(v)) => {
                        put(bytes, offset, bytemuck::bytes_of(&v.to_array()))
                    }
                    (UniformKind::Mat2, UniformValue::Mat2(m)) => {
                        put_columns(bytes, offset, kind, &m.to_cols_array())
                    }
                    (UniformKind::Mat3, UniformValue::Mat3(m)) => {
                        put_columns(bytes, offset, kind, &m.to_cols_array())
                    }
                    (UniformKind::Mat4, UniformValue::Mat4(m)) => {
                        put_columns(bytes, offset, kind, &m.to_cols_array())
                    }
                    _ => return Err(mismatch),
                }
                Ok(())
            }
        }
    }

    /// Reads a value back in the shape of its declared type.
    pub fn read(&self, location: UniformLocation) -> Option<UniformValue> {
        match location {
            UniformLocation::Sampler { binding } => self
                .sampler_units
                .get(&binding)
                .map(|unit| UniformValue::Int(*unit as i32)),
            UniformLocation::Block {
                binding,
                offset,
                kind,
            } => {
                let bytes = self.blocks.get(&binding)?;
                let offset = offset as usize;
                let floats = |count: usize| read_floats(bytes, offset, count);
                let value = match kind {
                    UniformKind::Int | UniformKind::Uint => {
                        let word: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
                        UniformValue::Int(i32::from_ne_bytes(word))
                    }
                    UniformKind::Float => UniformValue::Float(floats(1)?[0]),
                    UniformKind::Vec2 => UniformValue::Vec2(Vec2::from_slice(&floats(2)?)),
                    UniformKind::Vec3 => UniformValue::Vec3(Vec3::from_slice(&floats(3)?)),
                    UniformKind::Vec4 => UniformValue::Vec4(Vec4::from_slice(&floats(4)?)),
                    UniformKind::Mat2 => {
                        UniformValue::Mat2(Mat2::from_cols_slice(&read_columns(bytes, offset, kind)?))
                    }
                    UniformKind::Mat3 => {
                        UniformValue::Mat3(Mat3::from_cols_slice(&read_columns(bytes, offset, kind)?))
                    }
                    UniformKind::Mat4 => {
                        UniformValue::Mat4(Mat4::from_cols_slice(&read_columns(bytes, offset, kind)?))
                    }
                };
                Some(value)
            }
        }
    }

    pub fn block_bytes(&self, binding: u32) -> Option<&[u8]> {
        self.blocks.get(&binding).map(Vec::as_slice)
    }

    /// Texture unit assigned to the sampler slot at `binding`; unassigned
    /// slots read unit 0.
    pub fn sampler_unit(&self, binding: u32) -> u32 {
        self.sampler_units.get(&binding).copied().unwrap_or(0)
    }
}

fn put(bytes: &mut [u8], offset: usize, data: &[u8]) {
    if let Some(dst) = bytes.get_mut(offset..offset + data.len()) {
        dst.copy_from_slice(data);
    }
}

fn put_columns(bytes: &mut [u8], offset: usize, kind: UniformKind, cols: &[f32]) {
    let columns = kind.columns() as usize;
    let rows = cols.len() / columns;
    let stride = kind.column_stride() as usize;
    for (index, column) in cols.chunks(rows).enumerate() {
        put(bytes, offset + index * stride, bytemuck::cast_slice(column));
    }
}

fn read_columns(bytes: &[u8], offset: usize, kind: UniformKind) -> Option<Vec<f32>> {
    let columns = kind.columns() as usize;
    let stride = kind.column_stride() as usize;
    let mut out = Vec::with_capacity(columns * columns);
    for index in 0..columns {
        let start = offset + index * stride;
        out.extend(read_floats(bytes, start, columns)?);
    }
    Some(out)
}

fn read_floats(bytes: &[u8], offset: usize, count: usize) -> Option<Vec<f32>> {
    let slice = bytes.get(offset..offset + count * 4)?;
    Some(
        slice
            .chunks_exact(4)
            .map(|word| f32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
            .collect(),
    )
}
