//! Named uniform interface
//!
//! Programs declare their uniforms up front. Each declared element starts on
//! a 16-byte boundary: a `mat4` takes 64 bytes and every other type takes one
//! 16-byte slot, so WGSL blocks declare scalars and vec3 values as `vec4`.

use super::ProgramId;
use glam::{Mat4, Vec3};
use std::borrow::Cow;

/// Uniform value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Mat4,
    Vec3,
    Float,
    Int,
}

impl UniformType {
    /// Bytes occupied by one element.
    pub fn slot_size(self) -> u32 {
        match self {
            UniformType::Mat4 => 64,
            _ => 16,
        }
    }
}

/// A declared uniform (scalar when `len == 1`, array otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: Cow<'static, str>,
    pub ty: UniformType,
    pub len: u32,
}

impl UniformDecl {
    /// Declare a single value.
    pub const fn scalar(name: &'static str, ty: UniformType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            len: 1,
        }
    }

    /// Declare an array of `len` values.
    pub const fn array(name: &'static str, ty: UniformType, len: u32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            len,
        }
    }
}

/// Resolved uniform location. Carries its program, so setting a value never
/// depends on which program is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub(crate) program: ProgramId,
    pub(crate) offset: u32,
    pub(crate) ty: UniformType,
}

impl UniformLocation {
    /// Program the location belongs to.
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Byte offset inside the program's uniform block.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Declared type.
    pub fn ty(&self) -> UniformType {
        self.ty
    }
}

/// A uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec3(Vec3),
    Float(f32),
    Int(i32),
}

impl UniformValue {
    /// Type of the value.
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Mat4(_) => UniformType::Mat4,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
        }
    }

    /// Write the value into its slot. `slot` must be at least one slot long.
    pub fn write_to(&self, slot: &mut [u8]) {
        match self {
            UniformValue::Mat4(m) => {
                slot[..64].copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
            }
            UniformValue::Vec3(v) => {
                let lanes = [v.x, v.y, v.z, 0.0];
                slot[..16].copy_from_slice(bytemuck::cast_slice(&lanes));
            }
            UniformValue::Float(x) => {
                let lanes = [*x, 0.0, 0.0, 0.0];
                slot[..16].copy_from_slice(bytemuck::cast_slice(&lanes));
            }
            UniformValue::Int(i) => {
                let lanes = [*i, 0, 0, 0];
                slot[..16].copy_from_slice(bytemuck::cast_slice(&lanes));
            }
        }
    }
}

#[derive(Debug, Clone)]
struct LayoutEntry {
    name: Cow<'static, str>,
    ty: UniformType,
    len: u32,
    offset: u32,
}

/// Byte layout of a program's uniform block.
#[derive(Debug, Clone)]
pub struct UniformLayout {
    entries: Vec<LayoutEntry>,
    size: u32,
}

impl UniformLayout {
    /// Lay out declarations in order.
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0;
        let entries = decls
            .iter()
            .map(|decl| {
                let entry = LayoutEntry {
                    name: decl.name.clone(),
                    ty: decl.ty,
                    len: decl.len.max(1),
                    offset,
                };
                offset += entry.ty.slot_size() * entry.len;
                entry
            })
            .collect();

        Self {
            entries,
            // wgpu rejects zero-sized uniform bindings
            size: offset.max(16),
        }
    }

    /// Total block size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Resolve `name` or `name[index]` to a byte offset and type.
    pub fn resolve(&self, name: &str) -> Option<(u32, UniformType)> {
        let (base, index) = split_array_name(name)?;
        let entry = self.entries.iter().find(|e| e.name == base)?;
        if index >= entry.len {
            return None;
        }
        Some((entry.offset + index * entry.ty.slot_size(), entry.ty))
    }
}

/// Split `"name[3]"` into `("name", 3)`; a bare name is element 0.
fn split_array_name(name: &str) -> Option<(&str, u32)> {
    match name.find('[') {
        Some(open) => {
            let close = name.strip_suffix(']')?;
            let index = close[open + 1..].parse().ok()?;
            Some((&name[..open], index))
        }
        None => Some((name, 0)),
    }
}
