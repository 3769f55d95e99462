//! Named, typed uniform blocks laid out with WGSL uniform address rules.
//!
//! A [`UniformLayout`] is declared once per shader program and also emits the
//! matching WGSL struct, so the Rust side and the shader can never disagree on
//! offsets. [`UniformBlock`] is the CPU staging copy that draw code writes into
//! by name.

use std::fmt::Write as _;

use glam::{Mat3, Mat4, Vec3, Vec4};
use log::{trace, warn};

/// Value type of a single uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    /// Stored as `u32` because WGSL does not allow `bool` in uniform buffers.
    Bool,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    pub fn align(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::Bool => 4,
            UniformKind::Vec3 | UniformKind::Vec4 | UniformKind::Mat3 | UniformKind::Mat4 => 16,
        }
    }

    pub fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::Bool => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
        }
    }

    pub fn wgsl_type(self) -> &'static str {
        match self {
            UniformKind::Float => "f32",
            UniformKind::Int => "i32",
            UniformKind::Bool => "u32",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Vec4 => "vec4<f32>",
            UniformKind::Mat3 => "mat3x3<f32>",
            UniformKind::Mat4 => "mat4x4<f32>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub kind: UniformKind,
    pub offset: usize,
}

/// Byte layout of a program's uniform struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    size: usize,
}

impl UniformLayout {
    /// Lays out `members` in declaration order.
    pub fn new(members: &[(&'static str, UniformKind)]) -> Self {
        let mut fields = Vec::with_capacity(members.len());
        let mut cursor = 0usize;
        let mut struct_align = 16usize;
        for &(name, kind) in members {
            let offset = align_to(cursor, kind.align());
            fields.push(UniformField { name, kind, offset });
            cursor = offset + kind.size();
            struct_align = struct_align.max(kind.align());
        }
        Self {
            fields,
            size: align_to(cursor.max(1), struct_align),
        }
    }

    /// Struct size rounded up to its alignment.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// WGSL declaration of the struct, e.g. `struct Uniforms { view: mat4x4<f32>, }`.
    pub fn wgsl_struct(&self, struct_name: &str) -> String {
        let mut out = format!("struct {struct_name} {{\n");
        for field in &self.fields {
            let _ = writeln!(out, "    {}: {},", field.name, field.kind.wgsl_type());
        }
        out.push_str("}\n");
        out
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Typed setters addressed by uniform name.
///
/// Names unknown to the receiving program are ignored, which lets the same
/// contract code run against every program regardless of the subset of
/// uniforms it reads.
pub trait UniformSink {
    fn set_mat4(&mut self, name: &str, value: Mat4);
    fn set_mat3(&mut self, name: &str, value: Mat3);
    fn set_vec4(&mut self, name: &str, value: Vec4);
    fn set_vec3(&mut self, name: &str, value: Vec3);
    fn set_float(&mut self, name: &str, value: f32);
    fn set_int(&mut self, name: &str, value: i32);
    fn set_bool(&mut self, name: &str, value: bool);
}

/// CPU staging copy of one uniform struct.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let data = vec![0; layout.size()];
        Self { layout, data }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layout.field(name).is_some()
    }

    /// Reads back a scalar `f32` member.
    pub fn float(&self, name: &str) -> Option<f32> {
        let field = self.layout.field(name)?;
        (field.kind == UniformKind::Float).then(|| read_f32(&self.data, field.offset))
    }

    pub fn vec3(&self, name: &str) -> Option<Vec3> {
        let field = self.layout.field(name)?;
        (field.kind == UniformKind::Vec3).then(|| {
            Vec3::new(
                read_f32(&self.data, field.offset),
                read_f32(&self.data, field.offset + 4),
                read_f32(&self.data, field.offset + 8),
            )
        })
    }

    pub fn mat4(&self, name: &str) -> Option<Mat4> {
        let field = self.layout.field(name)?;
        (field.kind == UniformKind::Mat4).then(|| {
            let mut cols = [0.0f32; 16];
            for (i, value) in cols.iter_mut().enumerate() {
                *value = read_f32(&self.data, field.offset + i * 4);
            }
            Mat4::from_cols_array(&cols)
        })
    }

    pub fn uint(&self, name: &str) -> Option<u32> {
        let field = self.layout.field(name)?;
        matches!(field.kind, UniformKind::Bool | UniformKind::Int).then(|| {
            let bytes = &self.data[field.offset..field.offset + 4];
            u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        })
    }

    fn write(&mut self, name: &str, kind: UniformKind, bytes: &[u8]) {
        let Some(field) = self.layout.field(name) else {
            trace!("uniform `{name}` is not read by this program");
            return;
        };
        if field.kind != kind {
            warn!(
                "uniform `{name}` is declared as {:?} but was set as {kind:?}",
                field.kind
            );
            return;
        }
        let offset = field.offset;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    let bytes = &data[offset..offset + 4];
    f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl UniformSink for UniformBlock {
    fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.write(name, UniformKind::Mat4, bytemuck::bytes_of(&value.to_cols_array()));
    }

    fn set_mat3(&mut self, name: &str, value: Mat3) {
        let c = value.to_cols_array();
        let padded = [
            c[0], c[1], c[2], 0.0, c[3], c[4], c[5], 0.0, c[6], c[7], c[8], 0.0,
        ];
        self.write(name, UniformKind::Mat3, bytemuck::cast_slice(&padded));
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.write(name, UniformKind::Vec4, bytemuck::bytes_of(&value.to_array()));
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.write(name, UniformKind::Vec3, bytemuck::bytes_of(&value.to_array()));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.write(name, UniformKind::Float, bytemuck::bytes_of(&value));
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.write(name, UniformKind::Int, bytemuck::bytes_of(&value));
    }

    fn set_bool(&mut self, name: &str, value: bool) {
        self.write(name, UniformKind::Bool, bytemuck::bytes_of(&u32::from(value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layout() -> UniformLayout {
        UniformLayout::new(&[
            ("a", UniformKind::Vec3),
            ("b", UniformKind::Float),
            ("c", UniformKind::Mat4),
            ("d", UniformKind::Mat3),
            ("e", UniformKind::Bool),
        ])
    }

    #[test]
    fn follows_wgsl_alignment_rules() {
        let layout = sample_layout();
        let offsets: Vec<_> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 80, 128]);
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn emits_matching_wgsl_struct() {
        let source = sample_layout().wgsl_struct("Uniforms");
        assert!(source.starts_with("struct Uniforms {"));
        assert!(source.contains("    a: vec3<f32>,\n    b: f32,"));
        assert!(source.contains("    e: u32,"));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut block = UniformBlock::new(sample_layout());
        block.set_float("b", 2.5);
        let before = block.bytes().to_vec();
        block.set_vec3("not_declared", Vec3::ONE);
        block.set_float("missing", 1.0);
        assert_eq!(block.bytes(), before.as_slice());
    }

    #[test]
    fn mismatched_kind_leaves_value_untouched() {
        let mut block = UniformBlock::new(sample_layout());
        block.set_float("b", 4.0);
        block.set_int("b", 7);
        assert_eq!(block.float("b"), Some(4.0));
    }

    #[test]
    fn stores_values_at_declared_offsets() {
        let mut block = UniformBlock::new(sample_layout());
        let matrix = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        block.set_vec3("a", Vec3::new(1.0, 2.0, 3.0));
        block.set_float("b", 0.5);
        block.set_mat4("c", matrix);
        block.set_bool("e", true);
        assert_eq!(block.vec3("a"), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(block.float("b"), Some(0.5));
        assert_eq!(block.mat4("c"), Some(matrix));
        assert_eq!(block.uint("e"), Some(1));
    }
}
