use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floats per interleaved vertex: `position.xyz` followed by `normal.xyz`.
pub const VERTEX_STRIDE: usize = 6;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("failed to read mesh {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("mesh does not define any vertices")]
    Empty,
    #[error("face references vertex {index} but only {count} exist")]
    IndexOutOfRange { index: i32, count: usize },
}

/// CPU copy of a drawable mesh.
///
/// Meshes without indices are drawn as plain triangle lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
}

impl MeshData {
    pub fn vertex_count(&self) -> u32 {
        (self.vertices.len() / VERTEX_STRIDE) as u32
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Number of elements a draw call consumes.
    pub fn element_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len() as u32,
            None => self.vertex_count(),
        }
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count();
        self.vertices.extend_from_slice(&position.to_array());
        self.vertices.extend_from_slice(&normal.to_array());
        index
    }
}

/// Procedural shapes available without any asset on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinMesh {
    Plane,
    Cube,
    Cone,
    Sphere,
    Crystal,
    Disc,
}

impl BuiltinMesh {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "plane" => BuiltinMesh::Plane,
            "cube" => BuiltinMesh::Cube,
            "cone" => BuiltinMesh::Cone,
            "sphere" => BuiltinMesh::Sphere,
            "crystal" => BuiltinMesh::Crystal,
            "disc" => BuiltinMesh::Disc,
            _ => return None,
        })
    }

    pub fn build(self) -> MeshData {
        match self {
            BuiltinMesh::Plane => plane(20.0, 8),
            BuiltinMesh::Cube => cube(),
            BuiltinMesh::Cone => cone(16),
            BuiltinMesh::Sphere => sphere(12, 16),
            BuiltinMesh::Crystal => crystal(),
            BuiltinMesh::Disc => disc(32),
        }
    }
}

/// Where a drawable's geometry comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshSource {
    Builtin(BuiltinMesh),
    File(PathBuf),
}

impl MeshSource {
    /// Builtin names win over relative paths with the same spelling.
    pub fn parse(value: &str) -> Self {
        match BuiltinMesh::from_name(value) {
            Some(builtin) => MeshSource::Builtin(builtin),
            None => MeshSource::File(PathBuf::from(value)),
        }
    }
}

impl fmt::Display for MeshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshSource::Builtin(builtin) => write!(f, "{builtin:?}"),
            MeshSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolves `source`, reading files relative to `base_dir`.
pub fn load_mesh(source: &MeshSource, base_dir: &Path) -> Result<MeshData, MeshError> {
    match source {
        MeshSource::Builtin(builtin) => Ok(builtin.build()),
        MeshSource::File(path) => {
            let path = base_dir.join(path);
            let contents = fs::read_to_string(&path).map_err(|source| MeshError::Io {
                path: path.clone(),
                source,
            })?;
            load_obj_from_str(&contents)
        }
    }
}

/// Parses an OBJ file from memory into an indexed mesh.
///
/// Polygons are fan-triangulated; missing normals are computed from faces.
pub fn load_obj_from_str(data: &str) -> Result<MeshData, MeshError> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let line = line_no + 1;
        match tag {
            "v" => positions.push(parse_vec3(parts, line)?),
            "vn" => normals.push(parse_vec3(parts, line)?),
            "f" => {
                let polygon = parse_face(parts, line)?;
                for i in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(MeshError::Empty);
    }

    let mut mesh = build_mesh(&positions, &normals, &faces)?;
    if needs_normals(&mesh.vertices) {
        compute_normals(&mut mesh);
    }
    Ok(mesh)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>, line: usize) -> Result<Vec3, MeshError> {
    let mut component = || -> Result<f32, MeshError> {
        let text = parts.next().ok_or_else(|| MeshError::Parse {
            line,
            message: "missing vector component".into(),
        })?;
        text.parse::<f32>().map_err(|err| MeshError::Parse {
            line,
            message: format!("invalid number `{text}`: {err}"),
        })
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vn: i32,
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>, line: usize) -> Result<Vec<FaceIndex>, MeshError> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| MeshError::Parse {
                line,
                message: format!("invalid face vertex `{part}`"),
            })?;
        let _texcoord = segments.next();
        let vn = segments
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        indices.push(FaceIndex { v, vn });
    }
    if indices.len() < 3 {
        return Err(MeshError::Parse {
            line,
            message: "faces must reference at least 3 vertices".into(),
        });
    }
    Ok(indices)
}

fn build_mesh(
    positions: &[Vec3],
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<MeshData, MeshError> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = MeshData::default();
    let mut indices = Vec::with_capacity(faces.len() * 3);

    for face in faces {
        for idx in face {
            let position = fix_index(idx.v, positions.len()).ok_or(MeshError::IndexOutOfRange {
                index: idx.v,
                count: positions.len(),
            })?;
            let normal = fix_index(idx.vn, normals.len());
            let index = match lookup.get(&(position, normal)) {
                Some(index) => *index,
                None => {
                    let n = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                    let index = mesh.push_vertex(positions[position], n);
                    lookup.insert((position, normal), index);
                    index
                }
            };
            indices.push(index);
        }
    }

    mesh.indices = Some(indices);
    Ok(mesh)
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then(|| len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[f32]) -> bool {
    vertices
        .chunks_exact(VERTEX_STRIDE)
        .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
}

fn compute_normals(mesh: &mut MeshData) {
    let Some(indices) = mesh.indices.as_ref() else {
        return;
    };
    let position = |i: usize, vertices: &[f32]| {
        Vec3::from_slice(&vertices[i * VERTEX_STRIDE..i * VERTEX_STRIDE + 3])
    };
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count() as usize];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let p0 = position(i0, &mesh.vertices);
        let p1 = position(i1, &mesh.vertices);
        let p2 = position(i2, &mesh.vertices);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * VERTEX_STRIDE + 3..i * VERTEX_STRIDE + 6]
            .copy_from_slice(&normal.to_array());
    }
}

/// Square in the XZ plane centered on the origin, facing +Y.
pub fn plane(size: f32, subdivisions: u32) -> MeshData {
    let cells = subdivisions.max(1);
    let mut mesh = MeshData::default();
    let step = size / cells as f32;
    let origin = -size / 2.0;
    for z in 0..=cells {
        for x in 0..=cells {
            let position = Vec3::new(origin + x as f32 * step, 0.0, origin + z as f32 * step);
            mesh.push_vertex(position, Vec3::Y);
        }
    }
    let row = cells + 1;
    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for z in 0..cells {
        for x in 0..cells {
            let i = z * row + x;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    mesh.indices = Some(indices);
    mesh
}

/// Unit cube with per-face normals and counter-clockwise outward faces.
pub fn cube() -> MeshData {
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut mesh = MeshData::default();
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let center = normal * 0.5;
        let base = mesh.push_vertex(center - u * 0.5 - v * 0.5, normal);
        mesh.push_vertex(center + u * 0.5 - v * 0.5, normal);
        mesh.push_vertex(center + u * 0.5 + v * 0.5, normal);
        mesh.push_vertex(center - u * 0.5 + v * 0.5, normal);
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh.indices = Some(indices);
    mesh
}

/// Cone of height 2 standing on the origin with a base radius of 1.
pub fn cone(segments: u32) -> MeshData {
    let segments = segments.max(3);
    let apex = Vec3::new(0.0, 2.0, 0.0);
    let mut mesh = MeshData::default();
    let mut indices = Vec::new();
    for i in 0..segments {
        let a0 = i as f32 / segments as f32 * TAU;
        let a1 = (i + 1) as f32 / segments as f32 * TAU;
        let p0 = Vec3::new(a0.cos(), 0.0, -a0.sin());
        let p1 = Vec3::new(a1.cos(), 0.0, -a1.sin());
        let normal = (p1 - p0).cross(apex - p0).normalize();
        let base = mesh.push_vertex(p0, normal);
        mesh.push_vertex(p1, normal);
        mesh.push_vertex(apex, normal);
        indices.extend_from_slice(&[base, base + 1, base + 2]);

        let bottom = mesh.push_vertex(Vec3::ZERO, Vec3::NEG_Y);
        mesh.push_vertex(p1, Vec3::NEG_Y);
        mesh.push_vertex(p0, Vec3::NEG_Y);
        indices.extend_from_slice(&[bottom, bottom + 1, bottom + 2]);
    }
    mesh.indices = Some(indices);
    mesh
}

/// Unit sphere built from latitude rings.
pub fn sphere(rings: u32, sectors: u32) -> MeshData {
    let rings = rings.max(2);
    let sectors = sectors.max(3);
    let mut mesh = MeshData::default();
    for ring in 0..=rings {
        let phi = ring as f32 / rings as f32 * PI;
        for sector in 0..=sectors {
            let theta = sector as f32 / sectors as f32 * TAU;
            let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            mesh.push_vertex(normal, normal);
        }
    }
    let row = sectors + 1;
    let mut indices = Vec::new();
    for ring in 0..rings {
        for sector in 0..sectors {
            let i = ring * row + sector;
            indices.extend_from_slice(&[i, i + 1, i + row, i + 1, i + row + 1, i + row]);
        }
    }
    mesh.indices = Some(indices);
    mesh
}

/// Elongated octahedron with flat-shaded facets.
pub fn crystal() -> MeshData {
    let top = Vec3::new(0.0, 1.5, 0.0);
    let bottom = Vec3::new(0.0, -0.5, 0.0);
    let ring = [
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(0.0, 0.0, -0.5),
        Vec3::new(-0.5, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 0.5),
    ];
    let mut mesh = MeshData::default();
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        for (p0, p1, p2) in [(a, b, top), (b, a, bottom)] {
            let normal = (p1 - p0).cross(p2 - p0).normalize();
            mesh.push_vertex(p0, normal);
            mesh.push_vertex(p1, normal);
            mesh.push_vertex(p2, normal);
        }
    }
    mesh
}

/// Flat unit disc in the XZ plane facing +Y.
pub fn disc(segments: u32) -> MeshData {
    let segments = segments.max(3);
    let mut mesh = MeshData::default();
    let center = mesh.push_vertex(Vec3::ZERO, Vec3::Y);
    for i in 0..segments {
        let angle = i as f32 / segments as f32 * TAU;
        mesh.push_vertex(Vec3::new(angle.cos(), 0.0, -angle.sin()), Vec3::Y);
    }
    let mut indices = Vec::with_capacity(segments as usize * 3);
    for i in 0..segments {
        let current = center + 1 + i;
        let next = center + 1 + (i + 1) % segments;
        indices.extend_from_slice(&[center, current, next]);
    }
    mesh.indices = Some(indices);
    mesh
}

/// 36 non-indexed vertices of the cube `[-1, 1]^3`, used for the skybox.
pub fn skybox_cube() -> MeshData {
    let mut mesh = MeshData::default();
    let source = cube();
    if let Some(indices) = &source.indices {
        for &index in indices {
            let start = index as usize * VERTEX_STRIDE;
            let position = Vec3::from_slice(&source.vertices[start..start + 3]) * 2.0;
            mesh.push_vertex(position, Vec3::ZERO);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let mesh = load_obj_from_str("\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.indices, Some(vec![0, 1, 2]));
        assert_eq!(mesh.vertices.len(), 18);
        assert!(mesh.is_indexed());
    }

    #[test]
    fn computes_missing_normals() {
        let mesh = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        for chunk in mesh.vertices.chunks_exact(VERTEX_STRIDE) {
            assert_eq!(Vec3::from_slice(&chunk[3..6]), Vec3::Z);
        }
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, Some(vec![0, 1, 2, 0, 2, 3]));
    }

    #[test]
    fn reports_line_of_malformed_vertex() {
        let err = load_obj_from_str("v 0 0 0\nv 1 oops 0\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 2, .. }));
        assert!(matches!(load_obj_from_str("# nothing"), Err(MeshError::Empty)));
        assert!(matches!(
            load_obj_from_str("v 0 0 0\nf 1 2 3\n"),
            Err(MeshError::IndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = MeshSource::parse("does/not/exist.obj");
        assert!(matches!(
            load_mesh(&source, Path::new(".")),
            Err(MeshError::Io { .. })
        ));
    }

    #[test]
    fn builtin_shapes_are_well_formed() {
        for builtin in [
            BuiltinMesh::Plane,
            BuiltinMesh::Cube,
            BuiltinMesh::Cone,
            BuiltinMesh::Sphere,
            BuiltinMesh::Crystal,
            BuiltinMesh::Disc,
        ] {
            let mesh = builtin.build();
            assert_eq!(mesh.vertices.len() % VERTEX_STRIDE, 0);
            assert_eq!(mesh.element_count() % 3, 0, "{builtin:?}");
            if let Some(indices) = &mesh.indices {
                assert!(indices.iter().all(|&i| i < mesh.vertex_count()));
            }
        }
    }

    #[test]
    fn skybox_cube_is_unindexed() {
        let mesh = skybox_cube();
        assert!(!mesh.is_indexed());
        assert_eq!(mesh.element_count(), 36);
        assert!(mesh
            .vertices
            .chunks_exact(VERTEX_STRIDE)
            .all(|v| v[..3].iter().all(|c| c.abs() == 1.0)));
    }
}
