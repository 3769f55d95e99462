use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use log::info;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SceneConfig};
use crate::mesh::{BuiltinMesh, MeshSource};

/// Drawables plus the environment they are rendered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub skybox: Option<SkyboxFaces>,
    /// Directory that relative mesh and texture paths are resolved against.
    #[serde(default)]
    pub base_dir: PathBuf,
    /// `<param>` overrides in document order.
    #[serde(default)]
    pub overrides: Vec<(String, String)>,
}

impl Scene {
    /// Reads and parses a scene file; relative paths resolve next to it.
    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read scene {}", path.display()))?;
        let mut scene = Self::from_xml(&xml)
            .with_context(|| format!("failed to parse scene {}", path.display()))?;
        scene.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(
            "loaded scene {} with {} objects",
            path.display(),
            scene.objects.len()
        );
        Ok(scene)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        let mut objects = Vec::new();

        for node in root.children().filter(|n| n.has_tag_name("object")) {
            objects.push(parse_object(&node)?);
        }

        let skybox = root
            .children()
            .find(|n| n.has_tag_name("skybox"))
            .map(|node| parse_skybox(&node))
            .transpose()?;

        let mut overrides = Vec::new();
        for config in root.children().filter(|n| n.has_tag_name("config")) {
            for param in config.children().filter(|n| n.has_tag_name("param")) {
                let name = param
                    .attribute("name")
                    .ok_or_else(|| anyhow!("<param> is missing its name attribute"))?;
                let value = param.text().map(str::trim).unwrap_or_default();
                overrides.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            objects,
            skybox,
            base_dir: PathBuf::new(),
            overrides,
        })
    }

    /// Applies the scene's `<config>` overrides through the named setters.
    pub fn apply_overrides(&self, config: &mut SceneConfig) -> Result<(), ConfigError> {
        for (name, value) in &self.overrides {
            config.set_from_str(name, value)?;
        }
        Ok(())
    }

    /// Forest clearing with a whirling pond, built from procedural meshes.
    pub fn builtin() -> Self {
        let mut objects = vec![SceneObject {
            name: "Floor".into(),
            mesh: MeshSource::Builtin(BuiltinMesh::Plane),
            material: MaterialKind::Shadowed,
            transform: Transform::from_scale(Vec3::splat(5.0)),
            color: Vec3::new(0.45, 0.55, 0.35),
            ..SceneObject::default()
        }];

        let firs = [
            Vec3::new(-50.0, 5.2, -45.296),
            Vec3::new(-50.0, 5.2, -55.296),
            Vec3::new(-60.0, 5.2, -75.296),
            Vec3::new(-30.0, 7.5, -55.296),
            Vec3::new(-10.0, 7.5, -65.296),
            Vec3::new(20.0, 6.2, -65.296),
        ];
        for (i, position) in firs.into_iter().enumerate() {
            objects.push(SceneObject {
                name: format!("Fir{}", i + 1),
                mesh: MeshSource::Builtin(BuiltinMesh::Cone),
                material: MaterialKind::PointLit,
                transform: Transform {
                    position,
                    rotation: Vec3::ZERO,
                    scale: Vec3::new(2.5, 5.0, 2.5),
                },
                color: Vec3::new(0.1, 0.35, 0.15),
                ..SceneObject::default()
            });
        }

        let trees = [
            Vec3::new(-40.0, 6.2, -45.296),
            Vec3::new(55.0, 7.5, -20.296),
            Vec3::new(-40.0, 0.2, 40.296),
            Vec3::new(-60.0, 6.2, 45.296),
            Vec3::new(-60.0, 5.5, 25.296),
            Vec3::new(-55.0, 3.5, -20.296),
            Vec3::new(65.0, 14.5, -60.296),
            Vec3::new(-60.0, 9.2, 70.296),
            Vec3::new(60.0, 8.2, 45.296),
            Vec3::new(60.0, 3.0, 25.296),
        ];
        for (i, position) in trees.into_iter().enumerate() {
            objects.push(SceneObject {
                name: format!("Tree{}", i + 1),
                mesh: MeshSource::Builtin(BuiltinMesh::Sphere),
                material: MaterialKind::PointLit,
                transform: Transform {
                    position,
                    rotation: Vec3::ZERO,
                    scale: Vec3::splat(3.5),
                },
                color: Vec3::new(0.2, 0.5, 0.2),
                ..SceneObject::default()
            });
        }

        let crystals = [
            Vec3::new(-10.7432, 7.0, -55.296),
            Vec3::new(-20.7432, 5.0, -50.296),
            Vec3::new(-30.0, 1.5, -35.296),
            Vec3::new(-10.7432, 6.0, 25.296),
            Vec3::new(-60.7432, 5.0, 15.296),
            Vec3::new(40.0, 4.0, 2.296),
        ];
        for (i, position) in crystals.into_iter().enumerate() {
            objects.push(SceneObject {
                name: format!("Crystal{}", i + 1),
                mesh: MeshSource::Builtin(BuiltinMesh::Crystal),
                material: MaterialKind::PointLit,
                transform: Transform {
                    position,
                    rotation: Vec3::ZERO,
                    scale: Vec3::splat(1.5),
                },
                color: Vec3::new(0.6, 0.3, 0.8),
                ..SceneObject::default()
            });
        }

        objects.push(SceneObject {
            name: "Water".into(),
            mesh: MeshSource::Builtin(BuiltinMesh::Disc),
            material: MaterialKind::Water,
            transform: Transform {
                position: Vec3::new(0.0, 0.05, 0.0),
                rotation: Vec3::new(0.0, 90.0, 0.0),
                scale: Vec3::splat(7.5),
            },
            color: Vec3::new(0.55, 0.7, 0.9),
            spin: -1.0,
            casts_shadow: false,
        });

        Self {
            objects,
            skybox: None,
            base_dir: PathBuf::new(),
            overrides: Vec::new(),
        }
    }
}

/// Shader family a drawable is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Directional light with shadow-map lookups and skybox reflections.
    Shadowed,
    /// Attenuated point light without shadows.
    PointLit,
    /// Reflective, refractive and alpha blended.
    Water,
}

impl MaterialKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "shadowed" | "scene" => MaterialKind::Shadowed,
            "point_lit" | "lit" | "tree" => MaterialKind::PointLit,
            "water" => MaterialKind::Water,
            _ => return None,
        })
    }

    pub fn is_blended(self) -> bool {
        matches!(self, MaterialKind::Water)
    }
}

/// Position, Euler rotation in degrees and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Translation × rotation × scale.
    pub fn model_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        translation * rotation * Mat4::from_scale(self.scale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshSource,
    pub material: MaterialKind,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default = "default_color")]
    pub color: Vec3,
    /// Angular speed around Y in radians per second.
    #[serde(default)]
    pub spin: f32,
    #[serde(default = "default_casts_shadow")]
    pub casts_shadow: bool,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            mesh: MeshSource::Builtin(BuiltinMesh::Cube),
            material: MaterialKind::Shadowed,
            transform: Transform::default(),
            color: default_color(),
            spin: 0.0,
            casts_shadow: default_casts_shadow(),
        }
    }
}

impl SceneObject {
    /// Model matrix at absolute time `current_time`, spin included.
    pub fn model_matrix(&self, current_time: f32) -> Mat4 {
        if self.spin == 0.0 {
            return self.transform.model_matrix();
        }
        let Transform {
            position,
            rotation,
            scale,
        } = self.transform;
        let spun = Transform {
            position: Vec3::ZERO,
            rotation,
            scale,
        };
        Mat4::from_translation(position)
            * Mat4::from_rotation_y(self.spin * current_time)
            * spun.model_matrix()
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_casts_shadow() -> bool {
    true
}

/// Six cubemap face images in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkyboxFaces {
    pub faces: [PathBuf; 6],
}

const FACE_TAGS: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

fn parse_skybox(node: &Node<'_, '_>) -> Result<SkyboxFaces> {
    let mut faces: [PathBuf; 6] = Default::default();
    for (face, tag) in faces.iter_mut().zip(FACE_TAGS) {
        *face = PathBuf::from(required_text(node, tag).context("incomplete <skybox>")?);
    }
    Ok(SkyboxFaces { faces })
}

fn parse_object(node: &Node<'_, '_>) -> Result<SceneObject> {
    let defaults = SceneObject::default();
    let name = required_text(node, "name")?;
    let mesh = MeshSource::parse(&required_text(node, "mesh").with_context(|| format!("object {name}"))?);
    let material = match optional_text(node, "material") {
        Some(material) => MaterialKind::from_name(&material)
            .ok_or_else(|| anyhow!("object {name}: unknown material `{material}`"))?,
        None => defaults.material,
    };
    let transform = Transform {
        position: parse_vec3(optional_text(node, "position"), defaults.transform.position)?,
        rotation: parse_vec3(optional_text(node, "rotation"), defaults.transform.rotation)?,
        scale: parse_vec3(optional_text(node, "scale"), defaults.transform.scale)?,
    };
    Ok(SceneObject {
        color: parse_color(optional_text(node, "color"), defaults.color)?,
        spin: parse_f32(optional_text(node, "spin"), defaults.spin)?,
        casts_shadow: parse_bool(optional_text(node, "casts_shadow"), !material.is_blended())?,
        name,
        mesh,
        material,
        transform,
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<Vec3> {
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("invalid {what} component `{component}`: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("{what} needs exactly 3 components, got `{value}`")),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_components(&value, "vector"),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(parse_components(&value, "color")? / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(anyhow!("failed to parse boolean `{other}`")),
        None => Ok(default),
    }
}
