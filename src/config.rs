use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraMode;
use crate::particles::PrecipitationMode;

/// Errors produced when mutating the configuration by parameter name.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("parameter `{name}` expects a {expected} value")]
    TypeMismatch { name: String, expected: ParamKind },
    #[error("invalid value `{value}` for parameter `{name}`")]
    InvalidValue { name: String, value: String },
}

/// Value type of a bindable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Vec3,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Float => "float",
            ParamKind::Int => "integer",
            ParamKind::Bool => "boolean",
            ParamKind::Vec3 => "vec3",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec3(Vec3),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Vec3(_) => ParamKind::Vec3,
        }
    }

    /// False for infinite or NaN floats and vectors with such a component.
    pub fn is_finite(&self) -> bool {
        match self {
            ParamValue::Float(value) => value.is_finite(),
            ParamValue::Vec3(value) => value.is_finite(),
            ParamValue::Int(_) | ParamValue::Bool(_) => true,
        }
    }

    /// Parses `text` as a value of the requested kind.
    ///
    /// Vectors accept whitespace or comma separated components, booleans
    /// accept `true/false`, `on/off` and `1/0`.
    pub fn parse(kind: ParamKind, text: &str) -> Option<Self> {
        let text = text.trim();
        match kind {
            ParamKind::Float => text.parse::<f32>().ok().map(ParamValue::Float),
            ParamKind::Int => text.parse::<i32>().ok().map(ParamValue::Int),
            ParamKind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(ParamValue::Bool(true)),
                "false" | "off" | "0" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            ParamKind::Vec3 => {
                let components = text
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|part| !part.is_empty())
                    .map(str::parse::<f32>)
                    .collect::<Result<Vec<_>, _>>()
                    .ok()?;
                match components.as_slice() {
                    [x, y, z] => Some(ParamValue::Vec3(Vec3::new(*x, *y, *z))),
                    _ => None,
                }
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(value) => write!(f, "{value:.3}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Vec3(v) => write!(f, "({:.2}, {:.2}, {:.2})", v.x, v.y, v.z),
        }
    }
}

/// Names and kinds of every parameter a control panel may bind to.
pub const PARAMETERS: &[(&str, ParamKind)] = &[
    ("ambient_light_color", ParamKind::Vec3),
    ("ambient_light_intensity", ParamKind::Float),
    ("light_position", ParamKind::Vec3),
    ("light_direction", ParamKind::Vec3),
    ("light_color", ParamKind::Vec3),
    ("light_intensity", ParamKind::Float),
    ("attenuation_constant", ParamKind::Float),
    ("attenuation_linear", ParamKind::Float),
    ("attenuation_quadratic", ParamKind::Float),
    ("specular_exponent", ParamKind::Float),
    ("ambient_occlusion_mix", ParamKind::Float),
    ("normal_mapping_mix", ParamKind::Float),
    ("reflection_mix", ParamKind::Float),
    ("reflection_factor", ParamKind::Float),
    ("refraction_index", ParamKind::Float),
    ("soft_shadows", ParamKind::Bool),
    ("shadow_bias", ParamKind::Float),
    ("shadow_map_size", ParamKind::Float),
    ("shadow_map_depth_range", ParamKind::Float),
    ("snow", ParamKind::Bool),
    ("box_size", ParamKind::Float),
    ("particle_vertex_count", ParamKind::Int),
    ("particle_seed", ParamKind::Int),
    ("snow_scale", ParamKind::Float),
    ("rain_scale", ParamKind::Float),
    ("particle_damping", ParamKind::Float),
    ("first_person_camera", ParamKind::Bool),
    ("camera_fov", ParamKind::Float),
    ("camera_position", ParamKind::Vec3),
    ("camera_linear_speed", ParamKind::Float),
    ("camera_rotation_gain", ParamKind::Float),
    ("loop_interval", ParamKind::Float),
];

/// Ambient and directional/point light description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub attenuation_constant: f32,
    pub attenuation_linear: f32,
    pub attenuation_quadratic: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::new(1.0, 0.9, 0.9),
            ambient_intensity: 0.925,
            position: Vec3::new(10.2, 20.5, 0.8),
            direction: Vec3::new(2.7, -1.0, 0.7),
            color: Vec3::new(1.0, 0.5, 1.0),
            intensity: 0.75,
            attenuation_constant: 0.25,
            attenuation_linear: 0.1,
            attenuation_quadratic: 0.1,
        }
    }
}

impl LightConfig {
    /// Ambient color premultiplied by its intensity.
    pub fn ambient(&self) -> Vec3 {
        self.ambient_color * self.ambient_intensity
    }

    /// Light color premultiplied by its intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub specular_exponent: f32,
    pub ambient_occlusion_mix: f32,
    pub normal_mapping_mix: f32,
    pub reflection_mix: f32,
    pub reflection_factor: f32,
    pub refraction_index: f32,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            specular_exponent: 27.0,
            ambient_occlusion_mix: 1.0,
            normal_mapping_mix: 1.0,
            reflection_mix: 0.15,
            reflection_factor: 0.5,
            refraction_index: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub soft_shadows: bool,
    /// Bias in the units shown to users; see [`ShadowConfig::scaled_bias`].
    pub bias: f32,
    /// Width and height of the orthographic light frustum.
    pub map_size: f32,
    pub depth_range: f32,
    /// Texel resolution of the depth target.
    pub resolution: [u32; 2],
}

impl ShadowConfig {
    pub const BIAS_SCALE: f32 = 0.01;

    /// Bias as consumed by the shadow comparison.
    pub fn scaled_bias(&self) -> f32 {
        self.bias * Self::BIAS_SCALE
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            soft_shadows: false,
            bias: 0.07,
            map_size: 5.0,
            depth_range: 20.0,
            resolution: [1280, 720],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecipitationConfig {
    pub mode: PrecipitationMode,
    pub box_size: f32,
    /// Number of vertices in the base buffer; pairs of vertices form one particle.
    pub vertex_count: u32,
    pub seed: u64,
    pub snow_scale: f32,
    pub rain_scale: f32,
    pub damping: f32,
}

impl Default for PrecipitationConfig {
    fn default() -> Self {
        Self {
            mode: PrecipitationMode::Rain,
            box_size: 30.0,
            vertex_count: 2000,
            seed: 0x5eed,
            snow_scale: 0.2,
            rain_scale: 1.0,
            damping: 0.025,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mode: CameraMode,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub forward: Vec3,
    pub linear_speed: f32,
    pub rotation_gain: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            mode: CameraMode::FirstPerson,
            fov_degrees: 70.0,
            near: 0.1,
            far: 110.0,
            position: Vec3::new(0.0, 10.6, 0.0),
            forward: Vec3::new(0.0, 0.0, -1.0),
            linear_speed: 30.0,
            rotation_gain: 800.0,
        }
    }
}

/// Everything the frame loop reads each frame and a control panel may edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub light: LightConfig,
    pub material: MaterialConfig,
    pub shadow: ShadowConfig,
    pub precipitation: PrecipitationConfig,
    pub camera: CameraConfig,
    /// Minimum frame duration in seconds.
    pub loop_interval: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            light: LightConfig::default(),
            material: MaterialConfig::default(),
            shadow: ShadowConfig::default(),
            precipitation: PrecipitationConfig::default(),
            camera: CameraConfig::default(),
            loop_interval: 0.02,
        }
    }
}

impl SceneConfig {
    pub fn parameters() -> &'static [(&'static str, ParamKind)] {
        PARAMETERS
    }

    pub fn param_kind(name: &str) -> Option<ParamKind> {
        PARAMETERS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    /// Parses `text` according to the parameter's kind and applies it.
    pub fn set_from_str(&mut self, name: &str, text: &str) -> Result<(), ConfigError> {
        let kind =
            Self::param_kind(name).ok_or_else(|| ConfigError::UnknownParameter(name.into()))?;
        let value = ParamValue::parse(kind, text).ok_or_else(|| ConfigError::InvalidValue {
            name: name.into(),
            value: text.into(),
        })?;
        self.set(name, value)
    }

    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ConfigError> {
        let kind =
            Self::param_kind(name).ok_or_else(|| ConfigError::UnknownParameter(name.into()))?;
        if value.kind() != kind {
            return Err(ConfigError::TypeMismatch {
                name: name.into(),
                expected: kind,
            });
        }
        let invalid = || ConfigError::InvalidValue {
            name: name.into(),
            value: value.to_string(),
        };
        if !value.is_finite() {
            return Err(invalid());
        }

        use ParamValue::{Bool, Float, Int};
        match (name, value) {
            ("ambient_light_color", ParamValue::Vec3(v)) => self.light.ambient_color = v,
            ("ambient_light_intensity", Float(v)) => self.light.ambient_intensity = v,
            ("light_position", ParamValue::Vec3(v)) => self.light.position = v,
            ("light_direction", ParamValue::Vec3(v)) => {
                if v.length_squared() <= f32::EPSILON {
                    return Err(invalid());
                }
                self.light.direction = v;
            }
            ("light_color", ParamValue::Vec3(v)) => self.light.color = v,
            ("light_intensity", Float(v)) => self.light.intensity = v,
            ("attenuation_constant", Float(v)) => self.light.attenuation_constant = v,
            ("attenuation_linear", Float(v)) => self.light.attenuation_linear = v,
            ("attenuation_quadratic", Float(v)) => self.light.attenuation_quadratic = v,
            ("specular_exponent", Float(v)) => self.material.specular_exponent = v,
            ("ambient_occlusion_mix", Float(v)) => self.material.ambient_occlusion_mix = v,
            ("normal_mapping_mix", Float(v)) => self.material.normal_mapping_mix = v,
            ("reflection_mix", Float(v)) => self.material.reflection_mix = v,
            ("reflection_factor", Float(v)) => self.material.reflection_factor = v,
            ("refraction_index", Float(v)) => {
                if v <= 0.0 {
                    return Err(invalid());
                }
                self.material.refraction_index = v;
            }
            ("soft_shadows", Bool(v)) => self.shadow.soft_shadows = v,
            ("shadow_bias", Float(v)) => self.shadow.bias = v,
            ("shadow_map_size", Float(v)) => {
                if v <= 0.0 {
                    return Err(invalid());
                }
                self.shadow.map_size = v;
            }
            ("shadow_map_depth_range", Float(v)) => {
                if v <= 0.0 {
                    return Err(invalid());
                }
                self.shadow.depth_range = v;
            }
            ("snow", Bool(v)) => {
                self.precipitation.mode = if v {
                    PrecipitationMode::Snow
                } else {
                    PrecipitationMode::Rain
                };
            }
            ("box_size", Float(v)) => {
                if v <= 0.0 {
                    return Err(invalid());
                }
                self.precipitation.box_size = v;
            }
            ("particle_vertex_count", Int(v)) => {
                if v < 2 {
                    return Err(invalid());
                }
                self.precipitation.vertex_count = v as u32;
            }
            ("particle_seed", Int(v)) => self.precipitation.seed = v as u64,
            ("snow_scale", Float(v)) => self.precipitation.snow_scale = v,
            ("rain_scale", Float(v)) => self.precipitation.rain_scale = v,
            ("particle_damping", Float(v)) => self.precipitation.damping = v,
            ("first_person_camera", Bool(v)) => {
                self.camera.mode = if v {
                    CameraMode::FirstPerson
                } else {
                    CameraMode::Orbit
                };
            }
            ("camera_fov", Float(v)) => {
                if !(1.0..179.0).contains(&v) {
                    return Err(invalid());
                }
                self.camera.fov_degrees = v;
            }
            ("camera_position", ParamValue::Vec3(v)) => self.camera.position = v,
            ("camera_linear_speed", Float(v)) => self.camera.linear_speed = v,
            ("camera_rotation_gain", Float(v)) => self.camera.rotation_gain = v,
            ("loop_interval", Float(v)) => {
                if v < 0.0 {
                    return Err(invalid());
                }
                self.loop_interval = v;
            }
            _ => return Err(ConfigError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    /// Current value of a named parameter.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        use ParamValue::{Bool, Float, Int};
        Some(match name {
            "ambient_light_color" => ParamValue::Vec3(self.light.ambient_color),
            "ambient_light_intensity" => Float(self.light.ambient_intensity),
            "light_position" => ParamValue::Vec3(self.light.position),
            "light_direction" => ParamValue::Vec3(self.light.direction),
            "light_color" => ParamValue::Vec3(self.light.color),
            "light_intensity" => Float(self.light.intensity),
            "attenuation_constant" => Float(self.light.attenuation_constant),
            "attenuation_linear" => Float(self.light.attenuation_linear),
            "attenuation_quadratic" => Float(self.light.attenuation_quadratic),
            "specular_exponent" => Float(self.material.specular_exponent),
            "ambient_occlusion_mix" => Float(self.material.ambient_occlusion_mix),
            "normal_mapping_mix" => Float(self.material.normal_mapping_mix),
            "reflection_mix" => Float(self.material.reflection_mix),
            "reflection_factor" => Float(self.material.reflection_factor),
            "refraction_index" => Float(self.material.refraction_index),
            "soft_shadows" => Bool(self.shadow.soft_shadows),
            "shadow_bias" => Float(self.shadow.bias),
            "shadow_map_size" => Float(self.shadow.map_size),
            "shadow_map_depth_range" => Float(self.shadow.depth_range),
            "snow" => Bool(self.precipitation.mode == PrecipitationMode::Snow),
            "box_size" => Float(self.precipitation.box_size),
            "particle_vertex_count" => Int(self.precipitation.vertex_count as i32),
            "particle_seed" => Int(self.precipitation.seed as i32),
            "snow_scale" => Float(self.precipitation.snow_scale),
            "rain_scale" => Float(self.precipitation.rain_scale),
            "particle_damping" => Float(self.precipitation.damping),
            "first_person_camera" => Bool(self.camera.mode == CameraMode::FirstPerson),
            "camera_fov" => Float(self.camera.fov_degrees),
            "camera_position" => ParamValue::Vec3(self.camera.position),
            "camera_linear_speed" => Float(self.camera.linear_speed),
            "camera_rotation_gain" => Float(self.camera.rotation_gain),
            "loop_interval" => Float(self.loop_interval),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_parameter_round_trips() {
        let mut config = SceneConfig::default();
        for (name, kind) in SceneConfig::parameters() {
            let value = config.get(name).unwrap();
            assert_eq!(value.kind(), *kind, "{name}");
            config.set(name, value).unwrap();
        }
        assert_eq!(config, SceneConfig::default());
    }

    #[test]
    fn setters_mutate_owned_instance() {
        let mut config = SceneConfig::default();
        config.set("shadow_bias", ParamValue::Float(0.5)).unwrap();
        config.set_from_str("light_position", "1, 2, 3").unwrap();
        config.set_from_str("snow", "on").unwrap();
        assert_eq!(config.shadow.bias, 0.5);
        assert_eq!(config.light.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(config.precipitation.mode, PrecipitationMode::Snow);
    }

    #[test]
    fn rejects_unknown_and_mistyped_parameters() {
        let mut config = SceneConfig::default();
        assert_eq!(
            config.set("does_not_exist", ParamValue::Float(1.0)),
            Err(ConfigError::UnknownParameter("does_not_exist".into()))
        );
        assert!(matches!(
            config.set("soft_shadows", ParamValue::Float(1.0)),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert!(matches!(
            config.set_from_str("box_size", "-4"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set_from_str("light_color", "1 2"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut config = SceneConfig::default();
        for name in ["box_size", "loop_interval", "shadow_map_size", "shadow_map_depth_range"] {
            for text in ["inf", "-inf", "NaN"] {
                assert!(
                    matches!(
                        config.set_from_str(name, text),
                        Err(ConfigError::InvalidValue { .. })
                    ),
                    "{name} accepted {text}"
                );
            }
        }
        assert!(config.set_from_str("light_position", "1 NaN 3").is_err());
        assert!(config.set("specular_exponent", ParamValue::Float(f32::INFINITY)).is_err());
        assert_eq!(config, SceneConfig::default());
    }

    #[test]
    fn bias_is_scaled_before_upload() {
        let shadow = ShadowConfig::default();
        assert!((shadow.scaled_bias() - 0.0007).abs() < 1e-7);
    }
}
