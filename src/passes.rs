//! Per-pass uniform contract and draw ordering.
//!
//! Programs are shared between drawables, so every helper here writes all the
//! uniforms of its group on every call. A program whose layout lacks a name
//! simply ignores it.

use glam::{Mat3, Mat4, Vec3};

use crate::config::{LightConfig, MaterialConfig, SceneConfig, ShadowConfig};
use crate::particles::{ParticleFrame, StreamState};
use crate::scene::{MaterialKind, Scene, SceneObject};
use crate::shadow::LightSpace;
use crate::uniforms::{UniformKind, UniformLayout, UniformSink};

/// Camera transforms for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
}

impl CameraParams {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// The shader programs built at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Depth,
    Shadowed,
    PointLit,
    Water,
    Skybox,
    Particles,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 6] = [
        ProgramKind::Depth,
        ProgramKind::Shadowed,
        ProgramKind::PointLit,
        ProgramKind::Water,
        ProgramKind::Skybox,
        ProgramKind::Particles,
    ];

    pub fn for_material(material: MaterialKind) -> Self {
        match material {
            MaterialKind::Shadowed => ProgramKind::Shadowed,
            MaterialKind::PointLit => ProgramKind::PointLit,
            MaterialKind::Water => ProgramKind::Water,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Depth => "depth",
            ProgramKind::Shadowed => "shadowed",
            ProgramKind::PointLit => "point lit",
            ProgramKind::Water => "water",
            ProgramKind::Skybox => "skybox",
            ProgramKind::Particles => "particles",
        }
    }

    /// Uniforms the program's shaders read, in declaration order.
    pub fn layout(self) -> UniformLayout {
        use UniformKind::*;
        match self {
            ProgramKind::Depth => {
                UniformLayout::new(&[("light_space_matrix", Mat4), ("model", Mat4)])
            }
            ProgramKind::Shadowed => UniformLayout::new(&[
                ("projection", Mat4),
                ("view", Mat4),
                ("model", Mat4),
                ("light_space_matrix", Mat4),
                ("model_inv_tra", Mat3),
                ("camera_position", Vec3),
                ("specular_exponent", Float),
                ("ambient_light_color", Vec3),
                ("ambient_occlusion_mix", Float),
                ("light_direction", Vec3),
                ("reflection_mix", Float),
                ("light_color", Vec3),
                ("shadow_bias", Float),
                ("object_color", Vec3),
                ("soft_shadows", Bool),
            ]),
            ProgramKind::PointLit => UniformLayout::new(&[
                ("projection", Mat4),
                ("view", Mat4),
                ("model", Mat4),
                ("model_view_inv_tra", Mat3),
                ("camera_position", Vec3),
                ("specular_exponent", Float),
                ("ambient_light_color", Vec3),
                ("attenuation_c0", Float),
                ("light_position", Vec3),
                ("attenuation_c1", Float),
                ("light_color", Vec3),
                ("attenuation_c2", Float),
                ("object_color", Vec3),
                ("ambient_occlusion_mix", Float),
            ]),
            ProgramKind::Water => UniformLayout::new(&[
                ("projection", Mat4),
                ("view", Mat4),
                ("model", Mat4),
                ("model_inv_tra", Mat3),
                ("camera_position", Vec3),
                ("reflection_factor", Float),
                ("light_direction", Vec3),
                ("refraction_index", Float),
                ("light_color", Vec3),
                ("specular_exponent", Float),
                ("ambient_light_color", Vec3),
                ("object_color", Vec3),
            ]),
            ProgramKind::Skybox => UniformLayout::new(&[("projection", Mat4), ("view", Mat4)]),
            ProgramKind::Particles => UniformLayout::new(&[
                ("view_proj", Mat4),
                ("prev_view_proj", Mat4),
                ("offsets", Vec3),
                ("box_size", Float),
                ("inverse_velocity", Vec3),
                ("render_lines", Bool),
                ("camera_position", Vec3),
                ("forward_offset", Vec3),
            ]),
        }
    }
}

pub fn apply_camera(sink: &mut dyn UniformSink, camera: &CameraParams) {
    sink.set_mat4("projection", camera.projection);
    sink.set_mat4("view", camera.view);
    sink.set_vec3("camera_position", camera.position);
}

/// Ambient and direct light are pre-multiplied by their intensities.
pub fn apply_lighting(sink: &mut dyn UniformSink, light: &LightConfig) {
    sink.set_vec3("ambient_light_color", light.ambient());
    sink.set_vec3("light_position", light.position);
    sink.set_vec3("light_direction", light.direction.normalize_or_zero());
    sink.set_vec3("light_color", light.radiance());
    sink.set_float("attenuation_c0", light.attenuation_constant);
    sink.set_float("attenuation_c1", light.attenuation_linear);
    sink.set_float("attenuation_c2", light.attenuation_quadratic);
}

pub fn apply_material(sink: &mut dyn UniformSink, material: &MaterialConfig, color: Vec3) {
    sink.set_float("specular_exponent", material.specular_exponent);
    sink.set_float("ambient_occlusion_mix", material.ambient_occlusion_mix);
    sink.set_float("normal_mapping_mix", material.normal_mapping_mix);
    sink.set_float("reflection_mix", material.reflection_mix);
    sink.set_vec3("object_color", color);
}

pub fn apply_shadow_sampling(
    sink: &mut dyn UniformSink,
    light_space: &LightSpace,
    shadow: &ShadowConfig,
) {
    sink.set_mat4("light_space_matrix", light_space.matrix);
    sink.set_float("shadow_bias", shadow.scaled_bias());
    sink.set_bool("soft_shadows", shadow.soft_shadows);
}

pub fn apply_environment(sink: &mut dyn UniformSink, material: &MaterialConfig) {
    sink.set_float("reflection_factor", material.reflection_factor);
    sink.set_float("refraction_index", material.refraction_index);
}

/// Model matrix plus the two normal matrices the lit programs use.
pub fn apply_transform(sink: &mut dyn UniformSink, model: Mat4, view: Mat4) {
    sink.set_mat4("model", model);
    sink.set_mat3("model_inv_tra", normal_matrix(model));
    sink.set_mat3("model_view_inv_tra", normal_matrix(view * model));
}

pub fn normal_matrix(matrix: Mat4) -> Mat3 {
    Mat3::from_mat4(matrix).inverse().transpose()
}

pub fn apply_depth_pass(sink: &mut dyn UniformSink, light_space: &LightSpace, model: Mat4) {
    sink.set_mat4("light_space_matrix", light_space.matrix);
    sink.set_mat4("model", model);
}

/// The skybox follows camera rotation but never its translation.
pub fn apply_skybox(sink: &mut dyn UniformSink, camera: &CameraParams) {
    sink.set_mat4("projection", camera.projection);
    sink.set_mat4("view", Mat4::from_mat3(Mat3::from_mat4(camera.view)));
}

pub fn apply_particles(sink: &mut dyn UniformSink, frame: &ParticleFrame, stream: &StreamState) {
    sink.set_mat4("view_proj", frame.view_proj);
    sink.set_mat4("prev_view_proj", frame.prev_view_proj);
    sink.set_vec3("offsets", stream.offsets);
    sink.set_vec3("inverse_velocity", stream.inverse_velocity);
    sink.set_float("box_size", frame.box_size);
    sink.set_bool("render_lines", frame.render_lines);
    sink.set_vec3("camera_position", frame.camera_position);
    sink.set_vec3("forward_offset", frame.forward_offset);
}

/// Shared state every object draw reads from.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub config: &'a SceneConfig,
    pub camera: &'a CameraParams,
    pub light_space: &'a LightSpace,
    pub current_time: f32,
}

/// Full uniform contract for one scene object in the main pass.
pub fn apply_object(sink: &mut dyn UniformSink, context: &PassContext<'_>, object: &SceneObject) {
    apply_camera(sink, context.camera);
    apply_lighting(sink, &context.config.light);
    apply_material(sink, &context.config.material, object.color);
    apply_shadow_sampling(sink, context.light_space, &context.config.shadow);
    apply_environment(sink, &context.config.material);
    apply_transform(
        sink,
        object.model_matrix(context.current_time),
        context.camera.view,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrawPhase {
    ShadowDepth,
    Skybox,
    Opaque,
    Blended,
}

impl DrawPhase {
    pub fn blends(self) -> bool {
        matches!(self, DrawPhase::Blended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    /// Index into [`Scene::objects`].
    Object(usize),
    Skybox,
    Particles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub phase: DrawPhase,
    pub target: DrawTarget,
}

impl DrawCommand {
    pub fn program(&self, scene: &Scene) -> Option<ProgramKind> {
        match (self.phase, self.target) {
            (DrawPhase::ShadowDepth, _) => Some(ProgramKind::Depth),
            (_, DrawTarget::Skybox) => Some(ProgramKind::Skybox),
            (_, DrawTarget::Particles) => Some(ProgramKind::Particles),
            (_, DrawTarget::Object(index)) => scene
                .objects
                .get(index)
                .map(|object| ProgramKind::for_material(object.material)),
        }
    }
}

/// Orders a frame: shadow casters, skybox, opaque objects, then particles
/// and blended objects.
pub fn plan_draws(scene: &Scene) -> Vec<DrawCommand> {
    let mut commands = Vec::with_capacity(scene.objects.len() * 2 + 2);
    let command = |phase, target| DrawCommand { phase, target };

    for (index, object) in scene.objects.iter().enumerate() {
        if object.casts_shadow {
            commands.push(command(DrawPhase::ShadowDepth, DrawTarget::Object(index)));
        }
    }
    commands.push(command(DrawPhase::Skybox, DrawTarget::Skybox));
    for (index, object) in scene.objects.iter().enumerate() {
        if !object.material.is_blended() {
            commands.push(command(DrawPhase::Opaque, DrawTarget::Object(index)));
        }
    }
    commands.push(command(DrawPhase::Blended, DrawTarget::Particles));
    for (index, object) in scene.objects.iter().enumerate() {
        if object.material.is_blended() {
            commands.push(command(DrawPhase::Blended, DrawTarget::Object(index)));
        }
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::PrecipitationSystem;
    use crate::uniforms::UniformBlock;

    fn camera() -> CameraParams {
        let position = Vec3::new(1.0, 2.0, 3.0);
        CameraParams {
            view: Mat4::look_at_rh(position, position + Vec3::NEG_Z, Vec3::Y),
            projection: Mat4::perspective_rh(1.2, 1.5, 0.1, 110.0),
            position,
            forward: Vec3::NEG_Z,
        }
    }

    #[test]
    fn every_layout_fits_uniform_alignment() {
        for kind in ProgramKind::ALL {
            let layout = kind.layout();
            assert_eq!(layout.size() % 16, 0, "{}", kind.label());
            assert!(layout.wgsl_struct("Uniforms").contains("struct Uniforms"));
        }
    }

    #[test]
    fn shadow_bias_is_scaled_and_toggle_uploaded() {
        let mut config = SceneConfig::default();
        config.shadow.bias = 0.07;
        config.shadow.soft_shadows = true;
        let light_space = LightSpace::new(&config.light, &config.shadow);
        let mut block = UniformBlock::new(ProgramKind::Shadowed.layout());
        apply_shadow_sampling(&mut block, &light_space, &config.shadow);
        let bias = block.float("shadow_bias").unwrap();
        assert!((bias - 0.0007).abs() < 1e-7);
        assert_eq!(block.uint("soft_shadows"), Some(1));
        assert_eq!(block.mat4("light_space_matrix"), Some(light_space.matrix));
    }

    #[test]
    fn light_colors_are_premultiplied() {
        let config = SceneConfig::default();
        let mut block = UniformBlock::new(ProgramKind::Shadowed.layout());
        apply_lighting(&mut block, &config.light);
        let ambient = block.vec3("ambient_light_color").unwrap();
        assert!((ambient - config.light.ambient_color * config.light.ambient_intensity).length() < 1e-6);
        let direction = block.vec3("light_direction").unwrap();
        assert!((direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn programs_ignore_uniforms_they_do_not_read() {
        let config = SceneConfig::default();
        let camera = camera();
        let light_space = LightSpace::new(&config.light, &config.shadow);
        let context = PassContext {
            config: &config,
            camera: &camera,
            light_space: &light_space,
            current_time: 0.0,
        };
        let object = SceneObject::default();
        let mut depth = UniformBlock::new(ProgramKind::Depth.layout());
        apply_object(&mut depth, &context, &object);
        assert_eq!(depth.mat4("model"), Some(Mat4::IDENTITY));
        assert!(!depth.contains("camera_position"));
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(model) * Vec3::new(1.0, 1.0, 0.0);
        assert!((normal - Vec3::new(0.5, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn skybox_view_drops_translation() {
        let mut block = UniformBlock::new(ProgramKind::Skybox.layout());
        apply_skybox(&mut block, &camera());
        let view = block.mat4("view").unwrap();
        assert_eq!(view.w_axis, glam::Vec4::W);
    }

    #[test]
    fn particle_uniforms_follow_frame() {
        let config = SceneConfig::default();
        let system = PrecipitationSystem::new(&config.precipitation);
        let frame = system.prepare(
            &config.precipitation,
            1.0,
            Vec3::ZERO,
            Vec3::NEG_Z,
            Mat4::IDENTITY,
        );
        let mut block = UniformBlock::new(ProgramKind::Particles.layout());
        apply_particles(&mut block, &frame, &frame.streams[2]);
        assert_eq!(block.vec3("offsets"), Some(frame.streams[2].offsets));
        assert_eq!(block.float("box_size"), Some(30.0));
        assert_eq!(block.uint("render_lines"), Some(1));
    }

    #[test]
    fn draws_are_ordered_by_phase() {
        let scene = Scene::builtin();
        let plan = plan_draws(&scene);
        assert!(plan.windows(2).all(|pair| pair[0].phase <= pair[1].phase));

        let skybox = plan
            .iter()
            .position(|c| c.target == DrawTarget::Skybox)
            .unwrap();
        let particles = plan
            .iter()
            .position(|c| c.target == DrawTarget::Particles)
            .unwrap();
        assert!(skybox < particles);
        for command in plan.iter().filter(|c| c.phase.blends()) {
            match command.target {
                DrawTarget::Particles => {}
                DrawTarget::Object(index) => {
                    assert_eq!(scene.objects[index].material, MaterialKind::Water)
                }
                DrawTarget::Skybox => panic!("skybox must not blend"),
            }
        }
        let water = scene
            .objects
            .iter()
            .position(|o| o.material == MaterialKind::Water)
            .unwrap();
        assert!(!plan
            .iter()
            .any(|c| c.phase == DrawPhase::ShadowDepth && c.target == DrawTarget::Object(water)));
        assert_eq!(
            plan[0].program(&scene),
            Some(ProgramKind::Depth)
        );
    }
}
