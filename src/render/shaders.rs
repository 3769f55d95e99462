//! WGSL sources. The `Uniforms` struct is generated from each program's
//! [`UniformLayout`] and prepended to the body.

use crate::passes::ProgramKind;
use crate::uniforms::UniformLayout;

pub fn source(kind: ProgramKind, layout: &UniformLayout) -> String {
    let body = match kind {
        ProgramKind::Depth => DEPTH,
        ProgramKind::Shadowed => SHADOWED,
        ProgramKind::PointLit => POINT_LIT,
        ProgramKind::Water => WATER,
        ProgramKind::Skybox => SKYBOX,
        ProgramKind::Particles => PARTICLES,
    };
    format!(
        "{}\n@group(0) @binding(0)\nvar<uniform> u: Uniforms;\n{}",
        layout.wgsl_struct("Uniforms"),
        body
    )
}

const DEPTH: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> @builtin(position) vec4<f32> {
    return u.light_space_matrix * u.model * vec4<f32>(input.position, 1.0);
}
"#;

const SHADOWED: &str = r#"
@group(1) @binding(0)
var shadow_map: texture_depth_2d;
@group(1) @binding(1)
var shadow_sampler: sampler_comparison;
@group(1) @binding(2)
var skybox: texture_cube<f32>;
@group(1) @binding(3)
var skybox_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) light_space_pos: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = u.model * vec4<f32>(input.position, 1.0);
    out.clip = u.projection * u.view * world;
    out.world_pos = world.xyz;
    out.normal = u.model_inv_tra * input.normal;
    out.light_space_pos = u.light_space_matrix * world;
    return out;
}

// 1.0 when lit. Points outside the light frustum are lit.
fn shadow_factor(light_space_pos: vec4<f32>) -> f32 {
    let ndc = light_space_pos.xyz / light_space_pos.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, ndc.y * -0.5 + 0.5);
    if (ndc.z > 1.0 || any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0))) {
        return 1.0;
    }
    let depth = ndc.z - u.shadow_bias;
    if (u.soft_shadows == 0u) {
        return textureSampleCompareLevel(shadow_map, shadow_sampler, uv, depth);
    }
    let texel = 1.0 / vec2<f32>(textureDimensions(shadow_map));
    var lit = 0.0;
    for (var x: i32 = -1; x <= 1; x = x + 1) {
        for (var y: i32 = -1; y <= 1; y = y + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit = lit + textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, depth);
        }
    }
    return lit / 9.0;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.normal);
    let l = normalize(-u.light_direction);
    let v = normalize(u.camera_position - input.world_pos);
    let h = normalize(l + v);

    let diffuse = max(dot(n, l), 0.0);
    let specular = pow(max(dot(n, h), 0.0), u.specular_exponent);
    let shadow = shadow_factor(input.light_space_pos);
    let occlusion = mix(1.0, 0.5 + 0.5 * n.y, u.ambient_occlusion_mix);

    let direct = (diffuse * u.object_color + specular) * u.light_color * shadow;
    var color = u.ambient_light_color * u.object_color * occlusion + direct;
    let reflection = textureSampleLevel(skybox, skybox_sampler, reflect(-v, n), 0.0).rgb;
    color = mix(color, reflection, u.reflection_mix);
    return vec4<f32>(color, 1.0);
}
"#;

const POINT_LIT: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) view_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let view_pos = u.view * u.model * vec4<f32>(input.position, 1.0);
    out.clip = u.projection * view_pos;
    out.view_pos = view_pos.xyz;
    out.normal = u.model_view_inv_tra * input.normal;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let light_pos = (u.view * vec4<f32>(u.light_position, 1.0)).xyz;
    let to_light = light_pos - input.view_pos;
    let dist = length(to_light);
    let attenuation = 1.0 / (u.attenuation_c0 + u.attenuation_c1 * dist
        + u.attenuation_c2 * dist * dist);

    let n = normalize(input.normal);
    let l = to_light / max(dist, 1e-4);
    let v = normalize(-input.view_pos);
    let h = normalize(l + v);
    let diffuse = max(dot(n, l), 0.0);
    let specular = pow(max(dot(n, h), 0.0), u.specular_exponent);
    let occlusion = mix(1.0, 0.5 + 0.5 * n.y, u.ambient_occlusion_mix);

    let ambient = u.ambient_light_color * u.object_color * occlusion;
    let direct = (diffuse * u.object_color + specular) * u.light_color * attenuation;
    return vec4<f32>(ambient + direct, 1.0);
}
"#;

const WATER: &str = r#"
@group(1) @binding(2)
var skybox: texture_cube<f32>;
@group(1) @binding(3)
var skybox_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = u.model * vec4<f32>(input.position, 1.0);
    out.clip = u.projection * u.view * world;
    out.world_pos = world.xyz;
    out.normal = u.model_inv_tra * input.normal;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.normal);
    let incident = normalize(input.world_pos - u.camera_position);
    let reflected = textureSampleLevel(skybox, skybox_sampler, reflect(incident, n), 0.0).rgb;
    let refracted = textureSampleLevel(
        skybox, skybox_sampler, refract(incident, n, 1.0 / u.refraction_index), 0.0).rgb;
    let environment = mix(refracted, reflected, u.reflection_factor);

    let l = normalize(-u.light_direction);
    let h = normalize(l - incident);
    let specular = pow(max(dot(n, h), 0.0), u.specular_exponent) * u.light_color;
    let color = environment * u.object_color + u.ambient_light_color * 0.1 + specular;
    return vec4<f32>(color, 0.75);
}
"#;

const SKYBOX: &str = r#"
@group(1) @binding(2)
var skybox: texture_cube<f32>;
@group(1) @binding(3)
var skybox_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) direction: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let clip = u.projection * u.view * vec4<f32>(input.position, 1.0);
    // z = w puts every fragment on the far plane
    out.clip = clip.xyww;
    out.direction = input.position;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(skybox, skybox_sampler, input.direction);
}
"#;

const PARTICLES: &str = r#"
struct VertexInput {
    @builtin(vertex_index) index: u32,
    @location(0) position: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) alpha: f32,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    // base positions and offsets are both in [0, box_size)
    let wrapped = (input.position + u.offsets) % vec3<f32>(u.box_size);
    let world = wrapped + u.camera_position + u.forward_offset - vec3<f32>(u.box_size * 0.5);

    out.clip = u.view_proj * vec4<f32>(world, 1.0);
    if (u.render_lines != 0u && (input.index & 1u) == 1u) {
        out.clip = u.prev_view_proj * vec4<f32>(world + u.inverse_velocity, 1.0);
    }
    let dist = length(world - u.camera_position);
    out.alpha = clamp(1.0 - dist / u.box_size, 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var tint = vec3<f32>(1.0);
    if (u.render_lines != 0u) {
        tint = vec3<f32>(0.7, 0.75, 0.85);
    }
    return vec4<f32>(tint, input.alpha * 0.8);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_declare_the_generated_struct() {
        for kind in ProgramKind::ALL {
            let layout = kind.layout();
            let wgsl = source(kind, &layout);
            assert!(wgsl.starts_with("struct Uniforms {"));
            assert!(wgsl.contains("fn vs_main"), "{}", kind.label());
        }
    }

    #[test]
    fn depth_only_program_has_no_fragment_stage() {
        let wgsl = source(ProgramKind::Depth, &ProgramKind::Depth.layout());
        assert!(!wgsl.contains("fn fs_main"));
    }

    #[test]
    fn every_uniform_read_is_declared() {
        for kind in ProgramKind::ALL {
            let layout = kind.layout();
            let wgsl = source(kind, &layout);
            let mut rest = wgsl.as_str();
            while let Some(start) = rest.find("u.") {
                let name: String = rest[start + 2..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                assert!(
                    layout.field(&name).is_some(),
                    "{} reads undeclared uniform `{name}`",
                    kind.label()
                );
                rest = &rest[start + 2..];
            }
        }
    }
}
