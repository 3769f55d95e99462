use glam::{Mat4, Vec3};

use shadowfall::config::{CameraConfig, LightConfig, PrecipitationConfig, ShadowConfig};
use shadowfall::{
    Camera, CameraMovement, FirstPersonCamera, LightSpace, PrecipitationSystem, DEFAULT_STREAMS,
};

fn assert_vec3_near(actual: Vec3, expected: Vec3) {
    assert!(
        (actual - expected).length() < 1e-4,
        "expected {expected:?}, got {actual:?}"
    );
}

#[test]
fn one_forward_tick_moves_the_camera() {
    let config = CameraConfig {
        position: Vec3::ZERO,
        forward: Vec3::NEG_Z,
        linear_speed: 30.0,
        ..CameraConfig::default()
    };
    let mut camera = FirstPersonCamera::new(&config);

    camera.process_keyboard(CameraMovement::Forward, 0.02);

    assert_vec3_near(camera.position(), Vec3::new(0.0, 0.0, -0.6));
    assert_vec3_near(camera.forward(), Vec3::NEG_Z);
}

#[test]
fn first_rain_stream_wraps_into_the_box() {
    let config = PrecipitationConfig {
        box_size: 30.0,
        ..PrecipitationConfig::default()
    };
    let stream = DEFAULT_STREAMS[0];
    assert_eq!(stream.velocity, Vec3::new(0.0, 10.0, 0.0));
    assert_eq!(stream.wind, Vec3::new(0.85, 0.0, 0.0));

    // Box centred ahead of the camera: the -z forward offset cancels the
    // half-box shift on that axis.
    let ahead = PrecipitationSystem::stream_state(&config, &stream, 0.0, Vec3::ZERO, Vec3::NEG_Z);
    assert_vec3_near(ahead.offsets, Vec3::new(15.1, 15.2, 0.3));

    // Box centred on the camera: (0.1, 0.2, 0.3) - 15 wrapped into [0, 30).
    let centred = PrecipitationSystem::stream_state(&config, &stream, 0.0, Vec3::ZERO, Vec3::ZERO);
    assert_vec3_near(centred.offsets, Vec3::new(15.1, 15.2, 15.3));

    assert_vec3_near(
        ahead.inverse_velocity,
        Vec3::new(-0.85, -10.0, 0.0) * config.damping,
    );
}

#[test]
fn light_space_matrix_matches_hand_built_frustum() {
    let light = LightConfig {
        position: Vec3::new(10.2, 20.5, 0.8),
        direction: Vec3::new(2.7, -1.0, 0.7),
        ..LightConfig::default()
    };
    let shadow = ShadowConfig {
        map_size: 5.0,
        depth_range: 20.0,
        ..ShadowConfig::default()
    };

    let light_space = LightSpace::new(&light, &shadow);

    let projection = Mat4::orthographic_rh(-2.5, 2.5, -2.5, 2.5, 1.0, 21.0);
    let view = Mat4::look_at_rh(light.position, light.position + light.direction, Vec3::Y);
    assert!(light_space.matrix.abs_diff_eq(projection * view, 1e-5));

    // Points along the light direction land in the middle of the map.
    let target = light.position + light.direction.normalize() * 10.0;
    let clip = light_space.matrix.project_point3(target);
    assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
    assert!((0.0..=1.0).contains(&clip.z));
}
