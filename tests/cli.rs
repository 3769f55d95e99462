use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_scene() -> NamedTempFile {
    let scene = r#"<scene>
  <config>
    <param name="particle_vertex_count">64</param>
  </config>
  <object>
    <name>Ground</name>
    <mesh>plane</mesh>
    <scale>5 5 5</scale>
  </object>
  <object>
    <name>Pond</name>
    <mesh>disc</mesh>
    <material>water</material>
  </object>
</scene>
"#;
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn cli_walks_forward_and_prints_final_state() {
    let scene = write_scene();
    let mut cmd = Command::cargo_bin("shadowfall").expect("binary exists");
    cmd.arg("--scene")
        .arg(scene.path())
        .args(["--summary-only", "--frames", "2", "--hold", "W"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 2 objects"))
        .stdout(contains(" - Ground (Plane, Shadowed)"))
        .stdout(contains(" - Pond (Disc, Water)"))
        .stdout(contains(
            "Camera: FirstPerson pos=(0.00, 10.60, -0.60) forward=(0.00, 0.00, -1.00)",
        ))
        .stdout(contains("Precipitation: Rain (64 vertices, 4 streams)"))
        .stdout(contains("Frame 1 at t=0.02s"));
}

#[test]
fn cli_defaults_to_builtin_scene() {
    let mut cmd = Command::cargo_bin("shadowfall").expect("binary exists");
    cmd.args(["--summary-only", "--snow"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 24 objects"))
        .stdout(contains(" - Water (Disc, Water)"))
        .stdout(contains("Precipitation: Snow"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let mut cmd = Command::cargo_bin("shadowfall").expect("binary exists");
    cmd.arg("--turbo");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --turbo"));
}

#[test]
fn cli_reports_bad_overrides() {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(br#"<scene><config><param name="shadow_bias">lots</param></config></scene>"#)
        .expect("write scene");
    let mut cmd = Command::cargo_bin("shadowfall").expect("binary exists");
    cmd.arg("--scene").arg(tmp.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("invalid <config> override"));
}
