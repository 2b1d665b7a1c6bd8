use assert_cmd::Command;
use metric_calib::core::{Distortion, Intrinsics, PinholeCamera};
use metric_calib::store::{save_calibration, CalibrationArtifact};
use predicates::prelude::*;
use std::path::Path;

fn cli() -> Command {
    Command::cargo_bin("metric-calib").expect("binary")
}

fn write_fixture(dir: &Path) {
    let k = Intrinsics::new(1000.0, 1000.0, 320.0, 240.0);
    let artifact = CalibrationArtifact::new(PinholeCamera::new(k, Distortion::ZERO), 0.25);
    save_calibration(dir.join("calibration_data.json"), &artifact).expect("artifact");
    image::GrayImage::new(640, 480)
        .save(dir.join("book.png"))
        .expect("image");
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate"))
        .stdout(predicate::str::contains("measure"))
        .stdout(predicate::str::contains("undistort"));
}

#[test]
fn measures_book_from_command_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path());

    cli()
        .current_dir(dir.path())
        .args(["measure", "--image", "book.png", "--depth", "2.2"])
        .arg("--points")
        .args(["1404,2364", "1648,2352", "1410,2682", "1664,2682"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Estimated real-world width: 0.537 m"))
        .stdout(predicate::str::contains("Estimated real-world height: 0.700 m"));
}

#[test]
fn measure_config_file_and_json_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path());
    std::fs::write(
        dir.path().join("measure.json"),
        r#"{
            "image": "book.png",
            "query": {
                "depth_m": 1.0,
                "points": [[0, 0], [100, 0], [0, 50], [100, 50]],
                "space": "undistorted"
            }
        }"#,
    )
    .expect("config");

    let out = cli()
        .current_dir(dir.path())
        .args(["measure", "--config", "measure.json", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).expect("json report");
    assert_eq!(report["result"]["width_px"], serde_json::json!(100.0));
    assert_eq!(report["result"]["height_px"], serde_json::json!(50.0));
}

#[test]
fn missing_calibration_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .current_dir(dir.path())
        .args(["measure", "--calibration", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("absent.json"));
}

#[test]
fn calibrate_without_images_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .current_dir(dir.path())
        .args(["calibrate", "--images", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no images matching"));
}

#[test]
fn undistort_writes_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path());
    cli()
        .current_dir(dir.path())
        .args(["undistort", "book.png", "flat.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid region"));
    let out = image::open(dir.path().join("flat.png")).expect("decoded");
    assert_eq!((out.width(), out.height()), (640, 480));
}

#[test]
fn init_config_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .current_dir(dir.path())
        .args(["init-config", "calibrate", "calibrate.json"])
        .assert()
        .success();
    let cfg: metric_calib::config::CalibrateConfig =
        metric_calib::config::load_json(dir.path().join("calibrate.json")).expect("config");
    assert_eq!(cfg, metric_calib::config::CalibrateConfig::default());
}
