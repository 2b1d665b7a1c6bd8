use metric_calib::core::{Distortion, Intrinsics, PinholeCamera};
use metric_calib::store::{load_calibration, save_calibration, CalibrationArtifact, StoreError};

fn artifact() -> CalibrationArtifact {
    let camera = PinholeCamera::new(
        Intrinsics::new(
            3124.567_891_234_567,
            3119.000_000_000_1,
            1511.1 + 0.2,
            2015.333_333_333_333,
        ),
        Distortion {
            k1: 0.1 + 0.2,
            k2: -1.0 / 3.0,
            p1: 1e-300,
            p2: -2.718_281_828_459_045e-5,
            k3: std::f64::consts::PI,
        },
    );
    CalibrationArtifact::new(camera, 0.123_456_789_012_345_67)
}

#[test]
fn saved_artifact_loads_bit_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("calibration_data.json");
    let original = artifact();

    save_calibration(&path, &original).expect("save");
    let loaded = load_calibration(&path).expect("load");

    let bits = |a: &CalibrationArtifact| {
        let k = a.camera.intrinsics;
        let mut v = vec![k.fx, k.fy, k.cx, k.cy, k.skew, a.reprojection_error];
        v.extend(a.camera.distortion.to_array());
        v.into_iter().map(f64::to_bits).collect::<Vec<u64>>()
    };
    assert_eq!(bits(&loaded), bits(&original));
}

#[test]
fn file_uses_matrix_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("calib.json");
    save_calibration(&path, &artifact()).expect("save");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    let k = json["K"].as_array().expect("K");
    assert_eq!(k.len(), 3);
    assert_eq!(json["K"][2], serde_json::json!([0.0, 0.0, 1.0]));
    assert_eq!(json["dist"].as_array().expect("dist").len(), 5);
    assert!(json["reprojection_error"].is_f64());
}

#[test]
fn missing_or_broken_files_fail_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");

    let missing = load_calibration(dir.path().join("nope.json"));
    assert!(matches!(missing, Err(StoreError::Read { .. })));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{\"K\": [[1, 0, 0]]").expect("write");
    assert!(matches!(
        load_calibration(&broken),
        Err(StoreError::Parse { .. })
    ));
}
