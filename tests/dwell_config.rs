use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use dwell_tracker::config::DwellConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DWELL_CONFIG",
        "DWELL_COLLECTOR_HOST",
        "DWELL_COLLECTOR_PORT",
        "DWELL_CAPTURE_THRESHOLD_SECS",
        "DWELL_IOU_THRESHOLD",
        "DWELL_DETECTOR",
        "DWELL_MIN_OBJECT_SIZE",
        "DWELL_MAX_OBJECT_SIZE",
        "DWELL_SOURCE_URL",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DwellConfig::load().expect("load defaults");

    assert_eq!(cfg.collector.host, "127.0.0.1");
    assert_eq!(cfg.collector.port, 12345);
    assert_eq!(cfg.tracker_settings().capture_threshold, Duration::from_secs(3));
    assert_eq!(cfg.tracker_settings().iou_threshold, 0.5);
    assert_eq!(cfg.detector.backend, "luma");
    assert_eq!(cfg.detector.min_object_size, 64);
    assert_eq!(cfg.detector.max_object_size, 512);
    assert_eq!(cfg.source.url, "stub://synthetic");
    assert_eq!(cfg.jpeg_quality, 85);
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "collector": { "host": "collector.local", "port": 9000, "write_timeout_ms": 750 },
            "tracking": { "capture_threshold_secs": 1.5 },
            "detector": { "min_object_size": 16, "max_object_size": 256 },
            "source": { "url": "dir:///var/frames", "target_fps": 4 },
            "capture": { "jpeg_quality": 70 }
        }"#,
    );

    std::env::set_var("DWELL_CONFIG", file.path());
    std::env::set_var("DWELL_COLLECTOR_PORT", "9100");
    std::env::set_var("DWELL_IOU_THRESHOLD", "0.4");

    let cfg = DwellConfig::load().expect("load config");

    assert_eq!(cfg.collector.host, "collector.local");
    assert_eq!(cfg.collector.port, 9100);
    assert_eq!(cfg.collector.write_timeout, Duration::from_millis(750));
    assert_eq!(
        cfg.tracker_settings().capture_threshold,
        Duration::from_millis(1500)
    );
    assert_eq!(cfg.tracking.iou_threshold, 0.4);
    assert_eq!(cfg.detector_settings().min_object_size, 16);
    assert_eq!(cfg.detector_settings().max_object_size, 256);
    assert_eq!(cfg.source.url, "dir:///var/frames");
    assert_eq!(cfg.source.target_fps, 4);
    assert_eq!(cfg.jpeg_quality, 70);
    assert_eq!(cfg.collector_endpoint().to_string(), "collector.local:9100");

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[collector]
host = "10.0.0.7"

[tracking]
capture_threshold_secs = 5.0

[detector]
backend = "luma"
luma_threshold = 180
"#,
    );
    std::env::set_var("DWELL_CONFIG", file.path());
    std::env::set_var("DWELL_SOURCE_URL", "stub://lobby");

    let cfg = DwellConfig::load().expect("load toml config");

    assert_eq!(cfg.collector.host, "10.0.0.7");
    assert_eq!(cfg.collector.port, 12345);
    assert_eq!(cfg.tracker_settings().capture_threshold, Duration::from_secs(5));
    assert_eq!(cfg.detector.luma_threshold, 180);
    assert_eq!(cfg.source.url, "stub://lobby");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DWELL_CAPTURE_THRESHOLD_SECS", "-1");
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("capture threshold"), "{err}");
    clear_env();

    std::env::set_var("DWELL_COLLECTOR_PORT", "not-a-port");
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("DWELL_COLLECTOR_PORT"), "{err}");
    clear_env();

    std::env::set_var("DWELL_IOU_THRESHOLD", "1.0");
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("iou threshold"), "{err}");
    clear_env();

    std::env::set_var("DWELL_CAPTURE_THRESHOLD_SECS", "1e20");
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("capture threshold"), "{err}");
    clear_env();

    std::env::set_var("DWELL_MIN_OBJECT_SIZE", "600");
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("exceeds max object size"), "{err}");
    clear_env();
}

#[test]
fn largest_accepted_threshold_builds_tracker_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DWELL_CAPTURE_THRESHOLD_SECS", "1e18");
    let cfg = DwellConfig::load().expect("load config");
    let settings = cfg.tracker_settings();
    assert!(settings.capture_threshold >= Duration::from_secs(999_999_999_999_999_999));

    clear_env();
}

#[test]
fn rejects_out_of_range_source_dimensions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{ "source": { "width": 40000, "height": 40000 } }"#,
    );
    std::env::set_var("DWELL_CONFIG", file.path());
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("source width"), "{err}");

    let file = config_file(".json", r#"{ "source": { "height": 0 } }"#);
    std::env::set_var("DWELL_CONFIG", file.path());
    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("source height"), "{err}");

    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(".json", "{ \"collector\": ");
    std::env::set_var("DWELL_CONFIG", file.path());

    let err = DwellConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"), "{err}");

    clear_env();
}

#[test]
fn build_worker_rejects_unknown_detector() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DWELL_DETECTOR", "yolo");
    let cfg = DwellConfig::load().expect("load config");
    let err = dwell_tracker::build_worker(&cfg).err().expect("unknown backend");
    assert!(err.to_string().contains("yolo"), "{err}");

    clear_env();
}
