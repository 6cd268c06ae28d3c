#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::Command;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/gbsim-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn write_config(dir: &std::path::Path) -> PathBuf {
    std::fs::write(dir.join("pwm.mnfb"), [0x06, 0x00, 0x00, 0x01, 0x10, 0x20])
        .expect("manifest should be writable");
    let config = dir.join("modules.json");
    std::fs::write(
        &config,
        r#"{ "modules": [ { "interface_id": 1, "manifest": "pwm.mnfb",
            "cports": [ { "cport_id": 0, "host_cport_id": 4, "protocol": "pwm" } ] } ] }"#,
    )
    .expect("config should be writable");
    config
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("gbsim {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_protocols() {
    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("greybus: 0.1"));
    assert!(stdout.contains("pwm"));
}

#[test]
fn inspect_outputs_json_bindings() {
    let dir = unique_temp_dir("inspect");
    let config = write_config(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .args(["--log-level", "error", "--format", "json", "inspect", "--config"])
        .arg(&config)
        .output()
        .expect("inspect should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("inspect output should be JSON");
    assert_eq!(report["modules"][0]["interface_id"], 1);
    assert_eq!(report["modules"][0]["device_id"], 2);
    assert_eq!(report["modules"][0]["manifest_size"], 6);
    assert_eq!(report["bindings"][0]["host_cport_id"], 4);
    assert_eq!(report["bindings"][0]["protocol"], "pwm");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn inspect_invalid_config_returns_60() {
    let dir = unique_temp_dir("invalid");
    let config = dir.join("modules.json");
    std::fs::write(
        &config,
        r#"{ "modules": [ { "interface_id": 0, "manifest": "m" } ] }"#,
    )
    .expect("config should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .args(["--log-level", "error", "inspect", "--config"])
        .arg(&config)
        .output()
        .expect("inspect should run");

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reserved"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn run_without_gadget_returns_3() {
    let dir = unique_temp_dir("run");
    let config = write_config(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .args(["--log-level", "error", "run", "--config"])
        .arg(&config)
        .arg("--ffs-prefix")
        .arg(dir.join("no-such-gadget"))
        .output()
        .expect("run should start");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open control endpoint failed"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn run_rejects_bad_poll_interval() {
    let dir = unique_temp_dir("poll");
    let config = write_config(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_gbsim"))
        .args(["run", "--poll-interval", "soon", "--config"])
        .arg(&config)
        .output()
        .expect("run should start");

    assert_eq!(output.status.code(), Some(64));

    let _ = std::fs::remove_dir_all(&dir);
}
