//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use orra_sdk::config::SdkConfig;
use orra_sdk::{Error, Persistence, ServiceKind};
use predicates::prelude::*;
use tempfile::TempDir;

/// Test fixture for configuration testing
struct ConfigFixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worker.toml");
        Self { temp_dir, config_path }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    /// `orra-worker` with HOME pointed into the fixture
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("orra-worker").unwrap();
        cmd.current_dir(self.temp_dir.path())
            .env("HOME", self.temp_dir.path())
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("ORRA_URL")
            .env_remove("ORRA_API_KEY")
            .env_remove("ORRA_KEY");
        cmd
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[platform]
api_url = "https://api.orra.dev"
"#,
    );

    let config = SdkConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.platform.api_url, "https://api.orra.dev");
    assert_eq!(config.reconnect.max_attempts, 10);
    assert_eq!(config.delivery.ack_timeout_ms, 5000);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    let schema_path = fixture.temp_dir.path().join("schema.json");
    fs::write(&schema_path, r#"{"input": {"type": "object"}, "output": {"type": "object"}}"#).unwrap();

    fixture.write_config(&format!(
        r#"
[platform]
api_url = "https://api.orra.dev"
api_key = "sk-orra-123"

[service]
kind = "agent"
name = "delivery-agent"
description = "Plans deliveries"
schema_file = "{}"
version = 3

[reconnect]
base_interval_ms = 250
max_interval_ms = 8000
max_attempts = 0
connect_timeout_ms = 10000

[delivery]
ack_timeout_ms = 1500

[idempotency]
cleanup_interval_secs = 60
result_ttl_secs = 3600
in_progress_ttl_secs = 120

[persistence]
identity_file = "/tmp/orra/agent-key.json"

[logging]
level = "debug"
max_files = 2
json_format = true
"#,
        schema_path.display()
    ));

    let config = SdkConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.service.kind, ServiceKind::Agent);
    assert_eq!(config.service.version, 3);

    let options = config.client_options();
    assert_eq!(options.session.reconnect.base_interval, Duration::from_millis(250));
    assert_eq!(options.session.reconnect.max_interval, Duration::from_secs(8));
    assert_eq!(options.session.reconnect.max_attempts, 0);
    assert_eq!(options.session.connect_timeout, Duration::from_secs(10));
    assert_eq!(options.session.ack_timeout, Duration::from_millis(1500));
    assert_eq!(options.idempotency.cleanup_interval, Duration::from_secs(60));
    assert_eq!(options.idempotency.result_ttl, Duration::from_secs(3600));
    assert_eq!(options.idempotency.in_progress_ttl, Duration::from_secs(120));
    assert!(matches!(
        options.persistence,
        Persistence::File(ref p) if p == &PathBuf::from("/tmp/orra/agent-key.json")
    ));

    let registration = config.registration_options().unwrap();
    assert_eq!(registration.description.as_deref(), Some("Plans deliveries"));
    assert_eq!(registration.version, 3);
    assert_eq!(registration.schema.unwrap()["output"]["type"], "object");
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_websocket_scheme_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[platform]
api_url = "wss://api.orra.dev"
"#,
    );

    let err = SdkConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { .. }));
}

#[test]
fn test_unknown_service_kind() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[service]
kind = "robot"
"#,
    );

    let err = SdkConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_max_interval_below_base() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[reconnect]
base_interval_ms = 5000
max_interval_ms = 1000
"#,
    );

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("max_interval_ms"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "invalid_level"
"#,
    );

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure();
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[platform
api_url = "https://api.orra.dev"
"#,
    );

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_missing_schema_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[service]
schema_file = "/nonexistent/schema.json"
"#,
    );

    let config = SdkConfig::load(Some(fixture.path())).unwrap();
    let err = config.registration_options().unwrap_err();
    assert!(matches!(err, Error::IoRead { .. }));
}

// ─────────────────────────────────────────────────────────────────
// Config Show and Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[platform]
api_url = "https://custom.orra.dev"

[service]
name = "inventory-checker"

[delivery]
ack_timeout_ms = 7777
"#,
    );

    fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://custom.orra.dev"))
        .stdout(predicate::str::contains("inventory-checker"))
        .stdout(predicate::str::contains("7777"));
}

#[test]
fn test_config_init_output_is_valid() {
    let fixture = ConfigFixture::new();
    let config_path = fixture.temp_dir.path().join("fresh.toml");

    fixture
        .cmd()
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let config = SdkConfig::load(config_path.to_str()).unwrap();
    assert_eq!(config.persistence.identity_file, "orra-service-key.json");
}

#[test]
fn test_config_discovered_in_home() {
    let fixture = ConfigFixture::new();
    let orra_dir = fixture.temp_dir.path().join(".orra");
    fs::create_dir_all(&orra_dir).unwrap();
    fs::write(
        orra_dir.join("worker.toml"),
        "[service]\nname = \"found-in-home\"\n",
    )
    .unwrap();

    fixture
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("found-in-home"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_override_platform_url() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[platform]
api_url = "https://file.orra.dev"
"#,
    );

    fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("ORRA_URL", "https://env.orra.dev")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://env.orra.dev"))
        .stdout(predicate::str::contains("file.orra.dev").not());
}

#[test]
fn test_env_override_reliability_settings() {
    let fixture = ConfigFixture::new();

    fixture
        .cmd()
        .args(["config", "show"])
        .env("ORRA_MAX_RECONNECT_ATTEMPTS", "42")
        .env("ORRA_ACK_TIMEOUT_MS", "1234")
        .env("ORRA_SERVICE_KIND", "agent")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts = 42"))
        .stdout(predicate::str::contains("ack_timeout_ms = 1234"))
        .stdout(predicate::str::contains("kind = \"agent\""));
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[persistence]
identity_file = "~/orra/key.json"
"#,
    );

    let config = SdkConfig::load(Some(fixture.path())).unwrap();
    assert!(!config.persistence.identity_file.starts_with('~'));
    assert!(config.persistence.identity_file.ends_with("orra/key.json"));
}

