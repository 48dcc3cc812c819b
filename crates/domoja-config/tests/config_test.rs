#![allow(clippy::unwrap_used)]

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use domoja_config::{ConfigError, load_config, to_bridge_config};
use domoja_core::{IdentityPolicy, SpecOrigin, TlsVerification};
use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

const PLATFORM_JSON: &str = r#"{
    "platform": "Domoja",
    "url": "https://domoja.local:4001/",
    "auth": { "username": "admin", "password": "from-file" },
    "login": { "retryDelaySecs": 5, "timeoutSecs": 60 },
    "identity": "display-name",
    "accessories": [
        {
            "service": "Switch",
            "characteristic": "On",
            "get": { "mapping": ["ON", true, "OFF", false] },
            "set": { "mapping": [true, "ON", false, "OFF"] },
            "devicesAndDisplayNames": { "aquarium.lampes": "Lampes aquarium" }
        },
        {
            "displayName": "Piscine",
            "description": "pool probe",
            "services": [{
                "service": "Temperature Sensor",
                "characteristics": [
                    { "characteristic": "Current Temperature", "get": { "device": "piscine.temperature" } }
                ]
            }]
        }
    ]
}"#;

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn json_platform_block_loads() {
    let file = write_temp(".json", PLATFORM_JSON);

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.platform.as_deref(), Some("Domoja"));
    assert_eq!(config.auth.username, "admin");
    assert_eq!(config.login.retry_delay_secs, 5);
    assert_eq!(config.login.max_logged_retries, 2);
    assert_eq!(config.push.reconnect_delay_secs, 10);
    assert_eq!(config.identity, IdentityPolicy::DisplayName);

    let specs = config.accessory_specs().unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].origin, SpecOrigin::Expanded);
    assert_eq!(specs[1].display_name, "Piscine");
    assert!(
        specs[1]
            .find_characteristic("TemperatureSensor", "CurrentTemperature")
            .is_some()
    );
}

#[test]
fn null_in_mapping_survives_loading() {
    let file = write_temp(
        ".json",
        r#"{ "accessories": [{
            "service": "Switch", "characteristic": "On",
            "get": { "mapping": ["ON", true, "*", null] },
            "devicesAndDisplayNames": { "a.b": "Lampe" }
        }] }"#,
    );

    let specs = load_config(file.path()).unwrap().accessory_specs().unwrap();

    let get = specs[0].find_characteristic("Switch", "On").unwrap().get.clone().unwrap();
    assert_eq!(get.mapping.unwrap().entries()[3], serde_json::Value::Null);
}

#[test]
fn toml_loads_by_extension() {
    let file = write_temp(
        ".toml",
        r#"
url = "http://domoja.local:4001"
timeoutSecs = 5

[auth]
username = "admin"

[[accessories]]
displayName = "Pompe"

[[accessories.services]]
service = "Switch"

[[accessories.services.characteristics]]
characteristic = "On"
device = "piscine.pompe"
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.timeout_secs, 5);
    let specs = config.accessory_specs().unwrap();
    assert_eq!(specs[0].bound_devices(), vec!["piscine.pompe"]);
}

#[test]
fn missing_file_and_unknown_extension_are_errors() {
    let err = load_config(Path::new("/nonexistent/domoja.json")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));

    let file = write_temp(".yaml", "url: x");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat { ref extension } if extension == "yaml"));
}

#[test]
fn environment_overrides_file_and_supplies_password() {
    Jail::expect_with(|jail| {
        jail.create_file("domoja.json", PLATFORM_JSON)?;
        jail.set_env("DOMOJA_URL", "http://override.local:4001/");
        jail.set_env("DOMOJA_PASSWORD", "from-env");

        let config = load_config(Path::new("domoja.json")).map_err(|e| e.to_string())?;
        let bridge = to_bridge_config(&config).map_err(|e| e.to_string())?;

        assert_eq!(bridge.url.as_str(), "http://override.local:4001/");
        assert_eq!(bridge.password.expose_secret(), "from-env");
        assert_eq!(bridge.login.retry_delay, Duration::from_secs(5));
        assert_eq!(bridge.login.timeout, Some(Duration::from_secs(60)));
        assert_eq!(bridge.tls, TlsVerification::SystemDefaults);
        assert_eq!(bridge.identity, IdentityPolicy::DisplayName);
        Ok(())
    });
}

#[test]
fn bad_settings_are_reported() {
    Jail::expect_with(|jail| {
        jail.create_file("bad-url.json", r#"{ "url": "not a url", "auth": { "username": "admin" } }"#)?;
        jail.create_file("no-user.json", r#"{ "url": "http://domoja.local" }"#)?;
        jail.set_env("DOMOJA_PASSWORD", "pw");

        let config = load_config(Path::new("bad-url.json")).map_err(|e| e.to_string())?;
        let err = to_bridge_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));

        let config = load_config(Path::new("no-user.json")).map_err(|e| e.to_string())?;
        let err = to_bridge_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "auth.username"));
        Ok(())
    });
}

#[test]
fn insecure_flag_disables_verification() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "domoja.json",
            r#"{ "url": "https://domoja.local", "insecure": true, "auth": { "username": "admin", "password": "pw" } }"#,
        )?;

        let config = load_config(Path::new("domoja.json")).map_err(|e| e.to_string())?;
        let bridge = to_bridge_config(&config).map_err(|e| e.to_string())?;

        assert_eq!(bridge.tls, TlsVerification::DangerAcceptInvalid);
        Ok(())
    });
}
