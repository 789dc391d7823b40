use super::*;
use std::collections::HashMap;

#[test]
fn test_defaults_when_file_missing() {
    let cfg = load("/nonexistent/warelay/config.toml").unwrap();
    assert_eq!(cfg.relay.name, "warelay");
    assert_eq!(cfg.webhook.timeout_secs, 30);
    assert_eq!(cfg.api.port, 3001);
    assert!(cfg.api.enabled);
    assert_eq!(cfg.reconnect.max_attempts, 5);
    assert!(cfg.whatsapp.allowed_users.is_empty());
}

#[test]
fn test_load_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [webhook]
        url = "https://bot.example.com/webhook"

        [reconnect]
        max_attempts = 3
        "#,
    )
    .unwrap();

    let cfg = load(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.webhook.url, "https://bot.example.com/webhook");
    assert_eq!(cfg.webhook.timeout_secs, 30, "missing field keeps default");
    assert_eq!(cfg.reconnect.max_attempts, 3);
    assert_eq!(cfg.reconnect.base_delay_secs, 5);
    assert_eq!(cfg.api.host, "0.0.0.0");
}

#[test]
fn test_load_invalid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[webhook\nurl = ").unwrap();

    let err = load(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, RelayError::Config(_)));
}

#[test]
fn test_whatsapp_config_from_toml() {
    let toml_str = r#"
        device_name = "FinBot"
        allowed_users = ["5511999887766"]
    "#;
    let cfg: WhatsAppConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.device_name, "FinBot");
    assert_eq!(cfg.allowed_users, vec!["5511999887766"]);
}

#[test]
fn test_api_config_defaults_when_missing() {
    let cfg: ApiConfig = toml::from_str("port = 8080").unwrap();
    assert!(cfg.enabled);
    assert_eq!(cfg.port, 8080);
    assert!(cfg.api_key.is_empty());
    assert_eq!(cfg.send_timeout(), Duration::from_secs(30));
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("WARELAY_WEBHOOK_URL", "https://hooks.example.com/in"),
        ("WARELAY_API_KEY", "s3cret"),
        ("PORT", "4000"),
        ("WARELAY_DATA_DIR", ""),
    ]
    .into_iter()
    .collect();

    let mut cfg = Config::default();
    cfg.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(cfg.webhook.url, "https://hooks.example.com/in");
    assert_eq!(cfg.api.api_key, "s3cret");
    assert_eq!(cfg.api.port, 4000);
    assert_eq!(cfg.relay.data_dir, "~/.warelay", "empty value is ignored");
}

#[test]
fn test_env_override_bad_port() {
    let mut cfg = Config::default();
    let err = cfg
        .apply_overrides_from(|k| (k == "PORT").then(|| "http".to_string()))
        .unwrap_err();
    assert!(err.to_string().contains("PORT"));
}

#[test]
fn test_validate_accepts_defaults() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.webhook.url = "  ".into();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.webhook.url = "ftp://example.com".into();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.webhook.timeout_secs = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.reconnect.base_delay_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_session_dir_under_data_dir() {
    let mut cfg = Config::default();
    cfg.relay.data_dir = "/var/lib/warelay".into();
    assert_eq!(
        cfg.session_dir(),
        PathBuf::from("/var/lib/warelay/whatsapp_session")
    );
    assert_eq!(cfg.logs_dir(), PathBuf::from("/var/lib/warelay/logs"));
}

#[test]
fn test_shellexpand_passthrough() {
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
