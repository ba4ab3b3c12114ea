use std::time::Duration;

use teleport_autoreviewer::config::{GlobalConfig, MAX_IDENTITY_REFRESH_SECONDS};
use teleport_autoreviewer::AppError;

fn sample_toml() -> &'static str {
    r#"
[teleport]
addr = "teleport.example.com:3025"
identity = "/var/lib/autoreviewer/identity"
reviewer = "autoreviewer"
identity_refresh_seconds = 600

[server]
health_port = 9090
health_path = "/healthz"
shutdown_timeout_seconds = 5

[rejection]
default_message = "Denied by policy"

[[rejection.rules]]
name = "admins need a ticket"
roles_regex = "admin"
reason_regex = "^TICKET-[0-9]+"
message = "Admin access requires a ticket reference"

[[rejection.rules]]
name = "no root"
roles_regex = "^root$"
"#
}

fn minimal_toml() -> &'static str {
    r#"
[teleport]
addr = "localhost:3025"
identity = "identity.pem"
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config should parse");

    assert_eq!(config.teleport.addr, "teleport.example.com:3025");
    assert_eq!(config.teleport.reviewer.as_deref(), Some("autoreviewer"));
    assert_eq!(config.refresh_interval(), Duration::from_secs(600));
    assert_eq!(config.server.health_port, 9090);
    assert_eq!(config.server.health_path, "/healthz");
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    assert_eq!(config.rejection.default_message, "Denied by policy");
    assert_eq!(config.rejection.rules.len(), 2);
}

#[test]
fn rules_keep_declaration_order_and_optional_fields() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config should parse");

    let first = &config.rejection.rules[0];
    assert_eq!(first.name, "admins need a ticket");
    assert_eq!(first.reason_regex.as_deref(), Some("^TICKET-[0-9]+"));

    let second = &config.rejection.rules[1];
    assert_eq!(second.name, "no root");
    assert!(second.reason_regex.is_none());
    assert!(second.message.is_empty());
}

#[test]
fn minimal_config_gets_defaults() {
    let config = GlobalConfig::from_toml_str(minimal_toml()).expect("config should parse");

    assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
    assert_eq!(config.server.health_port, 8080);
    assert_eq!(config.server.health_path, "/health");
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    assert_eq!(
        config.rejection.default_message,
        "Access request rejected due to policy violation"
    );
    assert!(config.rejection.rules.is_empty());
    assert!(config.teleport.reviewer.is_none());
}

#[test]
fn explicit_zeroes_and_blanks_fall_back_to_defaults() {
    let toml = r#"
[teleport]
addr = "localhost:3025"
identity = "identity.pem"
reviewer = "  "
identity_refresh_seconds = 0

[server]
health_port = 0
health_path = ""

[rejection]
default_message = ""
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("config should parse");

    assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
    assert_eq!(config.server.health_port, 8080);
    assert_eq!(config.server.health_path, "/health");
    assert!(config.teleport.reviewer.is_none());
    assert!(!config.rejection.default_message.is_empty());
}

#[test]
fn health_bind_listens_on_all_interfaces() {
    let config = GlobalConfig::from_toml_str(minimal_toml()).expect("config should parse");
    assert_eq!(config.health_bind().to_string(), "0.0.0.0:8080");
}

#[test]
fn missing_teleport_section_is_rejected() {
    let result = GlobalConfig::from_toml_str("[server]\nhealth_port = 1\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn empty_addr_is_rejected() {
    let toml = r#"
[teleport]
addr = " "
identity = "identity.pem"
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert!(err.to_string().contains("teleport.addr"));
}

#[test]
fn health_path_must_be_absolute() {
    let toml = r#"
[teleport]
addr = "localhost:3025"
identity = "identity.pem"

[server]
health_path = "health"
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert!(err.to_string().contains("health_path"));
}

fn with_health_path(path: &str) -> String {
    format!(
        "[teleport]\naddr = \"localhost:3025\"\nidentity = \"identity.pem\"\n\n[server]\nhealth_path = \"{path}\"\n"
    )
}

#[test]
fn health_path_with_route_syntax_is_rejected() {
    for path in ["/:id", "/{name}", "/health/{*rest}", "/*", "/a b"] {
        let err = GlobalConfig::from_toml_str(&with_health_path(path))
            .expect_err("route syntax must fail");
        assert!(matches!(err, AppError::Config(_)), "{path}");
        assert!(err.to_string().contains("literal path"), "{path}");
    }
}

#[test]
fn literal_health_paths_are_accepted() {
    for path in ["/", "/healthz", "/v1/health-check", "/status_page.json", "/~ops"] {
        let config = GlobalConfig::from_toml_str(&with_health_path(path)).expect(path);
        assert_eq!(config.server.health_path, path);
    }
}

#[test]
fn refresh_interval_is_bounded() {
    let at_limit = format!(
        "[teleport]\naddr = \"localhost:3025\"\nidentity = \"identity.pem\"\nidentity_refresh_seconds = {MAX_IDENTITY_REFRESH_SECONDS}\n"
    );
    let config = GlobalConfig::from_toml_str(&at_limit).expect("limit is accepted");
    assert_eq!(
        config.refresh_interval(),
        Duration::from_secs(MAX_IDENTITY_REFRESH_SECONDS)
    );

    let huge = "[teleport]\naddr = \"localhost:3025\"\nidentity = \"identity.pem\"\nidentity_refresh_seconds = 9223372036854775807\n";
    let err = GlobalConfig::from_toml_str(huge).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("identity_refresh_seconds"));
}

#[test]
fn unnamed_rule_is_rejected() {
    let toml = r#"
[teleport]
addr = "localhost:3025"
identity = "identity.pem"

[[rejection.rules]]
name = ""
roles_regex = "admin"
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert!(err.to_string().contains("rejection.rules[0]"));
}

#[test]
fn invalid_regex_is_not_a_config_error() {
    let toml = r#"
[teleport]
addr = "localhost:3025"
identity = "identity.pem"

[[rejection.rules]]
name = "broken"
reason_regex = "["
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_ok());
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.rejection.rules.len(), 2);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
