//! Environment-driven configuration. These tests mutate process
//! environment variables, so they run one at a time.

use serial_test::serial;
use warden::config::{Environment, LogFormat, StoreBackend};
use warden::Config;

const VARS: &[&str] = &[
    "STORE",
    "DATABASE_URL",
    "JWT_SECRET",
    "JWT_EXPIRY_MINUTES",
    "ENVIRONMENT",
    "LEGACY_ADMIN_ROLE_ID",
    "MIN_PASSWORD_LENGTH",
    "LOG_FORMAT",
    "CORS_ALLOWED_ORIGINS",
    "SEED_ON_STARTUP",
];

fn reset() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn memory_store_needs_no_database_url() {
    reset();
    std::env::set_var("STORE", "memory");
    std::env::set_var("JWT_SECRET", "env-test-secret-0123456789abcdef");

    let config = Config::from_env();

    assert_eq!(config.database.backend, StoreBackend::Memory);
    assert_eq!(config.jwt.expiry_minutes, 30);
    assert_eq!(config.security.legacy_admin_role_id, Some(2));
    assert_eq!(config.security.min_password_length, 8);
    assert!(config.security.seed_on_startup);
    assert_eq!(config.server.environment, Environment::Development);
    reset();
}

#[test]
#[serial]
fn legacy_admin_id_can_be_disabled() {
    reset();
    std::env::set_var("STORE", "memory");
    std::env::set_var("JWT_SECRET", "env-test-secret-0123456789abcdef");
    std::env::set_var("LEGACY_ADMIN_ROLE_ID", "none");
    std::env::set_var("SEED_ON_STARTUP", "false");

    let config = Config::from_env();

    assert_eq!(config.security.legacy_admin_role_id, None);
    assert!(!config.security.seed_on_startup);
    reset();
}

#[test]
#[serial]
fn production_defaults_and_warnings() {
    reset();
    std::env::set_var("STORE", "memory");
    std::env::set_var("JWT_SECRET", "short");
    std::env::set_var("ENVIRONMENT", "production");
    std::env::set_var("JWT_EXPIRY_MINUTES", "120");

    let config = Config::from_env();

    assert_eq!(config.server.environment, Environment::Production);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.cors.allowed_origins.is_empty());
    assert!(!config.validate_for_production().is_empty());
    reset();
}

#[test]
#[serial]
fn cors_origins_are_split_and_trimmed() {
    reset();
    std::env::set_var("STORE", "memory");
    std::env::set_var("JWT_SECRET", "env-test-secret-0123456789abcdef");
    std::env::set_var(
        "CORS_ALLOWED_ORIGINS",
        "https://a.example.com, https://b.example.com",
    );

    let config = Config::from_env();

    assert_eq!(
        config.cors.allowed_origins,
        vec!["https://a.example.com", "https://b.example.com"]
    );
    reset();
}
