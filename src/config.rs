//! Configuration management.

use std::env;
use std::fmt;

use crate::authz::LEGACY_ADMIN_ROLE_ID;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub request_timeout_secs: u64,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub expiry_minutes: u64,
    pub leeway_secs: u64,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("expiry_minutes", &self.expiry_minutes)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub min_password_length: usize,
    /// Argon2 memory cost exponent (2^cost KiB).
    pub password_hash_cost: u32,
    /// Role id treated as administrator regardless of grants. `None`
    /// disables the shortcut.
    pub legacy_admin_role_id: Option<i32>,
    /// Organization assigned to projects created by users with none.
    pub default_organization_id: i32,
    pub default_organization_name: String,
    pub seed_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment();

        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: environment.clone(),
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .expect("REQUEST_TIMEOUT_SECS must be a valid number"),
                max_body_size: env::var("MAX_BODY_SIZE")
                    .unwrap_or_else(|_| "1048576".to_string())
                    .parse()
                    .expect("MAX_BODY_SIZE must be a valid number"),
            },
            database: Self::parse_database_config(),
            jwt: Self::parse_jwt_config(),
            security: Self::parse_security_config(),
            cors: Self::parse_cors_config(&environment),
            logging: Self::parse_logging_config(&environment),
            telemetry: Self::parse_telemetry_config(),
        }
    }

    fn parse_database_config() -> DatabaseConfig {
        let backend = match env::var("STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };

        let url = match backend {
            StoreBackend::Postgres => env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            StoreBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        DatabaseConfig {
            backend,
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("DATABASE_MAX_CONNECTIONS must be a valid number"),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .expect("DATABASE_MIN_CONNECTIONS must be a valid number"),
            connection_timeout_secs: env::var("DATABASE_CONNECTION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("DATABASE_CONNECTION_TIMEOUT_SECS must be a valid number"),
            idle_timeout_secs: env::var("DATABASE_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .expect("DATABASE_IDLE_TIMEOUT_SECS must be a valid number"),
        }
    }

    fn parse_telemetry_config() -> TelemetryConfig {
        TelemetryConfig {
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "warden".to_string()),
            metrics_enabled: env::var("METRICS_ENABLED")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(true),
        }
    }

    fn parse_environment() -> Environment {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    fn parse_jwt_config() -> JwtSettings {
        JwtSettings {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expiry_minutes: env::var("JWT_EXPIRY_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("JWT_EXPIRY_MINUTES must be a valid number"),
            leeway_secs: env::var("JWT_LEEWAY_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .expect("JWT_LEEWAY_SECS must be a valid number"),
        }
    }

    fn parse_security_config() -> SecurityConfig {
        let legacy_admin_role_id = match env::var("LEGACY_ADMIN_ROLE_ID") {
            Ok(v) if v.eq_ignore_ascii_case("none") || v.is_empty() => None,
            Ok(v) => Some(
                v.parse()
                    .expect("LEGACY_ADMIN_ROLE_ID must be a number or 'none'"),
            ),
            Err(_) => Some(LEGACY_ADMIN_ROLE_ID),
        };

        SecurityConfig {
            min_password_length: env::var("MIN_PASSWORD_LENGTH")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .expect("MIN_PASSWORD_LENGTH must be a valid number"),
            password_hash_cost: env::var("PASSWORD_HASH_COST")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .expect("PASSWORD_HASH_COST must be a valid number"),
            legacy_admin_role_id,
            default_organization_id: env::var("DEFAULT_ORGANIZATION_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .expect("DEFAULT_ORGANIZATION_ID must be a valid number"),
            default_organization_name: env::var("DEFAULT_ORGANIZATION_NAME")
                .unwrap_or_else(|_| "Default Organization".to_string()),
            seed_on_startup: env::var("SEED_ON_STARTUP")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(true),
        }
    }

    fn parse_cors_config(environment: &Environment) -> CorsConfig {
        let default_origins = if environment.is_development() {
            vec!["*".to_string()]
        } else {
            vec![]
        };

        let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(default_origins);

        CorsConfig {
            allowed_origins,
            allowed_methods: env::var("CORS_ALLOWED_METHODS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    vec![
                        "GET".to_string(),
                        "POST".to_string(),
                        "PUT".to_string(),
                        "DELETE".to_string(),
                        "OPTIONS".to_string(),
                    ]
                }),
            allowed_headers: env::var("CORS_ALLOWED_HEADERS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    vec![
                        "Content-Type".to_string(),
                        "Authorization".to_string(),
                        "X-Request-ID".to_string(),
                    ]
                }),
            allow_credentials: env::var("CORS_ALLOW_CREDENTIALS")
                .map(|v| v.parse().unwrap_or(false))
                .unwrap_or(false),
            max_age_secs: env::var("CORS_MAX_AGE_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .expect("CORS_MAX_AGE_SECS must be a valid number"),
        }
    }

    fn parse_logging_config(environment: &Environment) -> LoggingConfig {
        let is_dev = environment.is_development();

        LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| {
                if is_dev {
                    "debug".to_string()
                } else {
                    "info".to_string()
                }
            }),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| {
                    if is_dev {
                        "pretty".to_string()
                    } else {
                        "json".to_string()
                    }
                })
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    pub fn validate_for_production(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.server.environment.is_production() {
            if self.jwt.secret.len() < 32 {
                issues.push("JWT_SECRET should be at least 32 bytes in production".to_string());
            }

            if self.jwt.expiry_minutes > 60 {
                issues.push("Token lifetime should not exceed 60 minutes in production".to_string());
            }

            if self.cors.allowed_origins.contains(&"*".to_string()) {
                issues.push("CORS should not allow all origins (*) in production".to_string());
            }

            if self.security.min_password_length < 8 {
                issues.push("Minimum password length should be at least 8".to_string());
            }

            if self.security.password_hash_cost < 15 {
                issues.push("PASSWORD_HASH_COST below 15 is weak for production".to_string());
            }

            if self.security.legacy_admin_role_id.is_some() {
                issues.push(
                    "Legacy admin role id shortcut is enabled; grant system.admin instead"
                        .to_string(),
                );
            }

            if self.database.backend == StoreBackend::Memory {
                issues.push("In-memory store loses all data on restart".to_string());
            } else if self.database.url.contains("localhost")
                || self.database.url.contains("127.0.0.1")
            {
                issues.push("Database URL appears to be localhost in production".to_string());
            }
        }

        issues
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Config {
    pub fn default_for_testing() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                environment: Environment::Development,
                request_timeout_secs: 30,
                max_body_size: 1048576,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: String::new(),
                max_connections: 5,
                min_connections: 1,
                connection_timeout_secs: 10,
                idle_timeout_secs: 300,
            },
            jwt: JwtSettings {
                secret: "warden-test-secret-0123456789abcdef".to_string(),
                expiry_minutes: 30,
                leeway_secs: 0,
            },
            security: SecurityConfig {
                min_password_length: 8,
                password_hash_cost: 4,
                legacy_admin_role_id: Some(LEGACY_ADMIN_ROLE_ID),
                default_organization_id: 1,
                default_organization_name: "Default Organization".to_string(),
                seed_on_startup: true,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
                allowed_methods: vec![
                    "GET".to_string(),
                    "POST".to_string(),
                    "PUT".to_string(),
                    "DELETE".to_string(),
                ],
                allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
                allow_credentials: false,
                max_age_secs: 3600,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: None,
                service_name: "warden-test".to_string(),
                metrics_enabled: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Production.is_development());
        assert!(Environment::Development.is_development());
        assert!(!Environment::Development.is_production());
    }

    #[test]
    fn test_production_validation() {
        let mut config = Config::default_for_testing();
        config.server.environment = Environment::Production;
        config.jwt.secret = "short".to_string();
        config.jwt.expiry_minutes = 120;
        config.security.min_password_length = 6;

        let issues = config.validate_for_production();
        assert!(issues.iter().any(|i| i.contains("JWT_SECRET")));
        assert!(issues.iter().any(|i| i.contains("Token lifetime")));
        assert!(issues.iter().any(|i| i.contains("CORS")));
        assert!(issues.iter().any(|i| i.contains("PASSWORD_HASH_COST")));
        assert!(issues.iter().any(|i| i.contains("Legacy admin")));
        assert!(issues.iter().any(|i| i.contains("In-memory")));
    }

    #[test]
    fn test_development_has_no_warnings() {
        assert!(Config::default_for_testing()
            .validate_for_production()
            .is_empty());
    }

    #[test]
    fn test_jwt_secret_is_redacted() {
        let config = Config::default_for_testing();
        let printed = format!("{:?}", config.jwt);
        assert!(!printed.contains(&config.jwt.secret));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_testing_defaults() {
        let config = Config::default_for_testing();
        assert_eq!(config.jwt.expiry_minutes, 30);
        assert_eq!(config.jwt.leeway_secs, 0);
        assert_eq!(config.security.legacy_admin_role_id, Some(2));
        assert_eq!(config.security.default_organization_id, 1);
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert!(!config.telemetry.metrics_enabled);
    }
}
