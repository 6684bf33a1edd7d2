//! Application configuration, read from the process environment.
//!
//! | Variable                       | Default          |
//! |--------------------------------|------------------|
//! | `BIND_ADDR`                    | `0.0.0.0:8080`   |
//! | `APP_ENV`                      | `production`     |
//! | `APP_VERSION`                  | `1.0.0`          |
//! | `JWT_SECRET`                   | required in production |
//! | `API_TOKEN_LIFETIME`           | `30` (days)      |
//! | `MAX_TOKENS_PER_USER`          | `10`             |
//! | `TRUSTED_PROXIES`              | none (comma-separated IPs) |
//! | `API_VERSION`                  | `v1`             |
//! | `API_SUPPORTED_VERSIONS`       | `v1` (comma-separated) |
//! | `RATE_LIMIT_PER_MINUTE`        | `60`             |
//! | `RATE_LIMIT_API_PER_MINUTE`    | `100`            |
//! | `RATE_LIMIT_LOGIN_PER_MINUTE`  | `5`              |
//! | `SECURE_HEADERS_ENABLED`       | `true`           |
//! | `CSP_ENABLED`                  | `true`           |
//! | `HSTS_ENABLED`                 | `true`           |
//! | `HSTS_MAX_AGE`                 | `31536000`       |
//! | `HSTS_INCLUDE_SUBDOMAINS`      | `true`           |
//! | `HSTS_PRELOAD`                 | `false`          |
//! | `SEED_DEMO_USERS`              | `false`          |

use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "pktracker-insecure-dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable not set: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_lifetime_days: i64,
    pub max_tokens_per_user: usize,
    pub login_max_attempts: u32,
    pub login_decay_seconds: i64,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    /// Everyone else is identified by the socket address.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub default_version: String,
    pub supported_versions: Vec<String>,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

/// One named limit: `max_attempts` per `decay_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_attempts: u32,
    pub decay_seconds: i64,
}

impl RateLimit {
    pub const fn per_minute(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            decay_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global: RateLimit,
    pub api: RateLimit,
    pub auth: RateLimit,
}

impl RateLimitConfig {
    /// Limit for a named key kind; unknown kinds use `global`.
    pub fn for_kind(&self, kind: &str) -> RateLimit {
        match kind {
            "api" => self.api,
            "auth" => self.auth,
            _ => self.global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HstsConfig {
    pub enabled: bool,
    pub max_age: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,
    pub csp_enabled: bool,
    pub hsts: HstsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Query parameters whose names contain one of these are masked in request logs.
    pub sensitive_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub rate_limits: RateLimitConfig,
    pub security_headers: SecurityHeadersConfig,
    pub logging: LoggingConfig,
    pub seed_demo_users: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8080".to_string(),
                environment: "production".to_string(),
                version: "1.0.0".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_lifetime_days: 30,
                max_tokens_per_user: 10,
                login_max_attempts: 5,
                login_decay_seconds: 300,
                trusted_proxies: Vec::new(),
            },
            api: ApiConfig {
                default_version: "v1".to_string(),
                supported_versions: vec!["v1".to_string()],
                default_page_size: 15,
                max_page_size: 100,
            },
            rate_limits: RateLimitConfig {
                global: RateLimit::per_minute(60),
                api: RateLimit::per_minute(100),
                auth: RateLimit::per_minute(5),
            },
            security_headers: SecurityHeadersConfig {
                enabled: true,
                csp_enabled: true,
                hsts: HstsConfig {
                    enabled: true,
                    max_age: 31_536_000,
                    include_subdomains: true,
                    preload: false,
                },
            },
            logging: LoggingConfig {
                sensitive_fields: [
                    "password",
                    "password_confirmation",
                    "token",
                    "secret",
                    "key",
                    "credit_card",
                    "ssn",
                    "social_security",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            seed_demo_users: false,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(var) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(var) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                var,
                message: format!("expected a boolean, got '{raw}'"),
            }),
            None => Ok(default),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut cfg = Self::default();

        if let Some(v) = env.string("BIND_ADDR") {
            cfg.server.bind_addr = v;
        }
        if let Some(v) = env.string("APP_ENV") {
            cfg.server.environment = v;
        }
        if let Some(v) = env.string("APP_VERSION") {
            cfg.server.version = v;
        }

        match env.string("JWT_SECRET") {
            Some(secret) => cfg.auth.jwt_secret = secret,
            None if cfg.is_production() => return Err(ConfigError::Missing("JWT_SECRET")),
            None => tracing::warn!("JWT_SECRET not set; using insecure dev default"),
        }
        cfg.auth.token_lifetime_days = env.parse("API_TOKEN_LIFETIME", cfg.auth.token_lifetime_days)?;
        cfg.auth.max_tokens_per_user = env.parse("MAX_TOKENS_PER_USER", cfg.auth.max_tokens_per_user)?;
        if let Some(raw) = env.string("TRUSTED_PROXIES") {
            cfg.auth.trusted_proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse().map_err(|_| ConfigError::Invalid {
                        var: "TRUSTED_PROXIES",
                        message: format!("'{s}' is not an IP address"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if cfg.auth.token_lifetime_days <= 0 {
            return Err(ConfigError::Invalid {
                var: "API_TOKEN_LIFETIME",
                message: "must be at least one day".to_string(),
            });
        }

        if let Some(v) = env.string("API_VERSION") {
            cfg.api.default_version = v.trim().to_string();
        }
        if let Some(v) = env.string("API_SUPPORTED_VERSIONS") {
            cfg.api.supported_versions = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        cfg.rate_limits.global.max_attempts = env.parse("RATE_LIMIT_PER_MINUTE", cfg.rate_limits.global.max_attempts)?;
        cfg.rate_limits.api.max_attempts = env.parse("RATE_LIMIT_API_PER_MINUTE", cfg.rate_limits.api.max_attempts)?;
        cfg.rate_limits.auth.max_attempts = env.parse("RATE_LIMIT_LOGIN_PER_MINUTE", cfg.rate_limits.auth.max_attempts)?;

        let headers = &mut cfg.security_headers;
        headers.enabled = env.flag("SECURE_HEADERS_ENABLED", headers.enabled)?;
        headers.csp_enabled = env.flag("CSP_ENABLED", headers.csp_enabled)?;
        headers.hsts.enabled = env.flag("HSTS_ENABLED", headers.hsts.enabled)?;
        headers.hsts.max_age = env.parse("HSTS_MAX_AGE", headers.hsts.max_age)?;
        headers.hsts.include_subdomains = env.flag("HSTS_INCLUDE_SUBDOMAINS", headers.hsts.include_subdomains)?;
        headers.hsts.preload = env.flag("HSTS_PRELOAD", headers.hsts.preload)?;

        cfg.seed_demo_users = env.flag("SEED_DEMO_USERS", cfg.seed_demo_users)?;

        Ok(cfg)
    }
}
