use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub base_url: String,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub super_admin: SuperAdminConfig,
    pub magic_link_hours: i64,
    pub invitation_days: i64,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub features: FeatureFlags,
}

/// Policy gates for optional flows. A disabled feature is refused with
/// a typed error, distinct from identity failures.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    pub magic_link_login: bool,
    pub impersonation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Symmetric signing key for bearer tokens.
    pub signing_secret: Secret<String>,
    pub token_expiry_days: i64,
    pub session_lifetime_days: i64,
}

#[derive(Debug, Clone)]
pub struct SuperAdminConfig {
    pub session_lifetime_hours: i64,
    pub inactivity_timeout_minutes: i32,
    pub mfa_challenge_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Cookie domain base, also used for subdomain tenant resolution
    /// (e.g. "platform.test" resolves "acme.platform.test" to "acme").
    pub cookie_domain: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub magic_link_attempts: u32,
    pub magic_link_window_seconds: u64,
    pub admin_login_attempts: u32,
    pub admin_login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            base_url: get_env("BASE_URL", Some("http://localhost:3000"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            token: TokenConfig {
                signing_secret: Secret::new(get_env(
                    "TOKEN_SIGNING_SECRET",
                    Some("dev-only-signing-secret-change-me"),
                    is_prod,
                )?),
                token_expiry_days: parse_env("TOKEN_EXPIRY_DAYS", "7", is_prod)?,
                session_lifetime_days: parse_env("SESSION_LIFETIME_DAYS", "30", is_prod)?,
            },
            super_admin: SuperAdminConfig {
                session_lifetime_hours: parse_env("SUPER_ADMIN_SESSION_HOURS", "4", is_prod)?,
                inactivity_timeout_minutes: parse_env(
                    "SUPER_ADMIN_INACTIVITY_MINUTES",
                    "30",
                    is_prod,
                )?,
                mfa_challenge_minutes: parse_env("SUPER_ADMIN_MFA_CHALLENGE_MINUTES", "5", is_prod)?,
            },
            magic_link_hours: parse_env("MAGIC_LINK_EXPIRY_HOURS", "24", is_prod)?,
            invitation_days: parse_env("INVITATION_EXPIRY_DAYS", "7", is_prod)?,
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from: get_env("SMTP_FROM", Some("no-reply@localhost"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                cookie_domain: get_env("COOKIE_DOMAIN", Some("localhost"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                magic_link_attempts: parse_env("RATE_LIMIT_MAGIC_LINK_ATTEMPTS", "3", is_prod)?,
                magic_link_window_seconds: parse_env(
                    "RATE_LIMIT_MAGIC_LINK_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                admin_login_attempts: parse_env("RATE_LIMIT_ADMIN_LOGIN_ATTEMPTS", "5", is_prod)?,
                admin_login_window_seconds: parse_env(
                    "RATE_LIMIT_ADMIN_LOGIN_WINDOW_SECONDS",
                    "900",
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
            features: FeatureFlags {
                magic_link_login: parse_env("FEATURE_MAGIC_LINK_LOGIN", "true", is_prod)?,
                impersonation: parse_env("FEATURE_IMPERSONATION", "true", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.token.token_expiry_days <= 0 || self.token.session_lifetime_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token and session lifetimes must be positive"
            )));
        }

        if self.super_admin.session_lifetime_hours <= 0
            || self.super_admin.inactivity_timeout_minutes <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Super admin session windows must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
            if self.token.signing_secret.expose_secret().len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_SIGNING_SECRET must be at least 32 bytes in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
