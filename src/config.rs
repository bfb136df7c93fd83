//! Process configuration.
//!
//! `PortalConfig` is assembled once at startup from `PORTAL_*` environment variables (the
//! server binary lets CLI flags override a few of them) and then shared read-only behind an
//! `Arc` for the life of the process.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use jsonwebtoken::Algorithm;

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_DATA_FOLDER: &str = "data";
pub const DEFAULT_TOKEN_TTL_MINUTES: u64 = 30;
pub const DEFAULT_LOGIN_FLOOR_MS: u64 = 1000;
/// Shortest HMAC secret accepted in production.
pub const MIN_SECRET_LEN: usize = 32;
/// Longest accepted token lifetime (30 days).
pub const MAX_TOKEN_TTL_MINUTES: u64 = 30 * 24 * 60;
/// Longest accepted login floor (one minute).
pub const MAX_LOGIN_FLOOR_MS: u64 = 60_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PORTAL_SECRET_KEY must be set in production")]
    MissingSecret,
    #[error("PORTAL_SECRET_KEY is {0} bytes; at least {MIN_SECRET_LEN} are required in production")]
    WeakSecret(usize),
    #[error("unsupported signing algorithm '{0}' (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("could not generate a signing secret: {0}")]
    Rng(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Some(Environment::Development),
            "prod" | "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Argon2id cost parameters for newly produced hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        let p = argon2::Params::default();
        Self { memory_kib: p.m_cost(), iterations: p.t_cost(), lanes: p.p_cost() }
    }
}

/// Admin account created on first start when the user table is empty.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct PortalConfig {
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub token_ttl: Duration,
    pub environment: Environment,
    /// Minimum wall-clock duration of a rejected login.
    pub login_floor: Duration,
    pub data_folder: PathBuf,
    pub http_port: u16,
    /// Optional file that receives a copy of every audit event.
    pub audit_log: Option<PathBuf>,
    pub hashing: HashingConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    /// Set when no secret was configured and one was generated for this process only.
    pub ephemeral_secret: bool,
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("token_ttl", &self.token_ttl)
            .field("environment", &self.environment)
            .field("login_floor", &self.login_floor)
            .field("data_folder", &self.data_folder)
            .field("http_port", &self.http_port)
            .field("audit_log", &self.audit_log)
            .field("hashing", &self.hashing)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .field("ephemeral_secret", &self.ephemeral_secret)
            .finish()
    }
}

pub fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ConfigError::UnsupportedAlgorithm(name.to_string())),
    }
}

fn random_secret() -> Result<String, ConfigError> {
    let mut buf = [0u8; 48];
    getrandom::getrandom(&mut buf).map_err(|e| ConfigError::Rng(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

fn parse_num<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PortalConfig {
    /// Development configuration with an explicit secret; everything else at defaults.
    pub fn development(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            algorithm: Algorithm::HS256,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_MINUTES * 60),
            environment: Environment::Development,
            login_floor: Duration::from_millis(DEFAULT_LOGIN_FLOOR_MS),
            data_folder: PathBuf::from(DEFAULT_DATA_FOLDER),
            http_port: DEFAULT_HTTP_PORT,
            audit_log: None,
            hashing: HashingConfig::default(),
            bootstrap_admin: None,
            ephemeral_secret: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (the process environment in production).
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, ConfigError> {
        let environment = match non_empty(get("PORTAL_ENV")) {
            None => Environment::Development,
            Some(v) => Environment::parse(&v).ok_or(ConfigError::Invalid { name: "PORTAL_ENV", value: v })?,
        };

        let (secret_key, ephemeral_secret) = match non_empty(get("PORTAL_SECRET_KEY")) {
            Some(s) if environment == Environment::Production && s.len() < MIN_SECRET_LEN => {
                return Err(ConfigError::WeakSecret(s.len()));
            }
            Some(s) => (s, false),
            None if environment == Environment::Production => return Err(ConfigError::MissingSecret),
            None => (random_secret()?, true),
        };

        let algorithm = match non_empty(get("PORTAL_ALGORITHM")) {
            Some(name) => parse_algorithm(&name)?,
            None => Algorithm::HS256,
        };

        let ttl_minutes: u64 = parse_num("PORTAL_TOKEN_TTL_MINUTES", get("PORTAL_TOKEN_TTL_MINUTES"), DEFAULT_TOKEN_TTL_MINUTES)?;
        let ttl_secs = ttl_minutes
            .checked_mul(60)
            .filter(|_| (1..=MAX_TOKEN_TTL_MINUTES).contains(&ttl_minutes))
            .ok_or(ConfigError::Invalid { name: "PORTAL_TOKEN_TTL_MINUTES", value: ttl_minutes.to_string() })?;
        let floor_ms: u64 = parse_num("PORTAL_LOGIN_FLOOR_MS", get("PORTAL_LOGIN_FLOOR_MS"), DEFAULT_LOGIN_FLOOR_MS)?;
        if floor_ms > MAX_LOGIN_FLOOR_MS {
            return Err(ConfigError::Invalid { name: "PORTAL_LOGIN_FLOOR_MS", value: floor_ms.to_string() });
        }
        let http_port: u16 = parse_num("PORTAL_HTTP_PORT", get("PORTAL_HTTP_PORT"), DEFAULT_HTTP_PORT)?;

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: parse_num("PORTAL_ARGON2_MEMORY_KIB", get("PORTAL_ARGON2_MEMORY_KIB"), defaults.memory_kib)?,
            iterations: parse_num("PORTAL_ARGON2_ITERATIONS", get("PORTAL_ARGON2_ITERATIONS"), defaults.iterations)?,
            lanes: parse_num("PORTAL_ARGON2_LANES", get("PORTAL_ARGON2_LANES"), defaults.lanes)?,
        };
        if argon2::Params::new(hashing.memory_kib, hashing.iterations, hashing.lanes, None).is_err() {
            return Err(ConfigError::Invalid {
                name: "PORTAL_ARGON2_*",
                value: format!("m={} t={} p={}", hashing.memory_kib, hashing.iterations, hashing.lanes),
            });
        }

        let bootstrap_admin = match (non_empty(get("PORTAL_ADMIN_USERNAME")), get("PORTAL_ADMIN_PASSWORD").filter(|p| !p.is_empty())) {
            (Some(username), Some(password)) => Some(BootstrapAdmin {
                username,
                password,
                full_name: non_empty(get("PORTAL_ADMIN_FULL_NAME")),
                email: non_empty(get("PORTAL_ADMIN_EMAIL")),
            }),
            _ => None,
        };

        Ok(Self {
            secret_key,
            algorithm,
            token_ttl: Duration::from_secs(ttl_secs),
            environment,
            login_floor: Duration::from_millis(floor_ms),
            data_folder: non_empty(get("PORTAL_DATA_FOLDER")).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FOLDER)),
            http_port,
            audit_log: non_empty(get("PORTAL_AUDIT_LOG")).map(PathBuf::from),
            hashing,
            bootstrap_admin,
            ephemeral_secret,
        })
    }

    /// Whether the route catalogue is served.
    pub fn docs_enabled(&self) -> bool {
        self.environment != Environment::Production
    }
}
