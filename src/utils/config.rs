use serde::Deserialize;

use crate::utils::{constants, error::EntitlementError};

/// Allow-list for one tier, as it arrives from the environment.
///
/// Both fields are comma-separated, e.g.
/// `ENTITLED_ACCESS__PAID__DOMAINS=school.example,district.example`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierAccessConfig {
    #[serde(default)]
    pub identities: String,
    #[serde(default)]
    pub domains: String,
}

impl TierAccessConfig {
    pub fn identity_list(&self) -> Vec<String> {
        split_list(&self.identities)
    }

    pub fn domain_list(&self) -> Vec<String> {
        split_list(&self.domains)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecialAccessConfig {
    /// Development environment: everyone resolves to the `dev` tier.
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub paid: TierAccessConfig,
    #[serde(default)]
    pub trial: TierAccessConfig,
    #[serde(default)]
    pub ambassador: TierAccessConfig,
    #[serde(default)]
    pub beta: TierAccessConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: String,

    /// Base URL of the managed backend's auth API; `/user` is appended.
    pub auth_url: String,

    /// Project key sent alongside the caller's bearer token.
    pub auth_api_key: String,

    /// How long a token -> principal lookup is reused (seconds)
    #[serde(default = "default_identity_cache_ttl_secs")]
    pub identity_cache_ttl_secs: u64,

    #[serde(default = "default_identity_cache_max_entries")]
    pub identity_cache_max_entries: u64,

    /// Per-request timeout in ms before the server answers 408
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Emit JSON logs instead of the compact format
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub access: SpecialAccessConfig,
}

impl ServerConfig {
    pub fn load() -> Result<Self, EntitlementError> {
        dotenvy::dotenv().ok();

        let cfg: ServerConfig = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EntitlementError> {
        require("database_url", &self.database_url)?;
        require("auth_url", &self.auth_url)?;
        require("auth_api_key", &self.auth_api_key)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the verification endpoint
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Bearer credential of the signed-in principal
    pub token: Option<String>,

    /// How long a verified decision may be served from cache (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Forced re-verification period while a session is live (milliseconds)
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Persist the cache in Redis when set
    pub redis_url: Option<String>,

    /// Otherwise persist it as a JSON file under this directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_offers_url")]
    pub offers_url: String,

    #[serde(default = "default_support_contact")]
    pub support_contact: String,

    #[serde(default)]
    pub access: SpecialAccessConfig,
}

impl ClientConfig {
    pub fn load() -> Result<Self, EntitlementError> {
        dotenvy::dotenv().ok();

        let cfg: ClientConfig = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        require("verify_url", &cfg.verify_url)?;
        if cfg.cache_ttl_ms == 0 {
            return Err(EntitlementError::Config(
                "cache_ttl_ms must be greater than zero".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Special-access settings alone, for tools that need no server config.
pub fn load_access_config() -> Result<SpecialAccessConfig, EntitlementError> {
    dotenvy::dotenv().ok();

    let cfg = config::Config::builder()
        .add_source(environment())
        .build()?;

    match cfg.get::<SpecialAccessConfig>("access") {
        Ok(access) => Ok(access),
        Err(config::ConfigError::NotFound(_)) => Ok(SpecialAccessConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(constants::ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn require(name: &str, value: &str) -> Result<(), EntitlementError> {
    if value.trim().is_empty() {
        return Err(EntitlementError::Config(format!("{} must be set", name)));
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_port() -> u16 {
    8080
}
fn default_identity_cache_ttl_secs() -> u64 {
    60
}
fn default_identity_cache_max_entries() -> u64 {
    10_000
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_cache_ttl_ms() -> u64 {
    constants::DEFAULT_CACHE_TTL_MS
}
fn default_refresh_interval_ms() -> u64 {
    constants::DEFAULT_REFRESH_INTERVAL_MS
}
fn default_verify_url() -> String {
    "http://localhost:8080/api/entitlements".to_string()
}
fn default_cache_dir() -> String {
    ".entitled".to_string()
}
fn default_offers_url() -> String {
    "/offers".to_string()
}
fn default_support_contact() -> String {
    "support@example.com".to_string()
}
