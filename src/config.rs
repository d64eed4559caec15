use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::fnsign::credentials::Credential;
use crate::fnsign::{Config, CredentialConfig};

/// Deployment environment, read from `FNSIGN_ENVIRONMENT`.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            other => Err(anyhow!(
                "Invalid environment: {}. Must be one of: production, staging, development",
                other
            )),
        }
    }
}

impl Environment {
    /// Colour codes are left out in production, where logs go to a collector.
    pub fn ansi_logs(&self) -> bool {
        *self != Environment::Production
    }

    /// Development logs carry the source file and line of each event.
    pub fn log_source_locations(&self) -> bool {
        *self == Environment::Development
    }
}

/// Top-level configuration: process settings plus the server section.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub log_level: String,
    pub environment: Environment,
    pub fnsign: Config,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            environment: Environment::default(),
            fnsign: Config::default(),
        }
    }
}

#[derive(Deserialize)]
struct CredentialsJson {
    credentials: Vec<CredentialConfig>,
}

/// Loads configuration from an optional TOML file, then applies `FNSIGN_*`
/// environment overrides, then validates the result.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => AppConfig::default(),
        };

        Self::apply_env(&mut config)?;
        Self::validate(&config)?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<AppConfig> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(config: &mut AppConfig) -> Result<()> {
        if let Ok(level) = env::var("FNSIGN_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(environment) = env::var("FNSIGN_ENVIRONMENT") {
            config.environment = environment.parse()?;
        }
        if let Ok(address) = env::var("FNSIGN_ADDRESS") {
            config.fnsign.address = address;
        }
        if let Some(port) = parse_env("FNSIGN_PORT")? {
            config.fnsign.port = port;
        }
        if let Some(secs) = parse_env("FNSIGN_REPLAY_TOLERANCE_SECS")? {
            config.fnsign.replay_tolerance_secs = secs;
        }
        if let Some(ms) = parse_env("FNSIGN_RESOLVER_TIMEOUT_MS")? {
            config.fnsign.resolver_timeout_ms = ms;
        }
        if let Some(bytes) = parse_env("FNSIGN_MAX_BODY_BYTES")? {
            config.fnsign.max_body_bytes = bytes;
        }
        if let Some(flag) = parse_env("FNSIGN_ENCODE_PATH_SEPARATORS")? {
            config.fnsign.encode_path_separators = flag;
        }

        config.fnsign.credentials.extend(Self::load_credentials()?);
        Ok(())
    }

    /// Credentials from the environment, in two forms:
    /// 1. JSON via `FNSIGN_CREDENTIALS`
    /// 2. Indexed variables `FNSIGN_ACCESS_KEY_ID_<n>` / `FNSIGN_SECRET_KEY_<n>`
    fn load_credentials() -> Result<Vec<CredentialConfig>> {
        let mut credentials = Vec::new();

        if let Ok(json_creds) = env::var("FNSIGN_CREDENTIALS") {
            let parsed: CredentialsJson = serde_json::from_str(&json_creds)
                .map_err(|e| anyhow!("Invalid FNSIGN_CREDENTIALS JSON format: {}", e))?;
            credentials.extend(parsed.credentials);
        }

        let mut index = 0;
        while let (Ok(access_key_id), Ok(secret_key)) = (
            env::var(format!("FNSIGN_ACCESS_KEY_ID_{}", index)),
            env::var(format!("FNSIGN_SECRET_KEY_{}", index)),
        ) {
            credentials.push(CredentialConfig {
                access_key_id,
                secret_key,
            });
            index += 1;
        }

        Ok(credentials)
    }

    pub fn validate(config: &AppConfig) -> Result<()> {
        match config.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    config.log_level
                ))
            }
        }

        let server = &config.fnsign;
        if server.replay_tolerance_secs == 0 {
            return Err(anyhow!("replay_tolerance_secs must be greater than zero"));
        }
        if server.resolver_timeout_ms == 0 {
            return Err(anyhow!("resolver_timeout_ms must be greater than zero"));
        }
        if server.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for (i, cred) in server.credentials.iter().enumerate() {
            Credential::new(cred.access_key_id.clone(), cred.secret_key.clone())
                .map_err(|e| anyhow!("Credential {} is invalid: {}", i, e))?;
            if !seen.insert(cred.access_key_id.as_str()) {
                return Err(anyhow!(
                    "Credential {} duplicates access key ID {}",
                    i,
                    cred.access_key_id
                ));
            }
        }

        Ok(())
    }

    pub fn print_help() {
        println!("fnsign configuration - environment variables");
        println!("============================================");
        println!();
        println!("  FNSIGN_LOG_LEVEL               trace|debug|info|warn|error (default: info)");
        println!("  FNSIGN_ENVIRONMENT             production|staging|development (default: production)");
        println!("  FNSIGN_ADDRESS                 Bind address (default: 0.0.0.0)");
        println!("  FNSIGN_PORT                    Server port (default: 8334)");
        println!("  FNSIGN_REPLAY_TOLERANCE_SECS   Accepted clock skew (default: 300)");
        println!("  FNSIGN_RESOLVER_TIMEOUT_MS     Credential lookup timeout (default: 2000)");
        println!("  FNSIGN_MAX_BODY_BYTES          Largest body that will be buffered (default: 10485760)");
        println!("  FNSIGN_ENCODE_PATH_SEPARATORS  Percent-encode '/' in canonical paths (default: false)");
        println!();
        println!("Credentials:");
        println!("  FNSIGN_CREDENTIALS             JSON object with a credentials array");
        println!("  Example: '{{\"credentials\":[{{\"access_key_id\":\"AKID1\",\"secret_key\":\"s3cr3t\"}}]}}'");
        println!("  FNSIGN_ACCESS_KEY_ID_0         First access key ID");
        println!("  FNSIGN_SECRET_KEY_0            First secret key");
        println!("  ... (continue with _1, _2, etc.)");
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}: {} ({})", name, value, e)),
        Err(_) => Ok(None),
    }
}
