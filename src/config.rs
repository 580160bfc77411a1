use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RepoError;

pub const DEFAULT_CONFIG_FILE: &str = "metadata-repo.json";
pub const DEFAULT_ACCESSION_NAMESPACE: &str = "GHGA";
pub const DEFAULT_ACCESSION_MAX_ATTEMPTS: usize = 16;
/// The only config layout this build understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// What to do with a reference naming an alias the submission does not define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AliasPolicy {
    /// Reject the submission before anything is written.
    #[default]
    Strict,
    /// Drop the reference and carry on.
    Lenient,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub store_root: Option<String>,
    #[serde(default)]
    pub accession_namespace: Option<String>,
    #[serde(default)]
    pub accession_max_attempts: Option<usize>,
    #[serde(default)]
    pub alias_policy: Option<AliasPolicy>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub store_root: Option<Utf8PathBuf>,
    pub accession_namespace: String,
    pub accession_max_attempts: usize,
    pub alias_policy: AliasPolicy,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: SUPPORTED_SCHEMA_VERSION,
            store_root: None,
            accession_namespace: DEFAULT_ACCESSION_NAMESPACE.to_string(),
            accession_max_attempts: DEFAULT_ACCESSION_MAX_ATTEMPTS,
            alias_policy: AliasPolicy::Strict,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `metadata-repo.json` in the working directory when no
    /// path is given. A missing default file yields the defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RepoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RepoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RepoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RepoError> {
        let defaults = ResolvedConfig::default();

        let schema_version = config.schema_version.unwrap_or(defaults.schema_version);
        if schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(RepoError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SUPPORTED_SCHEMA_VERSION}"
            )));
        }

        let accession_namespace = match config.accession_namespace {
            Some(namespace) => {
                let namespace = namespace.trim().to_string();
                let is_valid = !namespace.is_empty()
                    && namespace.starts_with(|ch: char| ch.is_ascii_uppercase())
                    && namespace
                        .chars()
                        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit());
                if !is_valid {
                    return Err(RepoError::ConfigParse(format!(
                        "accession_namespace must be upper-case alphanumeric: {namespace}"
                    )));
                }
                namespace
            }
            None => defaults.accession_namespace,
        };

        let accession_max_attempts = config
            .accession_max_attempts
            .unwrap_or(defaults.accession_max_attempts);
        if accession_max_attempts == 0 {
            return Err(RepoError::ConfigParse(
                "accession_max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            store_root: config.store_root.map(Utf8PathBuf::from),
            accession_namespace,
            accession_max_attempts,
            alias_policy: config.alias_policy.unwrap_or(defaults.alias_policy),
        })
    }
}
