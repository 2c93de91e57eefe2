use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ResolverError;

pub const CONFIG_FILE_NAME: &str = "snp-resolver.json";
pub const TOKEN_ENV: &str = "SNP_RESOLVER_TOKEN";

/// How the decoder treats probability lines it cannot parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePolicy {
    /// Fail the whole decode.
    #[default]
    Strict,
    /// Log and skip the line.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub base_url: String,
    /// Upper bound on the space-joined `names` parameter of one query.
    pub max_query_length: usize,
    pub quality: f64,
    pub archive_suffix: String,
    pub temp_root: Option<PathBuf>,
    pub malformed_lines: LinePolicy,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            max_query_length: 1800,
            quality: 0.80,
            archive_suffix: ".gen.zip".to_string(),
            temp_root: None,
            malformed_lines: LinePolicy::Strict,
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config from `path`, or from `snp-resolver.json` in the current
    /// directory, or from the per-user config directory. With no explicit path
    /// and no file found, the defaults are used.
    pub fn resolve(path: Option<&str>) -> Result<ResolverConfig, ResolverError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => match Self::default_path() {
                Some(found) => found,
                None => return Ok(ResolverConfig::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ResolverError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ResolverConfig, ResolverError> {
        let config: ResolverConfig = serde_json::from_str(content)
            .map_err(|err| ResolverError::ConfigParse(err.to_string()))?;
        if config.max_query_length == 0 {
            return Err(ResolverError::ConfigParse(
                "max_query_length must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.quality) {
            return Err(ResolverError::ConfigParse(format!(
                "quality must be within [0, 1], got {}",
                config.quality
            )));
        }
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "snp-resolver")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

/// Token from the command line, falling back to `SNP_RESOLVER_TOKEN`.
pub fn resolve_token(explicit: Option<String>) -> Result<String, ResolverError> {
    explicit
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ResolverError::MissingToken)
}
