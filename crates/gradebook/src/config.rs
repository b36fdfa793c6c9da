use std::env;
use std::path::{Path, PathBuf};

use crate::gpa::ScaleRegistry;
use crate::portal::PortalConfig;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Portal settings, from `PORTAL_CONFIG` with env overrides applied
    pub portal: PortalConfig,
    /// Directory of extra GPA scale presets
    pub scales_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which stands in for the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar("PORT"))?;

        let mut portal = match var("PORTAL_CONFIG") {
            Some(path) => PortalConfig::load_from_file(Path::new(&path))?,
            None => PortalConfig::default(),
        };

        if let Some(base_url) = var("PORTAL_BASE_URL") {
            portal.base_url = Some(base_url);
        }

        if let Some(ttl) = var("SESSION_TTL_SECS") {
            portal.session_ttl_secs = ttl
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("SESSION_TTL_SECS"))?;
        }

        if let Some(hosts) = var("PORTAL_ALLOWED_HOSTS") {
            portal.allowed_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }

        let scales_dir = var("GPA_SCALES_DIR").map(PathBuf::from);

        Ok(Self {
            host,
            port,
            portal,
            scales_dir,
        })
    }

    /// Built-in scale presets plus any found in `scales_dir`.
    pub fn load_scales(&self) -> Result<ScaleRegistry, ConfigError> {
        let mut registry = ScaleRegistry::new();
        if let Some(dir) = &self.scales_dir {
            registry.load_from_directory(dir)?;
        }
        Ok(registry)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidEnvVar(&'static str),
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid value in {key}: {message}")]
    InvalidValue { key: String, message: String },
}
