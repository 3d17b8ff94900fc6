//! Configuration parser for loading instance configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, VmError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::InstanceConfig;

/// Environment variable overriding `project_id`.
pub const ENV_PROJECT_ID: &str = "COMPUTE_VM_PROJECT_ID";

/// Environment variable overriding `zone`.
pub const ENV_ZONE: &str = "COMPUTE_VM_ZONE";

/// Environment variable overriding `name`.
pub const ENV_NAME: &str = "COMPUTE_VM_NAME";

/// Configuration parser for loading instance configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<InstanceConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(VmError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            VmError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<InstanceConfig> {
        debug!("Parsing YAML configuration");

        let config: InstanceConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            VmError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Successfully parsed configuration for instance: {}", config.name);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// `COMPUTE_VM_PROJECT_ID`, `COMPUTE_VM_ZONE` and `COMPUTE_VM_NAME`
    /// replace the corresponding fields when set and non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<InstanceConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    fn apply_overrides(config: &mut InstanceConfig, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (ENV_PROJECT_ID, &mut config.project_id),
            (ENV_ZONE, &mut config.zone),
            (ENV_NAME, &mut config.name),
        ];

        for (key, field) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                debug!("Overriding {key} from environment");
                *field = value;
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                VmError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "compute-vm.yaml",
    "compute-vm.yml",
    "instance.yaml",
    "instance.yml",
];

/// Finds the configuration file in the given directory or its parents,
/// falling back to the user configuration directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();

    let user_dir = dirs::config_dir().map(|dir| dir.join("compute-vm"));
    let candidates = start.ancestors().map(Path::to_path_buf).chain(user_dir);

    for dir in candidates {
        if let Some(found) = find_in_dir(&dir) {
            info!("Found configuration file: {}", found.display());
            return Ok(found);
        }
    }

    Err(VmError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.is_file())
}
