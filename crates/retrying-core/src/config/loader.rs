//! Policy file loading and discovery

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};

use super::retry_config::RetryPoliciesConfig;

/// Policy file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["retrying.yaml", "retrying.yml"];

impl RetryPoliciesConfig {
    /// Load policies from a YAML file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path,
            operations = config.operations.len(),
            "loaded retry policies"
        );
        Ok(config)
    }

    /// Parse policies from YAML text
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Find a policy file in `start` or any of its parent directories
    pub fn find(start: &Utf8Path) -> Result<(Utf8PathBuf, Self)> {
        let mut current = start;

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.is_file() {
                    let config = Self::load(&path)?;
                    return Ok((path, config));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(Error::config_not_found(format!(
            "{} (searched {} and parent directories)",
            CONFIG_FILE_NAMES[0], start
        )))
    }

    /// Find a policy file starting from the current directory
    pub fn discover() -> Result<(Utf8PathBuf, Self)> {
        let cwd = std::env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;
        Self::find(&cwd)
    }
}
