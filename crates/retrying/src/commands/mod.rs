//! Command implementations

pub mod check;
pub mod run;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use retrying_core::{Error, RetryPoliciesConfig};

/// Load the policy file given on the command line, or look for one
///
/// Returns `None` when no path was given and no file was found.
pub(crate) fn load_policies(
    explicit: Option<&Utf8Path>,
) -> Result<Option<(Utf8PathBuf, RetryPoliciesConfig)>> {
    if let Some(path) = explicit {
        let config = RetryPoliciesConfig::load(path)
            .with_context(|| format!("Failed to load policies from {}", path))?;
        return Ok(Some((path.to_owned(), config)));
    }

    match RetryPoliciesConfig::discover() {
        Ok(found) => Ok(Some(found)),
        Err(Error::ConfigNotFound { .. }) => {
            tracing::debug!("no policy file found, using defaults");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to load policy file"),
    }
}
