//! Configuration shared by the estimator and the command-line front end.
//!
//! `FitOptions` can be built in code or read from a small TOML file:
//!
//! ```toml
//! variance = "population"   # or "unbiased"
//! center = false
//! parallel = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Denominator used for the marginal variances.
///
/// The same convention is applied to every column of a fit, so the diagonal of
/// the returned matrix and the variances fed to the pairwise solver agree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceConvention {
    /// Divide by the number of observed entries (`ddof = 0`).
    #[default]
    Population,
    /// Divide by the number of observed entries minus one (`ddof = 1`).
    Unbiased,
}

impl VarianceConvention {
    pub fn ddof(self) -> usize {
        match self {
            Self::Population => 0,
            Self::Unbiased => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitOptions {
    pub variance: VarianceConvention,
    /// Subtract each column's observed mean before estimating. The pairwise
    /// moments are uncentred, so leave this off only for mean-scaled input.
    pub center: bool,
    /// Evaluate feature pairs on the rayon pool.
    pub parallel: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            variance: VarianceConvention::Population,
            center: false,
            parallel: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FitOptions {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}
