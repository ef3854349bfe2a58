//! Engine configuration file support.
//!
//! Reads `metrics.toml`: which repository to read from, calculation defaults
//! and the preload scheduler's limits. Every setting has a default so a
//! minimal file only needs a `[repository]` table.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::db::factory::RepositoryType;
use crate::db::repository::RepositoryError;
use crate::models::SigConfidenceLevel;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub calculation: CalculationSettings,
    #[serde(default)]
    pub preload: PreloadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
            fixture_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationSettings {
    /// Minimum unweighted sample per entity before its market-average
    /// weight is trimmed.
    #[serde(default = "default_low_sample_for_brand")]
    pub low_sample_for_brand: u32,
    #[serde(default = "default_confidence_level")]
    pub default_confidence_level: u8,
    /// Re-weight every breakdown label from scratch instead of reusing
    /// per-cell contributions.
    #[serde(default)]
    pub legacy_break_calculation: bool,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            low_sample_for_brand: default_low_sample_for_brand(),
            default_confidence_level: default_confidence_level(),
            legacy_break_calculation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadSettings {
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_sub_product")]
    pub sub_product: String,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_absolute_expiration_secs")]
    pub absolute_expiration_secs: u64,
    #[serde(default = "default_sliding_expiration_secs")]
    pub sliding_expiration_secs: u64,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            product: default_product(),
            sub_product: default_sub_product(),
            max_parallelism: default_max_parallelism(),
            absolute_expiration_secs: default_absolute_expiration_secs(),
            sliding_expiration_secs: default_sliding_expiration_secs(),
        }
    }
}

impl PreloadSettings {
    /// Task cache key for this deployment, `<product>/<sub_product>`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.product, self.sub_product)
    }

    pub fn absolute_expiration(&self) -> Duration {
        Duration::from_secs(self.absolute_expiration_secs)
    }

    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_secs(self.sliding_expiration_secs)
    }
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_low_sample_for_brand() -> u32 {
    75
}

fn default_confidence_level() -> u8 {
    95
}

fn default_product() -> String {
    "brandvue".to_string()
}

fn default_sub_product() -> String {
    "default".to_string()
}

fn default_max_parallelism() -> usize {
    4
}

fn default_absolute_expiration_secs() -> u64 {
    2 * 60 * 60
}

fn default_sliding_expiration_secs() -> u64 {
    10 * 60
}

impl EngineConfig {
    /// Load engine configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(EngineConfig)` if successful
    /// * `Err(RepositoryError)` if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;
        content.parse()
    }

    /// Load engine configuration from the default location.
    ///
    /// Searches for `metrics.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let search_paths = [
            PathBuf::from("metrics.toml"),
            PathBuf::from("backend/metrics.toml"),
            PathBuf::from("../metrics.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                log::info!("Loading engine configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No metrics.toml found in standard locations",
        ))
    }

    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Confidence level used when a request does not name one.
    pub fn default_confidence_level(&self) -> Result<SigConfidenceLevel, RepositoryError> {
        SigConfidenceLevel::from_percent(self.calculation.default_confidence_level).ok_or_else(
            || {
                RepositoryError::configuration(format!(
                    "Unsupported confidence level {}%; expected 90, 95, 98 or 99",
                    self.calculation.default_confidence_level
                ))
            },
        )
    }
}

impl FromStr for EngineConfig {
    type Err = RepositoryError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })?;
        if config.preload.max_parallelism == 0 {
            return Err(RepositoryError::configuration(
                "preload.max_parallelism must be at least 1",
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[repository]
type = "fixture"
fixture_path = "data/demo.json"

[calculation]
low_sample_for_brand = 50
default_confidence_level = 99
legacy_break_calculation = true

[preload]
product = "brandvue"
sub_product = "retail"
max_parallelism = 2
absolute_expiration_secs = 60
sliding_expiration_secs = 30
"#;

        let config: EngineConfig = toml_str.parse().unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Fixture);
        assert_eq!(config.calculation.low_sample_for_brand, 50);
        assert!(config.calculation.legacy_break_calculation);
        assert_eq!(
            config.default_confidence_level().unwrap(),
            SigConfidenceLevel::NinetyNine
        );
        assert_eq!(config.preload.cache_key(), "brandvue/retail");
        assert_eq!(config.preload.sliding_expiration(), Duration::from_secs(30));
    }

    #[test]
    fn test_defaults_apply() {
        let config: EngineConfig = "[repository]\ntype = \"local\"\n".parse().unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
        assert_eq!(config.calculation.low_sample_for_brand, 75);
        assert!(!config.calculation.legacy_break_calculation);
        assert_eq!(config.preload.max_parallelism, 4);
        assert_eq!(config.preload.absolute_expiration(), Duration::from_secs(7200));
        assert_eq!(config.preload.sliding_expiration(), Duration::from_secs(600));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!("[preload]\nmax_parallelism = 0\n".parse::<EngineConfig>().is_err());
        let config: EngineConfig = "[calculation]\ndefault_confidence_level = 80\n".parse().unwrap();
        assert!(config.default_confidence_level().is_err());
        let config: EngineConfig = "[repository]\ntype = \"postgres\"\n".parse().unwrap();
        assert!(config.repository_type().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[preload]\nsub_product = \"finance\"").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.preload.cache_key(), "brandvue/finance");

        assert!(EngineConfig::from_file("/definitely/not/here.toml").is_err());
    }
}
