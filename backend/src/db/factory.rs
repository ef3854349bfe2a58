//! Repository factory for dependency injection.
//!
//! Creates the repository the engine reads from based on runtime configuration.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repositories::LocalRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::config::EngineConfig;

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Empty in-memory repository, populated by the caller
    Local,
    /// In-memory repository seeded from a JSON fixture file
    Fixture,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Parse repository type from string.
    ///
    /// # Arguments
    /// * `s` - String representation ("local", "memory", "fixture")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "memory" => Ok(Self::Local),
            "fixture" => Ok(Self::Fixture),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// Get repository type from environment variable.
    ///
    /// Reads `REPOSITORY_TYPE`. Defaults to Fixture if `METRICS_FIXTURE` is
    /// set, otherwise Local.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var("REPOSITORY_TYPE") {
            return val.parse().unwrap_or(Self::Local);
        }

        if std::env::var("METRICS_FIXTURE").is_ok() {
            Self::Fixture
        } else {
            Self::Local
        }
    }
}

/// Repository factory for creating repository instances.
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a repository instance based on type.
    ///
    /// # Arguments
    /// * `repo_type` - Type of repository to create
    /// * `fixture_path` - JSON fixture (required for Fixture)
    ///
    /// # Returns
    /// * `Ok(Arc<dyn FullRepository>)` - Repository instance
    /// * `Err(RepositoryError)` - If the fixture is missing or unreadable
    pub fn create(
        repo_type: RepositoryType,
        fixture_path: Option<&Path>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Fixture => {
                let path = fixture_path.ok_or_else(|| {
                    RepositoryError::configuration("Fixture repository requires a fixture path")
                })?;
                let repo = LocalRepository::from_fixture_file(path)?;
                Ok(Arc::new(repo))
            }
        }
    }

    /// Create an empty in-memory local repository.
    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Create repository from environment configuration.
    ///
    /// Uses `REPOSITORY_TYPE` and `METRICS_FIXTURE`.
    pub fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = RepositoryType::from_env();
        let fixture = std::env::var("METRICS_FIXTURE").ok();
        Self::create(repo_type, fixture.as_deref().map(Path::new))
    }

    /// Create repository from a loaded engine configuration.
    pub fn from_config(config: &EngineConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = config
            .repository_type()
            .map_err(RepositoryError::configuration)?;
        Self::create(repo_type, config.repository.fixture_path.as_deref())
    }
}
