//! Data access for the calculation engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Services (calculator chain, preloader)                 │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository traits (repository) - read-only interfaces  │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────▼──────────────────────────────┐
//!     │             Local Repository                  │
//!     │        (in-memory, optional JSON seed)        │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! - `repository`: Trait definitions and errors
//! - `repositories::local`: In-memory implementation
//! - `factory`: Creates repositories from configuration

pub mod factory;
pub mod repositories;
pub mod repository;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
pub use repository::{
    EntityRepository, ErrorContext, FullRepository, MeasureRepository, RepositoryError,
    RepositoryResult, RespondentRepository, SavedReportRepository, SubsetRepository,
    UnweightedCountQuery,
};
