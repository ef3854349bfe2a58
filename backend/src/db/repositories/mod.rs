//! Repository implementations.
//!
//! - `local`: In-memory implementation for tests, local development and fixtures
pub mod local;

pub use local::{Answer, LocalFixture, LocalRepository, Respondent};
