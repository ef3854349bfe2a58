//! # Survey Metrics
//!
//! Weighted survey-metric calculation engine.
//!
//! Respondent answers are counted per entity, day and quota cell, then
//! weighted so each demographic stratum counts in proportion to its target
//! population. On top of the weighted results the engine provides
//! demographic breakdowns, market averages across entities, significance
//! testing, trial-user redaction and background preloading of saved reports.
//!
//! ## Architecture
//!
//! - [`models`]: Measures, subsets, entities, quota cells, filters and result types
//! - [`db`]: Read-only repository traits, the in-memory repository and the factory
//! - [`services`]: The calculation pipeline, calculator decorators and the preloader
//! - [`config`]: `metrics.toml` loading
//! - [`api`]: The public surface, re-exported in one place
//!
//! ## Pipeline
//!
//! ```text
//! RespondentRepository ──► unweighted totals ──► weighting ──► significance
//!                                   │                 │
//!                                   │                 ├──► breakdowns
//!                                   │                 └──► market average
//!                                   └──► computed once per request, shared by Arc
//! ```

// RepositoryError carries an ErrorContext in every variant.
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
