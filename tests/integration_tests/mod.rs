//! Integration test modules
//!
//! Shared fixtures live in [`fixtures`]; each test module covers one part
//! of the pipeline surface.

pub mod cache_test;
pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
