//! Core library: scanning, aggregation, export, plugin detection and the
//! workspace file operations.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod export;
pub mod launch;
pub mod models;
pub mod plugins;
pub mod prefs;
pub mod scanner;
pub mod workspace;

pub use error::{CatalogError, Result};
