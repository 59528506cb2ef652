//! Folio Core: configuration and shared error types.

pub mod config;
pub mod error;

pub use config::{DataPaths, FolioConfig, ProviderKeys};
pub use error::{Error, Result};
