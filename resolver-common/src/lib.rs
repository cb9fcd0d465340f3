//! # Resolver Common Library
//!
//! Shared code for the identity resolution engine:
//! - Error type and result alias
//! - Configuration loading (thresholds, source priorities, batch budget)
//! - Database pool initialization and schema
//! - Typed row models for every query result crossing the storage boundary

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
