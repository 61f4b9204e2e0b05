//! # Bamort Common Library
//!
//! Shared code for the Bamort services including:
//! - Common error type
//! - Bootstrap configuration loading (TOML + environment)
//! - Database initialization and schema creation

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
