//! # heifkit-core
//!
//! Core types shared across the heifkit crates: the error taxonomy,
//! libheif's compression-format and error-code enums, and the TOML
//! configuration model.

pub mod config;
pub mod error;
pub mod format;

pub use config::*;

pub use error::{HeifkitError, HeifkitResult};
pub use format::{CompressionFormat, HeifErrorCode};
