//! Screener Common - Shared configuration, errors, and logging for the stock screener.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and HTTP status mapping
//! - Logging setup and trace identifiers
//! - String helpers for log-safe output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    AiSettings, Config, DataConfig, ObservabilityConfig, ServerConfig,
};
pub use error::{Error, Result};
