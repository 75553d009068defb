//! Shared utilities for the quant workspace
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and environment-driven configuration parsing.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_duration_secs, env_parse};
pub use logging::{init_tracing, init_tracing_json, init_tracing_with};
