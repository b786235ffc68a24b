//! termconf library
//!
//! Layered, validated, hot-reloadable configuration with encrypted secrets.
//! This module exports the core components for the binary and for tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod secrets;
