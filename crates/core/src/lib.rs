//! Core types and utilities for the Amnis price publisher
//!
//! This crate provides shared types used across all components:
//! - Symbol and price definitions
//! - Provider configuration
//! - Oracle and exchange-rate error types

pub mod types;
pub mod config;
pub mod errors;

pub use types::*;
pub use config::*;
pub use errors::*;
