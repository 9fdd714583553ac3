//! Core types, config, and errors for Edu Avatar.

pub mod config;
pub mod error;
pub mod types;
