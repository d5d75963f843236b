//! Shared types, configuration and errors for the notification core.

pub mod config;
pub mod error;
pub mod types;
