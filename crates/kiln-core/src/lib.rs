//! `kiln-core`: configuration and shared error types for the kiln workspace.

pub mod config;
pub mod error;

pub use config::KilnConfig;
pub use error::{KilnError, Result};
