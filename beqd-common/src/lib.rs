//! # beqd Common Library
//!
//! Shared code for the beqd profile loader daemon:
//! - Event types (BeqdEvent enum) and the broadcast EventBus
//! - Configuration loading (TOML + environment + built-in defaults)
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
