//! # vidquiz Common Library
//!
//! Shared code for the vidquiz services:
//! - Error type and result alias
//! - Pipeline event types and the broadcast EventBus
//! - Bootstrap configuration loading (TOML) and root folder resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
