//! Core domain + application logic for seedsbot, the art-gallery relay bot.
//!
//! This crate is intentionally framework-agnostic. Discord lives behind the
//! messaging port (trait) implemented in the adapter crate.

pub mod cache;
pub mod config;
pub mod content;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod relay;
pub mod retry;
pub mod state;

pub use errors::{Error, Result};
