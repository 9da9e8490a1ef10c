//! ragchat-core
//!
//! Configuration, error taxonomy, domain types, provider traits, and the
//! document loader/chunker shared by every other crate in the workspace.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, ProviderError, ProviderErrorKind, Result};
