//! ragchat-server
//!
//! axum service exposing the chat engine, plus wiring shared with the offline indexer.

pub mod bootstrap;
pub mod error;
pub mod gateway;
pub mod telemetry;

pub use gateway::{router, AppState};
