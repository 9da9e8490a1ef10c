//! ragchat-engine
//!
//! Conversational query engine, transcripts, and the index lifecycle that keeps
//! one consistent serving generation published.

pub mod engine;
pub mod lifecycle;
pub mod prompt;
pub mod stream;
pub mod transcript;

pub use engine::{Answer, ChatEngine, ChatMode, EngineOptions};
pub use lifecycle::{IndexLifecycle, LifecycleState, ServingGeneration};
pub use stream::{AnswerEvent, AnswerStream};
pub use transcript::{Transcript, TranscriptStore, DEFAULT_SESSION};
