use std::pin::Pin;

use futures::Stream;

use ragchat_core::Result;

/// One item of an answer: a token, or the end marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    Token(String),
    Done,
}

/// Lazy, single-use answer. Yields tokens in generation order, then exactly one
/// [`AnswerEvent::Done`]. Nothing follows `Done` or an error.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent>> + Send>>;
