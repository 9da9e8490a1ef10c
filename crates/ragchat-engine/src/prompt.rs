//! Prompt templates for both answer modes.

use ragchat_core::types::{ChatMessage, Role, SearchHit};

pub const CONTEXT_TEMPLATE: &str = "{system_prompt}

Here are the relevant documents for the context:

{context}

Instruction: Based on the above documents, provide a detailed answer for the user question below.
Answer \"I don't know\" if the answer is not present in the documents.";

pub const CONDENSE_TEMPLATE: &str = "Given the following conversation between a user and an AI assistant and a follow up question from the user, rephrase the follow up question to be a standalone question.

Chat History:
{history}
Follow Up Input: {question}
Standalone question:";

pub const QA_TEMPLATE: &str = "Context information is below.
---------------------
{context}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {question}
Answer: ";

/// Retrieved chunks rendered as a context block, best hit first.
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "(no relevant documents found)".to_string();
    }
    hits.iter()
        .map(|h| format!("source: {}\n\n{}", h.chunk.doc_id, h.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitute `{name}` placeholders in one pass. Inserted values are never
/// rescanned, so text that itself contains `{...}` is kept verbatim.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = values.iter().find_map(|(name, value)| {
            tail.strip_prefix('{')
                .and_then(|t| t.strip_prefix(*name))
                .and_then(|t| t.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn context_system_message(system_prompt: &str, hits: &[SearchHit]) -> ChatMessage {
    let context = format_context(hits);
    ChatMessage::system(fill(CONTEXT_TEMPLATE, &[("system_prompt", system_prompt.trim()), ("context", &context)]))
}

pub fn condense_prompt(history: &[ChatMessage], question: &str) -> ChatMessage {
    let history = history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    ChatMessage::user(fill(CONDENSE_TEMPLATE, &[("history", &history), ("question", question)]))
}

pub fn qa_prompt(hits: &[SearchHit], question: &str) -> ChatMessage {
    let context = format_context(hits);
    ChatMessage::user(fill(QA_TEMPLATE, &[("context", &context), ("question", question)]))
}
