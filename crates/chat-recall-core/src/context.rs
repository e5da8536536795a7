//! Context block handed to the answer-generation step.

use crate::models::Message;

/// Separator placed between message texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Join ranked message texts, most relevant first.
pub fn build_context_block(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.text.trim())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
