//! Token budgeting for the prompt sent upstream.
//!
//! Counts are estimates from a fixed characters-per-token ratio, not a real tokenizer.

use crate::models::chat::{ ChatMessage, Role };

pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_text(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| estimate_text(&m.content)).sum()
}

/// Drops the oldest non-system messages until the estimate fits `max_tokens` or only system
/// messages are left. System messages always survive and relative order is preserved.
pub fn trim(messages: &[ChatMessage], max_tokens: usize) -> Vec<ChatMessage> {
    let mut total = estimate(messages);
    if total <= max_tokens {
        return messages.to_vec();
    }

    let mut dropped = vec![false; messages.len()];
    for (idx, msg) in messages.iter().enumerate() {
        if total <= max_tokens {
            break;
        }
        if msg.role == Role::System {
            continue;
        }
        dropped[idx] = true;
        total -= estimate_text(&msg.content);
    }

    messages
        .iter()
        .zip(dropped)
        .filter(|(_, gone)| !gone)
        .map(|(msg, _)| msg.clone())
        .collect()
}
