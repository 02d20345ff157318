//! Tolerant extraction from inbound update payloads.
//!
//! The platform pushes a JSON update per event. Only the chat id and the
//! message text matter here; everything else passes through untouched.
//! Malformed payloads extract as "nothing" rather than erroring — the
//! ingress path must stay permissive.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Option<Chat>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    caption: String,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    message: Option<Message>,
}

/// Chat id of an update, or 0 when absent.
pub fn extract_chat_id(body: &[u8]) -> i64 {
    let Ok(update) = serde_json::from_slice::<Update>(body) else {
        return 0;
    };
    if let Some(chat) = update.message.as_ref().and_then(|m| m.chat.as_ref()) {
        return chat.id;
    }
    update
        .callback_query
        .and_then(|cb| cb.message)
        .and_then(|m| m.chat)
        .map_or(0, |c| c.id)
}

/// Message text of an update, falling back to the caption; empty when absent.
pub fn extract_message_text(body: &[u8]) -> String {
    let Ok(update) = serde_json::from_slice::<Update>(body) else {
        return String::new();
    };
    match update.message {
        Some(msg) if !msg.text.is_empty() => msg.text,
        Some(msg) => msg.caption,
        None => String::new(),
    }
}
