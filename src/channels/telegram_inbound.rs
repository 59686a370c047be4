//! Telegram inbound update parsing helpers.

use serde::Deserialize;

/// Telegram update payload.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default, rename = "edited_message")]
    pub edited_message: Option<TelegramMessage>,
}

/// Telegram message payload.
#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub text: Option<String>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
}

/// Telegram chat metadata.
#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub chat_type: Option<String>,
}

/// Telegram user metadata.
#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Parsed inbound Telegram message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramInbound {
    pub sender_id: i64,
    pub sender_name: String,
    pub chat_id: i64,
    pub text: String,
}

/// Extract a text-bearing inbound message from a Telegram update.
///
/// Bot-authored messages and updates without a sender or text are dropped.
pub fn extract_inbound(update: &TelegramUpdate) -> Option<TelegramInbound> {
    let message = update.message.as_ref().or(update.edited_message.as_ref())?;

    let from = message.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let text = message.text.as_ref().filter(|t| !t.is_empty())?.to_string();

    let sender_name = from
        .username
        .clone()
        .or_else(|| from.first_name.clone())
        .unwrap_or_else(|| from.id.to_string());

    Some(TelegramInbound {
        sender_id: from.id,
        sender_name,
        chat_id: message.chat.id,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_inbound_message() {
        let json = r#"{
            "update_id": 1,
            "message": {
                "text": "Hello",
                "chat": { "id": 123, "type": "private" },
                "from": { "id": 456, "is_bot": false, "username": "alice" }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        let inbound = extract_inbound(&update).unwrap();
        assert_eq!(inbound.sender_id, 456);
        assert_eq!(inbound.sender_name, "alice");
        assert_eq!(inbound.chat_id, 123);
        assert_eq!(inbound.text, "Hello");
    }

    #[test]
    fn test_extract_inbound_edited_message() {
        let json = r#"{
            "edited_message": {
                "text": "Fixed typo",
                "chat": { "id": 123, "type": "private" },
                "from": { "id": 456, "is_bot": false, "first_name": "Bob" }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        let inbound = extract_inbound(&update).unwrap();
        assert_eq!(inbound.sender_name, "Bob");
        assert_eq!(inbound.text, "Fixed typo");
    }

    #[test]
    fn test_extract_inbound_skips_bot() {
        let json = r#"{
            "message": {
                "text": "Ignore me",
                "chat": { "id": 123, "type": "private" },
                "from": { "id": 456, "is_bot": true }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        assert!(extract_inbound(&update).is_none());
    }

    #[test]
    fn test_extract_inbound_skips_empty_text() {
        let json = r#"{
            "message": {
                "chat": { "id": 123, "type": "private" },
                "from": { "id": 456, "is_bot": false }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        assert!(extract_inbound(&update).is_none());
    }

    #[test]
    fn test_sender_name_falls_back_to_id() {
        let json = r#"{
            "message": {
                "text": "hi",
                "chat": { "id": 1, "type": "private" },
                "from": { "id": 456, "is_bot": false }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(extract_inbound(&update).unwrap().sender_name, "456");
    }
}
