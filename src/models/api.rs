use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, ChatOptions };
use axum::http::HeaderValue;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

#[derive(Deserialize, Debug)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub options: Option<ChatOptions>,
}

impl ChatRequest {
    /// The turn's user input is the last entry; anything earlier is the client's own echo of
    /// history and is ignored in favour of the stored transcript.
    pub fn latest_user_message(&self) -> Result<&str, ChatError> {
        let last = self.messages
            .last()
            .ok_or_else(|| ChatError::Validation("messages must not be empty".into()))?;
        if last.role != "user" {
            return Err(ChatError::Validation("last message must have role 'user'".into()));
        }
        if last.content.trim().is_empty() {
            return Err(ChatError::Validation("last user message must not be empty".into()));
        }
        Ok(&last.content)
    }

    /// `null`, missing and blank ids all mean "start a new conversation"; anything else is kept
    /// verbatim. A supplied id has to be echoed back in a response header, so it must be a
    /// valid header value.
    pub fn conversation_id(&self) -> Result<Option<String>, ChatError> {
        match self.conversation_id.as_deref() {
            None => Ok(None),
            Some(id) if id.trim().is_empty() => Ok(None),
            Some(id) => {
                HeaderValue::from_str(id).map_err(|_|
                    ChatError::Validation("conversationId contains invalid characters".into())
                )?;
                Ok(Some(id.to_string()))
            }
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    pub id: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub history: Vec<ChatMessage>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct CancelResponse {
    pub status: &'static str,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_trailing_user_message() {
        let req = parse(
            r#"{"messages":[{"role":"assistant","content":"x"},{"role":"user","content":"hi"}],"conversationId":null}"#
        );
        assert_eq!(req.latest_user_message().unwrap(), "hi");
        assert_eq!(req.conversation_id().unwrap(), None);
    }

    #[test]
    fn rejects_missing_blank_or_non_user_tail() {
        assert!(parse(r#"{"messages":[]}"#).latest_user_message().is_err());
        assert!(parse(r#"{}"#).latest_user_message().is_err());
        assert!(
            parse(r#"{"messages":[{"role":"user","content":"   "}]}"#)
                .latest_user_message()
                .is_err()
        );
        assert!(
            parse(r#"{"messages":[{"role":"assistant","content":"hi"}]}"#)
                .latest_user_message()
                .is_err()
        );
    }

    #[test]
    fn blank_conversation_id_means_new() {
        let req = parse(r#"{"messages":[],"conversationId":"  "}"#);
        assert_eq!(req.conversation_id().unwrap(), None);
        let req = parse(r#"{"messages":[],"conversationId":"abc-123"}"#);
        assert_eq!(req.conversation_id().unwrap().as_deref(), Some("abc-123"));
        let req = parse(r#"{"messages":[],"conversationId":" abc-123 "}"#);
        assert_eq!(req.conversation_id().unwrap().as_deref(), Some(" abc-123 "));
        let req = parse(r#"{"messages":[],"conversationId":"bad\nid"}"#);
        assert!(req.conversation_id().is_err());
    }

    #[test]
    fn options_use_wire_names() {
        let req = parse(
            r#"{"messages":[],"options":{"model":"m","temperature":0.2,"max_tokens":64,"webSearchEnabled":true}}"#
        );
        let opts = req.options.unwrap();
        assert_eq!(opts.model.as_deref(), Some("m"));
        assert_eq!(opts.max_tokens, Some(64));
        assert_eq!(opts.web_search_enabled, Some(true));
    }
}
