use crate::api::models::{ConversationId, Message};
use crate::api::stomp::Frame;
use crate::error::{ChatError, Result};

/// A message pushed on a conversation's live topic.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    pub conversation_id: ConversationId,
    pub message: Message,
}

impl LiveEvent {
    pub fn from_frame(conversation_id: ConversationId, frame: &Frame) -> Result<Self> {
        let message: Message = serde_json::from_str(&frame.body).map_err(ChatError::from)?;
        Ok(Self { conversation_id, message })
    }
}

pub fn topic_for(prefix: &str, conversation_id: ConversationId) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), conversation_id)
}
