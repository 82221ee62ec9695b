use crate::api::models::{Conversation, ConversationId};

pub struct Sidebar;

impl Sidebar {
    pub fn render(items: &[Conversation], active: Option<ConversationId>) -> String {
        if items.is_empty() {
            return "No conversations yet.".to_string();
        }
        let mut lines = vec!["Conversations:".to_string()];
        for conv in items {
            let marker = if Some(conv.id) == active { '*' } else { ' ' };
            let when = conv
                .last_message_at
                .map(|t| t.format("%H:%M %d/%m/%Y").to_string())
                .unwrap_or_default();
            lines.push(format!("{} #{:<5} {:<32} {}", marker, conv.id, conv.display_name(), when).trim_end().to_string());
        }
        lines.join("\n")
    }
}
