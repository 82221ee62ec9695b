use crate::api::models::{Message, Role, badge_label};
use crate::sync::session::{AttachmentState, ChatSession};

pub struct ChatView;

impl ChatView {
    /// One bubble, from the point of view of `viewer`.
    pub fn bubble(m: &Message, viewer: Role, attachment: Option<&AttachmentState>) -> String {
        let who = if m.sender_type.is_from(viewer) {
            "you"
        } else {
            match viewer {
                Role::Customer => "support",
                Role::Admin => "customer",
            }
        };
        let time = m
            .sent_at
            .map(|t| format!(" {}", t.format("%H:%M")))
            .unwrap_or_default();

        let mut out = format!("[#{}{}] {}:", m.id, time, who);
        if let Some(text) = m.text() {
            out.push(' ');
            out.push_str(text);
        }
        if m.has_file {
            let name = m.file_name.as_deref().unwrap_or("file");
            let kind = if m.has_image() { "image" } else { "file" };
            out.push_str(&format!("\n    [{}: {}]", kind, name));
            match attachment {
                Some(AttachmentState::Ready(blob)) => {
                    out.push_str(&format!(" {} bytes, /download {} <path>", blob.bytes.len(), m.id));
                }
                Some(AttachmentState::Failed(reason)) => out.push_str(&format!(" ({})", reason)),
                None => {}
            }
        }
        out
    }

    pub fn render(session: &ChatSession) -> String {
        let mut lines = Vec::new();
        match (session.role(), session.active()) {
            (Role::Customer, _) => lines.push("== Customer support ==".to_string()),
            (Role::Admin, Some(c)) => lines.push(format!("== {} ==", c.display_name())),
            (Role::Admin, None) => lines.push("== No conversation selected ==".to_string()),
        }
        if let Some(notice) = session.notice() {
            lines.push(format!("! {}", notice));
        }
        if session.is_loading() {
            lines.push("Loading conversation...".to_string());
        } else if session.messages().is_empty() {
            lines.push("(no messages yet)".to_string());
        } else {
            for m in session.messages() {
                lines.push(Self::bubble(m, session.role(), session.attachment(m.id)));
            }
        }
        lines.join("\n")
    }

    pub fn badge(count: u64) -> String {
        match badge_label(count) {
            Some(label) => format!("[chat {}]", label),
            None => "[chat]".to_string(),
        }
    }
}
