use std::collections::HashSet;

use crate::api::models::{Message, MessageId};

/// Messages of the open conversation in arrival order, unique by id.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(history: Vec<Message>) -> Self {
        let mut timeline = Self::new();
        for m in history {
            timeline.merge(m);
        }
        timeline
    }

    /// Appends `message` unless one with the same id is already present.
    /// Returns whether anything changed.
    pub fn merge(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }
}
