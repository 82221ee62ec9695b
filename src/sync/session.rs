use std::collections::HashMap;
use std::fmt;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::api::client::ApiClient;
use crate::api::events::LiveEvent;
use crate::api::models::{
    AttachmentBlob, Conversation, ConversationId, Draft, Message, MessageId, OutgoingMessage, Role,
};
use crate::error::{ChatError, Result};
use crate::sync::live::{LinkState, LiveConfig, LiveLink};
use crate::sync::timeline::Timeline;

/// Which part of the chat a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Bootstrap,
    Send,
}

/// An inline, user-visible error. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub scope: ErrorScope,
    pub message: String,
}

impl Notice {
    fn new(scope: ErrorScope, err: &ChatError) -> Self {
        let what = match scope {
            ErrorScope::Bootstrap => "Could not load the conversation",
            ErrorScope::Send => "Could not send the message",
        };
        Self { scope, message: format!("{}: {}", what, err) }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentState {
    Ready(AttachmentBlob),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub live: LiveConfig,
    /// Merge the stored message returned by a successful send instead of waiting for the echo.
    pub reconcile_sent: bool,
    /// Admin only: open this customer's conversation after bootstrap.
    pub target_user_id: Option<i64>,
}

/// One chat view's worth of state, for either side of the conversation.
///
/// The customer widget resolves its single conversation; the admin console lists every
/// conversation and switches between them. Both share the same timeline, live link and
/// send path.
pub struct ChatSession {
    api: ApiClient,
    role: Role,
    options: SessionOptions,
    conversations: Vec<Conversation>,
    active: Option<Conversation>,
    timeline: Timeline,
    attachments: HashMap<MessageId, AttachmentState>,
    link: Option<LiveLink>,
    visible: bool,
    loading: bool,
    notice: Option<Notice>,
    events_tx: mpsc::UnboundedSender<LiveEvent>,
    events_rx: mpsc::UnboundedReceiver<LiveEvent>,
}

impl ChatSession {
    pub fn new(api: ApiClient, role: Role, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            api,
            role,
            options,
            conversations: Vec::new(),
            active: None,
            timeline: Timeline::new(),
            attachments: HashMap::new(),
            link: None,
            visible: false,
            loading: false,
            notice: None,
            events_tx,
            events_rx,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|c| c.id)
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn link_state(&self) -> LinkState {
        self.link
            .as_ref()
            .map(LiveLink::state)
            .unwrap_or(LinkState::Disconnected)
    }

    /// Resolves the conversation(s) and history for this role. Failures land in [`Self::notice`].
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.loading = true;
        self.notice = None;
        let res = match self.role {
            Role::Customer => self.bootstrap_customer().await,
            Role::Admin => self.bootstrap_admin().await,
        };
        self.loading = false;
        if let Err(e) = &res {
            warn!("chat bootstrap failed: {}", e);
            self.notice = Some(Notice::new(ErrorScope::Bootstrap, e));
        }
        res
    }

    async fn bootstrap_customer(&mut self) -> Result<()> {
        let conversation = self.api.my_conversation().await?;
        info!("resolved conversation {}", conversation.id);
        self.conversations = vec![conversation.clone()];
        self.load(conversation).await
    }

    async fn bootstrap_admin(&mut self) -> Result<()> {
        self.conversations = self.api.admin_conversations().await?;
        info!("loaded {} conversations", self.conversations.len());
        if let Some(user_id) = self.options.target_user_id {
            return self.open_for_user_inner(user_id).await;
        }
        match self.conversations.first().cloned() {
            Some(latest) if self.active.is_none() => self.load(latest).await,
            _ => Ok(()),
        }
    }

    /// Admin: resolve (or create) the conversation of `user_id` and switch to it.
    pub async fn open_for_user(&mut self, user_id: i64) -> Result<()> {
        let res = self.open_for_user_inner(user_id).await;
        if let Err(e) = &res {
            warn!("could not open conversation for user {}: {}", user_id, e);
            self.notice = Some(Notice::new(ErrorScope::Bootstrap, e));
        }
        res
    }

    async fn open_for_user_inner(&mut self, user_id: i64) -> Result<()> {
        let conversation = self.api.admin_conversation_for_user(user_id).await?;
        self.upsert(conversation.clone());
        self.load(conversation).await
    }

    /// Admin: re-fetch the conversation list, keeping the current selection.
    pub async fn refresh_conversations(&mut self) -> Result<()> {
        match self.api.admin_conversations().await {
            Ok(list) => {
                self.conversations = list;
                Ok(())
            }
            Err(e) => {
                self.notice = Some(Notice::new(ErrorScope::Bootstrap, &e));
                Err(e)
            }
        }
    }

    /// Switches to a conversation already present in the list.
    pub async fn select(&mut self, conversation_id: ConversationId) -> Result<()> {
        let conversation = self
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or(ChatError::NoConversation)?;
        self.loading = true;
        self.notice = None;
        let res = self.load(conversation).await;
        self.loading = false;
        if let Err(e) = &res {
            warn!("could not load conversation {}: {}", conversation_id, e);
            self.notice = Some(Notice::new(ErrorScope::Bootstrap, e));
        }
        res
    }

    // Replace by id, otherwise put it on top.
    fn upsert(&mut self, conversation: Conversation) {
        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => existing.absorb(conversation),
            None => self.conversations.insert(0, conversation),
        }
    }

    async fn load(&mut self, conversation: Conversation) -> Result<()> {
        let id = conversation.id;
        self.active = Some(conversation);
        self.timeline.clear();
        self.attachments.clear();
        let history = self.api.messages(id).await?;
        debug!("conversation {} has {} messages", id, history.len());
        self.timeline = Timeline::from_history(history);
        self.attach_live();
        Ok(())
    }

    /// Opens the link, or moves the existing one, onto the active conversation.
    fn attach_live(&mut self) {
        if !self.visible {
            return;
        }
        let Some(id) = self.active_id() else { return };
        match &self.link {
            Some(link) => link.switch_to(id),
            None => {
                self.link = Some(LiveLink::open(
                    self.options.live.clone(),
                    id,
                    self.events_tx.clone(),
                ));
            }
        }
    }

    /// The view became visible. Bootstraps on first show and starts live updates.
    /// Returns whether the customer's unread messages were marked read.
    pub async fn show(&mut self) -> bool {
        self.visible = true;
        if self.active.is_none() {
            let _ = self.bootstrap().await;
        }
        self.attach_live();
        if self.role != Role::Customer {
            return false;
        }
        match self.api.mark_read().await {
            Ok(()) => true,
            Err(e) => {
                debug!("mark-read failed: {}", e);
                false
            }
        }
    }

    /// The view went away: drop the live link so the next show starts fresh.
    pub async fn hide(&mut self) {
        self.visible = false;
        if let Some(link) = self.link.take() {
            link.close().await;
        }
    }

    /// Waits for the next live event. Pending forever while nothing is subscribed.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events_rx.recv().await
    }

    /// Merges a live event into the timeline. Events for any conversation other than the
    /// active one are discarded. Returns whether the timeline changed.
    pub fn apply(&mut self, event: LiveEvent) -> bool {
        if self.active_id() != Some(event.conversation_id) {
            debug!(
                "dropping message {} for inactive conversation {}",
                event.message.id, event.conversation_id
            );
            return false;
        }
        self.timeline.merge(event.message)
    }

    /// Applies whatever is already queued without waiting.
    pub fn drain_events(&mut self) -> usize {
        let mut changed = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) {
                changed += 1;
            }
        }
        changed
    }

    /// Posts the draft. The draft is cleared once a request has been issued, whatever the
    /// outcome; the sent message itself shows up through the live topic.
    pub async fn send(&mut self, draft: &mut Draft) -> Result<()> {
        if draft.is_blank() {
            return Err(ChatError::EmptyMessage);
        }
        let conversation_id = self.active_id().ok_or(ChatError::NoConversation)?;
        let outgoing =
            OutgoingMessage::from_draft(conversation_id, draft).ok_or(ChatError::EmptyMessage)?;
        draft.clear();

        match self.api.send_message(&outgoing).await {
            Ok(Some(stored)) if self.options.reconcile_sent => {
                self.timeline.merge(stored);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("failed to send message to conversation {}: {}", conversation_id, e);
                self.notice = Some(Notice::new(ErrorScope::Send, &e));
                Err(e)
            }
        }
    }

    pub fn attachment(&self, message_id: MessageId) -> Option<&AttachmentState> {
        self.attachments.get(&message_id)
    }

    /// Downloads a message's attachment once. A failure is kept on that message only.
    pub async fn load_attachment(&mut self, message_id: MessageId) -> &AttachmentState {
        if !matches!(self.attachments.get(&message_id), Some(AttachmentState::Ready(_))) {
            let state = match self.timeline.get(message_id) {
                Some(m) if m.has_file => match self.api.attachment(message_id).await {
                    Ok(blob) => AttachmentState::Ready(blob),
                    Err(e) => {
                        warn!("attachment of message {} failed: {}", message_id, e);
                        AttachmentState::Failed(e.to_string())
                    }
                },
                Some(_) => AttachmentState::Failed("message has no attachment".into()),
                None => AttachmentState::Failed("message not in this conversation".into()),
            };
            self.attachments.insert(message_id, state);
        }
        &self.attachments[&message_id]
    }

    /// Final teardown.
    pub async fn close(mut self) {
        self.hide().await;
    }
}
