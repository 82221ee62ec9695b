//! The live half of a chat view: one broker connection, one topic subscription.
//!
//! A [`LiveLink`] owns a background task holding the WebSocket. Dropping the link (or
//! calling [`LiveLink::close`]) is the only way to stop it. Unexpected drops are retried
//! after a fixed delay, re-subscribing to whatever conversation was asked for last.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use url::Url;

use crate::api::events::{LiveEvent, topic_for};
use crate::api::models::ConversationId;
use crate::api::stomp::{Command, Frame};
use crate::error::{ChatError, Result};
use crate::utils::host_of;

pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/conversations";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected { topic: String },
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub ws_url: Url,
    pub token: Option<String>,
    pub topic_prefix: String,
    pub reconnect_delay: Duration,
}

impl LiveConfig {
    pub fn new(ws_url: Url, token: Option<String>) -> Self {
        Self {
            ws_url,
            token,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveSubscription {
    id: String,
    conversation_id: ConversationId,
    topic: String,
}

/// Subscription bookkeeping for a single broker connection.
#[derive(Debug, Default)]
pub struct Subscriptions {
    active: Option<ActiveSubscription>,
    next_id: u64,
}

impl Subscriptions {
    /// Frames needed to move the connection onto `conversation_id`: an UNSUBSCRIBE for the
    /// previous topic, if any, followed by the new SUBSCRIBE. Empty when already there.
    pub fn switch(&mut self, conversation_id: ConversationId, prefix: &str) -> Vec<Frame> {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.conversation_id == conversation_id)
        {
            return Vec::new();
        }
        let mut frames = Vec::with_capacity(2);
        if let Some(prev) = self.active.take() {
            frames.push(Frame::unsubscribe(&prev.id));
        }
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        let topic = topic_for(prefix, conversation_id);
        frames.push(Frame::subscribe(&id, &topic));
        self.active = Some(ActiveSubscription { id, conversation_id, topic });
        frames
    }

    /// The conversation a MESSAGE frame belongs to, if it arrived on the active subscription.
    pub fn route(&self, frame: &Frame) -> Option<ConversationId> {
        let active = self.active.as_ref()?;
        (frame.command == Command::Message && frame.get("subscription") == Some(active.id.as_str()))
            .then_some(active.conversation_id)
    }

    pub fn active_topic(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.topic.as_str())
    }
}

enum LinkCommand {
    Subscribe(ConversationId),
    Close,
}

pub struct LiveLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
    state: watch::Receiver<LinkState>,
    task: Option<JoinHandle<()>>,
}

impl LiveLink {
    /// Starts connecting right away. Must be called from within a tokio runtime.
    pub fn open(
        config: LiveConfig,
        conversation_id: ConversationId,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let task = tokio::spawn(run_link(config, conversation_id, cmd_rx, events, state_tx));
        Self { commands: cmd_tx, state: state_rx, task: Some(task) }
    }

    pub fn switch_to(&self, conversation_id: ConversationId) {
        let _ = self.commands.send(LinkCommand::Subscribe(conversation_id));
    }

    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    /// Sends DISCONNECT and waits briefly for the socket to wind down.
    pub async fn close(mut self) {
        let _ = self.commands.send(LinkCommand::Close);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

async fn run_link(
    config: LiveConfig,
    mut wanted: ConversationId,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LiveEvent>,
    state: watch::Sender<LinkState>,
) {
    loop {
        state.send_replace(LinkState::Connecting);
        match serve(&config, &mut wanted, &mut commands, &events, &state).await {
            Ok(()) => break,
            Err(e) => warn!(
                "live link for conversation {} dropped: {}; retrying in {:?}",
                wanted, e, config.reconnect_delay
            ),
        }
        state.send_replace(LinkState::Disconnected);

        let sleep = tokio::time::sleep(config.reconnect_delay);
        tokio::pin!(sleep);
        let closed = loop {
            tokio::select! {
                _ = &mut sleep => break false,
                cmd = commands.recv() => match cmd {
                    Some(LinkCommand::Subscribe(id)) => wanted = id,
                    Some(LinkCommand::Close) | None => break true,
                },
            }
        };
        if closed {
            break;
        }
    }
    state.send_replace(LinkState::Disconnected);
    debug!("live link stopped (last conversation {})", wanted);
}

async fn serve(
    config: &LiveConfig,
    wanted: &mut ConversationId,
    commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    events: &mpsc::UnboundedSender<LiveEvent>,
    state: &watch::Sender<LinkState>,
) -> Result<()> {
    let (ws, _) = connect_async(config.ws_url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let host = host_of(&config.ws_url);
    sink.send(to_ws(Frame::connect(&host, config.token.as_deref())))
        .await?;
    tokio::time::timeout(CONNECT_TIMEOUT, await_connected(&mut stream))
        .await
        .map_err(|_| ChatError::Broker("timed out waiting for CONNECTED".into()))??;
    info!("live link connected to {}", config.ws_url);

    let mut subs = Subscriptions::default();
    for frame in subs.switch(*wanted, &config.topic_prefix) {
        sink.send(to_ws(frame)).await?;
    }
    publish_connected(state, &subs);

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(LinkCommand::Subscribe(id)) => {
                    *wanted = id;
                    for frame in subs.switch(id, &config.topic_prefix) {
                        sink.send(to_ws(frame)).await?;
                    }
                    publish_connected(state, &subs);
                }
                Some(LinkCommand::Close) | None => {
                    let _ = sink.send(to_ws(Frame::disconnect())).await;
                    let _ = sink.close().await;
                    info!("live link closed");
                    return Ok(());
                }
            },
            incoming = stream.next() => {
                let Some(payload) = text_of(incoming)? else { continue };
                for decoded in Frame::decode_each(&payload) {
                    let frame = match decoded {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("dropping undecodable broker frame: {}", e);
                            continue;
                        }
                    };
                    match frame.command {
                        Command::Message => {
                            let Some(conversation_id) = subs.route(&frame) else {
                                debug!("ignoring frame for stale subscription {:?}", frame.get("subscription"));
                                continue;
                            };
                            match LiveEvent::from_frame(conversation_id, &frame) {
                                Ok(ev) => {
                                    if events.send(ev).is_err() {
                                        // Nobody is listening anymore; wind down quietly.
                                        let _ = sink.send(to_ws(Frame::disconnect())).await;
                                        let _ = sink.close().await;
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("dropping malformed live message: {}", e),
                            }
                        }
                        Command::Error => return Err(broker_error(&frame)),
                        other => debug!("ignoring {} frame", other),
                    }
                }
            }
        }
    }
}

async fn await_connected<S>(stream: &mut S) -> Result<()>
where
    S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    loop {
        let Some(payload) = text_of(stream.next().await)? else { continue };
        for frame in Frame::decode_all(&payload)? {
            match frame.command {
                Command::Connected => return Ok(()),
                Command::Error => return Err(broker_error(&frame)),
                other => debug!("ignoring {} frame before CONNECTED", other),
            }
        }
    }
}

/// Extracts the STOMP payload from one WebSocket read. `None` for control messages.
fn text_of(
    incoming: Option<std::result::Result<WsMessage, tungstenite::Error>>,
) -> Result<Option<String>> {
    match incoming {
        None | Some(Ok(WsMessage::Close(_))) => {
            Err(ChatError::Broker("connection closed by broker".into()))
        }
        Some(Err(e)) => Err(e.into()),
        Some(Ok(WsMessage::Text(t))) => Ok(Some(t)),
        Some(Ok(WsMessage::Binary(b))) => Ok(Some(String::from_utf8_lossy(&b).into_owned())),
        Some(Ok(_)) => Ok(None),
    }
}

fn broker_error(frame: &Frame) -> ChatError {
    let detail = frame
        .get("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.clone());
    ChatError::Broker(detail)
}

fn publish_connected(state: &watch::Sender<LinkState>, subs: &Subscriptions) {
    if let Some(topic) = subs.active_topic() {
        debug!("subscribed to {}", topic);
        state.send_replace(LinkState::Connected { topic: topic.to_string() });
    }
}

fn to_ws(frame: Frame) -> WsMessage {
    WsMessage::Text(frame.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_on(sub: &str) -> Frame {
        Frame::new(Command::Message)
            .header("subscription", sub)
            .with_body("{}")
    }

    #[test]
    fn first_switch_only_subscribes() {
        let mut subs = Subscriptions::default();
        let frames = subs.switch(42, DEFAULT_TOPIC_PREFIX);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Subscribe);
        assert_eq!(frames[0].get("destination"), Some("/topic/conversations/42"));
        assert_eq!(subs.active_topic(), Some("/topic/conversations/42"));
    }

    #[test]
    fn switching_unsubscribes_the_previous_topic_first() {
        let mut subs = Subscriptions::default();
        let first = subs.switch(1, DEFAULT_TOPIC_PREFIX);
        let old_id = first[0].get("id").unwrap().to_string();

        let frames = subs.switch(2, DEFAULT_TOPIC_PREFIX);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Unsubscribe);
        assert_eq!(frames[0].get("id"), Some(old_id.as_str()));
        assert_eq!(frames[1].command, Command::Subscribe);
        assert_ne!(frames[1].get("id"), Some(old_id.as_str()));
        assert_eq!(subs.active_topic(), Some("/topic/conversations/2"));
    }

    #[test]
    fn reselecting_the_same_conversation_is_free() {
        let mut subs = Subscriptions::default();
        subs.switch(7, DEFAULT_TOPIC_PREFIX);
        assert!(subs.switch(7, DEFAULT_TOPIC_PREFIX).is_empty());
    }

    #[test]
    fn frames_from_the_old_subscription_are_not_routed() {
        let mut subs = Subscriptions::default();
        subs.switch(1, DEFAULT_TOPIC_PREFIX);
        subs.switch(2, DEFAULT_TOPIC_PREFIX);
        assert_eq!(subs.route(&message_on("sub-0")), None);
        assert_eq!(subs.route(&message_on("sub-1")), Some(2));
        assert_eq!(subs.route(&Frame::new(Command::Receipt).header("subscription", "sub-1")), None);
    }

    #[test]
    fn nothing_routes_before_subscribing() {
        let subs = Subscriptions::default();
        assert_eq!(subs.route(&message_on("sub-0")), None);
    }
}
