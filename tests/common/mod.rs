#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use storefront_chat::api::client::ApiClient;
use storefront_chat::api::models::Role;
use storefront_chat::api::stomp::{Command, Frame};
use storefront_chat::sync::live::LiveConfig;
use storefront_chat::sync::session::{ChatSession, SessionOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

pub const WAIT: Duration = Duration::from_secs(5);

enum Push {
    Raw(String),
    Drop,
}

/// In-process STOMP broker speaking just enough of the protocol for the client.
/// Serves one connection at a time and records every frame it receives.
pub struct FakeBroker {
    pub url: Url,
    received: mpsc::UnboundedReceiver<Frame>,
    push: mpsc::UnboundedSender<Push>,
    connections: Arc<AtomicUsize>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Push>();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(mut ws) = accept_async(tcp).await else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                loop {
                    tokio::select! {
                        incoming = ws.next() => {
                            let Some(Ok(WsMessage::Text(text))) = incoming else { break };
                            for frame in Frame::decode_all(&text).unwrap() {
                                if frame.command == Command::Connect {
                                    let reply = Frame::new(Command::Connected)
                                        .header("version", "1.2")
                                        .encode();
                                    let _ = ws.send(WsMessage::Text(reply)).await;
                                }
                                let _ = received_tx.send(frame);
                            }
                        }
                        pushed = push_rx.recv() => match pushed {
                            Some(Push::Raw(text)) => {
                                let _ = ws.send(WsMessage::Text(text)).await;
                            }
                            Some(Push::Drop) => {
                                let _ = ws.close(None).await;
                                break;
                            }
                            None => return,
                        }
                    }
                }
            }
        });

        Self {
            url: Url::parse(&format!("ws://{}/ws/websocket", addr)).unwrap(),
            received,
            push,
            connections,
        }
    }

    /// Next frame the client sent, whatever it is.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("broker waited too long for a frame")
            .expect("broker stopped")
    }

    /// Skips frames until one with `command` shows up.
    pub async fn expect(&mut self, command: Command) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    pub fn publish(&self, subscription: &str, body: Value) {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/conversations")
            .header("subscription", subscription)
            .header("message-id", "m-1")
            .header("content-type", "application/json")
            .with_body(body.to_string());
        self.push.send(Push::Raw(frame.encode())).unwrap();
    }

    pub fn push_raw(&self, raw: &str) {
        self.push.send(Push::Raw(raw.to_string())).unwrap();
    }

    pub fn drop_connection(&self) {
        self.push.send(Push::Drop).unwrap();
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn live_config(broker_url: &Url) -> LiveConfig {
    let mut live = LiveConfig::new(broker_url.clone(), Some("t0k".into()));
    live.reconnect_delay = Duration::from_millis(50);
    live
}

pub fn session(rest_base: &str, broker_url: &Url, role: Role, reconcile_sent: bool) -> ChatSession {
    let api = ApiClient::new(rest_base, Some("t0k".into())).unwrap();
    ChatSession::new(
        api,
        role,
        SessionOptions {
            live: live_config(broker_url),
            reconcile_sent,
            target_user_id: None,
        },
    )
}

pub async fn next_event(session: &mut ChatSession) -> storefront_chat::api::events::LiveEvent {
    tokio::time::timeout(WAIT, session.next_event())
        .await
        .expect("no live event arrived")
        .expect("event channel closed")
}
