use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::client::ApiClient;
use crate::api::models::badge_label;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Background unread-count poll feeding the widget badge.
///
/// Runs whether or not the chat view is open and stops when dropped.
pub struct UnreadPoller {
    count: Arc<watch::Sender<u64>>,
    rx: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl UnreadPoller {
    pub fn spawn(api: ApiClient, every: Duration) -> Self {
        let (tx, rx) = watch::channel(0u64);
        let count = Arc::new(tx);
        let publisher = count.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match api.unread_count().await {
                    Ok(n) => {
                        publisher.send_replace(n);
                    }
                    // A failed poll keeps the last known badge.
                    Err(e) => debug!("unread poll failed: {}", e),
                }
            }
        });
        Self { count, rx, task }
    }

    pub fn count(&self) -> u64 {
        *self.rx.borrow()
    }

    pub fn badge(&self) -> Option<String> {
        badge_label(self.count())
    }

    /// Zeroes the badge after the conversation has been marked read.
    pub fn reset(&self) {
        self.count.send_replace(0);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.rx.clone()
    }
}

impl Drop for UnreadPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
