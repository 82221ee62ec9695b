use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::models::Role;
use crate::error::{ChatError, Result};
use crate::sync::live::{DEFAULT_TOPIC_PREFIX, LiveConfig};
use crate::sync::session::SessionOptions;
use crate::utils::{normalize_url, ws_url_from_base};

pub const ENV_BASE_URL: &str = "STOREFRONT_CHAT_BASE_URL";
pub const ENV_TOKEN: &str = "STOREFRONT_CHAT_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppState {
    pub base_url: String,
    pub token: Option<String>,
    pub role: Role,
    /// Overrides the WebSocket endpoint derived from `base_url`.
    pub ws_url: Option<String>,
    pub topic_prefix: String,
    pub reconnect_delay_ms: u64,
    pub unread_poll_secs: u64,
    pub reconcile_sent: bool,
    pub target_user_id: Option<i64>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            role: Role::Customer,
            ws_url: None,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            reconnect_delay_ms: 5000,
            unread_poll_secs: 30,
            reconcile_sent: true,
            target_user_id: None,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML is the primary format; an older JSON state file is migrated on first read.
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("storefront-chat.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("com", "hometech", "StorefrontChat")?;
        Some(proj.config_dir().join("state.json"))
    }

    pub fn load() -> Self {
        let mut state = Self::load_from(Self::toml_path().as_deref(), Self::legacy_json_path().as_deref());
        state.apply_env(|key| std::env::var(key).ok());
        state
    }

    /// Reads `toml` if it parses, else falls back to `legacy` JSON (re-saving it as TOML).
    pub fn load_from(toml: Option<&Path>, legacy: Option<&Path>) -> Self {
        if let Some(path) = toml {
            if let Ok(text) = fs::read_to_string(path) {
                match toml::from_str::<AppState>(&text) {
                    Ok(state) => return state,
                    Err(e) => debug!("ignoring unreadable {}: {}", path.display(), e),
                }
            }
        }

        if let Some(legacy) = legacy {
            if let Ok(bytes) = fs::read(legacy) {
                if let Ok(state) = serde_json::from_slice::<AppState>(&bytes) {
                    if let Some(path) = toml {
                        if state.save_to(path).is_ok() {
                            info!("migrated {} to {}", legacy.display(), path.display());
                        }
                    }
                    return state;
                }
            }
        }

        Self::new()
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token.trim().to_string());
        }
        self.base_url = normalize_url(&self.base_url);
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::toml_path()
            .ok_or_else(|| ChatError::Config("no config directory".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.base_url, self.token.clone())
    }

    pub fn live_config(&self) -> Result<LiveConfig> {
        let ws_url = match self.ws_url.as_deref().filter(|u| !u.is_empty()) {
            Some(explicit) => url::Url::parse(explicit)?,
            None => ws_url_from_base(&self.base_url)?,
        };
        Ok(LiveConfig {
            ws_url,
            token: self.token.clone(),
            topic_prefix: self.topic_prefix.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        })
    }

    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            live: self.live_config()?,
            reconcile_sent: self.reconcile_sent,
            target_user_id: self.target_user_id,
        })
    }

    pub fn unread_poll_interval(&self) -> Duration {
        Duration::from_secs(self.unread_poll_secs.max(1))
    }
}

/// Logs in first if needed, then opens the view for the configured role.
pub async fn run(mut state: AppState) -> Result<()> {
    if !state.is_configured() {
        state = crate::ui::login::show_login(state).await?;
    }
    match state.role {
        Role::Customer => crate::ui::main_window::run_customer(&state).await,
        Role::Admin => crate::ui::main_window::run_admin(&state).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_takes_defaults() {
        let state: AppState = toml::from_str(
            r#"
            base_url = "https://shop.example"
            role = "admin"
            "#,
        )
        .unwrap();
        assert_eq!(state.role, Role::Admin);
        assert_eq!(state.reconnect_delay_ms, 5000);
        assert_eq!(state.unread_poll_secs, 30);
        assert_eq!(state.topic_prefix, "/topic/conversations");
        assert!(state.reconcile_sent);
        assert!(!state.is_configured());
    }

    #[test]
    fn toml_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.toml");
        let state = AppState {
            base_url: "https://shop.example".into(),
            token: Some("t0k".into()),
            target_user_id: Some(12),
            ..AppState::default()
        };
        state.save_to(&path).unwrap();
        assert_eq!(AppState::load_from(Some(&path), None), state);
    }

    #[test]
    fn legacy_json_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("chat.toml");
        let json_path = dir.path().join("state.json");
        fs::write(&json_path, r#"{"base_url":"http://localhost:8080","token":"abc"}"#).unwrap();

        let state = AppState::load_from(Some(&toml_path), Some(&json_path));
        assert_eq!(state.token.as_deref(), Some("abc"));
        assert!(toml_path.exists());
        assert_eq!(AppState::load_from(Some(&toml_path), None), state);
    }

    #[test]
    fn missing_files_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::load_from(Some(&dir.path().join("none.toml")), None);
        assert_eq!(state, AppState::default());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_BASE_URL, "shop.example"), (ENV_TOKEN, " secret ")]);
        let mut state = AppState { base_url: "http://old".into(), ..AppState::default() };
        state.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(state.base_url, "https://shop.example");
        assert_eq!(state.token.as_deref(), Some("secret"));
        assert!(state.is_configured());
    }

    #[test]
    fn live_config_derives_or_overrides_ws_url() {
        let mut state = AppState {
            base_url: "http://localhost:8080".into(),
            reconnect_delay_ms: 250,
            ..AppState::default()
        };
        let live = state.live_config().unwrap();
        assert_eq!(live.ws_url.as_str(), "ws://localhost:8080/ws/websocket");
        assert_eq!(live.reconnect_delay, Duration::from_millis(250));

        state.ws_url = Some("ws://broker:15674/stomp".into());
        assert_eq!(state.live_config().unwrap().ws_url.as_str(), "ws://broker:15674/stomp");
    }
}
