use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("not authorized, please log in again")]
    Unauthorized,
    #[error("token not found in login response")]
    MissingToken,
    #[error("no permission to download this file")]
    Forbidden,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("message is empty")]
    EmptyMessage,
    #[error("no conversation selected")]
    NoConversation,
    #[error("live connection failed: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("broker error: {0}")]
    Broker(String),
    #[error("malformed STOMP frame: {0}")]
    Frame(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 => ChatError::Unauthorized,
            403 => ChatError::Forbidden,
            code => ChatError::Http {
                status: code,
                message: extract_message(&body),
            },
        }
    }
}

// Backend error bodies look like {"success":false,"message":"..."}; fall back to the raw text.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
