use once_cell::sync::Lazy;
use url::Url;

use crate::error::{ChatError, Result};

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// The broker's raw WebSocket endpoint next to the REST base, e.g.
/// `https://shop.example` -> `wss://shop.example/ws/websocket`.
pub fn ws_url_from_base(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(&normalize_url(base_url))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ChatError::Config(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChatError::Config("cannot switch to a websocket scheme".into()))?;
    url.set_path("/ws/websocket");
    url.set_query(None);
    Ok(url)
}

/// Value for the STOMP `host` header.
pub fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => format!("{}:{}", h, p),
        (Some(h), None) => h.to_string(),
        _ => "localhost".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_added_when_missing() {
        assert_eq!(normalize_url(" shop.example "), "https://shop.example");
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn ws_url_follows_base_scheme() {
        let url = ws_url_from_base("http://localhost:8080/api").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws/websocket");
        let url = ws_url_from_base("shop.example").unwrap();
        assert_eq!(url.as_str(), "wss://shop.example/ws/websocket");
        assert_eq!(host_of(&url), "shop.example");
    }
}
