use std::time::Duration;

use log::debug;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::models::{
    AttachmentBlob, Conversation, ConversationId, Message, MessageId, OutgoingMessage, Role,
    parse_unread_count, sort_by_recent_activity, unwrap_list, unwrap_object,
};
use crate::error::{ChatError, Result};

/// REST side of the chat backend. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", Self::base_api(&self.base_url), path)
    }

    fn with_auth(mut req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        if let Some(t) = token {
            req = req.header("Authorization", format!("Bearer {}", t));
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = Self::with_auth(req, self.token()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status, body));
        }
        Ok(resp)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let endpoint = self.endpoint(path);
        debug!("GET {}", endpoint);
        let resp = self.send(self.http.get(&endpoint)).await?;
        Ok(resp.json::<Value>().await?)
    }

    fn decode<T: DeserializeOwned>(json: Value) -> Result<T> {
        Ok(serde_json::from_value(json)?)
    }

    /// Checks that the backend answers at all. Any HTTP status counts as reachable.
    pub async fn ping(&self) -> Result<u16> {
        let candidates = [self.endpoint("/chat/unread-count"), self.base_url.clone()];
        let mut last_err: Option<ChatError> = None;
        for endpoint in candidates {
            let req = Self::with_auth(self.http.get(&endpoint), self.token());
            match req.send().await {
                Ok(resp) => return Ok(resp.status().as_u16()),
                Err(e) => last_err = Some(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| ChatError::Config("no endpoint to ping".into())))
    }

    /// Exchanges credentials for a bearer token. Admins log in through their own endpoint.
    pub async fn login(&self, role: Role, email: &str, password: &str) -> Result<String> {
        let path = match role {
            Role::Customer => "/auth/login",
            Role::Admin => "/auth/admin/login",
        };
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self.send(self.http.post(self.endpoint(path)).json(&body)).await?;
        let json: Value = resp.json().await?;
        ["/token", "/accessToken", "/data/accessToken", "/data/token"]
            .iter()
            .find_map(|p| json.pointer(p).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(ChatError::MissingToken)
    }

    pub async fn my_conversation(&self) -> Result<Conversation> {
        let json = self.get_json("/chat/conversations/me").await?;
        Self::decode(unwrap_object(json))
    }

    pub async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let json = self
            .get_json(&format!("/chat/conversations/{}/messages", conversation_id))
            .await?;
        Self::decode(unwrap_list(json))
    }

    /// Posts one message. Returns the stored message when the backend echoes it in the response.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Option<Message>> {
        let endpoint = self.endpoint("/chat/messages");
        let req = match &outgoing.attachment {
            Some(file) => {
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)?;
                let mut form = Form::new()
                    .text("conversationId", outgoing.conversation_id.to_string())
                    .part("file", part);
                if let Some(content) = &outgoing.content {
                    form = form.text("content", content.clone());
                }
                self.http.post(&endpoint).multipart(form)
            }
            None => self.http.post(&endpoint).json(&serde_json::json!({
                "conversationId": outgoing.conversation_id,
                "content": outgoing.content,
            })),
        };
        debug!("POST {} (conversation {})", endpoint, outgoing.conversation_id);
        let resp = self.send(req).await?;
        let json: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(json
            .get("data")
            .cloned()
            .and_then(|data| serde_json::from_value::<Message>(data).ok()))
    }

    pub async fn attachment(&self, message_id: MessageId) -> Result<AttachmentBlob> {
        let endpoint = self.endpoint(&format!("/chat/messages/{}/file", message_id));
        let resp = self.send(self.http.get(&endpoint)).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(AttachmentBlob { content_type, bytes })
    }

    pub async fn mark_read(&self) -> Result<()> {
        self.send(self.http.post(self.endpoint("/chat/mark-read"))).await?;
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<u64> {
        let json = self.get_json("/chat/unread-count").await?;
        Ok(parse_unread_count(&json))
    }

    /// Every conversation, most recent activity first.
    pub async fn admin_conversations(&self) -> Result<Vec<Conversation>> {
        let json = self.get_json("/chat/conversations/admin").await?;
        let mut items: Vec<Conversation> = Self::decode(unwrap_list(json))?;
        sort_by_recent_activity(&mut items);
        Ok(items)
    }

    pub async fn admin_conversation_for_user(&self, user_id: i64) -> Result<Conversation> {
        let json = self
            .get_json(&format!("/chat/admin/customer/{}/conversation", user_id))
            .await?;
        Self::decode(unwrap_object(json))
    }
}
