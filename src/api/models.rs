use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type ConversationId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderType {
    Customer,
    Admin,
}

impl SenderType {
    pub fn is_from(self, role: Role) -> bool {
        matches!(
            (self, role),
            (SenderType::Customer, Role::Customer) | (SenderType::Admin, Role::Admin)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_message_at: Option<NaiveDateTime>,
}

impl Conversation {
    pub fn display_name(&self) -> String {
        let user = self
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "N/A".into());
        let name = self.username.as_deref().unwrap_or("Customer");
        format!("{} - {}", user, name)
    }

    /// Fills in whatever `other` knows, keeping our values where it has none.
    pub fn absorb(&mut self, other: Conversation) {
        if other.user_id.is_some() {
            self.user_id = other.user_id;
        }
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.last_message_at.is_some() {
            self.last_message_at = other.last_message_at;
        }
    }
}

/// Most recent activity first; conversations that never had a message go last.
pub fn sort_by_recent_activity(items: &mut [Conversation]) {
    items.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_type: SenderType,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub has_file: bool,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub sent_at: Option<NaiveDateTime>,
}

impl Message {
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }

    pub fn has_image(&self) -> bool {
        self.has_file
            && self
                .file_content_type
                .as_deref()
                .and_then(|ct| ct.parse::<mime::Mime>().ok())
                .is_some_and(|m| m.type_() == mime::IMAGE)
    }
}

/// A file picked in the composer, ready to be posted as multipart.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = guess_content_type(&file_name).to_string();
        Self { file_name, content_type, bytes }
    }
}

fn guess_content_type(file_name: &str) -> mime::Mime {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "pdf" => mime::APPLICATION_PDF,
        "txt" | "log" => mime::TEXT_PLAIN,
        "csv" => mime::TEXT_CSV,
        "json" => mime::APPLICATION_JSON,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// What the composer holds between keystrokes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachment: None }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.attachment = None;
    }
}

/// The validated body of a send request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Returns `None` when there is nothing worth sending.
    pub fn from_draft(conversation_id: ConversationId, draft: &Draft) -> Option<Self> {
        if draft.is_blank() {
            return None;
        }
        let trimmed = draft.text.trim();
        Some(Self {
            conversation_id,
            content: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            attachment: draft.attachment.clone(),
        })
    }
}

/// Binary body of a downloaded attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentBlob {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// The backend answers with `{count}` or `{data: {count}}` depending on the endpoint version.
pub fn parse_unread_count(json: &Value) -> u64 {
    json.get("count")
        .and_then(Value::as_u64)
        .or_else(|| json.pointer("/data/count").and_then(Value::as_u64))
        .unwrap_or(0)
}

pub fn badge_label(count: u64) -> Option<String> {
    match count {
        0 => None,
        1..=99 => Some(count.to_string()),
        _ => Some("99+".into()),
    }
}

/// Accepts both a bare JSON array and a `{"data": [...]}` envelope.
pub fn unwrap_list(json: Value) -> Value {
    match json {
        Value::Array(_) => json,
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Array(_)) => data,
            _ => Value::Array(Vec::new()),
        },
        _ => Value::Array(Vec::new()),
    }
}

/// Accepts both a bare object and a `{"data": {...}}` envelope.
pub fn unwrap_object(json: Value) -> Value {
    match json {
        Value::Object(ref map) if map.get("data").is_some_and(Value::is_object) => {
            json.get("data").cloned().unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
}
