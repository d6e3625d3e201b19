use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChannelId, ChannelScope, MessageId, ServerId, TempId, UserId};

/// Shown for a failed send when the acknowledgement carries no error text.
pub const DEFAULT_SEND_ERROR: &str = "Message could not be delivered.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Qa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

/// A server-confirmed message as it appears on the wire (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub author_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: MessageId,
    author_id: UserId,
    #[serde(default)]
    author_name: Option<String>,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attachments: Option<Value>,
}

impl Message {
    /// Boundary validation for untrusted payloads: a message missing any
    /// required field is rejected as a whole, while malformed attachments
    /// are dropped item by item.
    pub fn from_wire(value: Value) -> Option<Self> {
        let wire: WireMessage = serde_json::from_value(value).ok()?;
        Some(Self {
            id: wire.id,
            author_id: wire.author_id,
            author_name: wire.author_name,
            content: wire.content,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            edited_at: wire.edited_at,
            attachments: normalize_attachments(wire.attachments.as_ref()),
        })
    }
}

/// Keeps only attachments that carry a non-empty `url`; everything else in
/// the entry is optional.
pub fn normalize_attachments(value: Option<&Value>) -> Vec<Attachment> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<Attachment>(entry.clone()).ok())
        .filter(|attachment| !attachment.url.is_empty())
        .collect()
}

/// One fetched page of confirmed history plus its pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub items: Vec<Message>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessagePage {
    #[serde(default)]
    items: Option<Vec<Value>>,
    page: u32,
    page_size: u32,
    total: u64,
}

impl MessagePage {
    pub fn from_wire(value: Value) -> Result<Self, serde_json::Error> {
        let wire: WireMessagePage = serde_json::from_value(value)?;
        Ok(Self {
            items: wire
                .items
                .unwrap_or_default()
                .into_iter()
                .filter_map(Message::from_wire)
                .collect(),
            page: wire.page,
            page_size: wire.page_size,
            total: wire.total,
        })
    }

    /// Page number to request next, if this page says more history exists.
    pub fn next_page(&self) -> Option<u32> {
        let fetched = u64::from(self.page) * u64::from(self.page_size);
        (fetched < self.total).then(|| self.page + 1)
    }
}

/// Payload of a `message:create` emit. The nonce correlates the eventual
/// acknowledgement and broadcast with the locally pending entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    pub content: String,
    pub author_name: String,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub nonce: TempId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Direct reply to a `message:create` emit: `{success: true, message}` or
/// `{success: false, error}`, correlated by nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckEnvelope {
    pub nonce: TempId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

#[derive(Debug, Clone)]
pub enum AckOutcome {
    Delivered(Message),
    Rejected(AckError),
}

impl AckEnvelope {
    pub fn into_outcome(self) -> AckOutcome {
        match (self.success, self.message) {
            (true, Some(message)) => AckOutcome::Delivered(message),
            (true, None) => AckOutcome::Rejected(AckError {
                message: DEFAULT_SEND_ERROR.to_string(),
                code: None,
            }),
            (false, _) => AckOutcome::Rejected(self.error.unwrap_or(AckError {
                message: DEFAULT_SEND_ERROR.to_string(),
                code: None,
            })),
        }
    }
}

/// An unsolicited `message:created` push. Carries the full confirmed message
/// plus, for the sender's own messages, the originating nonce.
#[derive(Debug, Clone)]
pub struct MessageBroadcast {
    pub message: Message,
    pub nonce: Option<TempId>,
}

impl MessageBroadcast {
    pub fn from_wire(value: Value) -> Option<Self> {
        let nonce = value
            .get("nonce")
            .and_then(|raw| serde_json::from_value::<TempId>(raw.clone()).ok());
        let message = Message::from_wire(value)?;
        Some(Self { message, nonce })
    }
}

/// Frames the client emits on the channel socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientFrame {
    #[serde(rename = "channel:join")]
    ChannelJoin(ChannelScope),
    #[serde(rename = "channel:leave")]
    ChannelLeave(ChannelScope),
    #[serde(rename = "message:create")]
    MessageCreate(CreateMessage),
}

/// Frames the server pushes on the channel socket. `message:created` stays
/// untyped here so malformed broadcasts can be rejected item by item at the
/// boundary instead of tearing down the reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerFrame {
    #[serde(rename = "channel:joined")]
    ChannelJoined(ChannelScope),
    #[serde(rename = "channel:left")]
    ChannelLeft(ChannelScope),
    #[serde(rename = "message:created")]
    MessageCreated(Value),
    #[serde(rename = "message:ack")]
    MessageAck(AckEnvelope),
}
