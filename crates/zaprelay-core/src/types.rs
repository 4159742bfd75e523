// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier assigned by a messaging provider to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
}

// --- Timestamps ---

/// Formats a UTC instant the way every table stores it.
///
/// Millisecond precision with a literal `Z` keeps stored values
/// lexicographically ordered, so SQL comparisons on the text work.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// The current instant in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// The instant `minutes` ago in storage format. Fractional minutes are honoured.
pub fn timestamp_minutes_ago(minutes: f64) -> String {
    let millis = (minutes * 60_000.0).round() as i64;
    format_timestamp(Utc::now() - chrono::Duration::milliseconds(millis))
}

/// Reduces a WhatsApp address to its digits.
///
/// Accepts `+55 (11) 99999-0000`, `5511999990000@s.whatsapp.net` and plain
/// digits. Returns `None` when nothing dialable is left.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let local = raw.split('@').next().unwrap_or_default();
    let digits: String = local.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

// --- Enumerations ---

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    /// The LLM answers the client.
    Bot,
    /// A human operator replied by hand.
    Manual,
    /// Parked, waiting on the client.
    Waiting,
    /// Owned by a seller through their own gateway number.
    Seller,
    /// Soft-closed. Never hard-deleted.
    Closed,
}

impl ConversationStatus {
    /// Everything except `closed` counts as active.
    pub fn is_open(self) -> bool {
        self != Self::Closed
    }
}

/// Coarse urgency/interest classification of a lead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadTemperature {
    Hot,
    Warm,
    Cold,
}

impl LeadTemperature {
    fn rank(self) -> u8 {
        match self {
            Self::Cold => 0,
            Self::Warm => 1,
            Self::Hot => 2,
        }
    }

    /// Returns the hotter of the two temperatures.
    pub fn upgrade(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SenderKind {
    Client,
    Bot,
    Seller,
    Admin,
}

/// Delivery state of an outbound message, driven by provider callbacks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether a callback reporting `next` may overwrite `self`.
    ///
    /// Callbacks arrive out of order, so a late `sent` must not undo `read`.
    /// `failed` always applies.
    pub fn can_advance_to(self, next: Self) -> bool {
        next == Self::Failed || (self != Self::Failed && next.rank() > self.rank())
    }

    /// Maps a provider status string (`sent`, `delivered`, `read`, `failed`,
    /// Whapi's `pending`/`played`) onto a delivery status.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "sending" => Some(Self::Sending),
            "sent" | "server" => Some(Self::Sent),
            "delivered" | "device" => Some(Self::Delivered),
            "read" | "played" => Some(Self::Read),
            "failed" | "error" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Predicate an alert rule evaluates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    /// Seller `last_activity` older than `threshold` minutes.
    Inactivity,
    /// Open conversation without any message for `threshold` minutes.
    ConversationStalled,
    /// Seller-owned conversation where the client waits `threshold` minutes.
    ResponseTime,
    /// Seller performance score below `threshold`.
    QualityScore,
}

/// What happens when an alert rule matches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertAction {
    /// Notification row plus a WhatsApp text to every management phone.
    NotifyManagement,
    /// Notification row only.
    NotifyOnly,
}

// --- Rows ---

/// A client-phone-scoped thread of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub client_phone: String,
    pub client_name: Option<String>,
    pub status: ConversationStatus,
    pub temperature: LeadTemperature,
    pub assigned_seller_id: Option<String>,
    /// Session id issued by the LLM service; reused on every bot turn.
    pub llm_session_id: Option<String>,
    pub potential_value: Option<f64>,
    pub priority: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_at: Option<String>,
}

/// A single message inside a conversation. Append-only apart from delivery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: SenderKind,
    pub sender_id: Option<String>,
    pub content: String,
    pub message_type: String,
    /// Provider message id (wamid or Whapi id).
    pub external_id: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub created_at: String,
}

/// A human seller a conversation can be transferred to.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub whatsapp_number: String,
    #[serde(skip_serializing)]
    pub whapi_token: Option<String>,
    pub whapi_status: Option<String>,
    pub performance_score: f64,
    pub last_activity: Option<String>,
    pub active: bool,
    pub created_at: String,
}

impl std::fmt::Debug for Seller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seller")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("whatsapp_number", &self.whatsapp_number)
            .field("whapi_token", &self.whapi_token.as_ref().map(|_| "[redacted]"))
            .field("whapi_status", &self.whapi_status)
            .field("performance_score", &self.performance_score)
            .field("last_activity", &self.last_activity)
            .field("active", &self.active)
            .finish()
    }
}

/// A dashboard notification. Dismissal lives in a separate join table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub conversation_id: Option<String>,
    pub seller_id: Option<String>,
    pub created_at: String,
}

impl Notification {
    /// Builds an unsaved notification with a fresh id and timestamp.
    pub fn new(kind: &str, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: kind.to_string(),
            title: title.into(),
            body: body.into(),
            conversation_id: None,
            seller_id: None,
            created_at: now_timestamp(),
        }
    }

    pub fn for_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    pub fn for_seller(mut self, seller_id: Option<&str>) -> Self {
        self.seller_id = seller_id.map(str::to_string);
        self
    }
}

/// A polled alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub kind: AlertKind,
    /// Minutes for time-based kinds, a score for `quality_score`.
    pub threshold: f64,
    pub cooldown_minutes: i64,
    pub action: AlertAction,
    pub active: bool,
    pub last_triggered_at: Option<String>,
    pub created_at: String,
}

impl AlertRule {
    /// Whether the rule fired recently enough that it must stay quiet.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        if self.cooldown_minutes <= 0 {
            return false;
        }
        let Some(last) = self
            .last_triggered_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        else {
            return false;
        };
        now.signed_duration_since(last.with_timezone(&Utc))
            < chrono::Duration::minutes(self.cooldown_minutes)
    }
}

/// An audit-log row recording a change and who made it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: Option<String>,
    pub created_at: String,
}

// --- Inbound ---

/// A client message normalised out of a provider webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub external_id: String,
    pub from_phone: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub message_type: String,
    pub timestamp: Option<String>,
}

/// A delivery callback for a message we sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub external_id: String,
    pub status: DeliveryStatus,
    pub recipient: Option<String>,
}

/// One unit of work extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Status(DeliveryUpdate),
}

/// Which active conversation an inbound message attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationScope {
    /// Newest active conversation for the phone, whoever owns it.
    AnyOwner,
    /// Active conversation for the phone owned by this seller.
    Seller(String),
}

impl ConversationScope {
    pub fn seller_id(&self) -> Option<&str> {
        match self {
            Self::AnyOwner => None,
            Self::Seller(id) => Some(id),
        }
    }
}

/// Everything `record_inbound` writes for one client message.
#[derive(Debug, Clone)]
pub struct NewInbound {
    pub scope: ConversationScope,
    pub client_phone: String,
    pub client_name: Option<String>,
    pub content: String,
    pub message_type: String,
    pub external_id: Option<String>,
    /// Status for a conversation created by this message.
    pub initial_status: ConversationStatus,
    /// Temperature suggested by the message text, if any.
    pub temperature_hint: Option<LeadTemperature>,
}

/// Result of `record_inbound`.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub conversation: Conversation,
    pub message: Message,
    /// True when the message opened a new conversation.
    pub created: bool,
    pub notification: Notification,
}

// --- Outbound ---

/// Media categories the senders know how to deliver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
    Video,
}

/// Payload of an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundBody {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        link: String,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        filename: Option<String>,
    },
}

impl OutboundBody {
    /// Text stored in the messages table for this payload.
    pub fn display_text(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::Media { kind, caption, .. } => {
                caption.clone().unwrap_or_else(|| format!("[{kind}]"))
            }
        }
    }

    /// Value of the messages.message_type column.
    pub fn message_type(&self) -> String {
        match self {
            Self::Text { .. } => "text".to_string(),
            Self::Media { kind, .. } => kind.to_string(),
        }
    }
}

/// A message to deliver through a channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Destination phone, digits only.
    pub to: String,
    pub body: OutboundBody,
}

impl OutboundMessage {
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: OutboundBody::Text { body: body.into() },
        }
    }
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone)]
pub struct ChannelCapabilities {
    pub supports_media: bool,
    pub max_message_length: Option<usize>,
}

// --- Provider ---

/// A chat-completion request to the LLM service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub query: String,
    /// Stable end-user identifier (the client phone).
    pub user: String,
    /// LLM-side session id; `None` starts a new session.
    pub conversation_id: Option<String>,
    pub inputs: serde_json::Value,
}

impl ProviderRequest {
    pub fn new(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user: user.into(),
            conversation_id: None,
            inputs: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }
}

/// A generated reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub answer: String,
    pub conversation_id: String,
    pub message_id: Option<String>,
}

/// Fresh row identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
