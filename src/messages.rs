//! Wire grammar for the streaming session.
//!
//! Every inbound frame is a JSON envelope with a top-level `type`
//! discriminator; content frames nest a second `message.type` discriminator.
//! Outbound control frames are `start_request` / `stop_request`; audio rides
//! as raw binary WebSocket messages with no extra framing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outer envelope marker for content frames.
pub const OUTER_MESSAGE: &str = "message";
/// Outer envelope marker for server error frames.
pub const OUTER_ERROR: &str = "error";

/// Inner `message.type` discriminator for recognized frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum InboundKind {
    StartedListening,
    RecognitionStarted,
    SessionModified,
    ConversationCompleted,
    RecognitionStopped,
    ConversationCreated,
    Error,
    RecognitionResult,
    MessageResponse,
    InsightResponse,
    TopicResponse,
    TrackerResponse,
    EntityResponse,
    Teardown,
    UserDefined,
}

/// Stage-1 probe: only the outer `type` field.
#[derive(Debug, Deserialize)]
pub(crate) struct OuterProbe {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Stage-2 probe: only the inner `message.type` field.
#[derive(Debug, Deserialize)]
pub(crate) struct InnerProbe {
    pub message: TypeTag,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TypeTag {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Full envelope around a typed inner payload.
#[derive(Debug, Deserialize)]
pub(crate) struct MessageEnvelope<T> {
    pub message: T,
}

// ---------------------------------------------------------------------------
// Outbound control frames
// ---------------------------------------------------------------------------

/// Session-configuration frame, sent once immediately after connecting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    pub insight_types: Vec<String>,
    pub config: RecognitionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<TrackerSpec>,
}

impl StartRequest {
    pub fn new(config: RecognitionConfig) -> Self {
        Self {
            kind: "start_request",
            insight_types: Vec::new(),
            config,
            speaker: None,
            trackers: Vec::new(),
        }
    }

    pub fn insight_types(mut self, types: Vec<String>) -> Self {
        self.insight_types = types;
        self
    }

    pub fn speaker(mut self, speaker: Speaker) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn trackers(mut self, trackers: Vec<TrackerSpec>) -> Self {
        self.trackers = trackers;
        self
    }
}

impl Default for StartRequest {
    fn default() -> Self {
        Self::new(RecognitionConfig::default())
    }
}

/// Termination frame, sent once during `stop`.
#[derive(Debug, Clone, Serialize)]
pub struct StopRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl StopRequest {
    pub fn new() -> Self {
        Self {
            kind: "stop_request",
        }
    }
}

impl Default for StopRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_title: Option<String>,
    pub confidence_threshold: f64,
    pub detect_entities: bool,
    pub speech_recognition: SpeechRecognition,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            meeting_title: None,
            confidence_threshold: 0.7,
            detect_entities: false,
            speech_recognition: SpeechRecognition::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRecognition {
    pub encoding: String,
    pub sample_rate_hertz: u32,
}

impl Default for SpeechRecognition {
    fn default() -> Self {
        Self {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: 16000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    pub user_id: String,
    pub name: String,
}

/// Caller-defined vocabulary tracked by the service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSpec {
    pub name: String,
    pub vocabulary: Vec<String>,
}

// ---------------------------------------------------------------------------
// Inbound typed payloads
// ---------------------------------------------------------------------------

/// `conversation_created`: the server names the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInit {
    pub data: ConversationData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationData {
    pub conversation_id: String,
}

/// A participant reference as it appears on inbound frames.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Member {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
}

/// `recognition_result`: interim or final speech recognition output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionResult {
    pub is_final: bool,
    pub punctuated: Option<Punctuated>,
    pub payload: Option<RecognitionPayload>,
    pub user: Option<Member>,
}

impl RecognitionResult {
    /// Best available transcript: punctuated if present, else the first raw
    /// alternative.
    pub fn transcript(&self) -> &str {
        if let Some(p) = &self.punctuated {
            if !p.transcript.is_empty() {
                return &p.transcript;
            }
        }
        self.payload
            .as_ref()
            .and_then(|p| p.raw.alternatives.first())
            .map(|a| a.transcript.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Punctuated {
    pub transcript: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionPayload {
    pub raw: RawRecognition,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRecognition {
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f64,
}

/// `message_response`: finalized transcript messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageResponse {
    pub messages: Vec<TranscriptMessage>,
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptMessage {
    pub id: String,
    pub from: Member,
    pub payload: ContentPayload,
    pub duration: Option<TimeRange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentPayload {
    pub content: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeRange {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// `insight_response`: questions, action items, follow-ups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightResponse {
    pub insights: Vec<Insight>,
    pub sequence_number: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub payload: ContentPayload,
    pub assignee: Option<Member>,
    pub from: Option<Member>,
}

/// `topic_response`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicResponse {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Topic {
    pub id: String,
    pub phrases: String,
    pub confidence: f64,
}

/// `tracker_response`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerResponse {
    pub trackers: Vec<Tracker>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tracker {
    pub name: String,
    pub matches: Vec<TrackerMatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerMatch {
    pub value: String,
    pub message_refs: Vec<MessageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRef {
    pub id: String,
    pub text: String,
}

/// `entity_response`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityResponse {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entity {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// `teardown`: the server is ending the session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Teardown {
    pub reason: Option<String>,
}

/// Structured server error: `{"type":"error","details":...,"message":...}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    pub message: String,
}
