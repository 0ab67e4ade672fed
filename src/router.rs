//! Two-stage classification of inbound frames and dispatch into the typed
//! handler surface.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{ClientError, Result};
use crate::handler::{EventHandler, MessageCallback};
use crate::messages::{
    ConversationInit, EntityResponse, ErrorPayload, InboundKind, InnerProbe, InsightResponse,
    MessageEnvelope, MessageResponse, OuterProbe, RecognitionResult, Teardown, TopicResponse,
    TrackerResponse, OUTER_ERROR, OUTER_MESSAGE,
};

/// Classifies every raw inbound frame and invokes exactly one handler
/// method per frame.
///
/// The router carries no state beyond the conversation identifier the
/// server assigns via `conversation_created`; each `dispatch` call is a
/// function of the frame plus that one remembered value.
pub struct MessageRouter {
    handler: Option<Arc<dyn EventHandler>>,
    conversation_id: Mutex<String>,
}

impl MessageRouter {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler: Some(handler),
            conversation_id: Mutex::new(String::new()),
        }
    }

    /// A router with no handler: lifecycle frames are still logged, typed
    /// frames yield [`ClientError::UserCallbackNotDefined`].
    pub fn detached() -> Self {
        Self {
            handler: None,
            conversation_id: Mutex::new(String::new()),
        }
    }

    /// Server-assigned conversation identifier; empty until the
    /// `conversation_created` frame arrives.
    pub fn conversation_id(&self) -> String {
        self.conversation_id.lock().unwrap().clone()
    }

    /// Classify one frame and invoke the matching callback.
    ///
    /// Parse failures and missing-handler errors surface to the caller (the
    /// receive loop logs and keeps going); errors returned by a handler are
    /// logged here and swallowed so one failing callback cannot stop the
    /// stream.
    pub async fn dispatch(&self, raw: &[u8]) -> Result<()> {
        let outer: OuterProbe = serde_json::from_slice(raw)?;
        match outer.kind.as_str() {
            OUTER_ERROR => return self.handle_error(raw),
            OUTER_MESSAGE => {}
            other => return Err(ClientError::InvalidMessageType(other.to_string())),
        }

        let inner: InnerProbe = serde_json::from_slice(raw)?;
        let kind = match inner.message.kind.parse::<InboundKind>() {
            Ok(kind) => kind,
            Err(_) => {
                // Not part of the recognized grammar; hand the original
                // bytes to the catch-all rather than dropping them.
                let handler = self.require_handler("unhandled")?;
                Self::log_callback_error("unhandled", handler.on_unhandled(raw).await);
                return Ok(());
            }
        };

        match kind {
            InboundKind::StartedListening
            | InboundKind::RecognitionStarted
            | InboundKind::SessionModified
            | InboundKind::ConversationCompleted
            | InboundKind::RecognitionStopped => {
                log::debug!("lifecycle acknowledgement: {}", kind);
                Ok(())
            }
            InboundKind::ConversationCreated => {
                let envelope: MessageEnvelope<ConversationInit> = serde_json::from_slice(raw)?;
                let event = envelope.message;
                *self.conversation_id.lock().unwrap() = event.data.conversation_id.clone();
                log::info!("conversation created: {}", event.data.conversation_id);
                let handler = self.require_handler("conversation_created")?;
                Self::log_callback_error(
                    "conversation_created",
                    handler.on_conversation_created(event).await,
                );
                Ok(())
            }
            InboundKind::Error => {
                let envelope: MessageEnvelope<ErrorPayload> = serde_json::from_slice(raw)?;
                self.report_error(&envelope.message);
                Ok(())
            }
            InboundKind::RecognitionResult => {
                let envelope: MessageEnvelope<RecognitionResult> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("recognition_result")?;
                Self::log_callback_error(
                    "recognition_result",
                    handler.on_recognition_result(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::MessageResponse => {
                let envelope: MessageEnvelope<MessageResponse> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("message_response")?;
                Self::log_callback_error(
                    "message_response",
                    handler.on_message_response(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::InsightResponse => {
                let envelope: MessageEnvelope<InsightResponse> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("insight_response")?;
                Self::log_callback_error(
                    "insight_response",
                    handler.on_insight_response(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::TopicResponse => {
                let envelope: MessageEnvelope<TopicResponse> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("topic_response")?;
                Self::log_callback_error(
                    "topic_response",
                    handler.on_topic_response(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::TrackerResponse => {
                let envelope: MessageEnvelope<TrackerResponse> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("tracker_response")?;
                Self::log_callback_error(
                    "tracker_response",
                    handler.on_tracker_response(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::EntityResponse => {
                let envelope: MessageEnvelope<EntityResponse> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("entity_response")?;
                Self::log_callback_error(
                    "entity_response",
                    handler.on_entity_response(envelope.message).await,
                );
                Ok(())
            }
            InboundKind::Teardown => {
                let envelope: MessageEnvelope<Teardown> = serde_json::from_slice(raw)?;
                let handler = self.require_handler("teardown")?;
                Self::log_callback_error("teardown", handler.on_teardown(envelope.message).await);
                Ok(())
            }
            InboundKind::UserDefined => {
                let handler = self.require_handler("user_defined")?;
                Self::log_callback_error("user_defined", handler.on_user_defined(raw).await);
                Ok(())
            }
        }
    }

    /// Handle an outer error envelope: unmarshal and report. No user
    /// callback runs on this path.
    pub fn handle_error(&self, raw: &[u8]) -> Result<()> {
        let payload: ErrorPayload = serde_json::from_slice(raw)?;
        self.report_error(&payload);
        Ok(())
    }

    fn report_error(&self, payload: &ErrorPayload) {
        log::error!(
            "server error: type='{}' details='{}' message='{}'",
            payload.kind,
            payload.details,
            payload.message
        );
    }

    fn require_handler(&self, event: &'static str) -> Result<&Arc<dyn EventHandler>> {
        self.handler
            .as_ref()
            .ok_or(ClientError::UserCallbackNotDefined(event))
    }

    fn log_callback_error(event: &str, result: Result<()>) {
        if let Err(e) = result {
            log::warn!("{} handler failed: {}", event, e);
        }
    }
}

#[async_trait]
impl MessageCallback for MessageRouter {
    async fn message(&self, frame: &[u8]) -> Result<()> {
        self.dispatch(frame).await
    }
}
