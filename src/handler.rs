//! Caller-facing callback surfaces.
//!
//! `MessageCallback` is the seam between the connection manager's receive
//! loop and whatever consumes raw frames (normally a [`MessageRouter`]).
//! `EventHandler` is the typed capability set the router dispatches into;
//! every method has a default no-op so implementors override only the
//! events they care about.
//!
//! [`MessageRouter`]: crate::router::MessageRouter

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{
    ConversationInit, EntityResponse, InsightResponse, MessageResponse, RecognitionResult,
    Teardown, TopicResponse, TrackerResponse,
};

/// Receives every raw inbound frame, in socket order.
#[async_trait]
pub trait MessageCallback: Send + Sync {
    async fn message(&self, frame: &[u8]) -> Result<()>;
}

/// Typed callbacks, one per recognized inner frame kind.
///
/// Returning an error from a method is logged by the router and never stops
/// the receive loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_conversation_created(&self, event: ConversationInit) -> Result<()> {
        log::debug!(
            "conversation created: {}",
            event.data.conversation_id
        );
        Ok(())
    }

    async fn on_recognition_result(&self, event: RecognitionResult) -> Result<()> {
        log::debug!("recognition result: '{}'", event.transcript());
        Ok(())
    }

    async fn on_message_response(&self, event: MessageResponse) -> Result<()> {
        log::debug!("message response: {} messages", event.messages.len());
        Ok(())
    }

    async fn on_insight_response(&self, event: InsightResponse) -> Result<()> {
        log::debug!("insight response: {} insights", event.insights.len());
        Ok(())
    }

    async fn on_topic_response(&self, event: TopicResponse) -> Result<()> {
        log::debug!("topic response: {} topics", event.topics.len());
        Ok(())
    }

    async fn on_tracker_response(&self, event: TrackerResponse) -> Result<()> {
        log::debug!("tracker response: {} trackers", event.trackers.len());
        Ok(())
    }

    async fn on_entity_response(&self, event: EntityResponse) -> Result<()> {
        log::debug!("entity response: {} entities", event.entities.len());
        Ok(())
    }

    async fn on_teardown(&self, event: Teardown) -> Result<()> {
        log::debug!("teardown: {:?}", event.reason);
        Ok(())
    }

    /// Application-defined frames (`message.type == "user_defined"`).
    async fn on_user_defined(&self, raw: &[u8]) -> Result<()> {
        log::debug!("user defined frame: {} bytes", raw.len());
        Ok(())
    }

    /// Frames whose inner type is not part of the recognized grammar. The
    /// original raw bytes are passed through untouched.
    async fn on_unhandled(&self, raw: &[u8]) -> Result<()> {
        log::warn!(
            "unhandled frame: {}",
            String::from_utf8_lossy(raw)
        );
        Ok(())
    }
}
