//! Realtime streaming client for conversation-intelligence APIs.
//!
//! Establishes a long-lived WebSocket session, sends the session
//! configuration, streams binary audio frames while a background receive
//! loop classifies server-pushed JSON events into typed callbacks, and
//! survives transient network failures through reconnect-with-retry and a
//! keep-alive heartbeat.
//!
//! ```no_run
//! use std::sync::Arc;
//! use convostream::{
//!     AccessConfig, EventHandler, MessageCallback, MessageRouter, StartRequest,
//!     StreamingClient,
//! };
//!
//! struct Printer;
//! impl EventHandler for Printer {}
//!
//! # async fn run() -> convostream::Result<()> {
//! let access = AccessConfig::new("api.example.com", "v1/realtime/insights/abc", "key");
//! let router = Arc::new(MessageRouter::new(Arc::new(Printer)));
//! let callback: Arc<dyn MessageCallback> = router.clone();
//! let client = StreamingClient::new(access, Some(callback))?;
//!
//! client.connect().await?;
//! client.write_json(&StartRequest::default()).await?;
//! client.write_binary(vec![0u8; 3200]).await?;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod messages;
pub mod retry;
pub mod router;

pub use config::AccessConfig;
pub use connection::StreamingClient;
pub use error::{ClientError, Result};
pub use handler::{EventHandler, MessageCallback};
pub use messages::{
    InboundKind, RecognitionConfig, SpeechRecognition, Speaker, StartRequest, StopRequest,
    TrackerSpec,
};
pub use retry::RetryPolicy;
pub use router::MessageRouter;
