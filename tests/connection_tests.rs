//! Integration tests for the connection manager, run against an in-process
//! WebSocket server. No network access or API key required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::HeaderMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use convostream::messages::{ConversationInit, RecognitionResult};
use convostream::{
    AccessConfig, ClientError, EventHandler, MessageCallback, MessageRouter,
    Result as ClientResult, RetryPolicy, StartRequest, StreamingClient,
};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("ws://{}", listener.local_addr().unwrap());
    (listener, host)
}

fn access(host: &str) -> AccessConfig {
    AccessConfig::new(host, "v1/realtime/insights/test-session", "test-key")
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(50))
}

/// Accept connections and pump every received frame into a channel.
fn spawn_recording_server(listener: TcpListener) -> mpsc::UnboundedReceiver<Message> {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let frame_tx = frame_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if frame_tx.send(msg).is_err() {
                        break;
                    }
                }
            });
        }
    });
    frame_rx
}

#[test_log::test(tokio::test)]
async fn test_connect_retries_exactly_max_attempts() {
    let (listener, host) = bind().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = accepts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_accepts.fetch_add(1, Ordering::SeqCst);
            // Refuse the WebSocket handshake.
            drop(stream);
        }
    });

    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(3), HeaderMap::new())
            .unwrap();
    let result = client.connect().await;

    assert!(matches!(result, Err(ClientError::InvalidConnection)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
}

#[test_log::test(tokio::test)]
async fn test_stop_disables_redial_until_rearmed() {
    let (listener, host) = bind().await;
    let mut frames = spawn_recording_server(listener);

    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(2), HeaderMap::new())
            .unwrap();
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    client.stop().await;
    assert!(!client.is_connected().await);

    let result = client.write_binary(vec![1, 2, 3]).await;
    assert!(matches!(result, Err(ClientError::InvalidConnection)));
    let result = client.write_json(&StartRequest::default()).await;
    assert!(matches!(result, Err(ClientError::InvalidConnection)));

    // Explicit re-arm is the only path back to a live session.
    client.attempt_reconnect(2).await.unwrap();
    client.write_binary(vec![9, 9, 9]).await.unwrap();

    let mut saw_payload = false;
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(1), frames.recv()).await {
        if let Message::Binary(data) = msg {
            if data[..] == [9u8, 9, 9] {
                saw_payload = true;
                break;
            }
        }
    }
    assert!(saw_payload);
    client.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_concurrent_writers_never_interleave_frames() {
    let (listener, host) = bind().await;
    let mut frames = spawn_recording_server(listener);

    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(2), HeaderMap::new())
            .unwrap();
    client.connect().await.unwrap();

    const FRAMES_PER_WRITER: usize = 25;
    let writer_a = {
        let client = client.clone();
        tokio::spawn(async move {
            for _ in 0..FRAMES_PER_WRITER {
                client.write_binary(vec![0xAA; 311]).await.unwrap();
            }
        })
    };
    let writer_b = {
        let client = client.clone();
        tokio::spawn(async move {
            for _ in 0..FRAMES_PER_WRITER {
                client.write_binary(vec![0xBB; 257]).await.unwrap();
            }
        })
    };
    writer_a.await.unwrap();
    writer_b.await.unwrap();

    let mut from_a = 0;
    let mut from_b = 0;
    while from_a + from_b < FRAMES_PER_WRITER * 2 {
        let msg = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("timed out waiting for frames")
            .expect("server channel closed");
        if let Message::Binary(data) = msg {
            // Every captured frame must be one complete, homogeneous write.
            if data.len() == 311 && data.iter().all(|&b| b == 0xAA) {
                from_a += 1;
            } else if data.len() == 257 && data.iter().all(|&b| b == 0xBB) {
                from_b += 1;
            } else {
                panic!("interleaved or corrupted frame: {} bytes", data.len());
            }
        }
    }
    assert_eq!(from_a, FRAMES_PER_WRITER);
    assert_eq!(from_b, FRAMES_PER_WRITER);
    client.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_graceful_stop_sends_stop_request_then_close() {
    let (listener, host) = bind().await;
    let mut frames = spawn_recording_server(listener);

    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(2), HeaderMap::new())
            .unwrap();
    client.connect().await.unwrap();
    client.write_json(&StartRequest::default()).await.unwrap();
    client.write_binary(vec![0u8; 64]).await.unwrap();
    client.stop().await;

    let mut order = Vec::new();
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(1), frames.recv()).await {
        match msg {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                order.push(value["type"].as_str().unwrap_or("").to_string());
            }
            Message::Binary(_) => order.push("binary".to_string()),
            Message::Close(_) => {
                order.push("close".to_string());
                break;
            }
            _ => {}
        }
    }

    assert_eq!(order, ["start_request", "binary", "stop_request", "close"]);
}

#[test_log::test(tokio::test)]
async fn test_reconnects_after_server_drop() {
    let (listener, host) = bind().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = accepts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let n = server_accepts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                if n == 0 {
                    // First session: drop the connection right away.
                    let _ = ws.close(None).await;
                } else {
                    while ws.next().await.is_some() {}
                }
            });
        }
    });

    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(3), HeaderMap::new())
            .unwrap();
    client.connect().await.unwrap();

    // The listen task must detect the drop and redial on its own.
    let mut reconnected = false;
    for _ in 0..40 {
        if accepts.load(Ordering::SeqCst) >= 2 && client.is_connected().await {
            reconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(reconnected, "client did not re-establish the session");
    client.stop().await;
}

#[derive(Default)]
struct Recording {
    created: Mutex<Vec<String>>,
    transcripts: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for Recording {
    async fn on_conversation_created(&self, event: ConversationInit) -> ClientResult<()> {
        self.created
            .lock()
            .unwrap()
            .push(event.data.conversation_id);
        Ok(())
    }

    async fn on_recognition_result(&self, event: RecognitionResult) -> ClientResult<()> {
        self.transcripts
            .lock()
            .unwrap()
            .push(event.transcript().to_string());
        Ok(())
    }
}

#[test_log::test(tokio::test)]
async fn test_listen_loop_feeds_router() {
    let (listener, host) = bind().await;
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let created = r#"{"type":"message","message":{"type":"conversation_created","data":{"conversationId":"conv-42"}}}"#;
        let result = r#"{"type":"message","message":{"type":"recognition_result","isFinal":true,"punctuated":{"transcript":"hello world"}}}"#;
        ws.send(Message::Text(created.into())).await.unwrap();
        ws.send(Message::Text(result.into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let handler = Arc::new(Recording::default());
    let router = Arc::new(MessageRouter::new(handler.clone()));
    let callback: Arc<dyn MessageCallback> = router.clone();
    let client = StreamingClient::with_options(
        access(&host),
        Some(callback),
        fast_retry(2),
        HeaderMap::new(),
    )
    .unwrap();
    client.connect().await.unwrap();

    let mut delivered = false;
    for _ in 0..40 {
        if router.conversation_id() == "conv-42"
            && !handler.transcripts.lock().unwrap().is_empty()
        {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "events were not dispatched");
    assert_eq!(handler.created.lock().unwrap()[..], ["conv-42".to_string()]);
    assert_eq!(
        handler.transcripts.lock().unwrap()[..],
        ["hello world".to_string()]
    );
    client.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_api_key_and_custom_headers_ride_the_dial() {
    let (listener, host) = bind().await;
    let (hdr_tx, mut hdr_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let api_key = req
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let custom = req
                .headers()
                .get("x-demo-header")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let _ = hdr_tx.send((api_key, custom));
            Ok(response)
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            return;
        };
        while ws.next().await.is_some() {}
    });

    let mut headers = HeaderMap::new();
    headers.insert("x-demo-header", "demo-value".parse().unwrap());
    let client =
        StreamingClient::with_options(access(&host), None, fast_retry(2), headers).unwrap();
    client.connect().await.unwrap();

    let (api_key, custom) = tokio::time::timeout(Duration::from_secs(1), hdr_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(api_key.as_deref(), Some("test-key"));
    assert_eq!(custom.as_deref(), Some("demo-value"));
    client.stop().await;
}
