//! Connection manager: owns the WebSocket, dials with retry, keeps the
//! session alive with a heartbeat, and serializes every write through one
//! mutex so producers can stream concurrently without interleaving frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderMap, HeaderValue, LOCATION};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::AccessConfig;
use crate::error::{ClientError, Result};
use crate::handler::MessageCallback;
use crate::messages::StopRequest;
use crate::retry::RetryPolicy;

const API_KEY_HEADER: &str = "X-API-KEY";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const LISTEN_TICK: Duration = Duration::from_millis(250);
const PING_PERIOD: Duration = Duration::from_secs(30);
const CLOSE_GRACE: Duration = Duration::from_millis(250);
const MAX_REDIRECT_HOPS: u8 = 3;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// One logical streaming session to the remote endpoint.
///
/// Cheap to clone; all clones share the same underlying connection. At most
/// one live socket exists per client at any time, and every write (and the
/// close sequence) goes through the same mutex.
#[derive(Clone)]
pub struct StreamingClient {
    inner: Arc<ClientInner>,
}

impl StreamingClient {
    /// Validates the credentials and produces a disconnected client with
    /// retry enabled. No dial happens until [`connect`](Self::connect).
    pub fn new(
        access: AccessConfig,
        callback: Option<Arc<dyn MessageCallback>>,
    ) -> Result<Self> {
        Self::with_options(access, callback, RetryPolicy::default(), HeaderMap::new())
    }

    /// Like [`new`](Self::new) with an explicit retry policy and extra
    /// headers replayed verbatim on every (re)dial.
    pub fn with_options(
        access: AccessConfig,
        callback: Option<Arc<dyn MessageCallback>>,
        retry: RetryPolicy,
        headers: HeaderMap,
    ) -> Result<Self> {
        access.validate()?;
        let root = CancellationToken::new();
        let lifetime = root.child_token();
        Ok(Self {
            inner: Arc::new(ClientInner {
                access,
                headers,
                retry,
                callback,
                sink: Mutex::new(None),
                reader_slot: StdMutex::new(None),
                retry_enabled: AtomicBool::new(true),
                root,
                lifetime: StdMutex::new(lifetime),
                tasks: StdMutex::new(None),
            }),
        })
    }

    /// Establish the connection, dialing with the configured retry policy.
    /// Idempotent: returns immediately when a live socket already exists.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    /// Dial with an explicit attempt limit (0 = unlimited). Refuses
    /// immediately when retry has been disabled by [`stop`](Self::stop).
    pub async fn connect_with_retry(&self, max_attempts: u32) -> Result<()> {
        self.inner.connect_with_retry(max_attempts).await
    }

    /// Send one binary payload frame, dialing first if necessary.
    pub async fn write_binary(&self, data: Vec<u8>) -> Result<()> {
        self.inner.write_binary(data).await
    }

    /// Serialize `value` and send it as one text frame, dialing first if
    /// necessary.
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.inner.write_json(value).await
    }

    /// Disable reconnection, cancel the background tasks, send the
    /// termination control frame and close the socket. Always returns
    /// normally; safe to call with no live socket.
    pub async fn stop(&self) {
        self.inner.stop().await
    }

    /// Re-arm automatic reconnection after an intentional [`stop`](Self::stop)
    /// and dial again. The only path that resumes a stopped client.
    pub async fn attempt_reconnect(&self, max_attempts: u32) -> Result<()> {
        self.inner.attempt_reconnect(max_attempts).await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.sink.lock().await.is_some()
    }
}

struct TaskHandles {
    token: CancellationToken,
    listen: JoinHandle<()>,
    #[allow(dead_code)]
    ping: JoinHandle<()>,
}

struct ClientInner {
    access: AccessConfig,
    headers: HeaderMap,
    retry: RetryPolicy,
    callback: Option<Arc<dyn MessageCallback>>,
    /// Write half of the socket. The single mutex serializing all writers,
    /// the dial decision, and the close sequence.
    sink: Mutex<Option<WsSink>>,
    /// Read half handed off to the listen task after each successful dial.
    reader_slot: StdMutex<Option<WsSource>>,
    retry_enabled: AtomicBool,
    root: CancellationToken,
    lifetime: StdMutex<CancellationToken>,
    tasks: StdMutex<Option<TaskHandles>>,
}

impl ClientInner {
    fn current_lifetime(&self) -> CancellationToken {
        self.lifetime.lock().unwrap().clone()
    }

    fn retry_allowed(&self) -> bool {
        self.retry_enabled.load(Ordering::SeqCst)
    }

    fn take_reader(&self) -> Option<WsSource> {
        self.reader_slot.lock().unwrap().take()
    }

    async fn connect(self: &Arc<Self>) -> Result<()> {
        if !self.retry_allowed() {
            return Err(ClientError::InvalidConnection);
        }
        // A previous read loop may have detected breakage and cancelled the
        // lifetime; derive a fresh one from the root before redialing.
        {
            let mut lifetime = self.lifetime.lock().unwrap();
            if lifetime.is_cancelled() {
                *lifetime = self.root.child_token();
            }
        }
        self.connect_with_retry(self.retry.max_attempts).await
    }

    async fn connect_with_retry(self: &Arc<Self>, max_attempts: u32) -> Result<()> {
        if !self.retry_allowed() {
            return Err(ClientError::InvalidConnection);
        }
        let mut guard = self.sink.lock().await;
        self.ensure_connected_locked(&mut guard, max_attempts).await
    }

    /// Dial-with-retry, storing the halves on success. Must be called with
    /// the sink mutex held so writers never observe a half-installed socket.
    async fn ensure_connected_locked(
        self: &Arc<Self>,
        guard: &mut Option<WsSink>,
        max_attempts: u32,
    ) -> Result<()> {
        if guard.is_some() {
            return Ok(());
        }
        if !self.retry_allowed() {
            return Err(ClientError::InvalidConnection);
        }

        let token = self.current_lifetime();
        let policy = RetryPolicy::new(max_attempts, self.retry.delay);
        let mut attempt: u32 = 0;
        while !policy.exhausted(attempt) {
            if attempt > 0 {
                tokio::select! {
                    _ = token.cancelled() => return Err(ClientError::InvalidConnection),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
                if !self.retry_allowed() {
                    return Err(ClientError::InvalidConnection);
                }
            }
            attempt += 1;

            let dialed = tokio::select! {
                _ = token.cancelled() => return Err(ClientError::InvalidConnection),
                result = self.dial() => result,
            };
            match dialed {
                Ok(stream) => {
                    let (sink, source) = stream.split();
                    *guard = Some(sink);
                    *self.reader_slot.lock().unwrap() = Some(source);
                    self.retry_enabled.store(true, Ordering::SeqCst);
                    self.spawn_background_tasks();
                    log::info!("Connected to {}", self.access.host);
                    return Ok(());
                }
                Err(e) => log::warn!("Dial attempt {} failed: {}", attempt, e),
            }
        }
        Err(ClientError::InvalidConnection)
    }

    /// One TLS-capable dial with handshake timeout, API-key and custom
    /// header injection, and optional redirect following.
    async fn dial(&self) -> Result<WsStream> {
        let mut target = self.endpoint()?.to_string();
        let mut hops: u8 = 0;
        loop {
            let mut request = target.as_str().into_client_request()?;
            {
                let headers = request.headers_mut();
                headers.insert(API_KEY_HEADER, HeaderValue::from_str(self.access.api_key())?);
                for (name, value) in self.headers.iter() {
                    headers.insert(name.clone(), value.clone());
                }
            }
            let connector = self.tls_connector()?;
            let dialing = connect_async_tls_with_config(request, None, true, connector);
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, dialing).await {
                Err(_) => return Err(ClientError::HandshakeTimeout),
                Ok(Ok((stream, _response))) => return Ok(stream),
                Ok(Err(WsError::Http(response)))
                    if self.access.allow_redirects
                        && hops < MAX_REDIRECT_HOPS
                        && response.status().is_redirection() =>
                {
                    match response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned)
                    {
                        Some(location) => {
                            log::debug!("Following redirect to {}", location);
                            target = location;
                            hops += 1;
                        }
                        None => return Err(WsError::Http(response).into()),
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    fn endpoint(&self) -> Result<Url> {
        // A bare host dials wss://; an explicit scheme (ws:// against a
        // local test server) is kept as-is.
        let base = if self.access.host.contains("://") {
            self.access.host.clone()
        } else {
            format!("wss://{}", self.access.host)
        };
        let mut url = Url::parse(&base)?;
        url.set_path(&self.access.path);
        Ok(url)
    }

    fn tls_connector(&self) -> Result<Option<Connector>> {
        if !self.access.skip_server_auth {
            return Ok(None);
        }
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| ClientError::Tls(e.to_string()))?;
        Ok(Some(Connector::NativeTls(tls)))
    }

    async fn write_binary(self: &Arc<Self>, data: Vec<u8>) -> Result<()> {
        let mut guard = self.sink.lock().await;
        self.ensure_connected_locked(&mut guard, self.retry.max_attempts)
            .await?;
        let sent = match guard.as_mut() {
            Some(sink) => sink.send(Message::Binary(data.into())).await,
            None => return Err(ClientError::InvalidConnection),
        };
        if let Err(e) = sent {
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(self: &Arc<Self>, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let mut guard = self.sink.lock().await;
        self.ensure_connected_locked(&mut guard, self.retry.max_attempts)
            .await?;
        let sent = match guard.as_mut() {
            Some(sink) => sink.send(Message::Text(text.into())).await,
            None => return Err(ClientError::InvalidConnection),
        };
        if let Err(e) = sent {
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn stop(&self) {
        self.retry_enabled.store(false, Ordering::SeqCst);
        self.current_lifetime().cancel();

        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            if let Ok(stop_frame) = serde_json::to_string(&StopRequest::new()) {
                let _ = sink.send(Message::Text(stop_frame.into())).await;
            }
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Utf8Bytes::from_static("client stopped"),
            }));
            let _ = sink.send(close).await;
            // Give the peer a moment to observe the close frame.
            tokio::time::sleep(CLOSE_GRACE).await;
            let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
        }
        drop(guard);
        *self.reader_slot.lock().unwrap() = None;
        self.tasks.lock().unwrap().take();
        log::info!("Streaming connection stopped");
    }

    async fn attempt_reconnect(self: &Arc<Self>, max_attempts: u32) -> Result<()> {
        self.retry_enabled.store(true, Ordering::SeqCst);
        {
            let mut lifetime = self.lifetime.lock().unwrap();
            if lifetime.is_cancelled() {
                *lifetime = self.root.child_token();
            }
        }
        self.connect_with_retry(max_attempts).await
    }

    fn spawn_background_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(handles) = tasks.as_ref() {
            if !handles.token.is_cancelled() && !handles.listen.is_finished() {
                return;
            }
        }
        let token = self.current_lifetime();
        let listen = tokio::spawn(Arc::clone(self).listen_loop(token.clone()));
        let ping = tokio::spawn(Arc::clone(self).ping_loop(token.clone()));
        *tasks = Some(TaskHandles {
            token,
            listen,
            ping,
        });
    }

    /// Receive loop: ticks, obtains the current reader (dialing if
    /// necessary), then reads frames until the socket breaks. A broken
    /// socket clears the handle so the next tick redials.
    async fn listen_loop(self: Arc<Self>, token: CancellationToken) {
        let mut tick = tokio::time::interval(LISTEN_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            let mut source = match self.take_reader() {
                Some(source) => source,
                None => {
                    if let Err(e) = self.connect().await {
                        log::debug!("Reconnect attempt failed: {}", e);
                        continue;
                    }
                    match self.take_reader() {
                        Some(source) => source,
                        None => continue,
                    }
                }
            };
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => self.deliver(text.as_bytes()).await,
                        Some(Ok(Message::Binary(data))) => self.deliver(&data).await,
                        Some(Ok(Message::Ping(_)))
                        | Some(Ok(Message::Pong(_)))
                        | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed the connection: {:?}", frame);
                            self.mark_broken().await;
                            break;
                        }
                        Some(Err(e)) => {
                            log::warn!("Read error: {}", e);
                            self.mark_broken().await;
                            break;
                        }
                        None => {
                            log::info!("Connection closed by server");
                            self.mark_broken().await;
                            break;
                        }
                    }
                }
            }
        }
        log::debug!("Receive loop exited");
    }

    async fn deliver(&self, frame: &[u8]) {
        match &self.callback {
            Some(callback) => {
                if let Err(e) = callback.message(frame).await {
                    log::warn!("Frame dispatch failed: {}", e);
                }
            }
            // No callback registered: log the frame, never drop silently.
            None => log::info!(
                "No message callback registered, frame: {}",
                String::from_utf8_lossy(frame)
            ),
        }
    }

    /// Heartbeat loop: writes a ping with a deadline of half the period.
    /// A failed or timed-out write closes the socket so the listen tick
    /// forces reconnection.
    async fn ping_loop(self: Arc<Self>, token: CancellationToken) {
        let mut tick = tokio::time::interval(PING_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            let disconnected = self.sink.lock().await.is_none();
            if disconnected {
                if let Err(e) = self.connect().await {
                    log::debug!("Heartbeat reconnect attempt failed: {}", e);
                    continue;
                }
            }
            let mut guard = self.sink.lock().await;
            let pinged = match guard.as_mut() {
                Some(sink) => {
                    tokio::time::timeout(PING_PERIOD / 2, sink.send(Message::Ping(Vec::new().into())))
                        .await
                }
                None => continue,
            };
            let failed = match pinged {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    log::warn!("Heartbeat write failed: {}", e);
                    true
                }
                Err(_) => {
                    log::warn!("Heartbeat write timed out");
                    true
                }
            };
            if failed {
                if let Some(mut sink) = guard.take() {
                    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                }
            }
        }
        log::debug!("Heartbeat loop exited");
    }

    async fn mark_broken(&self) {
        let mut guard = self.sink.lock().await;
        if let Some(mut sink) = guard.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
        }
    }
}
