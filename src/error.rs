use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("No connection available and reconnect is disabled or exhausted")]
    InvalidConnection,

    #[error("Invalid outer message type: {0}")]
    InvalidMessageType(String),

    #[error("No event handler registered for {0}")]
    UserCallbackNotDefined(&'static str),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Callback failed: {0}")]
    Callback(String),
}
