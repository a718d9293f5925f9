//! WebSocket signaling client
//!
//! Connects to the signaling server, sends the initial session request and
//! feeds parsed inbound messages to the run loop. A writer task owns the
//! sink half of the socket so callbacks can send without locking it.

use super::{SignalMessage, SignalParser, SignalingError, SERVER_PEER_ID};
use crate::config::SignalingConfig;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::client::IntoClientRequest;
use tungstenite::protocol::Message;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event surfaced by the reader loop
#[derive(Debug)]
pub enum SignalingEvent {
    /// Parsed inbound signaling message
    Message(SignalMessage),
    /// The socket closed (server close frame, stream end or error)
    Closed,
}

/// Signaling client handle
pub struct SignalingClient {
    client_id: String,
    outbound_tx: mpsc::UnboundedSender<Message>,
    events_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    writer_handle: JoinHandle<()>,
    reader_handle: JoinHandle<()>,
}

impl SignalingClient {
    /// Connect to the signaling server and send the initial session request.
    ///
    /// Retries the connection `connect_attempts` times before giving up.
    pub async fn connect(
        config: &SignalingConfig,
        client_id: &str,
    ) -> Result<Self, SignalingError> {
        let url = endpoint_url(&config.url, client_id)?;
        let ws_stream = Self::dial(&url, config).await?;
        info!("Connected to signaling server at {}", url);

        let (write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<SignalingEvent>();

        let writer_handle = tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let pong_tx = outbound_tx.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match SignalParser::parse(&text) {
                        Ok(message) => {
                            if events_tx.send(SignalingEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping unparseable signaling message: {}", e),
                    },
                    Ok(Message::Binary(data)) => {
                        debug!("Ignoring binary signaling frame: {} bytes", data.len());
                    }
                    Ok(Message::Ping(ping)) => {
                        let _ = pong_tx.send(Message::Pong(ping));
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Ok(Message::Close(_)) => {
                        info!("Signaling server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Signaling socket error: {}", e);
                        break;
                    }
                }
            }
            let _ = events_tx.send(SignalingEvent::Closed);
        });

        let client = Self {
            client_id: client_id.to_string(),
            outbound_tx,
            events_rx,
            writer_handle,
            reader_handle,
        };

        client.send(&SignalMessage::request(SERVER_PEER_ID))?;
        Ok(client)
    }

    /// Establish the socket, retrying on failure
    async fn dial(url: &str, config: &SignalingConfig) -> Result<WsStream, SignalingError> {
        let attempts = config.connect_attempts.max(1);
        let delay = Duration::from_millis(config.connect_retry_delay_ms);

        for attempt in 1..=attempts {
            let request = url
                .into_client_request()
                .map_err(|e| SignalingError::ConnectFailed(e.to_string()))?;

            match connect_async(request).await {
                Ok((ws_stream, _response)) => return Ok(ws_stream),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Signaling connect attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(SignalingError::ConnectFailed(e.to_string())),
            }
        }

        Err(SignalingError::ConnectFailed("no attempts made".to_string()))
    }

    /// Queue a signaling message for transmission
    pub fn send(&self, message: &SignalMessage) -> Result<(), SignalingError> {
        let json = message.to_json()?;
        debug!("-> signaling: {}", json);
        self.outbound_tx
            .send(Message::Text(json))
            .map_err(|_| SignalingError::Closed)
    }

    /// Next event from the reader loop; `None` after the loop is torn down
    pub async fn next_event(&mut self) -> Option<SignalingEvent> {
        self.events_rx.recv().await
    }

    /// This client's id on the signaling wire
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Send a close frame and drain the writer.
    ///
    /// The reader is stopped first so its pong sender cannot keep the
    /// writer channel open while we wait for the queue to drain.
    pub async fn close(self) {
        let _ = self.outbound_tx.send(Message::Close(None));
        self.reader_handle.abort();
        drop(self.outbound_tx);
        let _ = self.writer_handle.await;
    }
}

/// Build the per-client endpoint URL: `<base>/<client id>`
fn endpoint_url(base: &str, client_id: &str) -> Result<String, SignalingError> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), client_id);
    let url = Url::parse(&raw).map_err(|e| SignalingError::ConnectFailed(e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(SignalingError::ConnectFailed(format!(
            "unsupported signaling scheme: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("ws://127.0.0.1:8000", "viewer_ab12cd34").unwrap();
        assert_eq!(url, "ws://127.0.0.1:8000/viewer_ab12cd34");
    }

    #[test]
    fn test_endpoint_url_trailing_slash() {
        let url = endpoint_url("ws://127.0.0.1:8000/", "viewer_1").unwrap();
        assert_eq!(url, "ws://127.0.0.1:8000/viewer_1");
    }

    #[test]
    fn test_endpoint_url_rejects_http() {
        assert!(endpoint_url("http://127.0.0.1:8000", "viewer_1").is_err());
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_retries() {
        // Grab an ephemeral port and drop the listener so nothing accepts.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SignalingConfig {
            url: format!("ws://127.0.0.1:{}", port),
            connect_attempts: 2,
            connect_retry_delay_ms: 10,
            ..Default::default()
        };

        let result = SignalingClient::connect(&config, "viewer_nobody").await;
        assert!(matches!(result, Err(SignalingError::ConnectFailed(_))));
    }
}
