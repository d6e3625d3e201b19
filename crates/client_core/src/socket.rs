use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::{
    domain::{ChannelScope, TempId},
    protocol::{AckEnvelope, ClientFrame, CreateMessage, MessageBroadcast, ServerFrame},
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{info, warn};

use crate::ChannelTransport;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_ATTEMPTS: usize = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
const BROADCAST_BUFFER: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct SocketShared {
    writer: Mutex<WsSink>,
    pending_acks: Mutex<HashMap<TempId, oneshot::Sender<AckEnvelope>>>,
    broadcasts: broadcast::Sender<MessageBroadcast>,
}

/// Explicitly owned websocket connection to the `/messages` namespace. One
/// instance per consumer with an open/close lifecycle; no ambient global
/// socket. A background reader resolves acknowledgements by nonce and fans
/// broadcasts out to subscribers.
pub struct WsChannelTransport {
    shared: Arc<SocketShared>,
    reader_task: JoinHandle<()>,
}

impl WsChannelTransport {
    pub async fn connect(server_url: &str) -> Result<Self> {
        let ws_url = socket_url(server_url)?;
        let (stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        Ok(Self::from_stream(stream))
    }

    /// Bounded reconnection on initial connect, mirroring the ten attempts
    /// the browser client configured.
    pub async fn connect_with_retry(server_url: &str) -> Result<Self> {
        let mut last_error = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match Self::connect(server_url).await {
                Ok(transport) => {
                    if attempt > 1 {
                        info!(attempt, "socket: connected after retry");
                    }
                    return Ok(transport);
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = CONNECT_ATTEMPTS,
                        "socket: connect failed: {err}"
                    );
                    last_error = Some(err);
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("socket connect failed")))
    }

    fn from_stream(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (writer, reader) = stream.split();
        let (broadcasts, _) = broadcast::channel(BROADCAST_BUFFER);
        let shared = Arc::new(SocketShared {
            writer: Mutex::new(writer),
            pending_acks: Mutex::new(HashMap::new()),
            broadcasts,
        });
        let reader_task = tokio::spawn(read_loop(Arc::clone(&shared), reader));
        Self {
            shared,
            reader_task,
        }
    }

    pub async fn close(self) -> Result<()> {
        {
            let mut writer = self.shared.writer.lock().await;
            let _ = writer.send(WsMessage::Close(None)).await;
        }
        self.reader_task.abort();
        Ok(())
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let text = serde_json::to_string(frame).context("failed to encode socket frame")?;
        let mut writer = self.shared.writer.lock().await;
        writer
            .send(WsMessage::Text(text))
            .await
            .context("failed to send socket frame")?;
        Ok(())
    }
}

impl Drop for WsChannelTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop(shared: Arc<SocketShared>, mut reader: WsSource) {
    while let Some(next) = reader.next().await {
        match next {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(ServerFrame::MessageAck(envelope)) => {
                    let waiter = shared.pending_acks.lock().await.remove(&envelope.nonce);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(envelope);
                        }
                        None => info!(nonce = %envelope.nonce, "socket: ack without waiter"),
                    }
                }
                Ok(ServerFrame::MessageCreated(payload)) => {
                    match MessageBroadcast::from_wire(payload) {
                        Some(broadcast) => {
                            let _ = shared.broadcasts.send(broadcast);
                        }
                        None => warn!("socket: dropping malformed message:created payload"),
                    }
                }
                Ok(ServerFrame::ChannelJoined(scope)) => {
                    info!(
                        server_id = %scope.server_id,
                        channel_id = %scope.channel_id,
                        "socket: channel joined"
                    );
                }
                Ok(ServerFrame::ChannelLeft(scope)) => {
                    info!(
                        server_id = %scope.server_id,
                        channel_id = %scope.channel_id,
                        "socket: channel left"
                    );
                }
                Err(err) => warn!("socket: invalid server frame: {err}"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("socket: receive failed: {err}");
                break;
            }
        }
    }

    // Dropping the waiters fails any in-flight send with a closed error.
    shared.pending_acks.lock().await.clear();
}

#[async_trait]
impl ChannelTransport for WsChannelTransport {
    async fn join(&self, scope: &ChannelScope) -> Result<()> {
        self.send_frame(&ClientFrame::ChannelJoin(scope.clone()))
            .await
    }

    async fn leave(&self, scope: &ChannelScope) -> Result<()> {
        self.send_frame(&ClientFrame::ChannelLeave(scope.clone()))
            .await
    }

    async fn create_message(&self, request: CreateMessage) -> Result<AckEnvelope> {
        let nonce = request.nonce.clone();
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_acks
            .lock()
            .await
            .insert(nonce.clone(), tx);

        if let Err(err) = self.send_frame(&ClientFrame::MessageCreate(request)).await {
            self.shared.pending_acks.lock().await.remove(&nonce);
            return Err(err);
        }

        match tokio::time::timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(anyhow!("connection closed before acknowledgement")),
            Err(_) => {
                self.shared.pending_acks.lock().await.remove(&nonce);
                Err(anyhow!("timed out waiting for acknowledgement"))
            }
        }
    }

    fn subscribe_broadcasts(&self) -> broadcast::Receiver<MessageBroadcast> {
        self.shared.broadcasts.subscribe()
    }
}

fn socket_url(server_url: &str) -> Result<String> {
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else if server_url.starts_with("wss://") || server_url.starts_with("ws://") {
        server_url.to_string()
    } else {
        return Err(anyhow!("server url must start with http:// or https://"));
    };
    Ok(format!("{}/messages", ws_url.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_switches_scheme_and_appends_namespace() {
        assert_eq!(
            socket_url("http://127.0.0.1:4000").expect("url"),
            "ws://127.0.0.1:4000/messages"
        );
        assert_eq!(
            socket_url("https://chat.campus.edu/").expect("url"),
            "wss://chat.campus.edu/messages"
        );
        assert!(socket_url("ftp://chat.campus.edu").is_err());
    }
}
