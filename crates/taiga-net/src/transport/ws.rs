//! WebSocket client transport
//!
//! Binary frames only; the stream's own message framing delimits frames.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{NetError, NetResult};
use crate::transport::Transport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client transport over a WebSocket connection
pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WsTransport {
    /// Validate the URL and open the connection
    pub async fn connect(url: &str) -> NetResult<Self> {
        let url = normalize_ws_url(url)?;
        info!(url = %url, "connecting websocket");

        let (ws, _resp) = connect_async(&url).await?;
        info!("websocket connected");

        let (sink, stream) = ws.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, data: &[u8]) -> NetResult<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    async fn receive(&self) -> NetResult<Vec<u8>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                // Control frames are answered by the library
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Text(_))) => return Err(NetError::NonBinaryFrame),
                Some(Ok(Message::Close(_))) | None => return Err(NetError::ConnectionClosed),
                Some(Err(e)) => return Err(NetError::WebSocket(e)),
            }
        }
    }

    async fn disconnect(&self) -> NetResult<()> {
        debug!("disconnecting websocket");
        let mut sink = self.sink.lock().await;
        sink.close().await?;
        Ok(())
    }
}

/// Require a `ws://`/`wss://` scheme and patch a missing `/ws` path
pub fn normalize_ws_url(url: &str) -> NetResult<String> {
    if !url.starts_with("ws://") && !url.starts_with("wss://") {
        return Err(NetError::InvalidUrl(format!(
            "must start with ws:// or wss://, got: {}",
            url
        )));
    }

    if url.ends_with("/ws") {
        Ok(url.to_string())
    } else {
        Ok(format!("{}/ws", url.trim_end_matches('/')))
    }
}
