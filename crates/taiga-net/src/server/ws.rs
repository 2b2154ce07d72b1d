//! WebSocket server backend
//!
//! Accept loop plus one task per connection. Upgrades are accepted on the
//! `/ws` path only; inbound non-binary frames are skipped. Outbound frames
//! flow through the connection's bounded queue into a writer task so a slow
//! client never stalls the node's pumps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::NetResult;
use crate::server::{ConnHandle, FrameHandler, SEND_QUEUE_FRAMES};

/// WebSocket frame server
pub struct WsServer {
    listener: TcpListener,
}

impl WsServer {
    /// Bind the listening socket
    pub async fn bind(addr: &str) -> NetResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> NetResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve accepts until the token is cancelled
    pub async fn serve(
        self,
        handler: Arc<dyn FrameHandler>,
        shutdown: CancellationToken,
    ) -> NetResult<()> {
        info!(addr = %self.listener.local_addr()?, "websocket server listening");
        let next_id = AtomicU64::new(0);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("websocket server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let id = next_id.fetch_add(1, Ordering::Relaxed);
                            let handler = Arc::clone(&handler);
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_socket(stream, id, handler, shutdown).await {
                                    debug!(peer = %peer, "connection closed: {}", e);
                                }
                            });
                        }
                        Err(e) => error!("failed to accept connection: {}", e),
                    }
                }
            }
        }
    }
}

async fn handle_socket(
    stream: TcpStream,
    id: u64,
    handler: Arc<dyn FrameHandler>,
    shutdown: CancellationToken,
) -> NetResult<()> {
    let ws = tokio_tungstenite::accept_hdr_async(stream, require_ws_path).await?;
    info!(conn = id, "client connected");

    let (sink, mut inbound) = ws.split();
    let (tx, rx) = mpsc::channel::<Vec<u8>>(SEND_QUEUE_FRAMES);
    let conn = ConnHandle::stream(id, tx);

    let writer = tokio::spawn(write_pump(sink, rx));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = inbound.next() => match msg {
                Some(Ok(Message::Binary(data))) => handler.on_frame(&conn, data).await,
                // Text and control frames carry no protocol traffic
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(conn = id, "read error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    handler.on_disconnect(conn.id()).await;
    info!(conn = id, "client disconnected");

    // Dropping the handle closes the queue; the writer drains and exits.
    drop(conn);
    let _ = writer.await;
    Ok(())
}

async fn write_pump(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = sink.send(Message::Binary(data)).await {
            debug!("write error: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}

fn require_ws_path(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == "/ws" {
        Ok(resp)
    } else {
        Err(ErrorResponse::new(Some("not found".into())))
    }
}
