//! Per-connection tasks: a reader that forwards frames to the dispatcher
//! and a writer that drains the connection's outbound channel.
//!
//! Neither task looks inside a frame. Decoding, authorization, and room
//! logic all happen on the dispatcher.

use std::sync::Arc;

use tokio::sync::mpsc;

use bingo_protocol::Codec;
use bingo_room::Outbound;
use bingo_transport::{Connection, WebSocketConnection};

use crate::dispatcher::DispatchEvent;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    events: mpsc::UnboundedSender<DispatchEvent>,
    codec: C,
) where
    C: Codec + Clone,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let (outbound, rx) = mpsc::unbounded_channel();

    let opened = DispatchEvent::Opened {
        conn_id,
        target: conn.target().to_owned(),
        outbound,
    };
    if events.send(opened).is_err() {
        tracing::debug!(%conn_id, "dispatcher gone, dropping connection");
        return;
    }
    tokio::spawn(write_loop(Arc::clone(&conn), rx, codec));

    loop {
        match conn.recv().await {
            Ok(Some(text)) => {
                if events.send(DispatchEvent::Frame { conn_id, text }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        }
    }
    let _ = events.send(DispatchEvent::Closed { conn_id });
}

/// Writes outbound items until the channel closes, a send fails, or a
/// close is requested.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    codec: C,
) {
    let conn_id = conn.id();
    while let Some(outbound) = rx.recv().await {
        let result = match outbound {
            Outbound::Message(message) => match codec.encode(&*message) {
                Ok(text) => conn.send(&text).await,
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "failed to encode message");
                    continue;
                }
            },
            Outbound::Text(text) => conn.send(&text).await,
            Outbound::Close(reason) => {
                tracing::debug!(%conn_id, code = reason.code, "closing connection");
                if let Err(e) = conn.close(reason).await {
                    tracing::debug!(%conn_id, error = %e, "close failed");
                }
                break;
            }
        };
        if let Err(e) = result {
            tracing::debug!(%conn_id, error = %e, "send failed");
            break;
        }
    }
}
