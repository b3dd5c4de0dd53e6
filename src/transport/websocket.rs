use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

/// Read half of an established connection, consumed by the client's read loop.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Handle for pushing frames onto the wire. Frames sent through this channel
/// go out in order via a single writer task.
pub type FrameSender = mpsc::UnboundedSender<WsMessage>;

/// Opens the websocket and splits it, spawning a writer task that forwards
/// channel frames to the socket until the channel or the socket closes.
pub async fn open_socket(
    url: &str,
) -> Result<(FrameSender, WsReader, JoinHandle<()>), tungstenite::Error> {
    let (ws_stream, _) = connect_async(url).await?;
    let (mut ws_sender, ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                tracing::warn!("failed to write frame: {e}");
                break;
            }
        }
        tracing::debug!("write loop closed");
    });

    Ok((tx, ws_receiver, writer))
}
