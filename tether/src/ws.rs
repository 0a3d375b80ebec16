//! WebSocket transport for the patch hub.

use crate::app::AppState;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    SinkExt, StreamExt,
    future::ready,
    stream::{SplitSink, Stream},
};
use std::sync::Arc;
use tether_core::BoxError;
use tether_std::hub::{FrameSink, SessionId};
use tokio::sync::Mutex;
use tracing::debug;

/// The writing half of an upgraded socket.
pub struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl FrameSink for WsSink {
    async fn send(&self, frame: Arc<str>) -> Result<(), BoxError> {
        self.tx
            .lock()
            .await
            .send(Message::Text(frame.as_ref().into()))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        let mut tx = self.tx.lock().await;
        let _ = tx.send(Message::Close(None)).await;
        let _ = tx.close().await;
    }
}

/// Text frames as strings. A close frame or a transport error ends the
/// stream with an error; binary and control frames are skipped.
fn text_frames(
    rx: impl Stream<Item = Result<Message, axum::Error>> + Send,
) -> impl Stream<Item = Result<String, String>> + Send {
    rx.filter_map(|message| {
        ready(match message {
            Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(Message::Close(_)) => Some(Err("closed by peer".to_string())),
            Ok(_) => None,
            Err(error) => Some(Err(error.to_string())),
        })
    })
}

pub(crate) async fn upgrade(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub().clone();
    ws.on_upgrade(move |socket| async move {
        debug!(%session, "socket upgraded");
        let (tx, rx) = socket.split();
        hub.run_connection(session, WsSink::new(tx), text_frames(rx))
            .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    #[tokio::test]
    async fn test_text_frames_skip_binary_and_end_on_close() {
        let messages = stream::iter(vec![
            Ok(Message::Text("a".into())),
            Ok(Message::Binary(Bytes::from_static(b"\x00"))),
            Ok(Message::Close(None)),
        ]);
        let frames: Vec<_> = text_frames(messages).collect().await;
        assert_eq!(frames, vec![
            Ok("a".to_string()),
            Err("closed by peer".to_string())
        ]);
    }
}
