use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::{channel::mpsc, SinkExt as _, StreamExt as _};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{error::ChannelError, sys::Transport};

/// [`Transport`] over a WebSocket connection.
///
/// Reading and writing happen on background tasks; frames received from
/// the server are delivered through the stream returned by
/// [`WebSocketTransport::connect`].
pub struct WebSocketTransport {
    open: Arc<AtomicBool>,
    outbound: RefCell<Option<mpsc::UnboundedSender<String>>>,
}

impl WebSocketTransport {
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>), ChannelError> {
        let (ws, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();
        tracing::info!(%url, "Signaling WebSocket connected");

        let open = Arc::new(AtomicBool::new(true));
        let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<String>();

        tokio::spawn({
            let open = Arc::clone(&open);
            async move {
                while let Some(text) = out_rx.next().await {
                    if let Err(e) = sink.send(Message::Text(text.into())).await
                    {
                        tracing::warn!(error = %e, "WebSocket write failed");
                        break;
                    }
                }
                open.store(false, Ordering::SeqCst);
                let _ = sink.close().await;
            }
        });

        tokio::spawn({
            let open = Arc::clone(&open);
            async move {
                while let Some(msg) = stream.next().await {
                    let text = match msg {
                        Ok(Message::Text(t)) => t.as_str().to_owned(),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "WebSocket read failed");
                            break;
                        }
                    };
                    if in_tx.unbounded_send(text).is_err() {
                        break;
                    }
                }
                open.store(false, Ordering::SeqCst);
                tracing::info!("Signaling WebSocket closed");
            }
        });

        Ok((
            Self {
                open,
                outbound: RefCell::new(Some(out_tx)),
            },
            in_rx,
        ))
    }
}

impl Transport for WebSocketTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.outbound.borrow().is_some()
    }

    fn send(&self, text: String) -> Result<(), ChannelError> {
        match self.outbound.borrow().as_ref() {
            Some(tx) => {
                tx.unbounded_send(text).map_err(|_| ChannelError::Closed)
            }
            None => Err(ChannelError::Closed),
        }
    }

    fn close(&self) {
        // Dropping the sender ends the writer task, which closes the socket.
        self.outbound.borrow_mut().take();
    }
}
