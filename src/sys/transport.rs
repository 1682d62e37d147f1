use std::{cell::Cell, rc::Rc};

use futures::{channel::mpsc, StreamExt as _};

use crate::error::ChannelError;

/// Reliable, ordered text transport to the signaling server.
pub trait Transport {
    fn is_open(&self) -> bool;

    fn send(&self, text: String) -> Result<(), ChannelError>;

    /// Best-effort close, never blocks.
    fn close(&self);
}

/// In-process [`Transport`] whose other end is a [`MemoryServer`].
pub struct MemoryTransport {
    open: Rc<Cell<bool>>,
    outbound: mpsc::UnboundedSender<String>,
}

/// Server side of a [`MemoryTransport`].
pub struct MemoryServer {
    open: Rc<Cell<bool>>,
    inbound: mpsc::UnboundedSender<String>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Returns the client transport, its server end and the stream of
    /// frames pushed by the server.
    pub fn pair() -> (Self, MemoryServer, mpsc::UnboundedReceiver<String>) {
        let open = Rc::new(Cell::new(true));
        let (out_tx, out_rx) = mpsc::unbounded();
        let (in_tx, in_rx) = mpsc::unbounded();
        (
            Self {
                open: Rc::clone(&open),
                outbound: out_tx,
            },
            MemoryServer {
                open,
                inbound: in_tx,
                outbound: out_rx,
            },
            in_rx,
        )
    }
}

impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn send(&self, text: String) -> Result<(), ChannelError> {
        if !self.open.get() {
            return Err(ChannelError::Closed);
        }
        self.outbound
            .unbounded_send(text)
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        self.open.set(false);
        self.outbound.close_channel();
    }
}

impl MemoryServer {
    pub fn push(&self, text: impl Into<String>) {
        if self.inbound.unbounded_send(text.into()).is_err() {
            tracing::warn!("Client end of the memory transport is gone");
        }
    }

    /// Takes every frame the client has sent so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.outbound.try_next() {
            frames.push(frame);
        }
        frames
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// Simulates the server dropping the connection.
    pub fn disconnect(&self) {
        self.open.set(false);
        self.inbound.close_channel();
    }
}
