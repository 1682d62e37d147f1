//! JSON framing on top of a [`Transport`].

use serde_json::Value;

use crate::{
    error::ChannelError,
    proto::{ClientMessage, MessageKind, ServerMessage},
    sys::Transport,
};

pub struct SignalingChannel {
    transport: Box<dyn Transport>,
}

impl SignalingChannel {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Serializes and transmits `msg`.
    ///
    /// Never fails: a closed channel or a transport error drops the message
    /// with a log record.
    pub fn send(&self, msg: &ClientMessage) {
        if !self.transport.is_open() {
            tracing::warn!(?msg, "Skip sending, signaling channel isn't open");
            return;
        }
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Can't serialize {:?}", msg);
                return;
            }
        };
        tracing::debug!(message = %json, "Send signaling message");
        if let Err(e) = self.transport.send(json) {
            tracing::warn!(error = %e, "Signaling message dropped");
        }
    }

    pub fn decode(raw: &str) -> Result<ServerMessage, ChannelError> {
        let value: Value = serde_json::from_str(raw)?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::Malformed("missing `id`".into()))?;
        if MessageKind::from_id(id).is_none() {
            return Err(ChannelError::UnknownKind(id.to_owned()));
        }
        serde_json::from_value(value)
            .map_err(|e| ChannelError::Malformed(e.to_string()))
    }

    pub fn close(&self) {
        tracing::info!("Close signaling channel");
        self.transport.close();
    }
}
