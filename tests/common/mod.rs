#![allow(dead_code)]

use std::{
    io,
    rc::Rc,
    sync::{Arc, Mutex},
};

use serde_json::{json, Value};
use sfu_signaling::{
    component::Peer,
    proto::{ClientMessage, EndpointId},
    sys::{LoopbackFactory, LoopbackPeer, MemoryServer, MemoryTransport},
    Room, SessionConfig, SignalingChannel,
};
use tracing::subscriber::DefaultGuard;

/// [`Room`] wired to an in-process server and loopback peers.
pub struct Harness {
    pub room: Rc<Room>,
    pub server: MemoryServer,
    pub factory: Rc<LoopbackFactory>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_factory(config, LoopbackFactory::new().with_candidates(1))
    }

    pub fn with_factory(config: SessionConfig, factory: LoopbackFactory) -> Self {
        let (transport, server, inbound) = MemoryTransport::pair();
        let factory = Rc::new(factory);
        let room = Room::new(
            config,
            SignalingChannel::new(transport),
            factory.clone(),
        );
        Rc::clone(&room).spawn_tasks(inbound);
        Self {
            room,
            server,
            factory,
        }
    }

    /// Messages sent by the client since the last call.
    pub fn sent(&mut self) -> Vec<ClientMessage> {
        self.server
            .drain()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    /// Pushes `msg` from the server and lets the client handle it.
    pub async fn receive(&self, msg: Value) {
        self.server.push(msg.to_string());
        settle().await;
    }

    pub async fn make(&self, id: &str, endpoint: &str) {
        self.receive(json!({
            "id": id,
            "sdpOffer": format!("v=0\r\ns={}\r\n", endpoint),
            "webRtcEpId": endpoint,
        }))
        .await;
    }

    /// Starts the session and creates the talker `ep-1`.
    pub async fn start_talker(&mut self) {
        self.room.start();
        self.make("MAKE_TALKER", "ep-1").await;
        self.sent();
    }

    pub fn peer(&self, endpoint: &str) -> Rc<Peer> {
        self.room.peers().get(&EndpointId::from(endpoint)).unwrap()
    }

    pub fn loopback(&self, n: usize) -> Rc<LoopbackPeer> {
        self.factory.peers()[n].clone()
    }
}

/// Lets every spawned task run until it blocks.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn candidate(endpoint: &str) -> Value {
    json!({
        "id": "ADD_ICE_CANDIDATE",
        "webRtcEpId": endpoint,
        "candidate": {
            "candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 41000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        },
    })
}

/// Position of the first message matching `pred`.
pub fn position(
    sent: &[ClientMessage],
    pred: impl Fn(&ClientMessage) -> bool,
) -> Option<usize> {
    sent.iter().position(pred)
}

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
