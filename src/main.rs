use std::{rc::Rc, time::Duration};

use anyhow::{bail, Context as _};
use futures_signals::signal::SignalExt as _;
use sfu_signaling::{
    proto::{ClientMessage, EndpointId, IceCandidate, ServerMessage},
    sys::{LoopbackFactory, MemoryServer, MemoryTransport, WebSocketTransport},
    Room, SessionConfig, SessionState, SignalingChannel, Variant,
};
use tokio::{task, task::spawn_local, time::sleep};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sfu_signaling=debug")),
        )
        .init();

    let config = SessionConfig::load().context("can't load configuration")?;
    task::LocalSet::new().run_until(run(config)).await
}

async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let factory = Rc::new(
        LoopbackFactory::new()
            .with_latency(Duration::from_millis(50))
            .with_candidates(2),
    );

    let (channel, inbound) = match &config.server_url {
        Some(url) => {
            let (transport, inbound) = WebSocketTransport::connect(url)
                .await
                .with_context(|| format!("can't connect to {}", url))?;
            (SignalingChannel::new(transport), inbound)
        }
        None => {
            let (transport, server, inbound) = MemoryTransport::pair();
            spawn_demo_server(server, config.variant);
            (SignalingChannel::new(transport), inbound)
        }
    };

    let room = Room::new(config.clone(), channel, factory.clone());
    Rc::clone(&room).spawn_tasks(inbound);

    room.start();
    let started = tokio::time::timeout(
        Duration::from_secs(10),
        room.snapshot().signal().wait_for(SessionState::Started),
    )
    .await;
    if started.is_err() {
        room.stop();
        bail!("session didn't start in time");
    }

    match config.variant {
        Variant::Composite | Variant::SfuDataChannels => {
            if config.variant.debug_control() {
                room.debug();
            }
            room.send_data("Hello from the client")?;
            if let Some(peer) = factory.peers().first() {
                peer.push_data("Hello from the server");
            }
        }
        Variant::SfuMute => {
            for muted in [true, false] {
                if let Err(e) = room.set_muted(muted).await {
                    tracing::error!(muted, error = %e, "Mute toggle failed");
                }
                sleep(Duration::from_millis(300)).await;
            }
        }
    }

    sleep(Duration::from_millis(500)).await;
    if let Some(text) = room.primary_peer().and_then(|p| p.data_text()) {
        tracing::info!(%text, "Received data");
    }

    room.stop();
    room.close();
    Ok(())
}

/// Plays the media server's side of the protocol over `server`.
fn spawn_demo_server(mut server: MemoryServer, variant: Variant) {
    spawn_local(async move {
        while let Some(raw) = server.recv().await {
            let msg: ClientMessage = match serde_json::from_str(&raw) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "Demo server got invalid message");
                    continue;
                }
            };
            for reply in demo_replies(msg, variant) {
                match serde_json::to_string(&reply) {
                    Ok(json) => server.push(json),
                    Err(e) => tracing::error!(error = %e, "Demo server can't reply"),
                }
            }
        }
    });
}

fn demo_replies(msg: ClientMessage, variant: Variant) -> Vec<ServerMessage> {
    let offer = |session: &str| {
        format!(
            "v=0\r\no=demo-server 0 0 IN IP4 127.0.0.1\r\ns={}\r\n",
            session,
        )
    };
    match msg {
        ClientMessage::Start => match variant {
            Variant::Composite => vec![ServerMessage::MakePeer {
                sdp_offer: offer("peer"),
                web_rtc_ep_id: EndpointId::from("ep-peer"),
            }],
            Variant::SfuDataChannels | Variant::SfuMute => {
                let mut replies = vec![ServerMessage::MakeTalker {
                    sdp_offer: offer("talker"),
                    web_rtc_ep_id: EndpointId::from("ep-talker"),
                }];
                replies.extend((1..=2).map(|n| ServerMessage::MakeListener {
                    sdp_offer: offer("listener"),
                    web_rtc_ep_id: EndpointId(format!("ep-listener-{}", n)),
                }));
                replies
            }
        },
        ClientMessage::WebRtcPeerReady { web_rtc_ep_id } => {
            vec![ServerMessage::AddIceCandidate {
                web_rtc_ep_id,
                candidate: IceCandidate {
                    candidate: "candidate:0 1 UDP 2122252543 10.0.0.1 40000 \
                                typ host"
                        .into(),
                    sdp_mid: Some("0".into()),
                    sdp_m_line_index: Some(0),
                },
            }]
        }
        ClientMessage::ProcessSdpReoffer { web_rtc_ep_id, .. } => {
            vec![ServerMessage::ProcessSdpReanswer {
                web_rtc_ep_id,
                sdp_answer: offer("reanswer"),
            }]
        }
        ClientMessage::Error { message } => {
            tracing::warn!(%message, "Demo server got client error");
            Vec::new()
        }
        ClientMessage::Stop
        | ClientMessage::Debug
        | ClientMessage::ProcessSdpAnswer { .. }
        | ClientMessage::AddIceCandidate { .. } => Vec::new(),
    }
}
