mod common;

use std::{rc::Rc, time::Duration};

use serde_json::json;
use sfu_signaling::{
    component::NegotiationState,
    error::TrackError,
    proto::ClientMessage,
    sys::{LoopbackFactory, PeerEvent},
    MuteStrategy, ReanswerFailure, SessionConfig, SessionState, Variant,
};
use tokio::task::{spawn_local, LocalSet};

use self::common::{settle, Harness, LogCapture};

fn reanswer(sdp: &str) -> serde_json::Value {
    json!({
        "id": "PROCESS_SDP_REANSWER",
        "webRtcEpId": "ep-1",
        "sdpAnswer": sdp,
    })
}

fn reoffers(sent: &[ClientMessage]) -> Vec<String> {
    sent.iter()
        .filter_map(|m| match m {
            ClientMessage::ProcessSdpReoffer {
                web_rtc_ep_id,
                sdp_offer,
            } if web_rtc_ep_id.0 == "ep-1" => Some(sdp_offer.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn replace_mute_round_trip_restores_sender_track() {
    LocalSet::new()
        .run_until(async {
            let mut h =
                Harness::new(SessionConfig::sfu_mute(MuteStrategy::Replace));
            h.start_talker().await;
            let loopback = h.loopback(0);
            let original = loopback.sent_tracks();
            let peer = h.peer("ep-1");
            let sender = peer.sender().unwrap();
            assert_eq!(original, vec![Some(sender.track().clone())]);

            h.room.set_muted(true).await.unwrap();
            assert!(sender.is_muted());
            assert_eq!(loopback.sent_tracks(), vec![None]);

            h.room.set_muted(false).await.unwrap();
            assert!(!sender.is_muted());
            assert!(sender.is_attached());
            assert_eq!(loopback.sent_tracks(), original);

            settle().await;
            assert!(h.sent().is_empty());
        })
        .await;
}

#[tokio::test]
async fn rejected_replace_rolls_back_toggle() {
    LocalSet::new()
        .run_until(async {
            let (logs, _guard) = LogCapture::install();
            let mut h =
                Harness::new(SessionConfig::sfu_mute(MuteStrategy::Replace));
            h.start_talker().await;
            let loopback = h.loopback(0);
            let original = loopback.sent_tracks();

            loopback.fail_next_replace(TrackError::InvalidModification(
                "codec changed".into(),
            ));
            let res = h.room.set_muted(true).await;

            assert_eq!(
                res,
                Err(TrackError::InvalidModification("codec changed".into())),
            );
            assert!(!h.peer("ep-1").sender().unwrap().is_muted());
            assert_eq!(loopback.sent_tracks(), original);
            assert!(logs.contains("Track mutation needs renegotiation"));

            h.room.set_muted(true).await.unwrap();
            loopback.fail_next_replace(TrackError::Rejected("busy".into()));
            assert!(h.room.set_muted(false).await.is_err());
            assert!(h.peer("ep-1").sender().unwrap().is_muted());
            assert!(logs.contains("Track mutation failed"));
            assert_eq!(h.room.state(), SessionState::Started);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn overlapping_toggle_is_refused() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::with_factory(
                SessionConfig::sfu_mute(MuteStrategy::Replace),
                LoopbackFactory::new().with_latency(Duration::from_millis(10)),
            );
            h.room.start();
            h.make("MAKE_TALKER", "ep-1").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            settle().await;
            assert_eq!(h.room.state(), SessionState::Started);
            h.sent();

            let pending = spawn_local({
                let room = Rc::clone(&h.room);
                async move { room.set_muted(true).await }
            });
            settle().await;

            assert_eq!(
                h.room.set_muted(false).await,
                Err(TrackError::InProgress),
            );
            assert_eq!(pending.await.unwrap(), Ok(()));
            assert!(h.peer("ep-1").sender().unwrap().is_muted());
        })
        .await;
}

#[tokio::test]
async fn remove_add_mute_renegotiates() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new(SessionConfig::sfu_mute(
                MuteStrategy::RemoveAdd,
            ));
            h.start_talker().await;
            let loopback = h.loopback(0);
            let peer = h.peer("ep-1");
            let track = peer.sender().unwrap().track().clone();

            h.room.set_muted(true).await.unwrap();
            assert!(loopback.sent_tracks().is_empty());
            assert!(!peer.sender().unwrap().is_attached());
            settle().await;

            let offers = reoffers(&h.sent());
            assert_eq!(offers.len(), 1);
            assert_eq!(loopback.local_description(), Some(offers[0].clone()));
            assert_eq!(peer.state(), NegotiationState::Renegotiating);

            h.receive(reanswer("v=0\r\ns=reanswer-1\r\n")).await;
            assert_eq!(peer.state(), NegotiationState::Negotiated);
            assert_eq!(
                loopback.remote_description().as_deref(),
                Some("v=0\r\ns=reanswer-1\r\n"),
            );

            h.room.set_muted(false).await.unwrap();
            assert_eq!(loopback.sent_tracks(), vec![Some(track)]);
            assert!(peer.sender().unwrap().is_attached());
            settle().await;
            assert_eq!(reoffers(&h.sent()).len(), 1);
        })
        .await;
}

#[tokio::test]
async fn remove_add_sync_failure_rolls_back_without_reoffer() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new(SessionConfig::sfu_mute(
                MuteStrategy::RemoveAdd,
            ));
            h.start_talker().await;
            let loopback = h.loopback(0);
            let original = loopback.sent_tracks();

            loopback.fail_next_track_op(TrackError::InvalidState(
                "sender gone".into(),
            ));
            assert!(h.room.set_muted(true).await.is_err());
            settle().await;

            assert!(!h.peer("ep-1").sender().unwrap().is_muted());
            assert_eq!(loopback.sent_tracks(), original);
            assert!(h.sent().is_empty());
        })
        .await;
}

#[tokio::test]
async fn reoffer_failure_aborts_session() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new(SessionConfig::sfu_mute(
                MuteStrategy::RemoveAdd,
            ));
            h.start_talker().await;
            h.loopback(0).fail_generate_offer("no transceiver");

            h.room.set_muted(true).await.unwrap();
            settle().await;

            assert_eq!(
                h.sent(),
                vec![
                    ClientMessage::Error {
                        message: "[talker.WebRtcPeer.generateOffer] Error: \
                                  failed to generate SDP offer: no \
                                  transceiver"
                            .into(),
                    },
                    ClientMessage::Stop,
                ],
            );
            assert_eq!(h.room.state(), SessionState::Idle);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn reoffer_failure_of_a_stopped_session_keeps_new_one() {
    LocalSet::new()
        .run_until(async {
            let latency = Duration::from_millis(100);
            let mut h = Harness::with_factory(
                SessionConfig::sfu_mute(MuteStrategy::RemoveAdd),
                LoopbackFactory::new().with_latency(latency),
            );
            h.room.start();
            h.make("MAKE_TALKER", "ep-1").await;
            tokio::time::sleep(latency * 3).await;
            settle().await;
            assert_eq!(h.room.state(), SessionState::Started);
            h.sent();

            h.loopback(0)
                .fail_generate_offer("InvalidStateError: connection closed");
            h.room.set_muted(true).await.unwrap();
            settle().await;

            h.room.stop();
            h.room.start();
            tokio::time::sleep(latency * 3).await;
            settle().await;

            assert_eq!(
                h.sent(),
                vec![ClientMessage::Stop, ClientMessage::Start],
            );
            assert_eq!(h.room.state(), SessionState::Starting);
        })
        .await;
}

#[tokio::test]
async fn reanswer_failure_is_logged_by_default() {
    LocalSet::new()
        .run_until(async {
            let (logs, _guard) = LogCapture::install();
            let mut h = Harness::new(SessionConfig::sfu_mute(
                MuteStrategy::RemoveAdd,
            ));
            h.start_talker().await;
            h.room.set_muted(true).await.unwrap();
            settle().await;
            h.sent();

            h.loopback(0).fail_process_answer("bad fingerprint");
            h.receive(reanswer("v=0")).await;

            assert!(h.sent().is_empty());
            assert_eq!(h.room.state(), SessionState::Started);
            assert_eq!(
                h.peer("ep-1").state(),
                NegotiationState::Renegotiating,
            );
            assert!(logs.contains("Can't apply SDP re-answer"));
        })
        .await;
}

#[tokio::test]
async fn reanswer_failure_can_abort() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new(
                SessionConfig::sfu_mute(MuteStrategy::RemoveAdd)
                    .with_reanswer_failure(ReanswerFailure::Abort),
            );
            h.start_talker().await;
            h.room.set_muted(true).await.unwrap();
            settle().await;
            h.sent();

            h.loopback(0).fail_process_answer("bad fingerprint");
            h.receive(reanswer("v=0")).await;

            assert_eq!(
                h.sent(),
                vec![
                    ClientMessage::Error {
                        message: "[talker.WebRtcPeer.processAnswer] Error: \
                                  failed to process SDP answer: bad \
                                  fingerprint"
                            .into(),
                    },
                    ClientMessage::Stop,
                ],
            );
            assert_eq!(h.room.state(), SessionState::Idle);
        })
        .await;
}

#[tokio::test]
async fn reanswer_for_unknown_endpoint_is_skipped() {
    LocalSet::new()
        .run_until(async {
            let (logs, _guard) = LogCapture::install();
            let mut h =
                Harness::new(SessionConfig::sfu_mute(MuteStrategy::Replace));
            h.start_talker().await;

            h.receive(json!({
                "id": "PROCESS_SDP_REANSWER",
                "webRtcEpId": "ep-9",
                "sdpAnswer": "v=0",
            }))
            .await;

            assert!(h.sent().is_empty());
            assert!(logs.contains("Skip SDP re-answer, unknown endpoint"));
        })
        .await;
}

#[tokio::test]
async fn negotiation_needed_is_noop_without_remove_add() {
    LocalSet::new()
        .run_until(async {
            let (logs, _guard) = LogCapture::install();
            let mut h =
                Harness::new(SessionConfig::sfu_mute(MuteStrategy::Replace));
            h.start_talker().await;

            h.loopback(0).emit(PeerEvent::NegotiationNeeded);
            settle().await;

            assert!(h.sent().is_empty());
            assert_eq!(h.peer("ep-1").state(), NegotiationState::Negotiated);
            assert!(logs.contains("Negotiation needed, NOOP"));
        })
        .await;
}

#[tokio::test]
async fn listener_never_reoffers() {
    LocalSet::new()
        .run_until(async {
            let (logs, _guard) = LogCapture::install();
            let mut h = Harness::new(SessionConfig::sfu_mute(
                MuteStrategy::RemoveAdd,
            ));
            h.start_talker().await;
            h.make("MAKE_LISTENER", "ep-2").await;
            h.sent();
            let answer = h.loopback(1).local_description();

            h.loopback(1).emit(PeerEvent::NegotiationNeeded);
            settle().await;

            assert!(h.sent().is_empty());
            assert_eq!(h.peer("ep-2").state(), NegotiationState::Negotiated);
            assert_eq!(h.loopback(1).local_description(), answer);
            assert!(logs.contains("Negotiation needed, NOOP"));
        })
        .await;
}

#[tokio::test]
async fn mute_requires_started_mute_session() {
    LocalSet::new()
        .run_until(async {
            let h = Harness::new(SessionConfig::sfu_mute(MuteStrategy::Replace));
            assert!(matches!(
                h.room.set_muted(true).await,
                Err(TrackError::InvalidState(_)),
            ));

            let mut data =
                Harness::new(SessionConfig::new(Variant::SfuDataChannels));
            data.start_talker().await;
            assert_eq!(
                data.room.set_muted(true).await,
                Err(TrackError::Unsupported),
            );
        })
        .await;
}
