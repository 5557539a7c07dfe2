//! Session-level integration tests
//!
//! Runs the session, client and query surface against a mock companion.
//! These tests verify:
//! - Frame ordering and song-change detection
//! - Outbound command frames (and their absence for no-op commands)
//! - Disconnect handling from either side
//! - Reconnect safety

mod mock_servers;

use mock_servers::MockYtmServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

use ytm_control::artwork::ArtworkCache;
use ytm_control::bus::{create_bus, BusEvent};
use ytm_control::client::PlaybackClient;
use ytm_control::protocol::Action;
use ytm_control::query::{ClientAction, QueryEngine};
use ytm_control::session::{ConnectionSession, Dispatch, SessionConfig, SessionState};

// =============================================================================
// Test utilities
// =============================================================================

struct Harness {
    server: MockYtmServer,
    client: PlaybackClient,
    events: broadcast::Receiver<BusEvent>,
    _cache: tempfile::TempDir,
}

/// Start a mock companion and a connected client
async fn connected() -> Harness {
    let server = MockYtmServer::start().await;
    let config = SessionConfig {
        host: "127.0.0.1".to_string(),
        port: server.port(),
        connect_timeout: Duration::from_secs(2),
        disconnect_timeout: Duration::from_millis(500),
    };
    let session = Arc::new(ConnectionSession::new(config, create_bus()));
    let cache = tempfile::tempdir().unwrap();
    let client = PlaybackClient::new(session, Arc::new(ArtworkCache::new(cache.path()).unwrap()));
    let events = client.subscribe();

    client.connect().await.expect("connect to mock companion");
    server.wait_for_connections(1).await;

    Harness {
        server,
        client,
        events,
        _cache: cache,
    }
}

/// Wait for a specific event type with timeout
async fn expect_event<F>(
    rx: &mut broadcast::Receiver<BusEvent>,
    predicate: F,
    timeout_ms: u64,
) -> Option<BusEvent>
where
    F: Fn(&BusEvent) -> bool,
{
    let deadline = Duration::from_millis(timeout_ms);
    match timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    {
        Ok(event) => event,
        Err(_) => None,
    }
}

fn is_state_change(event: &BusEvent) -> bool {
    matches!(event, BusEvent::PlayerStateChanged { .. })
}

/// Push a frame and wait until it has been merged
async fn push_and_wait(h: &mut Harness, frame: &str) {
    h.server.push(frame).await;
    expect_event(&mut h.events, is_state_change, 1000)
        .await
        .expect("frame should be merged");
}

// =============================================================================
// State mirroring
// =============================================================================

#[tokio::test]
async fn three_frame_scenario_reports_two_song_changes() {
    let mut h = connected().await;
    assert!(matches!(
        h.events.recv().await.unwrap(),
        BusEvent::Connected { .. }
    ));

    h.server
        .push(r#"{"type":"PLAYER_STATE","song":{"title":"A","videoId":"id1","songDuration":200,"isPaused":false,"elapsedSeconds":0}}"#)
        .await;
    h.server.push(r#"{"type":"PLAYER_STATE","isPlaying":true}"#).await;
    h.server
        .push(r#"{"type":"PLAYER_STATE","song":{"title":"B","videoId":"id2","songDuration":180,"isPaused":false,"elapsedSeconds":0}}"#)
        .await;

    let mut song_changes = Vec::new();
    let mut state_changes = 0;
    while state_changes < 3 {
        let event = timeout(Duration::from_secs(2), h.events.recv())
            .await
            .expect("event in time")
            .unwrap();
        match event {
            BusEvent::SongChanged { track } => song_changes.push(track.track_id),
            BusEvent::PlayerStateChanged { .. } => state_changes += 1,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert_eq!(song_changes, ["id1", "id2"]);

    let snapshot = h.client.snapshot().unwrap();
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.track.title, "B");
    assert_eq!(snapshot.track.duration_seconds, 180);
    assert_eq!(h.client.current_playback_name(), "B");
}

#[tokio::test]
async fn song_change_precedes_its_state_change() {
    let mut h = connected().await;
    h.server
        .push(r#"{"type":"PLAYER_STATE","song":{"title":"A","videoId":"id1"}}"#)
        .await;

    let first = expect_event(
        &mut h.events,
        |e| !matches!(e, BusEvent::Connected { .. }),
        1000,
    )
    .await
    .unwrap();
    assert!(matches!(first, BusEvent::SongChanged { .. }));
    assert!(expect_event(&mut h.events, is_state_change, 1000).await.is_some());
}

#[tokio::test]
async fn malformed_frames_do_not_stop_the_loop() {
    let mut h = connected().await;

    h.server.push("this is not json").await;
    h.server.push(r#"{"type":"PLAYER_STATE","volume":"loud"}"#).await;
    h.server.push(r#"{"type":"VIDEO_CHANGED","videoId":"x"}"#).await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","volume":35,"muted":true}"#).await;

    assert_eq!(h.client.current_volume(), Some(35));
    assert!(h.client.is_muted());
    assert!(h.client.is_connected());
}

#[tokio::test]
async fn fresh_connection_starts_from_defaults() {
    let h = connected().await;
    let snapshot = h.client.snapshot().expect("snapshot after connect");
    assert_eq!(snapshot.volume_percent, 100);
    assert!(!snapshot.is_playing);
    assert!(!snapshot.track.is_loaded());
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn unchanged_volume_sends_nothing() {
    let mut h = connected().await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","volume":30}"#).await;

    assert_eq!(h.client.set_volume(30).await, Dispatch::Unchanged);
    // Sentinel: the first frame the companion sees must be this one
    assert_eq!(h.client.skip().await, Dispatch::Sent);

    let frames = h.server.wait_for_frames(1).await;
    assert_eq!(frames[0]["action"], "next");
    assert_eq!(frames.len(), 1);
}

#[tokio::test]
async fn set_volume_sends_absolute_value() {
    let mut h = connected().await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","volume":30}"#).await;

    assert_eq!(h.client.set_volume(55).await, Dispatch::Sent);
    assert_eq!(h.client.set_volume(250).await, Dispatch::Sent);

    let frames = h.server.wait_for_frames(2).await;
    assert_eq!(frames[0]["type"], "ACTION");
    assert_eq!(frames[0]["action"], "setVolume");
    assert_eq!(frames[0]["data"], 55);
    assert_eq!(frames[1]["data"], 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_arrive_as_whole_frames() {
    const SENDERS: i64 = 64;

    let mut h = connected().await;
    let session = h.client.session().clone();

    let senders: Vec<_> = (0..SENDERS)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move { session.send_command(Action::Seek(i)).await })
        })
        .collect();
    // Inbound traffic while the writes are in flight
    for volume in 0..10 {
        h.server
            .push(&format!(r#"{{"type":"PLAYER_STATE","volume":{volume}}}"#))
            .await;
    }

    for sender in senders {
        assert_eq!(sender.await.unwrap(), Dispatch::Sent);
    }

    let frames = h.server.wait_for_frames(SENDERS as usize).await;
    assert_eq!(frames.len(), SENDERS as usize);
    assert_eq!(h.server.malformed().await, 0);

    let mut offsets: Vec<i64> = frames
        .iter()
        .map(|frame| {
            assert_eq!(frame["type"], "ACTION");
            assert_eq!(frame["action"], "seek");
            frame["data"].as_i64().expect("numeric seek offset")
        })
        .collect();
    offsets.sort_unstable();
    assert_eq!(offsets, (0..SENDERS).collect::<Vec<_>>());

    // The receive loop kept up with the pushed frames
    let last = expect_event(
        &mut h.events,
        |e| matches!(e, BusEvent::PlayerStateChanged { snapshot } if snapshot.volume_percent == 9),
        2000,
    )
    .await;
    assert!(last.is_some());
    assert!(h.client.is_connected());
}

#[tokio::test]
async fn set_position_sends_relative_seek() {
    let mut h = connected().await;
    push_and_wait(
        &mut h,
        r#"{"type":"PLAYER_STATE","song":{"videoId":"id1","songDuration":200,"elapsedSeconds":50}}"#,
    )
    .await;
    assert_eq!(h.client.current_position(), Some(50));

    assert_eq!(h.client.set_position(50).await, Dispatch::Unchanged);
    assert_eq!(h.client.set_position(80).await, Dispatch::Sent);
    assert_eq!(h.client.set_position(20).await, Dispatch::Sent);

    let frames = h.server.wait_for_frames(2).await;
    assert_eq!(frames[0]["action"], "seek");
    assert_eq!(frames[0]["data"], 30);
    assert_eq!(frames[1]["data"], -30);
}

#[tokio::test]
async fn play_and_pause_respect_current_state() {
    let mut h = connected().await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","isPlaying":true}"#).await;

    assert_eq!(h.client.play().await, Dispatch::Unchanged);
    assert_eq!(h.client.pause().await, Dispatch::Sent);

    let frames = h.server.wait_for_frames(1).await;
    assert_eq!(frames[0]["action"], "pause");
    assert!(frames[0].get("data").is_none());
}

#[tokio::test]
async fn toggles_send_their_actions() {
    let h = connected().await;

    assert_eq!(h.client.toggle_mute().await, Dispatch::Sent);
    assert_eq!(h.client.shuffle().await, Dispatch::Sent);
    assert_eq!(h.client.toggle_repeat().await, Dispatch::Sent);
    assert_eq!(h.client.skip_back().await, Dispatch::Sent);

    let actions: Vec<_> = h
        .server
        .wait_for_frames(4)
        .await
        .iter()
        .map(|f| f["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, ["mute", "shuffle", "repeat", "previous"]);
}

// =============================================================================
// Disconnects
// =============================================================================

#[tokio::test]
async fn server_close_returns_to_disconnected() {
    let mut h = connected().await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","isPlaying":true}"#).await;

    h.server.close_client().await;

    let event = expect_event(
        &mut h.events,
        |e| matches!(e, BusEvent::Disconnected { .. }),
        2000,
    )
    .await;
    assert!(event.is_some(), "expected Disconnected");
    assert_eq!(h.client.session().state(), SessionState::Disconnected);
    assert!(h.client.snapshot().is_none());
    assert_eq!(h.client.play().await, Dispatch::NotConnected);
}

#[tokio::test]
async fn dropped_transport_returns_to_disconnected() {
    let mut h = connected().await;

    h.server.abort_client().await;

    assert!(expect_event(
        &mut h.events,
        |e| matches!(e, BusEvent::Disconnected { .. }),
        2000,
    )
    .await
    .is_some());
    assert!(!h.client.is_connected());
    assert!(h.client.snapshot().is_none());
}

#[tokio::test]
async fn disconnect_sends_close_and_clears_snapshot() {
    let mut h = connected().await;

    h.client.disconnect().await;
    h.client.disconnect().await;

    assert_eq!(h.client.session().state(), SessionState::Disconnected);
    assert!(h.client.snapshot().is_none());
    assert!(expect_event(
        &mut h.events,
        |e| matches!(e, BusEvent::Disconnected { .. }),
        1000,
    )
    .await
    .is_some());

    timeout(Duration::from_secs(2), async {
        while h.server.closes().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("companion should see a close frame");
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn reconnect_runs_a_single_receive_loop() {
    let mut h = connected().await;

    h.client.reconnect().await.expect("reconnect");
    h.server.wait_for_connections(2).await;
    assert!(h.client.is_connected());

    // Drain lifecycle events from the reconnect
    expect_event(&mut h.events, |e| matches!(e, BusEvent::Connected { .. }), 1000).await;
    expect_event(&mut h.events, |e| matches!(e, BusEvent::Connected { .. }), 1000).await;

    h.server.push(r#"{"type":"PLAYER_STATE","volume":10}"#).await;
    assert!(expect_event(&mut h.events, is_state_change, 1000).await.is_some());
    // A second loop would merge the frame twice
    assert!(expect_event(&mut h.events, is_state_change, 200).await.is_none());

    assert_eq!(h.client.current_volume(), Some(10));
}

#[tokio::test]
async fn reconnect_after_server_close() {
    let mut h = connected().await;
    h.server.close_client().await;
    expect_event(
        &mut h.events,
        |e| matches!(e, BusEvent::Disconnected { .. }),
        2000,
    )
    .await
    .expect("Disconnected");

    h.client.reconnect().await.expect("reconnect");
    h.server.wait_for_connections(2).await;
    push_and_wait(&mut h, r#"{"type":"PLAYER_STATE","isPlaying":true}"#).await;
    assert!(h.client.snapshot().unwrap().is_playing);
}

// =============================================================================
// Query surface
// =============================================================================

#[tokio::test]
async fn query_overview_and_execute() {
    let mut h = connected().await;
    push_and_wait(
        &mut h,
        r#"{"type":"PLAYER_STATE","isPlaying":true,"volume":20,"song":{"title":"Song A","artist":"Someone","songDuration":200,"elapsedSeconds":5}}"#,
    )
    .await;

    let engine = QueryEngine::new();
    let overview = engine.query(&h.client, "").await;
    assert_eq!(overview[0].title, "Song A");
    assert_eq!(overview[0].subtitle, "Now Playing 0:05/3:20 | by Someone");

    let results = engine.query(&h.client, "vol +15").await;
    assert_eq!(results[0].action, Some(ClientAction::SetVolume(35)));

    let dispatch = results[0]
        .action
        .unwrap()
        .execute(&h.client)
        .await
        .unwrap();
    assert_eq!(dispatch, Dispatch::Sent);

    let frames = h.server.wait_for_frames(1).await;
    assert_eq!(frames[0]["action"], "setVolume");
    assert_eq!(frames[0]["data"], 35);
}
