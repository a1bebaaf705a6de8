//! HTTP API integration tests
//!
//! Boots the router on an ephemeral port and drives it like a control
//! surface would.

use cuedeck_engine::api::server::create_router;
use cuedeck_engine::api::AppContext;
use cuedeck_engine::config::Config;
use cuedeck_engine::output::LoggingSecondScreen;
use cuedeck_engine::playback::spawn_engine;
use cuedeck_engine::registry::ProcessRegistry;
use cuedeck_engine::slides::NullSlideController;
use cuedeck_engine::SharedState;
use cuedeck_common::events::VolumeStep;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn start_server() -> SocketAddr {
    let config = Config {
        mpv_path: "/nonexistent/mpv".into(),
        ffplay_path: "/nonexistent/ffplay".into(),
        ..Config::default()
    };
    let registry = Arc::new(ProcessRegistry::new(Duration::from_millis(200)));
    let state = Arc::new(SharedState::new(VolumeStep::Full));
    let (engine, _task) = spawn_engine(
        config,
        registry,
        Arc::clone(&state),
        Arc::new(LoggingSecondScreen),
        Arc::new(NullSlideController::new()),
    );

    let app = create_router(AppContext { state, engine });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_reports_module() {
    let addr = start_server().await;
    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "cuedeck-engine");
}

#[tokio::test]
async fn show_editing_and_status_flow() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let scene: Value = client
        .post(format!("http://{}/scenes", addr))
        .json(&json!({ "name": "Act 1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let scene_id = scene["scene_id"].as_str().unwrap().to_string();

    let cue: Value = client
        .post(format!("http://{}/cues", addr))
        .json(&json!({
            "scene_id": scene_id,
            "kind": "audio",
            "path": "/media/track.mp3"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let cue_id = cue["cue_id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("http://{}/cues/{}/select", addr, cue_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let status: Value = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["selection"]["scene_id"].as_str().unwrap(), scene_id);
    assert_eq!(status["selection"]["cue_id"].as_str().unwrap(), cue_id);
    assert_eq!(status["output"]["surface"], "blackout");
    assert_eq!(status["decks"]["A"]["phase"], "Empty");
}

#[tokio::test]
async fn invalid_trim_is_bad_request() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let scene: Value = client
        .post(format!("http://{}/scenes", addr))
        .json(&json!({ "name": "Act 1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let cue: Value = client
        .post(format!("http://{}/cues", addr))
        .json(&json!({
            "scene_id": scene["scene_id"],
            "kind": "video",
            "path": "/media/clip.mp4"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .post(format!(
            "http://{}/cues/{}/trim",
            addr,
            cue["cue_id"].as_str().unwrap()
        ))
        .json(&json!({ "start": 20.0, "stop": 5.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trim_accepts_operator_timecodes() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let scene: Value = client
        .post(format!("http://{}/scenes", addr))
        .json(&json!({ "name": "Act 1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let cue: Value = client
        .post(format!("http://{}/cues", addr))
        .json(&json!({
            "scene_id": scene["scene_id"],
            "kind": "video",
            "path": "/media/clip.mp4"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let cue_id = cue["cue_id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("http://{}/cues/{}/trim", addr, cue_id))
        .json(&json!({ "start": "0:05", "stop": "1:23.5" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let snapshot: Value = client
        .get(format!("http://{}/show/snapshot", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stored = &snapshot["scenes"][0]["cues"][0];
    assert_eq!(stored["start_offset"], 5.0);
    assert_eq!(stored["stop_offset"], 83.5);

    // Garbage timecode is rejected at edit time
    let response = client
        .post(format!("http://{}/cues/{}/trim", addr, cue_id))
        .json(&json!({ "start": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn snapshot_roundtrip_over_http() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let scene: Value = client
        .post(format!("http://{}/scenes", addr))
        .json(&json!({ "name": "Act 1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    client
        .post(format!("http://{}/cues", addr))
        .json(&json!({
            "scene_id": scene["scene_id"],
            "kind": "image",
            "path": "/media/title.png"
        }))
        .send()
        .await
        .unwrap();

    let snapshot: Value = client
        .get(format!("http://{}/show/snapshot", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["scenes"].as_array().unwrap().len(), 1);

    let response = client
        .put(format!("http://{}/show/snapshot", addr))
        .json(&snapshot)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let restored: Value = client
        .get(format!("http://{}/show/snapshot", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(restored["scenes"], snapshot["scenes"]);
}

#[tokio::test]
async fn unknown_deck_is_not_found() {
    let addr = start_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/decks/c/stop", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
