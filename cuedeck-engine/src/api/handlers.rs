//! HTTP request handlers
//!
//! Thin adapters between HTTP and the engine command surface. Handlers
//! never touch engine state directly: reads come from `SharedState`
//! snapshots, writes go through the `EngineHandle`.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::show::{CueKind, ShowSnapshot};
use crate::state::{DeckSnapshot, SelectionSnapshot};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cuedeck_common::events::{DeckId, OverlayInfo, VolumeStep};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct EngineStatusResponse {
    decks: HashMap<DeckId, DeckSnapshot>,
    selection: SelectionSnapshot,
    output: OverlayInfo,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct SeekResponse {
    position_secs: f64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    step: VolumeStep,
}

#[derive(Debug, Deserialize)]
pub struct LoopRequest {
    enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    paused: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddSceneRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct AddSceneResponse {
    scene_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RenameSceneRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCueRequest {
    scene_id: Uuid,
    kind: CueKind,
    path: std::path::PathBuf,
}

#[derive(Debug, Serialize)]
pub struct AddCueResponse {
    cue_id: Uuid,
}

/// Trim points arrive either as plain seconds or as operator timecodes
/// (`"1:23.5"`), matching how they are entered on the control surface.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TimeField {
    Seconds(f64),
    Timecode(String),
}

impl TimeField {
    fn as_seconds(&self) -> Result<f64, Error> {
        match self {
            TimeField::Seconds(seconds) => Ok(*seconds),
            TimeField::Timecode(text) => cuedeck_common::time::parse_timecode(text)
                .ok_or_else(|| Error::InvalidTiming(format!("unparsable timecode '{}'", text))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrimRequest {
    start: TimeField,
    stop: Option<TimeField>,
}

#[derive(Debug, Deserialize)]
pub struct MoveCueRequest {
    /// Target scene (ownership transfer when it differs from the owner)
    scene_id: Option<Uuid>,
    index: Option<usize>,
    /// Reorder within the owning scene when no target scene is given
    delta: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CueMetaRequest {
    name: Option<String>,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    token: u64,
}

type ErrorReply = (StatusCode, Json<StatusMessage>);

/// Map engine errors onto HTTP statuses
fn error_reply(e: Error) -> ErrorReply {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidTiming(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) | Error::AlreadyRunning(_) | Error::Unsupported(_) => {
            StatusCode::CONFLICT
        }
        Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusMessage {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusMessage> {
    Json(StatusMessage {
        status: "ok".to_string(),
    })
}

fn parse_deck(deck: &str) -> Result<DeckId, ErrorReply> {
    match deck {
        "a" | "A" => Ok(DeckId::A),
        "b" | "B" => Ok(DeckId::B),
        other => Err(error_reply(Error::NotFound(format!("deck {}", other)))),
    }
}

// ============================================================================
// Health and Status
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "cuedeck-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - Full engine status snapshot
pub async fn status(State(ctx): State<AppContext>) -> Json<EngineStatusResponse> {
    Json(EngineStatusResponse {
        decks: ctx.state.decks().await,
        selection: ctx.state.selection().await,
        output: ctx.state.output().await,
    })
}

// ============================================================================
// Show Transport
// ============================================================================

/// POST /show/go - GO LIVE trigger
pub async fn go_live(State(ctx): State<AppContext>) -> Result<Json<StatusMessage>, ErrorReply> {
    info!("GO LIVE");
    ctx.engine.go_live().await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /show/play - Load and start the selected cue
pub async fn play_selected(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.play_selected().await.map_err(error_reply)?;
    Ok(ok())
}

/// GET /show/snapshot - Export the show for the persistence collaborator
pub async fn get_snapshot(
    State(ctx): State<AppContext>,
) -> Result<Json<ShowSnapshot>, ErrorReply> {
    let snapshot = ctx.engine.snapshot().await.map_err(error_reply)?;
    Ok(Json(snapshot))
}

/// PUT /show/snapshot - Rehydrate the show from a snapshot
pub async fn restore_snapshot(
    State(ctx): State<AppContext>,
    Json(snapshot): Json<ShowSnapshot>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.restore(snapshot).await.map_err(error_reply)?;
    Ok(ok())
}

// ============================================================================
// Deck Transport
// ============================================================================

/// POST /decks/:deck/play
pub async fn deck_play(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    ctx.engine.play(deck).await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /decks/:deck/stop
pub async fn deck_stop(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    ctx.engine.stop(deck).await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /decks/:deck/pause - Toggle pause (Unsupported on backends that
/// cannot pause mid-stream)
pub async fn deck_pause(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
) -> Result<Json<PauseResponse>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    let paused = ctx.engine.toggle_pause(deck).await.map_err(error_reply)?;
    Ok(Json(PauseResponse { paused }))
}

/// POST /decks/:deck/seek
pub async fn deck_seek(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<SeekResponse>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    let position_secs = ctx
        .engine
        .seek(deck, req.seconds)
        .await
        .map_err(error_reply)?;
    Ok(Json(SeekResponse { position_secs }))
}

/// POST /decks/:deck/volume - Discrete volume step (mute/half/full)
pub async fn deck_volume(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    ctx.engine
        .step_volume(deck, req.step)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

/// POST /decks/:deck/loop
pub async fn deck_loop(
    State(ctx): State<AppContext>,
    Path(deck): Path<String>,
    Json(req): Json<LoopRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let deck = parse_deck(&deck)?;
    ctx.engine
        .set_loop(deck, req.enabled)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

// ============================================================================
// Scene Endpoints
// ============================================================================

/// POST /scenes - Create a scene
pub async fn add_scene(
    State(ctx): State<AppContext>,
    Json(req): Json<AddSceneRequest>,
) -> Result<Json<AddSceneResponse>, ErrorReply> {
    let scene_id = ctx.engine.add_scene(req.name).await.map_err(error_reply)?;
    Ok(Json(AddSceneResponse { scene_id }))
}

/// DELETE /scenes/:scene_id
pub async fn remove_scene(
    State(ctx): State<AppContext>,
    Path(scene_id): Path<Uuid>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine
        .remove_scene(scene_id)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

/// POST /scenes/:scene_id/select
pub async fn select_scene(
    State(ctx): State<AppContext>,
    Path(scene_id): Path<Uuid>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine
        .select_scene(scene_id)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

/// POST /scenes/:scene_id/rename
pub async fn rename_scene(
    State(ctx): State<AppContext>,
    Path(scene_id): Path<Uuid>,
    Json(req): Json<RenameSceneRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine
        .rename_scene(scene_id, req.name)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

// ============================================================================
// Cue Endpoints
// ============================================================================

/// POST /cues - Add a cue to a scene
pub async fn add_cue(
    State(ctx): State<AppContext>,
    Json(req): Json<AddCueRequest>,
) -> Result<Json<AddCueResponse>, ErrorReply> {
    let cue_id = ctx
        .engine
        .add_cue(req.scene_id, req.kind, req.path)
        .await
        .map_err(error_reply)?;
    Ok(Json(AddCueResponse { cue_id }))
}

/// DELETE /cues/:cue_id
pub async fn remove_cue(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.remove_cue(cue_id).await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /cues/:cue_id/select
pub async fn select_cue(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.select_cue(cue_id).await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /cues/:cue_id/trim - Set trim points (validated at edit time)
pub async fn trim_cue(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
    Json(req): Json<TrimRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let start = req.start.as_seconds().map_err(error_reply)?;
    let stop = req
        .stop
        .as_ref()
        .map(TimeField::as_seconds)
        .transpose()
        .map_err(error_reply)?;
    ctx.engine
        .trim_cue(cue_id, start, stop)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

/// POST /cues/:cue_id/move - Reorder within a scene or transfer ownership
pub async fn move_cue(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
    Json(req): Json<MoveCueRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    let result = match (req.scene_id, req.delta) {
        (Some(scene_id), _) => {
            ctx.engine
                .move_cue(cue_id, scene_id, req.index.unwrap_or(usize::MAX))
                .await
        }
        (None, Some(delta)) => ctx.engine.shift_cue(cue_id, delta).await,
        (None, None) => Err(Error::InvalidState(
            "move needs a target scene or a delta".to_string(),
        )),
    };
    result.map_err(error_reply)?;
    Ok(ok())
}

/// POST /cues/:cue_id/meta - Rename / annotate
pub async fn update_cue_meta(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
    Json(req): Json<CueMetaRequest>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine
        .update_cue_meta(cue_id, req.name, req.note)
        .await
        .map_err(error_reply)?;
    Ok(ok())
}

/// POST /cues/:cue_id/preview - Kick off preview extraction
pub async fn request_preview(
    State(ctx): State<AppContext>,
    Path(cue_id): Path<Uuid>,
) -> Result<Json<PreviewResponse>, ErrorReply> {
    let token = ctx
        .engine
        .request_preview(cue_id)
        .await
        .map_err(error_reply)?;
    Ok(Json(PreviewResponse { token }))
}

// ============================================================================
// Slide Navigation
// ============================================================================

/// POST /slides/next
pub async fn slide_next(State(ctx): State<AppContext>) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.slide_next().await.map_err(error_reply)?;
    Ok(ok())
}

/// POST /slides/previous
pub async fn slide_previous(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusMessage>, ErrorReply> {
    ctx.engine.slide_previous().await.map_err(error_reply)?;
    Ok(ok())
}
