//! Routes for the story context.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use cadex_story::application::{command_handlers, query_handlers};
use cadex_story::domain::commands;
use cadex_core::error::DomainError;
use cadex_story::domain::story::{PlayerPrivateRecord, PlayerPublicView, StoryAggregate};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /new-story.
#[derive(Debug, Deserialize)]
pub struct NewStoryRequest {
    /// Display name of the admin.
    pub name: String,
    /// Real identity of the admin.
    pub uid: String,
    /// Optional display color.
    #[serde(default)]
    pub color: Option<String>,
}

/// Request body for POST /start-story and POST /close-story.
#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    /// The story to act on.
    pub story_id: Uuid,
    /// Real identity of the caller.
    pub uid: String,
}

/// Request body for POST /new-player.
#[derive(Debug, Deserialize)]
pub struct NewPlayerRequest {
    /// The story to join.
    pub story_id: Uuid,
    /// Real identity of the player.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Optional display color.
    #[serde(default)]
    pub color: Option<String>,
}

/// Request body for POST /play.
#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// The story being played.
    pub story_id: Uuid,
    /// Real identity of the player.
    pub uid: String,
    /// Text revealed when the story closes.
    pub head: String,
    /// Text handed to the next player.
    pub tail: String,
}

/// Request body for POST /update-player.
#[derive(Debug, Deserialize)]
pub struct UpdatePlayerRequest {
    /// The story the player belongs to.
    pub story_id: Uuid,
    /// Real identity of the player.
    pub uid: String,
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New display color.
    #[serde(default)]
    pub color: Option<String>,
}

/// Response body for POST /new-story.
#[derive(Debug, Serialize)]
pub struct NewStoryResponse {
    /// The admin's public view.
    pub admin: PlayerPublicView,
    /// The freshly created story.
    pub story: StoryAggregate,
}

/// Response body for commands issued by one player.
#[derive(Debug, Serialize)]
pub struct PlayerResponse {
    /// The caller's private record.
    pub player: PlayerPrivateRecord,
    /// The story after the command.
    pub story: StoryAggregate,
}

fn public_view(story: &StoryAggregate, key: &str) -> Result<PlayerPublicView, DomainError> {
    story
        .players
        .get(key)
        .cloned()
        .ok_or_else(|| DomainError::PlayerNotFound(key.to_owned()))
}

/// POST /new-story
#[instrument(skip(state, request))]
async fn new_story(
    State(state): State<AppState>,
    Json(request): Json<NewStoryRequest>,
) -> Result<Json<NewStoryResponse>, ApiError> {
    let command = commands::NewStory {
        correlation_id: Uuid::new_v4(),
        name: request.name,
        uid: request.uid,
        color: request.color,
    };

    info!(correlation_id = %command.correlation_id, "handling new_story command");

    let result = command_handlers::handle_new_story(&command, state.story_context()).await?;

    let admin = public_view(&result.story, &result.story.admin)?;

    Ok(Json(NewStoryResponse {
        admin,
        story: result.story,
    }))
}

/// POST /start-story
#[instrument(skip(state, request), fields(story_id = %request.story_id))]
async fn start_story(
    State(state): State<AppState>,
    Json(request): Json<AdminRequest>,
) -> Result<Json<StoryAggregate>, ApiError> {
    let command = commands::StartStory {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        uid: request.uid,
    };

    info!(correlation_id = %command.correlation_id, "handling start_story command");

    let story =
        command_handlers::handle_start_story(&command, state.story_context(), &state.rng).await?;

    Ok(Json(story))
}

/// POST /new-player
#[instrument(skip(state, request), fields(story_id = %request.story_id))]
async fn new_player(
    State(state): State<AppState>,
    Json(request): Json<NewPlayerRequest>,
) -> Result<Json<PlayerPublicView>, ApiError> {
    let command = commands::NewPlayer {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        uid: request.uid,
        name: request.name,
        color: request.color,
    };

    info!(correlation_id = %command.correlation_id, "handling new_player command");

    let result = command_handlers::handle_new_player(&command, state.story_context()).await?;

    Ok(Json(public_view(&result.story, &result.player.key)?))
}

/// POST /play
#[instrument(skip(state, request), fields(story_id = %request.story_id))]
async fn play(
    State(state): State<AppState>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let command = commands::Play {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        uid: request.uid,
        head: request.head,
        tail: request.tail,
    };

    info!(correlation_id = %command.correlation_id, "handling play command");

    let result = command_handlers::handle_play(&command, state.story_context()).await?;

    Ok(Json(PlayerResponse {
        player: result.player,
        story: result.story,
    }))
}

/// POST /update-player
#[instrument(skip(state, request), fields(story_id = %request.story_id))]
async fn update_player(
    State(state): State<AppState>,
    Json(request): Json<UpdatePlayerRequest>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let command = commands::UpdatePlayer {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        uid: request.uid,
        name: request.name,
        color: request.color,
    };

    info!(correlation_id = %command.correlation_id, "handling update_player command");

    let result = command_handlers::handle_update_player(&command, state.story_context()).await?;

    Ok(Json(PlayerResponse {
        player: result.player,
        story: result.story,
    }))
}

/// POST /close-story
#[instrument(skip(state, request), fields(story_id = %request.story_id))]
async fn close_story(
    State(state): State<AppState>,
    Json(request): Json<AdminRequest>,
) -> Result<Json<StoryAggregate>, ApiError> {
    let command = commands::CloseStory {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        uid: request.uid,
    };

    info!(correlation_id = %command.correlation_id, "handling close_story command");

    let story = command_handlers::handle_close_story(&command, state.story_context()).await?;

    Ok(Json(story))
}

/// GET /{story_id}
#[instrument(skip(state))]
async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<StoryAggregate>, ApiError> {
    let story = query_handlers::get_story(story_id, &*state.store).await?;
    Ok(Json(story))
}

/// GET /{story_id}/players/{uid}
#[instrument(skip(state, uid))]
async fn get_player(
    State(state): State<AppState>,
    Path((story_id, uid)): Path<(Uuid, String)>,
) -> Result<Json<PlayerPrivateRecord>, ApiError> {
    let player = query_handlers::get_player(story_id, &uid, &*state.store).await?;
    Ok(Json(player))
}

/// Returns the router for the story context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new-story", post(new_story))
        .route("/start-story", post(start_story))
        .route("/new-player", post(new_player))
        .route("/play", post(play))
        .route("/update-player", post(update_player))
        .route("/close-story", post(close_story))
        .route("/{story_id}", get(get_story))
        .route("/{story_id}/players/{uid}", get(get_player))
}
