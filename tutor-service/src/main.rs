// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use lambda_http::run as lambda_run;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tutor_common::{
    CreateGameRequest, CreateGameResponse, DEFAULT_DIFFICULTY, Movement, MovementRequest,
    ResponseCatalog, Tutor, TutorError, TutorResponse, expand_env_vars,
};

#[derive(Clone)]
struct AppState {
    store: Arc<RwLock<InMemoryStore>>,
    tutor: Arc<Tutor>,
}

#[derive(Default)]
struct InMemoryStore {
    games: HashMap<String, GameRecord>,
}

#[derive(Debug, Clone)]
struct GameRecord {
    game_id: String,
    movements: Vec<Movement>,
    /// Unbounded in both directions; only `CHANGE_DIFF` replies move it.
    difficulty: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GameRecord {
    fn new(game_id: &str) -> Self {
        let now = Utc::now();
        Self {
            game_id: game_id.to_string(),
            movements: Vec::new(),
            difficulty: DEFAULT_DIFFICULTY,
            created_at: now,
            updated_at: now,
        }
    }

    fn record_movement(&mut self, movement: Movement, response: &TutorResponse) {
        self.movements.push(movement);
        if let Some(level_plus) = response.level_change() {
            self.difficulty = self.difficulty.saturating_add(level_plus);
        }
        self.updated_at = Utc::now();
    }
}

impl InMemoryStore {
    /// Replace any existing record with a fresh one.
    fn reset(&mut self, game_id: &str) -> &GameRecord {
        self.games.insert(game_id.to_string(), GameRecord::new(game_id));
        &self.games[game_id]
    }

    /// Unknown ids are default-created rather than rejected.
    fn get_or_create(&mut self, game_id: &str) -> &mut GameRecord {
        self.games.entry(game_id.to_string()).or_insert_with(|| {
            info!(game_id = %game_id, "auto-created game record for unknown id");
            GameRecord::new(game_id)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GameRecordResponse {
    game_id: String,
    movements: Vec<Movement>,
    difficulty: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&GameRecord> for GameRecordResponse {
    fn from(game: &GameRecord) -> Self {
        Self {
            game_id: game.game_id.clone(),
            movements: game.movements.clone(),
            difficulty: game.difficulty,
            created_at: game.created_at,
            updated_at: game.updated_at,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tutor_service=debug,tower_http=info".to_string()),
        )
        .init();

    let catalog = match load_catalog_config() {
        Some(catalog) => {
            info!(
                speech_texts = catalog.speech_texts.len(),
                tutorial_videos = catalog.tutorial_videos,
                "loaded response catalog from YAML config"
            );
            catalog
        }
        None => ResponseCatalog::default(),
    };
    let seed = parse_rng_seed();
    if let Some(seed) = seed {
        info!(seed, "tutor RNG seeded from environment");
    }

    let state = AppState {
        store: Arc::new(RwLock::new(InMemoryStore::default())),
        tutor: Arc::new(Tutor::new(catalog, seed)),
    };

    let app = build_router(state);

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; running tutor-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr = parse_bind_addr("TUTOR_SERVICE_BIND", "0.0.0.0:8000")?;
    info!(%bind_addr, "tutor-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn load_catalog_config() -> Option<ResponseCatalog> {
    let path = std::env::var("TUTOR_CATALOG_CONFIG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path, error = %error, "failed to read response catalog file");
            return None;
        }
    };

    if raw.trim().is_empty() {
        warn!(path = %path, "response catalog file is empty");
        return None;
    }

    match parse_catalog_yaml(&raw) {
        Ok(catalog) => Some(catalog),
        Err(error) => {
            warn!(path = %path, error = %format!("{error:#}"), "ignoring response catalog config");
            None
        }
    }
}

fn parse_catalog_yaml(raw: &str) -> anyhow::Result<ResponseCatalog> {
    let catalog = serde_yaml::from_str::<ResponseCatalog>(&expand_env_vars(raw))
        .context("failed to parse response catalog yaml")?;
    catalog.validate()?;
    Ok(catalog)
}

fn parse_rng_seed() -> Option<u64> {
    let value = std::env::var("TUTOR_RNG_SEED").ok()?;
    match value.trim().parse::<u64>() {
        Ok(seed) => Some(seed),
        Err(error) => {
            warn!(value = %value, error = %error, "ignoring invalid TUTOR_RNG_SEED");
            None
        }
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/game", post(create_game_handler))
        .route(
            "/game/{game_id}",
            post(submit_movement_handler).get(get_game_handler),
        )
        .route("/game/{game_id}/best_next", get(best_next_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "tutor-service"}))
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Json<CreateGameResponse> {
    let mut store = state.store.write().await;
    let game = store.reset(&request.game_id);
    info!(game_id = %game.game_id, "game created");

    Json(CreateGameResponse {
        message: "Game created".to_string(),
        game_id: game.game_id.clone(),
    })
}

async fn submit_movement_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(request): Json<MovementRequest>,
) -> Result<Json<TutorResponse>, ApiError> {
    let mut store = state.store.write().await;
    let game = store.get_or_create(&game_id);

    let response = state.tutor.respond_to_movement()?;
    game.record_movement(request.movement, &response);

    debug!(
        game_id = %game.game_id,
        response_type = response.tag(),
        movements = game.movements.len(),
        difficulty = game.difficulty,
        "answered movement"
    );

    Ok(Json(response))
}

async fn best_next_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<TutorResponse>, ApiError> {
    let mut store = state.store.write().await;
    let game = store.get_or_create(&game_id);
    let response = state.tutor.best_next()?;

    debug!(game_id = %game.game_id, "answered best-next request");
    Ok(Json(response))
}

async fn get_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<GameRecordResponse>, ApiError> {
    let store = state.store.read().await;
    let game = store
        .games
        .get(&game_id)
        .ok_or_else(|| ApiError::not_found(format!("game {} not found", game_id)))?;

    Ok(Json(GameRecordResponse::from(game)))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<TutorError> for ApiError {
    fn from(error: TutorError) -> Self {
        Self::internal(format!("tutor failed to answer: {error}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
