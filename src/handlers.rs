use crate::app_state::AppState;
use crate::combat::action::BattleAction;
use crate::combat::events::{BattleEvent, BattleEventEnvelope};
use crate::combat::messages::{
    ErrorResponse, StartBattleRequest, StartBattleResponse, SubmitActionRequest, SubmitActionResponse,
};
use crate::combat::utils;
use crate::error::{BattleError, ErrorKind};
use axum::extract::ws::Utf8Bytes;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl IntoResponse for BattleError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Configuration => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Protocol => StatusCode::CONFLICT,
        };
        (status, Json(ErrorResponse { kind, message: self.to_string() })).into_response()
    }
}

// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "OK"
}

pub async fn start_battle_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartBattleRequest>,
) -> Result<impl IntoResponse, BattleError> {
    let setup = utils::build_battle_setup(request, &state.move_repository)?;
    let (battle_id, initial_event) = state.battle_manager.start_battle(setup).await?;
    Ok((StatusCode::CREATED, Json(StartBattleResponse { battle_id, initial_event })))
}

pub async fn submit_action_handler(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
    Json(request): Json<SubmitActionRequest>,
) -> Result<impl IntoResponse, BattleError> {
    let action = BattleAction::new(request.side_identity, request.action);
    let ack = state.battle_manager.submit_action(battle_id, action).await?;
    Ok(Json(SubmitActionResponse { battle_id, ack }))
}

pub async fn diagnostics_handler(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<impl IntoResponse, BattleError> {
    Ok(Json(state.battle_manager.diagnostics(battle_id).await?))
}

// Handler for per-battle event stream connections
pub async fn ws_battle_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Response {
    if !state.battle_manager.is_active(battle_id) {
        return BattleError::BattleNotFound(battle_id).into_response();
    }
    ws.on_upgrade(move |socket| handle_battle_socket(socket, state, battle_id))
}

fn to_message(envelope: &BattleEventEnvelope) -> Option<Message> {
    match serde_json::to_string(envelope) {
        Ok(json) => Some(Message::Text(Utf8Bytes::from(json))),
        Err(e) => {
            warn!("Failed to encode battle event: {}", e);
            None
        }
    }
}

/// Replay the battle log, then forward live events until `battle_end`
pub async fn handle_battle_socket(socket: WebSocket, state: Arc<AppState>, battle_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the log so nothing falls in between
    let mut rx = state.events.subscribe();
    let backlog = match state.battle_manager.event_log(battle_id).await {
        Ok(log) => log,
        Err(e) => {
            debug!("Battle {} gone before stream started: {}", battle_id, e);
            let _ = sender.close().await;
            return;
        }
    };
    info!("Event stream opened for battle {} ({} events replayed)", battle_id, backlog.len());

    let mut last_sequence = None;
    for envelope in &backlog {
        let Some(message) = to_message(envelope) else { continue };
        if sender.send(message).await.is_err() {
            return;
        }
        last_sequence = Some(envelope.sequence);
        if matches!(envelope.event, BattleEvent::BattleEnd { .. }) {
            let _ = sender.close().await;
            return;
        }
    }

    let mut forward_task = tokio::spawn(async move {
        loop {
            let envelope = match rx.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream for battle {} lagged, skipped {} events", battle_id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if envelope.battle_id != battle_id || Some(envelope.sequence) <= last_sequence {
                continue;
            }
            let Some(message) = to_message(&envelope) else { continue };
            if sender.send(message).await.is_err() {
                break;
            }
            if matches!(envelope.event, BattleEvent::BattleEnd { .. }) {
                let _ = sender.close().await;
                break;
            }
        }
    });

    // Drain client frames so close handshakes are observed
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => client_task.abort(),
        _ = &mut client_task => forward_task.abort(),
    }
    debug!("Event stream closed for battle {}", battle_id);
}
