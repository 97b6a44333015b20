use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use ev_charger_server::constants::{RESULT_DISPLAY_DELAY_MS, TICK_MS};
use ev_charger_server::engine::{GameSession, SessionOptions};
use ev_charger_server::error::LeaderboardError;
use ev_charger_server::leaderboard::{
    build_response, build_session_result, record_session, JsonFileLeaderboard, LeaderboardStore,
};
use ev_charger_server::server_protocol::{parse_client_message, ParsedClientMessage};
use ev_charger_server::server_utils::{
    client_id, parse_leaderboard_limit, sanitize_name, session_seed,
};
use ev_charger_server::types::GameSummary;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_CLIENT_SEQ: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    session: GameSession,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    leaderboard: Arc<dyn LeaderboardStore>,
}

impl ServerState {
    fn new(leaderboard: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            clients: HashMap::new(),
            leaderboard,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let leaderboard_path = std::env::var("LEADERBOARD_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/leaderboard.json"));

    let leaderboard: Arc<dyn LeaderboardStore> =
        Arc::new(JsonFileLeaderboard::open(leaderboard_path));
    let state = Arc::new(Mutex::new(ServerState::new(leaderboard)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving api and websocket only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist"), PathBuf::from("../dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let store = state.lock().await.leaderboard.clone();
    let limit = parse_leaderboard_limit(query.limit.as_deref());
    let fetched = tokio::task::spawn_blocking(move || build_response(store.as_ref(), limit)).await;
    match fetched {
        Ok(Ok(response)) => (StatusCode::OK, Json(json!(response))),
        Ok(Err(error)) => {
            warn!(%error, "leaderboard fetch failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": error.to_string() })),
            )
        }
        Err(error) => {
            error!(%error, "leaderboard task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "leaderboard task failed" })),
            )
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = client_id(NEXT_CLIENT_SEQ.fetch_add(1, Ordering::Relaxed));
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        let session = GameSession::new(session_seed(), SessionOptions::default());
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                session,
            },
        );
        send_welcome(&mut guard, &client_id);
    }
    info!(client = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Leaderboard { limit } => {
            let (store, tx) = {
                let guard = state.lock().await;
                let Some(client) = guard.clients.get(client_id) else {
                    return;
                };
                (guard.leaderboard.clone(), client.tx.clone())
            };
            let fetched =
                tokio::task::spawn_blocking(move || build_response(store.as_ref(), limit)).await;
            let payload = match fetched {
                Ok(Ok(response)) => json!({ "type": "leaderboard", "leaderboard": response }),
                Ok(Err(error)) => {
                    warn!(client = %client_id, %error, "leaderboard fetch failed");
                    json!({ "type": "leaderboard_unavailable", "message": error.to_string() })
                }
                Err(error) => {
                    error!(client = %client_id, %error, "leaderboard task failed");
                    json!({ "type": "leaderboard_unavailable", "message": "leaderboard task failed" })
                }
            };
            deliver_reply(&tx, client_id, &payload);
        }
        ParsedClientMessage::Start { name } => {
            let mut guard = state.lock().await;
            let Some(client) = guard.clients.get_mut(client_id) else {
                return;
            };
            let name = sanitize_name(&name);
            match client.session.start(&name) {
                Ok(()) => {
                    info!(client = %client_id, player = %name, "session started");
                    let payload = json!({
                        "type": "session_started",
                        "playerName": client.session.player_name(),
                        "forecast": client.session.forecast(),
                    });
                    send_to_client(&mut guard, client_id, &payload, QueuePolicy::DisconnectOnFull);
                }
                Err(error) => {
                    debug!(client = %client_id, %error, "start rejected");
                    send_to_client(
                        &mut guard,
                        client_id,
                        &json!({ "type": "error", "message": error.to_string() }),
                        QueuePolicy::DisconnectOnFull,
                    );
                }
            }
            send_state(&mut guard, client_id, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::ToggleCharge => {
            apply_command(&state, client_id, "charge", GameSession::toggle_normal_charge).await;
        }
        ParsedClientMessage::ToggleRapid => {
            apply_command(&state, client_id, "rapid", GameSession::toggle_rapid_charge).await;
        }
        ParsedClientMessage::ReturnToIdle => {
            let mut guard = state.lock().await;
            let Some(client) = guard.clients.get_mut(client_id) else {
                return;
            };
            if !client.session.return_to_idle() {
                debug!(client = %client_id, "return to idle ignored while running");
            }
            send_state(&mut guard, client_id, QueuePolicy::DisconnectOnFull);
        }
    }
}

/// Runs a player command; refusals are no-ops whose status text rides along
/// in the next snapshot.
async fn apply_command<F, E>(state: &SharedState, client_id: &str, label: &str, command: F)
where
    F: FnOnce(&mut GameSession) -> Result<(), E>,
    E: std::fmt::Display,
{
    let mut guard = state.lock().await;
    let Some(client) = guard.clients.get_mut(client_id) else {
        return;
    };
    if let Err(error) = command(&mut client.session) {
        debug!(client = %client_id, command = label, %error, "command refused");
    }
    send_state(&mut guard, client_id, QueuePolicy::DisconnectOnFull);
}

/// Queues a reply produced outside the state lock. Returns false when the
/// client's queue was full or already closed.
fn deliver_reply(tx: &mpsc::Sender<OutboundMessage>, client_id: &str, payload: &Value) -> bool {
    let queued = tx
        .try_send(OutboundMessage::Text(payload.to_string()))
        .is_ok();
    if !queued {
        debug!(client = %client_id, "reply dropped, queue full or closed");
    }
    queued
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    if context.session.phase().is_running() {
        info!(
            client = %client_id,
            player = %context.session.player_name(),
            score = context.session.score(),
            "client left mid-session, session abandoned"
        );
    }
    let _ = context.tx.try_send(OutboundMessage::Close {
        code: 1000,
        reason: "bye".to_string(),
    });
    info!(client = %client_id, "client disconnected");
}

fn send_welcome(state: &mut ServerState, client_id: &str) {
    let Some(client) = state.clients.get(client_id) else {
        return;
    };
    let payload = json!({
        "type": "welcome",
        "clientId": client_id,
        "config": client.session.config,
        "forecast": client.session.forecast(),
    });
    send_to_client(state, client_id, &payload, QueuePolicy::DisconnectOnFull);
    send_state(state, client_id, QueuePolicy::DisconnectOnFull);
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

fn tick_sessions(state: &mut ServerState) {
    let running: Vec<String> = state
        .clients
        .iter()
        .filter(|(_, client)| client.session.phase().is_running())
        .map(|(id, _)| id.clone())
        .collect();

    for client_id in running {
        let finished = {
            let Some(client) = state.clients.get_mut(&client_id) else {
                continue;
            };
            client.session.advance(TICK_MS);
            client.session.take_finished()
        };
        send_state(state, &client_id, QueuePolicy::DropOnFull);

        if let Some(summary) = finished {
            info!(
                client = %client_id,
                player = %summary.player_name,
                score = summary.final_score,
                evs = summary.evs_completed,
                penalties = summary.penalties,
                "session finished"
            );
            send_to_client(
                state,
                &client_id,
                &json!({
                    "type": "game_over",
                    "summary": summary,
                }),
                QueuePolicy::DisconnectOnFull,
            );
            if let Some(client) = state.clients.get(&client_id) {
                spawn_result_delivery(state.leaderboard.clone(), client.tx.clone(), summary);
            }
        }
    }
}

/// Persists the score off the tick loop and delivers the ranked result no
/// sooner than the minimum display delay.
fn spawn_result_delivery(
    store: Arc<dyn LeaderboardStore>,
    tx: mpsc::Sender<OutboundMessage>,
    summary: GameSummary,
) {
    tokio::spawn(async move {
        let persisted_summary = summary.clone();
        let persist = tokio::task::spawn_blocking(move || {
            record_session(store.as_ref(), &persisted_summary, None)
        });
        let (_, joined) = tokio::join!(
            tokio::time::sleep(Duration::from_millis(RESULT_DISPLAY_DELAY_MS)),
            persist
        );
        let result = match joined {
            Ok(result) => result,
            Err(error) => {
                error!(%error, "leaderboard task failed");
                build_session_result(
                    &summary,
                    Err(LeaderboardError::Unavailable(error.to_string())),
                    Ok(Vec::new()),
                    None,
                )
            }
        };
        let payload = json!({ "type": "result", "result": result });
        if tx.try_send(OutboundMessage::Text(payload.to_string())).is_err() {
            debug!(player = %summary.player_name, "result dropped, client gone");
        }
    });
}

fn send_state(state: &mut ServerState, client_id: &str, policy: QueuePolicy) {
    let Some(client) = state.clients.get_mut(client_id) else {
        return;
    };
    let snapshot = client.session.build_snapshot(true);
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        policy,
    );
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        warn!(client = %client_id, "outbound queue full, disconnecting");
        disconnect_client_internal(state, client_id);
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}
