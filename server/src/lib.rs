//! Transport adapter: routes WebSocket connections to registry sessions and
//! serves the non-interactive fallback endpoint.
//!
//! The adapter stays thin on purpose: it parses inbound JSON into
//! [`ClientOp`]s, forwards session events back out, and reports the socket
//! closing as a disconnect. Everything stateful lives in the session core.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;

use runcell_core::SessionRegistry;
use runcell_core::run_one_shot;
use runcell_protocol::ClientOp;
use runcell_protocol::OneShotRequest;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
struct AppState {
    registry: SessionRegistry,
}

pub fn router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/execute", post(execute_handler))
        .with_state(AppState { registry })
}

/// Serves until ctrl-c. Session cleanup on shutdown follows from the
/// connections closing, not from anything transport-specific.
pub async fn serve(
    listener: tokio::net::TcpListener,
    registry: SessionRegistry,
) -> std::io::Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let id = state.registry.connect(events_tx).await;
    tracing::info!(%id, "client connected");

    let (mut sink, mut stream) = socket.split();
    let forward = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientOp>(&text) {
                Ok(op) => {
                    state.registry.dispatch(id, op).await;
                }
                Err(err) => {
                    tracing::warn!(%id, error = %err, "ignoring malformed client message");
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the socket layer; binary frames are not
            // part of the protocol.
            _ => {}
        }
    }

    // Whether the close was clean or the stream just errored out, the
    // session's cleanup path is the same.
    state.registry.disconnect(id).await;
    forward.abort();
    tracing::info!(%id, "client disconnected");
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<OneShotRequest>,
) -> Response {
    match run_one_shot(state.registry.config(), &request.code, request.timeout).await {
        Ok(response) => Json(response).into_response(),
        Err(err) if err.is_validation() => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "one-shot execution failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
