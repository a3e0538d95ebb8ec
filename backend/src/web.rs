use crate::clock;
use crate::error::TrackingError;
use crate::hub::Subscription;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fleettrack_shared::{LookupResponse, Position, ReportRequest, VehicleId, VehicleStatus};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

/// Public router constructor
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicles/{id}", get(lookup_vehicle))
        .route("/api/vehicles/{id}/start", post(start_session))
        .route("/api/vehicles/{id}/report", post(report_position))
        .route("/api/vehicles/{id}/stop", post(stop_session))
        .route("/ws/vehicles/{id}", get(ws_handler))
        .layer(CompressionLayer::new())
        .with_state(state)
}

impl IntoResponse for TrackingError {
    fn into_response(self) -> Response {
        let status = match &self {
            TrackingError::InvalidVehicleId(_) => StatusCode::BAD_REQUEST,
            TrackingError::InvalidState(_) => StatusCode::CONFLICT,
            TrackingError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<&'static str, TrackingError> {
    let id = VehicleId::parse(&id)?;
    // the session table keeps the session alive; no handle is retained here
    state.sessions.start(id);
    Ok("ok")
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ReportRequest>,
) -> Result<&'static str, TrackingError> {
    let id = VehicleId::parse(&id)?;
    let position = Position {
        location: req.location,
        observed_at_ms: req.observed_at_ms.unwrap_or_else(clock::now_ms),
    };
    state.sessions.report(&id, position)?;
    Ok("ok")
}

async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<&'static str, TrackingError> {
    let id = VehicleId::parse(&id)?;
    state.sessions.stop(&id);
    Ok("ok")
}

/// One-shot lookup. Never-seen vehicles answer with the unknown status shape
/// rather than an error, so passengers can poll ids they only suspect exist.
async fn lookup_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LookupResponse>, TrackingError> {
    match state.query.lookup(&id) {
        Ok(response) => Ok(Json(response)),
        Err(TrackingError::NotFound(vehicle_id)) => Ok(Json(LookupResponse {
            vehicle_id,
            status: VehicleStatus::Unknown,
            position: None,
        })),
        Err(err) => Err(err),
    }
}

#[derive(Deserialize)]
struct FleetParams {
    // /api/vehicles?status=active
    status: Option<VehicleStatus>,
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FleetParams>,
) -> Json<Vec<LookupResponse>> {
    let mut fleet = state.query.fleet();
    if let Some(status) = params.status {
        fleet.retain(|entry| entry.status == status);
    }
    Json(fleet)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, TrackingError> {
    let feed = state.query.subscribe_live(&id)?;
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, feed)))
}

/// Forward the live feed to the socket until the session ends or the client
/// goes away. Dropping the subscription on exit deregisters it from the hub.
async fn handle_ws(socket: WebSocket, mut feed: Subscription) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = feed.recv() => {
                let Some(update) = update else {
                    // terminal update already went out; the feed is closed
                    break;
                };
                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(vehicle = %feed.vehicle_id(), "failed to encode update: {err}");
                        continue;
                    }
                };
                if sender.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                // nothing to read from clients; any close or error ends the feed
                if !matches!(msg, Some(Ok(_))) {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}
