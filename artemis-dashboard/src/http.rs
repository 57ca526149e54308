/**
 * API HTTP ARTEMIS - Vue JSON du tableau de bord
 *
 * RÔLE :
 * Expose la dernière vue rendue par le coordinateur et relaie les actions
 * opérateur (focus carte, réponse d'alerte, fermeture) sous forme de commandes.
 * Aucun handler ne touche l'état directement : lecture via watch, écriture via mpsc.
 *
 * ROUTES :
 * - /health, /system/health : supervision
 * - /auth/login : login de démonstration
 * - /dashboard, /devices, /markers, /alert : vue courante
 * - /devices/{id}/focus, /alert/respond, /alert/dismiss : actions opérateur
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert::AlertPanel;
use crate::auth::{check_login, LoginError, LoginRequest, LoginSuccess};
use crate::config::LoginConf;
use crate::dashboard::DashboardHandle;
use crate::error::DashboardError;
use crate::health::{DashboardHealth, HealthTracker};
use crate::models::OperatorResponse;
use crate::view::{DashboardView, DeviceCard, FocusTarget, Marker};

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    pub health: HealthTracker,
    pub login: LoginConf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespondRequest {
    false_alarm: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondResult {
    pub emitted: bool,
    pub response: Option<OperatorResponse>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/auth/login", post(login))
        .route("/dashboard", get(get_dashboard))
        .route("/devices", get(get_devices))
        .route("/devices/{id}", get(get_device))
        .route("/devices/{id}/focus", post(focus_device))
        .route("/markers", get(get_markers))
        .route("/alert", get(get_alert))
        .route("/alert/respond", post(respond_to_alert))
        .route("/alert/dismiss", post(dismiss_alert))
        .with_state(app_state)
}

fn coordinator_error(e: DashboardError) -> StatusCode {
    warn!("operator action failed: {}", e);
    StatusCode::SERVICE_UNAVAILABLE
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<DashboardHealth> {
    let view = app.dashboard.view();
    Json(app.health.get_health(&view))
}

// POST /auth/login
async fn login(
    State(app): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginSuccess>, (StatusCode, Json<serde_json::Value>)> {
    match check_login(&req, &app.login) {
        Ok(success) => {
            info!("operator {} logged in", success.user);
            Ok(Json(success))
        }
        Err(e) => {
            let code = match e {
                LoginError::MissingFields => StatusCode::BAD_REQUEST,
                LoginError::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            };
            Err((code, Json(serde_json::json!({ "error": e.to_string() }))))
        }
    }
}

// GET /dashboard
async fn get_dashboard(State(app): State<AppState>) -> Json<DashboardView> {
    Json(app.dashboard.view())
}

// GET /devices
async fn get_devices(State(app): State<AppState>) -> Json<Vec<DeviceCard>> {
    Json(app.dashboard.view().cards)
}

// GET /devices/{id}
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceCard>, StatusCode> {
    let view = app.dashboard.view();
    let Some(card) = view.card(&id) else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(card.clone()))
}

// POST /devices/{id}/focus
async fn focus_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FocusTarget>, StatusCode> {
    match app.dashboard.focus(&id).await.map_err(coordinator_error)? {
        Some(target) => Ok(Json(target)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// GET /markers
async fn get_markers(State(app): State<AppState>) -> Json<Vec<Marker>> {
    Json(app.dashboard.view().markers)
}

// GET /alert
async fn get_alert(State(app): State<AppState>) -> Json<Option<AlertPanel>> {
    Json(app.dashboard.view().alert)
}

// POST /alert/respond
async fn respond_to_alert(
    State(app): State<AppState>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResult>, StatusCode> {
    let response = app
        .dashboard
        .respond(req.false_alarm)
        .await
        .map_err(coordinator_error)?;
    Ok(Json(RespondResult { emitted: response.is_some(), response }))
}

// POST /alert/dismiss
async fn dismiss_alert(State(app): State<AppState>) -> Result<StatusCode, StatusCode> {
    app.dashboard.dismiss().await.map_err(coordinator_error)?;
    Ok(StatusCode::NO_CONTENT)
}
