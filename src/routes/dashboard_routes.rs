// src/routes/dashboard_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
    routes::ApiOk,
    services::{DashboardCounts, Period},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/appointments/{period}", get(appointment_counts))
}

/// Per-status appointment counts for today, this week or this month (UTC).
pub async fn appointment_counts(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(period): Path<Period>,
) -> Result<Json<ApiOk<DashboardCounts>>, ApiError> {
    let counts = state
        .dashboard()
        .counts(&auth.scope(), period, Utc::now())
        .await?;

    Ok(Json(ApiOk { data: counts }))
}
