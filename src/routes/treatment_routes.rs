// src/routes/treatment_routes.rs

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    filters::TreatmentFilter,
    middleware::auth_context::AuthContext,
    models::{AppState, Treatment},
    pagination::SortDirection,
    routes::{ApiOk, PageParams, PageResponse},
    services::NewTreatment,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/treatments", post(record_treatment).get(list_treatments))
        .route("/treatments/{treatment_id}", get(get_treatment))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListTreatmentsQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<SortDirection>,

    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
}

/// Linking an appointment marks it COMPLETED.
pub async fn record_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NewTreatment>,
) -> Result<(StatusCode, Json<ApiOk<Treatment>>), ApiError> {
    let treatment = state
        .appointments()
        .record_treatment(&auth.scope(), req, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: treatment })))
}

pub async fn list_treatments(
    State(state): State<AppState>,
    auth: AuthContext,
    query: Result<Query<ListTreatmentsQuery>, QueryRejection>,
) -> Result<Json<PageResponse<Treatment>>, ApiError> {
    let Query(q) = query?;
    let filter = TreatmentFilter {
        patient_id: q.patient_id,
        doctor_id: q.doctor_id,
        appointment_id: q.appointment_id,
    };
    let params = PageParams {
        cursor: q.cursor,
        limit: q.limit,
        sort: q.sort,
    };
    let page = params.request(&state, "treatment", &filter)?;

    let result = state
        .appointments()
        .list_treatments(&auth.scope(), &filter, &page)
        .await?;

    Ok(Json(result.into()))
}

pub async fn get_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Treatment>>, ApiError> {
    let treatment = state
        .appointments()
        .get_treatment(&auth.scope(), treatment_id)
        .await?;

    Ok(Json(ApiOk { data: treatment }))
}
