// src/routes/doctor_routes.rs

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
    filters::DoctorFilter,
    middleware::auth_context::AuthContext,
    models::{AppState, Doctor},
    pagination::SortDirection,
    routes::{ApiOk, PageParams, PageResponse},
    services::NewDoctor,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", post(create_doctor).get(list_doctors))
        .route("/doctors/{doctor_id}", get(get_doctor).delete(delete_doctor))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDoctorsQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<SortDirection>,

    pub specialization: Option<String>,
    pub active: Option<bool>,
}

pub async fn create_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NewDoctor>,
) -> Result<(StatusCode, Json<ApiOk<Doctor>>), ApiError> {
    let doctor = state
        .directory()
        .create_doctor(&auth.scope(), req, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: doctor })))
}

pub async fn list_doctors(
    State(state): State<AppState>,
    auth: AuthContext,
    query: Result<Query<ListDoctorsQuery>, QueryRejection>,
) -> Result<Json<PageResponse<Doctor>>, ApiError> {
    let Query(q) = query?;
    let filter = DoctorFilter {
        specialization: q.specialization,
        active: q.active,
    }
    .normalize();
    let params = PageParams {
        cursor: q.cursor,
        limit: q.limit,
        sort: q.sort,
    };
    let page = params.request(&state, "doctor", &filter)?;

    let result = state.directory().list_doctors(&auth.scope(), &filter, &page).await?;
    Ok(Json(result.into()))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Doctor>>, ApiError> {
    let doctor = state.directory().get_doctor(&auth.scope(), doctor_id).await?;
    Ok(Json(ApiOk { data: doctor }))
}

pub async fn delete_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.ensure_admin("delete doctors")?;

    state.directory().delete_doctor(&auth.scope(), doctor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
