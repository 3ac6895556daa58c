// src/routes/patient_routes.rs

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    filters::PatientFilter,
    middleware::auth_context::AuthContext,
    models::{AppState, Gender, Patient},
    pagination::SortDirection,
    routes::{ApiOk, PageParams, PageResponse},
    services::NewPatient,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(list_patients))
        .route("/patients/{patient_id}", get(get_patient).delete(delete_patient))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListPatientsQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<SortDirection>,

    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NewPatient>,
) -> Result<(StatusCode, Json<ApiOk<Patient>>), ApiError> {
    let patient = state
        .directory()
        .create_patient(&auth.scope(), req, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: patient })))
}

pub async fn list_patients(
    State(state): State<AppState>,
    auth: AuthContext,
    query: Result<Query<ListPatientsQuery>, QueryRejection>,
) -> Result<Json<PageResponse<Patient>>, ApiError> {
    let Query(q) = query?;
    let filter = PatientFilter {
        gender: q.gender,
        phone: q.phone,
        name: q.name,
        created_from: q.created_from,
        created_to: q.created_to,
    }
    .normalize()?;
    let params = PageParams {
        cursor: q.cursor,
        limit: q.limit,
        sort: q.sort,
    };
    let page = params.request(&state, "patient", &filter)?;

    let result = state.directory().list_patients(&auth.scope(), &filter, &page).await?;
    Ok(Json(result.into()))
}

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Patient>>, ApiError> {
    let patient = state.directory().get_patient(&auth.scope(), patient_id).await?;
    Ok(Json(ApiOk { data: patient }))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.ensure_admin("delete patients")?;

    state.directory().delete_patient(&auth.scope(), patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
