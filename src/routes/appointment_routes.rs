// src/routes/appointment_routes.rs

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
    filters::AppointmentFilter,
    middleware::auth_context::AuthContext,
    models::{Appointment, AppointmentStatus, AppState},
    pagination::SortDirection,
    routes::{ApiOk, PageParams, PageResponse},
    services::{AppointmentDetail, AppointmentView, NewAppointment},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}/complete", post(complete_appointment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
}

/* ============================================================
   Query params
   ============================================================ */

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListAppointmentsQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<SortDirection>,

    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub today: Option<bool>,
    // YYYY-MM-DD, inclusive, UTC
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ListAppointmentsQuery {
    fn split(self) -> (PageParams, AppointmentFilter) {
        let filter = AppointmentFilter {
            status: self.status,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            start_date: self.start_date,
            end_date: self.end_date,
            today: self.today.unwrap_or(false),
        };
        let page = PageParams {
            cursor: self.cursor,
            limit: self.limit,
            sort: self.sort,
        };
        (page, filter)
    }
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NewAppointment>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    let appointment = state
        .appointments()
        .create(&auth.scope(), req, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: appointment })))
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    query: Result<Query<ListAppointmentsQuery>, QueryRejection>,
) -> Result<Json<PageResponse<AppointmentView>>, ApiError> {
    let Query(q) = query?;
    let (params, filter) = q.split();
    let criteria = filter.resolve(Utc::now().date_naive())?;
    let page = params.request(&state, "appointment", &criteria)?;

    let result = state
        .appointments()
        .list(&auth.scope(), &criteria, &page)
        .await?;

    Ok(Json(result.into()))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDetail>>, ApiError> {
    let detail = state
        .appointments()
        .get_by_id(&auth.scope(), appointment_id)
        .await?;

    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   Status transitions
   ============================================================ */

pub async fn complete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let updated = state
        .appointments()
        .complete(&auth.scope(), appointment_id, Utc::now())
        .await?;

    Ok(Json(ApiOk { data: updated }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let updated = state
        .appointments()
        .cancel(&auth.scope(), appointment_id, Utc::now())
        .await?;

    Ok(Json(ApiOk { data: updated }))
}
