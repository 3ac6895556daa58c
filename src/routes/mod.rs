use axum::Router;
use serde::Serialize;

use crate::{
    error::ApiError,
    models::AppState,
    pagination::{Page, PageRequest, SortDirection},
};

pub mod appointment_routes;
pub mod dashboard_routes;
pub mod doctor_routes;
pub mod patient_routes;
pub mod treatment_routes;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(appointment_routes::router())
        .merge(treatment_routes::router())
        .merge(doctor_routes::router())
        .merge(patient_routes::router())
        .merge(dashboard_routes::router());

    Router::new().nest("/api/v1", api).with_state(state)
}

/* ============================================================
   Shared envelopes
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub count: usize,
    pub has_next_page: bool,
    pub next_cursor: Option<String>,
    pub data: Vec<T>,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            count: page.items.len(),
            has_next_page: page.has_next_page,
            next_cursor: page.next_cursor,
            data: page.items,
        }
    }
}

/// Paging part of every listing query string.
#[derive(Debug, Default)]
pub struct PageParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub sort: Option<SortDirection>,
}

impl PageParams {
    pub fn request<F: Serialize>(
        &self,
        state: &AppState,
        kind: &str,
        filter: &F,
    ) -> Result<PageRequest, ApiError> {
        Ok(PageRequest::build(
            kind,
            filter,
            self.sort,
            self.cursor.as_deref(),
            self.limit,
            state.page_limit_max,
        )?)
    }
}
