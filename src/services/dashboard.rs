use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ClinicError,
    filters::{day_end, day_start},
    models::StatusCounts,
    store::{EntityStore, TenantScope},
};

/// Reporting window, always in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    /// Sunday through the end of today.
    Week,
    Month,
}

impl Period {
    /// `[from, until)` containing `now`.
    pub fn window(self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), ClinicError> {
        let today = now.date_naive();
        let out_of_range = || ClinicError::Internal(format!("no {self:?} window around {now}"));
        let end_of_today = day_end(today).ok_or_else(out_of_range)?;

        match self {
            Period::Today => Ok((day_start(today), end_of_today)),
            Period::Week => {
                let back = u64::from(today.weekday().num_days_from_sunday());
                let sunday = today.checked_sub_days(Days::new(back)).ok_or_else(out_of_range)?;
                Ok((day_start(sunday), end_of_today))
            }
            Period::Month => {
                let first = today.with_day(1).ok_or_else(out_of_range)?;
                let next_first = match today.month() {
                    12 => NaiveDate::from_ymd_opt(today.year() + 1, 1, 1),
                    m => NaiveDate::from_ymd_opt(today.year(), m + 1, 1),
                }
                .ok_or_else(out_of_range)?;
                Ok((day_start(first), day_start(next_first)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardCounts {
    pub period: Period,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn EntityStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn counts(
        &self,
        scope: &TenantScope,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<DashboardCounts, ClinicError> {
        let (from, until) = period.window(now)?;
        let counts = self.store.count_appointments_by_status(scope, from, until).await?;
        Ok(DashboardCounts {
            period,
            from,
            until,
            counts,
        })
    }
}
