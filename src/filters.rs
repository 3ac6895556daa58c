//! Listing criteria per entity.
//!
//! Each filter is the caller-facing shape (serialized into cursor
//! fingerprints) plus a `matches` predicate used by the in-memory store.
//! The Postgres store translates the same fields into SQL.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ClinicError,
    models::{Appointment, AppointmentStatus, Doctor, Gender, Patient, Treatment},
};

/// Midnight UTC at the start of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

/// Midnight UTC after `date`; `None` past the calendar's end.
pub fn day_end(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt().map(day_start)
}

fn normalized(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn check_date_order(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), ClinicError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ClinicError::validation(
            "VALIDATION_ERROR",
            "start date must not be after end date",
        )),
        _ => Ok(()),
    }
}

/* ============================================================
   Appointments
   ============================================================ */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub today: bool,
}

impl AppointmentFilter {
    /// Pin the date shortcuts to concrete instants.
    ///
    /// `today` wins over an explicit range. Date bounds are inclusive
    /// calendar days and apply to `start_time`.
    pub fn resolve(&self, today: NaiveDate) -> Result<AppointmentCriteria, ClinicError> {
        let (starts_from, starts_before) = if self.today {
            (Some(day_start(today)), day_end(today))
        } else {
            check_date_order(self.start_date, self.end_date)?;
            (
                self.start_date.map(day_start),
                self.end_date.and_then(day_end),
            )
        };

        Ok(AppointmentCriteria {
            status: self.status,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            starts_from,
            starts_before,
        })
    }
}

/// Appointment filter with its time window resolved.
///
/// Cursors are fingerprinted over this form, so a `today` cursor stops
/// resuming once the day it was issued on is over.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentCriteria {
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub starts_from: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
}

impl AppointmentCriteria {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.status.is_none_or(|s| a.status == s)
            && self.doctor_id.is_none_or(|d| a.doctor_id == d)
            && self.patient_id.is_none_or(|p| a.patient_id == p)
            && self.starts_from.is_none_or(|from| a.start_time >= from)
            && self.starts_before.is_none_or(|until| a.start_time < until)
    }
}

/* ============================================================
   Patients
   ============================================================ */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientFilter {
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}

impl PatientFilter {
    /// Trim text criteria, drop blank ones, check the date range.
    pub fn normalize(self) -> Result<Self, ClinicError> {
        check_date_order(self.created_from, self.created_to)?;
        Ok(Self {
            phone: normalized(&self.phone),
            name: normalized(&self.name),
            ..self
        })
    }

    pub fn matches(&self, p: &Patient) -> bool {
        self.gender.is_none_or(|g| p.gender == Some(g))
            && self
                .phone
                .as_deref()
                .is_none_or(|needle| p.phone.as_deref().is_some_and(|h| h.contains(needle)))
            && self
                .name
                .as_deref()
                .is_none_or(|needle| contains_ci(Some(&p.name), needle))
            && self.created_from.is_none_or(|d| p.created_at >= day_start(d))
            && self
                .created_to
                .and_then(day_end)
                .is_none_or(|until| p.created_at < until)
    }
}

/* ============================================================
   Doctors
   ============================================================ */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoctorFilter {
    pub specialization: Option<String>,
    pub active: Option<bool>,
}

impl DoctorFilter {
    pub fn normalize(self) -> Self {
        Self {
            specialization: normalized(&self.specialization),
            ..self
        }
    }

    pub fn matches(&self, d: &Doctor) -> bool {
        self.specialization
            .as_deref()
            .is_none_or(|needle| contains_ci(d.specialization.as_deref(), needle))
            && self.active.is_none_or(|a| d.is_active == a)
    }
}

/* ============================================================
   Treatments
   ============================================================ */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreatmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
}

impl TreatmentFilter {
    pub fn matches(&self, t: &Treatment) -> bool {
        self.patient_id.is_none_or(|p| t.patient_id == p)
            && self.doctor_id.is_none_or(|d| t.doctor_id == Some(d))
            && self.appointment_id.is_none_or(|a| t.appointment_id == Some(a))
    }
}

/// Escape `%`, `_` and `\` so user text matches literally inside `ILIKE`.
pub fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
