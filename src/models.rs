use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    auth::IdentityProvider,
    conflict::TimeRange,
    error::ClinicError,
    services::{AppointmentService, DashboardService, DirectoryService},
    store::{EntityStore, TenantScope},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub page_limit_max: u32,
}

impl AppState {
    pub fn appointments(&self) -> AppointmentService {
        AppointmentService::new(self.store.clone())
    }

    pub fn directory(&self) -> DirectoryService {
        DirectoryService::new(self.store.clone())
    }

    pub fn dashboard(&self) -> DashboardService {
        DashboardService::new(self.store.clone())
    }
}

/// Records that live inside exactly one clinic.
pub trait Tenanted {
    fn tenant_id(&self) -> Uuid;
}

/* -------------------------
   Enums (stored as smallint)
--------------------------*/

/// 0 pending, 1 completed, 2 cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Completed = 1,
    Cancelled = 2,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether an appointment in this state occupies its doctor's time.
    pub fn blocks_slot(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AppointmentStatus::Pending)
    }

    /// Explicit transitions only leave PENDING.
    pub fn ensure_transition(self, target: AppointmentStatus) -> Result<(), ClinicError> {
        if self == AppointmentStatus::Pending && target.is_terminal() {
            Ok(())
        } else {
            Err(ClinicError::validation(
                "INVALID_TRANSITION",
                format!(
                    "cannot move appointment from {} to {}",
                    self.as_str(),
                    target.as_str()
                ),
            ))
        }
    }
}

/// 0 male, 1 female, 2 other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Gender {
    Male = 0,
    Female = 1,
    Other = 2,
}

/* -------------------------
   Records
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn pending(
        scope: &TenantScope,
        doctor_id: Uuid,
        patient_id: Uuid,
        range: TimeRange,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: scope.tenant_id(),
            doctor_id,
            patient_id,
            start_time: range.start(),
            end_time: range.end(),
            status: AppointmentStatus::Pending,
            note,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored rows always satisfy `start_time < end_time`.
    pub fn range(&self) -> TimeRange {
        TimeRange::from_stored(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Doctor {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Treatment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

macro_rules! tenanted {
    ($($ty:ty),+) => {
        $(impl Tenanted for $ty {
            fn tenant_id(&self) -> Uuid {
                self.tenant_id
            }
        })+
    };
}

tenanted!(Appointment, Doctor, Patient, Treatment);

/// Which side of an appointment a directory entry sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentParty {
    Doctor(Uuid),
    Patient(Uuid),
}

/// Per-status appointment totals inside a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct StatusCounts {
    pub all: i64,
    pub pending: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn tally(&mut self, status: AppointmentStatus) {
        self.all += 1;
        match status {
            AppointmentStatus::Pending => self.pending += 1,
            AppointmentStatus::Completed => self.completed += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Result of recording a treatment: the new row plus the status the linked
/// appointment had before it was completed.
#[derive(Debug, Clone)]
pub struct TreatmentRecorded {
    pub treatment: Treatment,
    pub previous_status: Option<AppointmentStatus>,
}
