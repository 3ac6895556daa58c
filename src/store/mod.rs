//! Entity store abstraction.
//!
//! The store is the only owner of persisted clinic data. Every read and
//! mutation takes a [`TenantScope`]; inserts take records already stamped with
//! the scope's tenant id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    conflict::TimeRange,
    error::ClinicError,
    filters::{AppointmentCriteria, DoctorFilter, PatientFilter, TreatmentFilter},
    models::{
        Appointment, AppointmentParty, AppointmentStatus, Doctor, Patient, StatusCounts,
        Treatment, TreatmentRecorded,
    },
    pagination::PageRequest,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// The single tenant a request operates in.
///
/// Built once from the authenticated identity and handed to every store
/// call, so no query is assembled without its tenant predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    tenant_id: Uuid,
}

impl TenantScope {
    pub fn new(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn owns(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == tenant_id
    }
}

/// Persistence operations used by the services.
///
/// `page_*` methods return at most [`PageRequest::fetch_limit`] rows ordered by
/// id in the requested direction, starting after the request's cursor.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /* doctors */

    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor, ClinicError>;

    async fn get_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Doctor>, ClinicError>;

    async fn page_doctors(
        &self,
        scope: &TenantScope,
        filter: &DoctorFilter,
        page: &PageRequest,
    ) -> Result<Vec<Doctor>, ClinicError>;

    /// Returns `false` when nothing was deleted. Refused with
    /// [`ClinicError::HasDependents`] while anything references the doctor,
    /// decided in the same atomic step as the delete.
    async fn delete_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError>;

    /* patients */

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, ClinicError>;

    async fn get_patient(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Patient>, ClinicError>;

    async fn page_patients(
        &self,
        scope: &TenantScope,
        filter: &PatientFilter,
        page: &PageRequest,
    ) -> Result<Vec<Patient>, ClinicError>;

    /// Same contract as [`EntityStore::delete_doctor`].
    async fn delete_patient(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError>;

    /* appointments */

    /// Any non-cancelled appointment of `doctor_id` overlapping `range`.
    async fn find_conflict(
        &self,
        scope: &TenantScope,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, ClinicError>;

    /// Insert unless the slot is taken.
    ///
    /// The overlap test and the write are serialized per `(tenant, doctor)`;
    /// a lost race surfaces as [`ClinicError::SlotConflict`], and a doctor or
    /// patient deleted in the meantime as `UNKNOWN_REFERENCE`. Dropping the
    /// future before it resolves leaves nothing written.
    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, ClinicError>;

    async fn get_appointment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Appointment>, ClinicError>;

    async fn page_appointments(
        &self,
        scope: &TenantScope,
        criteria: &AppointmentCriteria,
        page: &PageRequest,
    ) -> Result<Vec<Appointment>, ClinicError>;

    /// Set `status` when the row is currently `expected` (any status if
    /// `None`). `Ok(None)` means no row matched.
    async fn update_appointment_status(
        &self,
        scope: &TenantScope,
        id: Uuid,
        expected: Option<AppointmentStatus>,
        status: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, ClinicError>;

    /// Appointments plus treatments referencing a doctor or patient.
    async fn count_dependents(
        &self,
        scope: &TenantScope,
        party: AppointmentParty,
    ) -> Result<u64, ClinicError>;

    /// Per-status totals for appointments starting in `[from, until)`.
    async fn count_appointments_by_status(
        &self,
        scope: &TenantScope,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<StatusCounts, ClinicError>;

    /* treatments */

    /// Insert a treatment; when it names an appointment, mark that
    /// appointment COMPLETED in the same atomic step.
    async fn record_treatment(&self, treatment: Treatment) -> Result<TreatmentRecorded, ClinicError>;

    async fn get_treatment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Treatment>, ClinicError>;

    async fn page_treatments(
        &self,
        scope: &TenantScope,
        filter: &TreatmentFilter,
        page: &PageRequest,
    ) -> Result<Vec<Treatment>, ClinicError>;

    async fn treatments_for_appointment(
        &self,
        scope: &TenantScope,
        appointment_id: Uuid,
    ) -> Result<Vec<Treatment>, ClinicError>;
}
