use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    conflict::{ConflictChecker, TimeRange},
    error::ClinicError,
    filters::{AppointmentCriteria, TreatmentFilter},
    models::{Appointment, AppointmentStatus, Treatment},
    pagination::{Page, PageRequest},
    store::{EntityStore, TenantScope},
};

/* ============================================================
   Inputs
   ============================================================ */

/// Booking request as received; every field is checked by [`AppointmentService::create`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAppointment {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTreatment {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub description: Option<String>,
}

/* ============================================================
   Views
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub display: String,
}

/// Appointment with doctor and patient names resolved.
///
/// A party missing from the directory shows up as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub doctor: Option<PersonBrief>,
    pub patient: Option<PersonBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub view: AppointmentView,
    pub treatments: Vec<Treatment>,
}

/// Booking, listing and status transitions.
#[derive(Clone)]
pub struct AppointmentService {
    store: Arc<dyn EntityStore>,
    checker: ConflictChecker,
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AppointmentService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            checker: ConflictChecker::new(store.clone()),
            store,
        }
    }

    pub async fn create(
        &self,
        scope: &TenantScope,
        req: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<Appointment, ClinicError> {
        let doctor_id = req.doctor_id.ok_or_else(|| ClinicError::missing_field("doctor_id"))?;
        let patient_id = req.patient_id.ok_or_else(|| ClinicError::missing_field("patient_id"))?;
        let start = req.start_time.ok_or_else(|| ClinicError::missing_field("start_time"))?;
        let end = req.end_time.ok_or_else(|| ClinicError::missing_field("end_time"))?;
        let range = TimeRange::new(start, end)?;

        if self.store.get_doctor(scope, doctor_id).await?.is_none() {
            return Err(ClinicError::validation("UNKNOWN_DOCTOR", "doctor does not exist"));
        }
        if self.store.get_patient(scope, patient_id).await?.is_none() {
            return Err(ClinicError::validation("UNKNOWN_PATIENT", "patient does not exist"));
        }

        if let Some(existing) = self.checker.check_conflict(scope, doctor_id, &range, None).await? {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                doctor_id = %doctor_id,
                existing = %existing.id,
                "slot already booked"
            );
            return Err(ClinicError::SlotConflict {
                appointment_id: Some(existing.id),
            });
        }

        let appointment = Appointment::pending(scope, doctor_id, patient_id, range, trimmed(req.note), now);
        let saved = self.store.insert_appointment(appointment).await.inspect_err(|e| {
            if matches!(e, ClinicError::SlotConflict { .. }) {
                tracing::warn!(tenant_id = %scope.tenant_id(), doctor_id = %doctor_id, "slot taken by concurrent booking");
            }
        })?;

        tracing::info!(
            tenant_id = %scope.tenant_id(),
            appointment_id = %saved.id,
            doctor_id = %saved.doctor_id,
            "appointment booked"
        );
        Ok(saved)
    }

    /// `criteria` must be the value `page` was built over.
    pub async fn list(
        &self,
        scope: &TenantScope,
        criteria: &AppointmentCriteria,
        page: &PageRequest,
    ) -> Result<Page<AppointmentView>, ClinicError> {
        let rows = self.store.page_appointments(scope, criteria, page).await?;
        let page = page.finish(rows, |a| a.id);

        let items = self.enrich(scope, page.items).await?;
        Ok(Page {
            items,
            has_next_page: page.has_next_page,
            next_cursor: page.next_cursor,
        })
    }

    pub async fn get_by_id(&self, scope: &TenantScope, id: Uuid) -> Result<AppointmentDetail, ClinicError> {
        let appointment = self.fetch(scope, id).await?;
        let treatments = self.store.treatments_for_appointment(scope, id).await?;
        let view = self
            .enrich(scope, vec![appointment])
            .await?
            .pop()
            .ok_or_else(|| ClinicError::not_found("appointment"))?;

        Ok(AppointmentDetail { view, treatments })
    }

    pub async fn complete(&self, scope: &TenantScope, id: Uuid, now: DateTime<Utc>) -> Result<Appointment, ClinicError> {
        self.transition(scope, id, AppointmentStatus::Completed, now).await
    }

    pub async fn cancel(&self, scope: &TenantScope, id: Uuid, now: DateTime<Utc>) -> Result<Appointment, ClinicError> {
        self.transition(scope, id, AppointmentStatus::Cancelled, now).await
    }

    async fn transition(
        &self,
        scope: &TenantScope,
        id: Uuid,
        target: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, ClinicError> {
        let current = self.fetch(scope, id).await?;
        current.status.ensure_transition(target)?;

        let updated = self
            .store
            .update_appointment_status(scope, id, Some(AppointmentStatus::Pending), target, now)
            .await?;

        match updated {
            Some(a) => {
                tracing::info!(
                    tenant_id = %scope.tenant_id(),
                    appointment_id = %id,
                    status = target.as_str(),
                    "appointment status changed"
                );
                Ok(a)
            }
            // lost a race: report against whatever state won
            None => {
                let now_current = self.fetch(scope, id).await?;
                now_current.status.ensure_transition(target)?;
                Err(ClinicError::Internal(format!("status update of {id} matched no row")))
            }
        }
    }

    /// Record a treatment; a linked appointment becomes COMPLETED whatever
    /// its current status.
    pub async fn record_treatment(
        &self,
        scope: &TenantScope,
        req: NewTreatment,
        now: DateTime<Utc>,
    ) -> Result<Treatment, ClinicError> {
        let patient_id = req.patient_id.ok_or_else(|| ClinicError::missing_field("patient_id"))?;
        let description = trimmed(req.description).ok_or_else(|| ClinicError::missing_field("description"))?;

        if self.store.get_patient(scope, patient_id).await?.is_none() {
            return Err(ClinicError::validation("UNKNOWN_PATIENT", "patient does not exist"));
        }

        let mut doctor_id = req.doctor_id;
        if let Some(appointment_id) = req.appointment_id {
            let appointment = self.fetch(scope, appointment_id).await?;
            if appointment.patient_id != patient_id {
                return Err(ClinicError::validation(
                    "PATIENT_MISMATCH",
                    "appointment belongs to another patient",
                ));
            }
            doctor_id = doctor_id.or(Some(appointment.doctor_id));
        }
        if let Some(d) = doctor_id {
            if self.store.get_doctor(scope, d).await?.is_none() {
                return Err(ClinicError::validation("UNKNOWN_DOCTOR", "doctor does not exist"));
            }
        }

        let treatment = Treatment {
            id: Uuid::now_v7(),
            tenant_id: scope.tenant_id(),
            patient_id,
            doctor_id,
            appointment_id: req.appointment_id,
            description,
            created_at: now,
        };

        let recorded = self.store.record_treatment(treatment).await?;
        match recorded.previous_status {
            Some(AppointmentStatus::Cancelled) => tracing::warn!(
                tenant_id = %scope.tenant_id(),
                appointment_id = ?recorded.treatment.appointment_id,
                "treatment completed a cancelled appointment"
            ),
            Some(_) | None => tracing::info!(
                tenant_id = %scope.tenant_id(),
                treatment_id = %recorded.treatment.id,
                "treatment recorded"
            ),
        }
        Ok(recorded.treatment)
    }

    pub async fn get_treatment(&self, scope: &TenantScope, id: Uuid) -> Result<Treatment, ClinicError> {
        self.store
            .get_treatment(scope, id)
            .await?
            .ok_or_else(|| ClinicError::not_found("treatment"))
    }

    pub async fn list_treatments(
        &self,
        scope: &TenantScope,
        filter: &TreatmentFilter,
        page: &PageRequest,
    ) -> Result<Page<Treatment>, ClinicError> {
        let rows = self.store.page_treatments(scope, filter, page).await?;
        Ok(page.finish(rows, |t| t.id))
    }

    async fn fetch(&self, scope: &TenantScope, id: Uuid) -> Result<Appointment, ClinicError> {
        self.store
            .get_appointment(scope, id)
            .await?
            .ok_or_else(|| ClinicError::not_found("appointment"))
    }

    /// Attach doctor and patient names, one lookup per distinct party.
    async fn enrich(
        &self,
        scope: &TenantScope,
        appointments: Vec<Appointment>,
    ) -> Result<Vec<AppointmentView>, ClinicError> {
        let mut doctors: HashMap<Uuid, Option<PersonBrief>> = HashMap::new();
        let mut patients: HashMap<Uuid, Option<PersonBrief>> = HashMap::new();

        for a in &appointments {
            if !doctors.contains_key(&a.doctor_id) {
                let brief = self.store.get_doctor(scope, a.doctor_id).await?.map(|d| PersonBrief {
                    id: d.id,
                    display: d.name,
                });
                doctors.insert(a.doctor_id, brief);
            }
            if !patients.contains_key(&a.patient_id) {
                let brief = self.store.get_patient(scope, a.patient_id).await?.map(|p| PersonBrief {
                    id: p.id,
                    display: p.name,
                });
                patients.insert(a.patient_id, brief);
            }
        }

        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentView {
                doctor: doctors.get(&appointment.doctor_id).cloned().flatten(),
                patient: patients.get(&appointment.patient_id).cloned().flatten(),
                appointment,
            })
            .collect())
    }
}
