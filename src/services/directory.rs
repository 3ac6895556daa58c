use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ClinicError,
    filters::{DoctorFilter, PatientFilter},
    models::{AppointmentParty, Doctor, Gender, Patient},
    pagination::{Page, PageRequest},
    store::{EntityStore, TenantScope},
};

const NAME_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDoctor {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
}

fn required_name(name: Option<String>) -> Result<String, ClinicError> {
    let name = name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ClinicError::missing_field("name"));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(ClinicError::validation(
            "VALIDATION_ERROR",
            format!("name must be at most {NAME_MAX_CHARS} characters"),
        ));
    }
    Ok(name.to_string())
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Doctors and patients of one clinic.
#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn EntityStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /* ----- doctors ----- */

    pub async fn create_doctor(
        &self,
        scope: &TenantScope,
        req: NewDoctor,
        now: DateTime<Utc>,
    ) -> Result<Doctor, ClinicError> {
        let doctor = Doctor {
            id: Uuid::now_v7(),
            tenant_id: scope.tenant_id(),
            name: required_name(req.name)?,
            specialization: optional_text(req.specialization),
            is_active: req.is_active.unwrap_or(true),
            created_at: now,
        };
        let saved = self.store.insert_doctor(doctor).await?;
        tracing::info!(tenant_id = %scope.tenant_id(), doctor_id = %saved.id, "doctor created");
        Ok(saved)
    }

    pub async fn get_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<Doctor, ClinicError> {
        self.store
            .get_doctor(scope, id)
            .await?
            .ok_or_else(|| ClinicError::not_found("doctor"))
    }

    pub async fn list_doctors(
        &self,
        scope: &TenantScope,
        filter: &DoctorFilter,
        page: &PageRequest,
    ) -> Result<Page<Doctor>, ClinicError> {
        let rows = self.store.page_doctors(scope, filter, page).await?;
        Ok(page.finish(rows, |d| d.id))
    }

    /// Refused while any appointment or treatment still names the doctor.
    pub async fn delete_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<(), ClinicError> {
        self.get_doctor(scope, id).await?;
        self.ensure_unreferenced(scope, AppointmentParty::Doctor(id), "doctor").await?;

        if !self.store.delete_doctor(scope, id).await? {
            return Err(ClinicError::not_found("doctor"));
        }
        tracing::info!(tenant_id = %scope.tenant_id(), doctor_id = %id, "doctor deleted");
        Ok(())
    }

    /* ----- patients ----- */

    pub async fn create_patient(
        &self,
        scope: &TenantScope,
        req: NewPatient,
        now: DateTime<Utc>,
    ) -> Result<Patient, ClinicError> {
        let patient = Patient {
            id: Uuid::now_v7(),
            tenant_id: scope.tenant_id(),
            name: required_name(req.name)?,
            phone: optional_text(req.phone),
            gender: req.gender,
            created_at: now,
        };
        let saved = self.store.insert_patient(patient).await?;
        tracing::info!(tenant_id = %scope.tenant_id(), patient_id = %saved.id, "patient created");
        Ok(saved)
    }

    pub async fn get_patient(&self, scope: &TenantScope, id: Uuid) -> Result<Patient, ClinicError> {
        self.store
            .get_patient(scope, id)
            .await?
            .ok_or_else(|| ClinicError::not_found("patient"))
    }

    pub async fn list_patients(
        &self,
        scope: &TenantScope,
        filter: &PatientFilter,
        page: &PageRequest,
    ) -> Result<Page<Patient>, ClinicError> {
        let rows = self.store.page_patients(scope, filter, page).await?;
        Ok(page.finish(rows, |p| p.id))
    }

    pub async fn delete_patient(&self, scope: &TenantScope, id: Uuid) -> Result<(), ClinicError> {
        self.get_patient(scope, id).await?;
        self.ensure_unreferenced(scope, AppointmentParty::Patient(id), "patient").await?;

        if !self.store.delete_patient(scope, id).await? {
            return Err(ClinicError::not_found("patient"));
        }
        tracing::info!(tenant_id = %scope.tenant_id(), patient_id = %id, "patient deleted");
        Ok(())
    }

    async fn ensure_unreferenced(
        &self,
        scope: &TenantScope,
        party: AppointmentParty,
        entity: &'static str,
    ) -> Result<(), ClinicError> {
        let dependents = self.store.count_dependents(scope, party).await?;
        if dependents > 0 {
            tracing::warn!(tenant_id = %scope.tenant_id(), ?party, dependents, "delete refused");
            return Err(ClinicError::HasDependents { entity });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(required_name(Some("  Dr. Ama ".into())).unwrap(), "Dr. Ama");
        assert!(required_name(Some("   ".into())).is_err());
        assert!(required_name(None).is_err());
        assert!(required_name(Some("x".repeat(129))).is_err());
        assert!(required_name(Some("é".repeat(128))).is_ok());
    }
}
