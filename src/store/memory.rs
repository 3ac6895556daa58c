use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EntityStore, TenantScope};
use crate::{
    conflict::{TimeRange, first_conflict},
    error::ClinicError,
    filters::{AppointmentCriteria, DoctorFilter, PatientFilter, TreatmentFilter},
    models::{
        Appointment, AppointmentParty, AppointmentStatus, Doctor, Patient, StatusCounts, Tenanted,
        Treatment, TreatmentRecorded,
    },
    pagination::{PageRequest, SortDirection},
};

#[derive(Default)]
struct Tables {
    doctors: BTreeMap<Uuid, Doctor>,
    patients: BTreeMap<Uuid, Patient>,
    appointments: BTreeMap<Uuid, Appointment>,
    treatments: BTreeMap<Uuid, Treatment>,
}

impl Tables {
    fn tenant_appointments<'a>(
        &'a self,
        scope: &'a TenantScope,
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        self.appointments
            .values()
            .filter(move |a| scope.owns(a.tenant_id))
    }

    /// Appointments plus treatments naming `party`.
    fn dependents(&self, scope: &TenantScope, party: AppointmentParty) -> usize {
        let appointments = self.tenant_appointments(scope).filter(|a| match party {
            AppointmentParty::Doctor(id) => a.doctor_id == id,
            AppointmentParty::Patient(id) => a.patient_id == id,
        });
        let treatments = self
            .treatments
            .values()
            .filter(|tr| scope.owns(tr.tenant_id))
            .filter(|tr| match party {
                AppointmentParty::Doctor(id) => tr.doctor_id == Some(id),
                AppointmentParty::Patient(id) => tr.patient_id == id,
            });
        appointments.count() + treatments.count()
    }

    /// Same guarantee the Postgres foreign keys give: a row only names
    /// doctors and patients of its own clinic.
    fn ensure_parties(
        &self,
        scope: &TenantScope,
        doctor_id: Option<Uuid>,
        patient_id: Uuid,
    ) -> Result<(), ClinicError> {
        let doctor_ok = doctor_id.is_none_or(|id| scoped_get(&self.doctors, scope, id).is_some());
        let patient_ok = scoped_get(&self.patients, scope, patient_id).is_some();
        if doctor_ok && patient_ok {
            Ok(())
        } else {
            Err(ClinicError::unknown_reference())
        }
    }
}

/// Process-local store backed by ordered maps.
///
/// All mutations that must be atomic run inside one write-lock section with
/// no await point, so a cancelled caller never observes a half-applied write.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn scoped_get<T: Tenanted + Clone>(
    table: &BTreeMap<Uuid, T>,
    scope: &TenantScope,
    id: Uuid,
) -> Option<T> {
    table.get(&id).filter(|r| scope.owns(r.tenant_id())).cloned()
}

fn scoped_delete<T: Tenanted>(table: &mut BTreeMap<Uuid, T>, scope: &TenantScope, id: Uuid) -> bool {
    match table.get(&id) {
        Some(r) if scope.owns(r.tenant_id()) => table.remove(&id).is_some(),
        _ => false,
    }
}

/// Walk the map from the cursor in the requested direction.
fn scoped_page<T: Tenanted + Clone>(
    table: &BTreeMap<Uuid, T>,
    scope: &TenantScope,
    page: &PageRequest,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    let rows: Box<dyn Iterator<Item = &T> + '_> = match (page.sort(), page.after()) {
        (SortDirection::Asc, None) => Box::new(table.values()),
        (SortDirection::Asc, Some(c)) => Box::new(table.range((Excluded(c), Unbounded)).map(|(_, v)| v)),
        (SortDirection::Desc, None) => Box::new(table.values().rev()),
        (SortDirection::Desc, Some(c)) => Box::new(table.range(..c).rev().map(|(_, v)| v)),
    };

    rows.filter(|r| scope.owns(r.tenant_id()) && keep(r))
        .take(page.fetch_limit())
        .cloned()
        .collect()
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor, ClinicError> {
        let mut t = self.tables.write().await;
        t.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn get_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Doctor>, ClinicError> {
        Ok(scoped_get(&self.tables.read().await.doctors, scope, id))
    }

    async fn page_doctors(
        &self,
        scope: &TenantScope,
        filter: &DoctorFilter,
        page: &PageRequest,
    ) -> Result<Vec<Doctor>, ClinicError> {
        let t = self.tables.read().await;
        Ok(scoped_page(&t.doctors, scope, page, |d| filter.matches(d)))
    }

    async fn delete_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError> {
        let mut t = self.tables.write().await;
        if t.dependents(scope, AppointmentParty::Doctor(id)) > 0 {
            return Err(ClinicError::HasDependents { entity: "doctor" });
        }
        Ok(scoped_delete(&mut t.doctors, scope, id))
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, ClinicError> {
        let mut t = self.tables.write().await;
        t.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Patient>, ClinicError> {
        Ok(scoped_get(&self.tables.read().await.patients, scope, id))
    }

    async fn page_patients(
        &self,
        scope: &TenantScope,
        filter: &PatientFilter,
        page: &PageRequest,
    ) -> Result<Vec<Patient>, ClinicError> {
        let t = self.tables.read().await;
        Ok(scoped_page(&t.patients, scope, page, |p| filter.matches(p)))
    }

    async fn delete_patient(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError> {
        let mut t = self.tables.write().await;
        if t.dependents(scope, AppointmentParty::Patient(id)) > 0 {
            return Err(ClinicError::HasDependents { entity: "patient" });
        }
        Ok(scoped_delete(&mut t.patients, scope, id))
    }

    async fn find_conflict(
        &self,
        scope: &TenantScope,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, ClinicError> {
        let t = self.tables.read().await;
        Ok(first_conflict(t.tenant_appointments(scope), doctor_id, range, exclude).cloned())
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, ClinicError> {
        let mut t = self.tables.write().await;
        let scope = TenantScope::new(appointment.tenant_id);
        t.ensure_parties(&scope, Some(appointment.doctor_id), appointment.patient_id)?;

        if let Some(existing) = first_conflict(
            t.tenant_appointments(&scope),
            appointment.doctor_id,
            &appointment.range(),
            Some(appointment.id),
        ) {
            return Err(ClinicError::SlotConflict {
                appointment_id: Some(existing.id),
            });
        }

        t.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Appointment>, ClinicError> {
        Ok(scoped_get(&self.tables.read().await.appointments, scope, id))
    }

    async fn page_appointments(
        &self,
        scope: &TenantScope,
        criteria: &AppointmentCriteria,
        page: &PageRequest,
    ) -> Result<Vec<Appointment>, ClinicError> {
        let t = self.tables.read().await;
        Ok(scoped_page(&t.appointments, scope, page, |a| criteria.matches(a)))
    }

    async fn update_appointment_status(
        &self,
        scope: &TenantScope,
        id: Uuid,
        expected: Option<AppointmentStatus>,
        status: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, ClinicError> {
        let mut t = self.tables.write().await;
        let Some(row) = t
            .appointments
            .get_mut(&id)
            .filter(|a| scope.owns(a.tenant_id))
        else {
            return Ok(None);
        };
        if expected.is_some_and(|e| row.status != e) {
            return Ok(None);
        }

        row.status = status;
        row.updated_at = at;
        Ok(Some(row.clone()))
    }

    async fn count_dependents(
        &self,
        scope: &TenantScope,
        party: AppointmentParty,
    ) -> Result<u64, ClinicError> {
        Ok(self.tables.read().await.dependents(scope, party) as u64)
    }

    async fn count_appointments_by_status(
        &self,
        scope: &TenantScope,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<StatusCounts, ClinicError> {
        let t = self.tables.read().await;
        let mut counts = StatusCounts::default();
        t.tenant_appointments(scope)
            .filter(|a| a.start_time >= from && a.start_time < until)
            .for_each(|a| counts.tally(a.status));
        Ok(counts)
    }

    async fn record_treatment(&self, treatment: Treatment) -> Result<TreatmentRecorded, ClinicError> {
        let mut t = self.tables.write().await;
        let scope = TenantScope::new(treatment.tenant_id);
        t.ensure_parties(&scope, treatment.doctor_id, treatment.patient_id)?;

        let previous_status = match treatment.appointment_id {
            None => None,
            Some(appointment_id) => {
                let current = scoped_get(&t.appointments, &scope, appointment_id)
                    .ok_or_else(|| ClinicError::not_found("appointment"))?;

                // reviving a cancelled slot must not double-book the doctor
                if !current.status.blocks_slot() {
                    if let Some(existing) = first_conflict(
                        t.tenant_appointments(&scope),
                        current.doctor_id,
                        &current.range(),
                        Some(current.id),
                    ) {
                        return Err(ClinicError::SlotConflict {
                            appointment_id: Some(existing.id),
                        });
                    }
                }

                if let Some(row) = t.appointments.get_mut(&appointment_id) {
                    row.status = AppointmentStatus::Completed;
                    row.updated_at = treatment.created_at;
                }
                Some(current.status)
            }
        };

        t.treatments.insert(treatment.id, treatment.clone());
        Ok(TreatmentRecorded {
            treatment,
            previous_status,
        })
    }

    async fn get_treatment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Treatment>, ClinicError> {
        Ok(scoped_get(&self.tables.read().await.treatments, scope, id))
    }

    async fn page_treatments(
        &self,
        scope: &TenantScope,
        filter: &TreatmentFilter,
        page: &PageRequest,
    ) -> Result<Vec<Treatment>, ClinicError> {
        let t = self.tables.read().await;
        Ok(scoped_page(&t.treatments, scope, page, |tr| filter.matches(tr)))
    }

    async fn treatments_for_appointment(
        &self,
        scope: &TenantScope,
        appointment_id: Uuid,
    ) -> Result<Vec<Treatment>, ClinicError> {
        let t = self.tables.read().await;
        Ok(t.treatments
            .values()
            .filter(|tr| scope.owns(tr.tenant_id) && tr.appointment_id == Some(appointment_id))
            .cloned()
            .collect())
    }
}
