#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use clinic_ops_server::{
    models::{Appointment, Doctor, Patient},
    services::{AppointmentService, DirectoryService, NewAppointment, NewDoctor, NewPatient},
    store::{EntityStore, InMemoryStore, TenantScope},
};

pub struct Clinic {
    pub store: Arc<dyn EntityStore>,
    pub scope: TenantScope,
}

impl Clinic {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// A second clinic sharing the same store.
    pub fn with_store(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            scope: TenantScope::new(Uuid::new_v4()),
        }
    }

    pub fn appointments(&self) -> AppointmentService {
        AppointmentService::new(self.store.clone())
    }

    pub fn directory(&self) -> DirectoryService {
        DirectoryService::new(self.store.clone())
    }

    pub async fn doctor(&self, name: &str) -> Doctor {
        self.directory()
            .create_doctor(
                &self.scope,
                NewDoctor {
                    name: Some(name.to_string()),
                    specialization: Some("General".into()),
                    is_active: None,
                },
                now(),
            )
            .await
            .expect("create doctor")
    }

    pub async fn patient(&self, name: &str) -> Patient {
        self.directory()
            .create_patient(
                &self.scope,
                NewPatient {
                    name: Some(name.to_string()),
                    phone: Some("0700000000".into()),
                    gender: None,
                },
                now(),
            )
            .await
            .expect("create patient")
    }

    pub async fn book(
        &self,
        doctor: &Doctor,
        patient: &Patient,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Appointment, clinic_ops_server::error::ClinicError> {
        self.appointments()
            .create(&self.scope, booking(doctor.id, patient.id, start, end), now())
            .await
    }
}

pub fn booking(doctor_id: Uuid, patient_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> NewAppointment {
    NewAppointment {
        doctor_id: Some(doctor_id),
        patient_id: Some(patient_id),
        start_time: Some(start),
        end_time: Some(end),
        note: None,
    }
}

/// 2026-03-02 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}
