// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgExecutor};
use uuid::Uuid;

use super::{EntityStore, TenantScope};
use crate::{
    conflict::TimeRange,
    error::ClinicError,
    filters::{
        AppointmentCriteria, DoctorFilter, PatientFilter, TreatmentFilter, day_end, day_start,
        like_pattern,
    },
    models::{
        Appointment, AppointmentParty, AppointmentStatus, Doctor, Patient, StatusCounts,
        Treatment, TreatmentRecorded,
    },
    pagination::PageRequest,
};

const DOCTOR_COLUMNS: &str = "id, tenant_id, name, specialization, is_active, created_at";
const PATIENT_COLUMNS: &str = "id, tenant_id, name, phone, gender, created_at";
const APPOINTMENT_COLUMNS: &str =
    "id, tenant_id, doctor_id, patient_id, start_time, end_time, status, note, created_at, updated_at";
const TREATMENT_COLUMNS: &str =
    "id, tenant_id, patient_id, doctor_id, appointment_id, description, created_at";

// SQLSTATE codes
const EXCLUSION_VIOLATION: &str = "23P01";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map errors from INSERT/UPDATE paths.
fn write_error(e: sqlx::Error) -> ClinicError {
    match sqlstate(&e).as_deref() {
        Some(EXCLUSION_VIOLATION) => ClinicError::SlotConflict { appointment_id: None },
        Some(FOREIGN_KEY_VIOLATION) => ClinicError::unknown_reference(),
        _ => ClinicError::from(e),
    }
}

/// Map errors from DELETE paths.
fn delete_error(entity: &'static str) -> impl FnOnce(sqlx::Error) -> ClinicError {
    move |e| match sqlstate(&e).as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => ClinicError::HasDependents { entity },
        _ => ClinicError::from(e),
    }
}

/// `SELECT <columns> FROM <table> WHERE tenant_id = $1`; every listing
/// starts here.
fn scoped_select<'a>(columns: &str, table: &str, scope: &TenantScope) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE tenant_id = "));
    qb.push_bind(scope.tenant_id());
    qb
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: &PageRequest) {
    if let Some(after) = page.after() {
        qb.push(" AND id").push(page.sort().sql_comparator()).push_bind(after);
    }
    qb.push(" ORDER BY id ").push(page.sort().sql_order());
    qb.push(" LIMIT ").push_bind(page.fetch_limit() as i64);
}

async fn find_conflict_in<'e, E: PgExecutor<'e>>(
    executor: E,
    scope: &TenantScope,
    doctor_id: Uuid,
    range: &TimeRange,
    exclude: Option<Uuid>,
) -> Result<Option<Appointment>, ClinicError> {
    let sql = format!(
        r#"
        SELECT {APPOINTMENT_COLUMNS}
        FROM appointment
        WHERE tenant_id = $1
          AND doctor_id = $2
          AND status <> $3
          AND start_time < $5
          AND end_time   > $4
          AND ($6::uuid IS NULL OR id <> $6)
        LIMIT 1
        "#
    );

    let row = sqlx::query_as::<_, Appointment>(&sql)
        .bind(scope.tenant_id())
        .bind(doctor_id)
        .bind(AppointmentStatus::Cancelled)
        .bind(range.start())
        .bind(range.end())
        .bind(exclude)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

/// Postgres-backed store.
///
/// Double booking is prevented twice: inserts take a transaction-scoped
/// advisory lock per `(tenant, doctor)` before re-checking, and the
/// `appointment_no_overlap` exclusion constraint rejects anything that
/// slips past.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor, ClinicError> {
        let sql = format!(
            "INSERT INTO doctor ({DOCTOR_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6) RETURNING {DOCTOR_COLUMNS}"
        );
        sqlx::query_as::<_, Doctor>(&sql)
            .bind(doctor.id)
            .bind(doctor.tenant_id)
            .bind(&doctor.name)
            .bind(&doctor.specialization)
            .bind(doctor.is_active)
            .bind(doctor.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn get_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Doctor>, ClinicError> {
        let mut qb = scoped_select(DOCTOR_COLUMNS, "doctor", scope);
        qb.push(" AND id = ").push_bind(id);
        Ok(qb.build_query_as::<Doctor>().fetch_optional(&self.pool).await?)
    }

    async fn page_doctors(
        &self,
        scope: &TenantScope,
        filter: &DoctorFilter,
        page: &PageRequest,
    ) -> Result<Vec<Doctor>, ClinicError> {
        let mut qb = scoped_select(DOCTOR_COLUMNS, "doctor", scope);
        if let Some(spec) = &filter.specialization {
            qb.push(" AND specialization ILIKE ").push_bind(like_pattern(spec));
        }
        if let Some(active) = filter.active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        push_page(&mut qb, page);

        tracing::debug!(sql = qb.sql(), "page doctors");
        Ok(qb.build_query_as::<Doctor>().fetch_all(&self.pool).await?)
    }

    async fn delete_doctor(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError> {
        let done = sqlx::query("DELETE FROM doctor WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await
            .map_err(delete_error("doctor"))?;
        Ok(done.rows_affected() > 0)
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient, ClinicError> {
        let sql = format!(
            "INSERT INTO patient ({PATIENT_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6) RETURNING {PATIENT_COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&sql)
            .bind(patient.id)
            .bind(patient.tenant_id)
            .bind(&patient.name)
            .bind(&patient.phone)
            .bind(patient.gender)
            .bind(patient.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn get_patient(&self, scope: &TenantScope, id: Uuid) -> Result<Option<Patient>, ClinicError> {
        let mut qb = scoped_select(PATIENT_COLUMNS, "patient", scope);
        qb.push(" AND id = ").push_bind(id);
        Ok(qb.build_query_as::<Patient>().fetch_optional(&self.pool).await?)
    }

    async fn page_patients(
        &self,
        scope: &TenantScope,
        filter: &PatientFilter,
        page: &PageRequest,
    ) -> Result<Vec<Patient>, ClinicError> {
        let mut qb = scoped_select(PATIENT_COLUMNS, "patient", scope);
        if let Some(gender) = filter.gender {
            qb.push(" AND gender = ").push_bind(gender);
        }
        if let Some(phone) = &filter.phone {
            qb.push(" AND phone LIKE ").push_bind(like_pattern(phone));
        }
        if let Some(name) = &filter.name {
            qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        if let Some(from) = filter.created_from {
            qb.push(" AND created_at >= ").push_bind(day_start(from));
        }
        if let Some(until) = filter.created_to.and_then(day_end) {
            qb.push(" AND created_at < ").push_bind(until);
        }
        push_page(&mut qb, page);

        tracing::debug!(sql = qb.sql(), "page patients");
        Ok(qb.build_query_as::<Patient>().fetch_all(&self.pool).await?)
    }

    async fn delete_patient(&self, scope: &TenantScope, id: Uuid) -> Result<bool, ClinicError> {
        let done = sqlx::query("DELETE FROM patient WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await
            .map_err(delete_error("patient"))?;
        Ok(done.rows_affected() > 0)
    }

    async fn find_conflict(
        &self,
        scope: &TenantScope,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, ClinicError> {
        find_conflict_in(&self.pool, scope, doctor_id, range, exclude).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, ClinicError> {
        let scope = TenantScope::new(appointment.tenant_id);
        let mut tx = self.pool.begin().await?;

        // serialize bookings per (tenant, doctor) until commit/rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}", appointment.tenant_id, appointment.doctor_id))
            .execute(&mut *tx)
            .await?;

        if let Some(existing) = find_conflict_in(
            &mut *tx,
            &scope,
            appointment.doctor_id,
            &appointment.range(),
            Some(appointment.id),
        )
        .await?
        {
            return Err(ClinicError::SlotConflict {
                appointment_id: Some(existing.id),
            });
        }

        let sql = format!(
            r#"
            INSERT INTO appointment ({APPOINTMENT_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment.id)
            .bind(appointment.tenant_id)
            .bind(appointment.doctor_id)
            .bind(appointment.patient_id)
            .bind(appointment.start_time)
            .bind(appointment.end_time)
            .bind(appointment.status)
            .bind(&appointment.note)
            .bind(appointment.created_at)
            .bind(appointment.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await?;
        Ok(row)
    }

    async fn get_appointment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Appointment>, ClinicError> {
        let mut qb = scoped_select(APPOINTMENT_COLUMNS, "appointment", scope);
        qb.push(" AND id = ").push_bind(id);
        Ok(qb.build_query_as::<Appointment>().fetch_optional(&self.pool).await?)
    }

    async fn page_appointments(
        &self,
        scope: &TenantScope,
        criteria: &AppointmentCriteria,
        page: &PageRequest,
    ) -> Result<Vec<Appointment>, ClinicError> {
        let mut qb = scoped_select(APPOINTMENT_COLUMNS, "appointment", scope);
        if let Some(status) = criteria.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(doctor_id) = criteria.doctor_id {
            qb.push(" AND doctor_id = ").push_bind(doctor_id);
        }
        if let Some(patient_id) = criteria.patient_id {
            qb.push(" AND patient_id = ").push_bind(patient_id);
        }
        if let Some(from) = criteria.starts_from {
            qb.push(" AND start_time >= ").push_bind(from);
        }
        if let Some(until) = criteria.starts_before {
            qb.push(" AND start_time < ").push_bind(until);
        }
        push_page(&mut qb, page);

        tracing::debug!(sql = qb.sql(), "page appointments");
        Ok(qb.build_query_as::<Appointment>().fetch_all(&self.pool).await?)
    }

    async fn update_appointment_status(
        &self,
        scope: &TenantScope,
        id: Uuid,
        expected: Option<AppointmentStatus>,
        status: AppointmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, ClinicError> {
        let sql = format!(
            r#"
            UPDATE appointment
            SET status = $3,
                updated_at = $4
            WHERE id = $1
              AND tenant_id = $2
              AND ($5::smallint IS NULL OR status = $5)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .bind(scope.tenant_id())
            .bind(status)
            .bind(at)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)
    }

    async fn count_dependents(
        &self,
        scope: &TenantScope,
        party: AppointmentParty,
    ) -> Result<u64, ClinicError> {
        let (column, id) = match party {
            AppointmentParty::Doctor(id) => ("doctor_id", id),
            AppointmentParty::Patient(id) => ("patient_id", id),
        };
        let sql = format!(
            r#"
            SELECT
              (SELECT COUNT(*) FROM appointment WHERE tenant_id = $1 AND {column} = $2)
            + (SELECT COUNT(*) FROM treatment   WHERE tenant_id = $1 AND {column} = $2)
            "#
        );
        let total = sqlx::query_scalar::<_, i64>(&sql)
            .bind(scope.tenant_id())
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn count_appointments_by_status(
        &self,
        scope: &TenantScope,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<StatusCounts, ClinicError> {
        let counts = sqlx::query_as::<_, StatusCounts>(
            r#"
            SELECT
              COUNT(*)                              AS "all",
              COUNT(*) FILTER (WHERE status = $4)   AS pending,
              COUNT(*) FILTER (WHERE status = $5)   AS completed,
              COUNT(*) FILTER (WHERE status = $6)   AS cancelled
            FROM appointment
            WHERE tenant_id = $1
              AND start_time >= $2
              AND start_time <  $3
            "#,
        )
        .bind(scope.tenant_id())
        .bind(from)
        .bind(until)
        .bind(AppointmentStatus::Pending)
        .bind(AppointmentStatus::Completed)
        .bind(AppointmentStatus::Cancelled)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn record_treatment(&self, treatment: Treatment) -> Result<TreatmentRecorded, ClinicError> {
        let mut tx = self.pool.begin().await?;

        let previous_status = match treatment.appointment_id {
            None => None,
            Some(appointment_id) => {
                let current = sqlx::query_scalar::<_, AppointmentStatus>(
                    r#"
                    SELECT status
                    FROM appointment
                    WHERE id = $1 AND tenant_id = $2
                    FOR UPDATE
                    "#,
                )
                .bind(appointment_id)
                .bind(treatment.tenant_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| ClinicError::not_found("appointment"))?;

                sqlx::query(
                    r#"
                    UPDATE appointment
                    SET status = $3, updated_at = $4
                    WHERE id = $1 AND tenant_id = $2
                    "#,
                )
                .bind(appointment_id)
                .bind(treatment.tenant_id)
                .bind(AppointmentStatus::Completed)
                .bind(treatment.created_at)
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;

                Some(current)
            }
        };

        let sql = format!(
            r#"
            INSERT INTO treatment ({TREATMENT_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            RETURNING {TREATMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Treatment>(&sql)
            .bind(treatment.id)
            .bind(treatment.tenant_id)
            .bind(treatment.patient_id)
            .bind(treatment.doctor_id)
            .bind(treatment.appointment_id)
            .bind(&treatment.description)
            .bind(treatment.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await?;
        Ok(TreatmentRecorded {
            treatment: row,
            previous_status,
        })
    }

    async fn get_treatment(
        &self,
        scope: &TenantScope,
        id: Uuid,
    ) -> Result<Option<Treatment>, ClinicError> {
        let mut qb = scoped_select(TREATMENT_COLUMNS, "treatment", scope);
        qb.push(" AND id = ").push_bind(id);
        Ok(qb.build_query_as::<Treatment>().fetch_optional(&self.pool).await?)
    }

    async fn page_treatments(
        &self,
        scope: &TenantScope,
        filter: &TreatmentFilter,
        page: &PageRequest,
    ) -> Result<Vec<Treatment>, ClinicError> {
        let mut qb = scoped_select(TREATMENT_COLUMNS, "treatment", scope);
        if let Some(patient_id) = filter.patient_id {
            qb.push(" AND patient_id = ").push_bind(patient_id);
        }
        if let Some(doctor_id) = filter.doctor_id {
            qb.push(" AND doctor_id = ").push_bind(doctor_id);
        }
        if let Some(appointment_id) = filter.appointment_id {
            qb.push(" AND appointment_id = ").push_bind(appointment_id);
        }
        push_page(&mut qb, page);
        Ok(qb.build_query_as::<Treatment>().fetch_all(&self.pool).await?)
    }

    async fn treatments_for_appointment(
        &self,
        scope: &TenantScope,
        appointment_id: Uuid,
    ) -> Result<Vec<Treatment>, ClinicError> {
        let mut qb = scoped_select(TREATMENT_COLUMNS, "treatment", scope);
        qb.push(" AND appointment_id = ").push_bind(appointment_id);
        qb.push(" ORDER BY id ASC");
        Ok(qb.build_query_as::<Treatment>().fetch_all(&self.pool).await?)
    }
}
