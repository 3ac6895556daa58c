// src/conflict.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::ClinicError,
    models::Appointment,
    store::{EntityStore, TenantScope},
};

/// Half-open booking interval `[start, end)`.
///
/// Construction rejects empty and inverted ranges, so an existing
/// `TimeRange` always has positive length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ClinicError> {
        if end <= start {
            return Err(ClinicError::invalid_range());
        }
        Ok(Self { start, end })
    }

    /// Rebuild a range from a persisted row; rows were validated on insert.
    pub(crate) fn from_stored(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Back-to-back ranges (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// First appointment among `candidates` that blocks `range` for `doctor_id`.
///
/// Cancelled appointments and `exclude` never block. The caller is
/// responsible for restricting `candidates` to one tenant.
pub fn first_conflict<'a, I>(
    candidates: I,
    doctor_id: Uuid,
    range: &TimeRange,
    exclude: Option<Uuid>,
) -> Option<&'a Appointment>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    candidates.into_iter().find(|a| {
        a.doctor_id == doctor_id
            && a.status.blocks_slot()
            && Some(a.id) != exclude
            && range.overlaps(&a.range())
    })
}

/// Read-side booking feasibility check against the entity store.
#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn EntityStore>,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Returns an appointment occupying part of `range`, if any.
    ///
    /// This is advisory: the insert path re-runs the same test under the
    /// store's per-doctor serialization before writing.
    pub async fn check_conflict(
        &self,
        scope: &TenantScope,
        doctor_id: Uuid,
        range: &TimeRange,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, ClinicError> {
        tracing::debug!(
            tenant_id = %scope.tenant_id(),
            doctor_id = %doctor_id,
            start = %range.start(),
            end = %range.end(),
            "checking slot"
        );
        self.store.find_conflict(scope, doctor_id, range, exclude).await
    }
}
