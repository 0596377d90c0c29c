// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, ConflictCheckResponse,
    CONFLICT_BUFFER_MINUTES, MAX_DURATION_MINUTES,
};
use crate::services::store::AppointmentStore;

/// The interval a candidate booking claims: its start pulled forward by the
/// lead buffer, up to its unpadded end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictWindow {
    pub buffered_start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ConflictWindow {
    pub fn for_slot(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            buffered_start: start - Duration::minutes(CONFLICT_BUFFER_MINUTES),
            end: start + Duration::minutes(duration_minutes as i64),
        }
    }

    /// Half-open overlap: touching endpoints do not conflict.
    pub fn overlaps(&self, existing: &Appointment) -> bool {
        existing.appointment_date < self.end && existing.end_time() > self.buffered_start
    }
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Blocking appointments of `doctor_id` that overlap the candidate slot.
    pub async fn find_conflicts(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let window = ConflictWindow::for_slot(start, duration_minutes);
        debug!(
            "Checking conflicts for doctor {} in [{}, {})",
            doctor_id, window.buffered_start, window.end
        );

        // An existing booking can reach into the window from at most the
        // longest allowed duration before it.
        let query = AppointmentQuery {
            doctor_id: Some(doctor_id),
            statuses: Some(AppointmentStatus::BLOCKING.to_vec()),
            starts_from: Some(window.buffered_start - Duration::minutes(MAX_DURATION_MINUTES as i64)),
            starts_until: Some(window.end),
            exclude_id,
            ..AppointmentQuery::default()
        };

        let candidates = self.store.find(&query).await?;
        let conflicts: Vec<Appointment> = candidates
            .into_iter()
            .filter(|existing| existing.is_blocking() && window.overlaps(existing))
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for doctor {} - {} conflicting appointments",
                doctor_id,
                conflicts.len()
            );
        }

        Ok(conflicts)
    }

    /// Fails with `Conflict` when the slot is taken.
    pub async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let conflicts = self
            .find_conflicts(doctor_id, start, duration_minutes, exclude_id)
            .await?;

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(AppointmentError::Conflict {
                doctor_id,
                conflicting: conflicts.iter().map(|a| a.id).collect(),
            })
        }
    }

    pub async fn check(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let window = ConflictWindow::for_slot(start, duration_minutes);
        let conflicting_appointments = self
            .find_conflicts(doctor_id, start, duration_minutes, exclude_id)
            .await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting_appointments.is_empty(),
            buffered_start: window.buffered_start,
            end_time: window.end,
            conflicting_appointments,
        })
    }
}
