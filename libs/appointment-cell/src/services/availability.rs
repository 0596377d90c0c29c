use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::models::{day_bounds, AppointmentError, AppointmentQuery, AppointmentStatus, AvailabilityResponse};
use crate::services::store::AppointmentStore;

pub struct AvailabilityService {
    store: Arc<dyn AppointmentStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Blocking appointments a doctor has starting on `date` (UTC day),
    /// optionally narrowed to one clinic.
    pub async fn check_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        clinic_id: Option<Uuid>,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let (day_start, day_end) = day_bounds(date);
        debug!("Checking availability for doctor {} on {}", doctor_id, date);

        let query = AppointmentQuery {
            doctor_id: Some(doctor_id),
            clinic_id,
            statuses: Some(AppointmentStatus::BLOCKING.to_vec()),
            starts_from: Some(day_start),
            starts_until: Some(day_end),
            ..AppointmentQuery::default()
        };

        let booked = self.store.find(&query).await?;
        Ok(AvailabilityResponse::from_conflicts(booked))
    }
}
