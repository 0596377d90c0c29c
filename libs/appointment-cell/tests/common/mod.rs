#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentPriority, AppointmentType, CreateAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::clock::FixedClock;
use appointment_cell::services::identity::StaticIdentityResolver;
use appointment_cell::services::store::InMemoryAppointmentStore;

pub const ACTOR: &str = "reception-1";

/// 2025-06-01 at the given UTC wall time.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
}

/// Engine wired to in-memory collaborators, with one active patient, doctor
/// and clinic registered and the clock parked at 2025-06-01T07:00Z.
pub struct Harness {
    pub store: Arc<InMemoryAppointmentStore>,
    pub identity: Arc<StaticIdentityResolver>,
    pub clock: Arc<FixedClock>,
    pub booking: Arc<AppointmentBookingService>,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let identity = Arc::new(StaticIdentityResolver::new());
        let clock = Arc::new(FixedClock::new(at(7, 0)));

        let patient_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let clinic_id = Uuid::new_v4();
        identity.register_patient(patient_id, "Ama Mensah", true).await;
        identity.register_user(doctor_id, "Dr. Kofi Boateng", &["doctor"], true).await;
        identity.register_clinic(clinic_id, "Central Clinic", true).await;

        let booking = Arc::new(AppointmentBookingService::new(
            store.clone(),
            identity.clone(),
            clock.clone(),
        ));

        Self { store, identity, clock, booking, patient_id, doctor_id, clinic_id }
    }

    pub fn request(&self, start: DateTime<Utc>, duration: i32) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
            appointment_date: start,
            duration,
            appointment_type: AppointmentType::Consultation,
            priority: AppointmentPriority::Normal,
            is_emergency: false,
            reason: Some("Routine check".to_string()),
            notes: None,
            symptoms: None,
            estimated_cost: None,
            is_recurring: false,
            recurring_pattern: None,
        }
    }

    pub async fn register_doctor(&self) -> Uuid {
        let doctor_id = Uuid::new_v4();
        self.identity.register_user(doctor_id, "Dr. Second", &["doctor"], true).await;
        doctor_id
    }
}
