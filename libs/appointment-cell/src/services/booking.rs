// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    validate_duration, Appointment, AppointmentDetails, AppointmentError, AppointmentFilter,
    AppointmentStatus, ConflictCheckResponse, CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::clock::Clock;
use crate::services::conflict::ConflictDetectionService;
use crate::services::consistency::{SchedulingGuard, SchedulingLocks};
use crate::services::identity::{IdentityResolver, DOCTOR_ROLE};
use crate::services::lifecycle::{AppointmentLifecycleService, LifecycleAction};
use crate::services::store::AppointmentStore;

/// The appointment lifecycle engine. Every write for a doctor runs under that
/// doctor's scheduling lock, so conflict checks and the writes they guard are
/// atomic within this process.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    identity: Arc<dyn IdentityResolver>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    locks: SchedulingLocks,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        identity: Arc<dyn IdentityResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            locks: SchedulingLocks::new(),
            store,
            identity,
            clock,
        }
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        actor: &str,
    ) -> Result<Appointment, AppointmentError> {
        validate_duration(request.duration)?;

        let now = self.clock.now();
        if request.appointment_date < now {
            return Err(AppointmentError::Validation(format!(
                "Appointment date {} is in the past",
                request.appointment_date
            )));
        }

        self.ensure_patient(request.patient_id).await?;
        self.ensure_doctor(request.doctor_id).await?;
        self.ensure_clinic(request.clinic_id).await?;

        let _guard = self.locks.acquire(request.doctor_id).await;
        self.conflict_service
            .ensure_slot_free(request.doctor_id, request.appointment_date, request.duration, None)
            .await?;

        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            clinic_id: request.clinic_id,
            appointment_date: request.appointment_date,
            duration: request.duration,
            appointment_type: request.appointment_type,
            priority: request.priority,
            is_emergency: request.is_emergency,
            status: AppointmentStatus::Scheduled,
            is_active: true,
            reason: request.reason,
            notes: request.notes,
            symptoms: request.symptoms,
            cancellation_reason: None,
            estimated_cost: request.estimated_cost,
            final_cost: None,
            is_paid: false,
            payment_method: None,
            paid_at: None,
            is_recurring: request.is_recurring,
            recurring_pattern: request.recurring_pattern,
            created_by: Some(actor.to_string()),
            updated_by: Some(actor.to_string()),
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        appointment.validate()?;
        appointment.stamp_lifecycle_timestamps(now);

        let created = self
            .store
            .insert(appointment)
            .await
            .inspect_err(|e| error!("Failed to insert appointment: {}", e))?;

        info!(
            "Booked appointment {} for doctor {} at {}",
            created.id, created.doctor_id, created.appointment_date
        );
        Ok(created)
    }

    async fn ensure_patient(&self, patient_id: Uuid) -> Result<(), AppointmentError> {
        match self.identity.resolve_patient(patient_id).await? {
            Some(patient) if patient.is_active => Ok(()),
            _ => {
                warn!("Rejected booking for missing or inactive patient {}", patient_id);
                Err(AppointmentError::PatientNotFound(patient_id))
            }
        }
    }

    async fn ensure_doctor(&self, doctor_id: Uuid) -> Result<(), AppointmentError> {
        match self.identity.resolve_doctor(doctor_id).await? {
            Some(doctor) if doctor.is_active && doctor.has_role(DOCTOR_ROLE) => Ok(()),
            _ => {
                warn!("Rejected booking for missing, inactive or non-doctor user {}", doctor_id);
                Err(AppointmentError::DoctorNotFound(doctor_id))
            }
        }
    }

    async fn ensure_clinic(&self, clinic_id: Uuid) -> Result<(), AppointmentError> {
        match self.identity.resolve_clinic(clinic_id).await? {
            Some(clinic) if clinic.is_active => Ok(()),
            _ => {
                warn!("Rejected booking for missing or inactive clinic {}", clinic_id);
                Err(AppointmentError::ClinicNotFound(clinic_id))
            }
        }
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn find_all(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filter {:?}", filter);
        self.store.find(&filter.to_query()).await
    }

    /// Active appointment by id. Soft-deleted rows read as not found.
    pub async fn find_one(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        match self.store.find_by_id(id).await? {
            Some(appointment) if appointment.is_active => Ok(appointment),
            _ => Err(AppointmentError::NotFound(id)),
        }
    }

    pub async fn get_details(&self, id: Uuid) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = self.find_one(id).await?;

        let patient = self.identity.resolve_patient(appointment.patient_id).await?;
        let doctor = self.identity.resolve_doctor(appointment.doctor_id).await?;
        let clinic = self.identity.resolve_clinic(appointment.clinic_id).await?;

        Ok(AppointmentDetails {
            end_time: appointment.end_time(),
            patient: patient.map(|p| p.summary()),
            doctor: doctor.map(|d| d.summary()),
            clinic: clinic.map(|c| c.summary()),
            appointment,
        })
    }

    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration: i32,
        exclude_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        validate_duration(duration)?;
        self.conflict_service.check(doctor_id, start, duration, exclude_id).await
    }

    // ==========================================================================
    // UPDATES
    // ==========================================================================

    #[instrument(skip(self, patch))]
    pub async fn update_appointment(
        &self,
        id: Uuid,
        patch: UpdateAppointmentRequest,
        actor: &str,
    ) -> Result<Appointment, AppointmentError> {
        let (_guard, mut appointment) = self.load_for_write(id).await?;

        let reschedules = patch.changes_schedule(&appointment);
        patch.apply_to(&mut appointment);
        appointment.validate()?;

        if reschedules {
            self.conflict_service
                .ensure_slot_free(
                    appointment.doctor_id,
                    appointment.appointment_date,
                    appointment.duration,
                    Some(appointment.id),
                )
                .await?;
        }

        let updated = self.save(appointment, actor).await?;
        info!("Updated appointment {}", updated.id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn confirm(&self, id: Uuid, actor: &str) -> Result<Appointment, AppointmentError> {
        self.transition(id, LifecycleAction::Confirm, actor, None).await
    }

    #[instrument(skip(self))]
    pub async fn start(&self, id: Uuid, actor: &str) -> Result<Appointment, AppointmentError> {
        self.transition(id, LifecycleAction::Start, actor, None).await
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, id: Uuid, actor: &str) -> Result<Appointment, AppointmentError> {
        self.transition(id, LifecycleAction::Complete, actor, None).await
    }

    #[instrument(skip(self, cancellation_reason))]
    pub async fn cancel(
        &self,
        id: Uuid,
        cancellation_reason: &str,
        actor: &str,
    ) -> Result<Appointment, AppointmentError> {
        let reason = cancellation_reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::Validation(
                "Cancellation reason is required".to_string(),
            ));
        }
        self.transition(id, LifecycleAction::Cancel, actor, Some(reason.to_string()))
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_no_show(&self, id: Uuid, actor: &str) -> Result<Appointment, AppointmentError> {
        self.transition(id, LifecycleAction::MarkNoShow, actor, None).await
    }

    /// Soft delete. The row stays in the store with `is_active = false`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid, actor: &str) -> Result<Appointment, AppointmentError> {
        let (_guard, mut appointment) = self.load_for_write(id).await?;
        appointment.is_active = false;

        let removed = self.save(appointment, actor).await?;
        info!("Soft-deleted appointment {}", removed.id);
        Ok(removed)
    }

    async fn transition(
        &self,
        id: Uuid,
        action: LifecycleAction,
        actor: &str,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let (_guard, mut appointment) = self.load_for_write(id).await?;

        self.lifecycle_service
            .apply(&mut appointment, action, self.clock.now())?;
        if action == LifecycleAction::Cancel {
            appointment.cancellation_reason = cancellation_reason;
        }

        self.save(appointment, actor).await
    }

    /// Takes the doctor's scheduling lock and re-reads the appointment under it.
    async fn load_for_write(
        &self,
        id: Uuid,
    ) -> Result<(SchedulingGuard, Appointment), AppointmentError> {
        let doctor_id = self.find_one(id).await?.doctor_id;
        let guard = self.locks.acquire(doctor_id).await;
        let appointment = self.find_one(id).await?;
        Ok((guard, appointment))
    }

    /// Persist path for existing rows: validation and timestamp hook, then
    /// audit fields.
    async fn save(&self, mut appointment: Appointment, actor: &str) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        appointment.validate()?;
        appointment.stamp_lifecycle_timestamps(now);
        appointment.updated_at = now;
        appointment.updated_by = Some(actor.to_string());

        self.store
            .update(appointment)
            .await
            .inspect_err(|e| error!("Failed to update appointment: {}", e))
    }
}
