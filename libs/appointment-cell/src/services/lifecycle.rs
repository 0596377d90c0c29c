// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Confirm,
    Start,
    Complete,
    Cancel,
    MarkNoShow,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 5] = [
        LifecycleAction::Confirm,
        LifecycleAction::Start,
        LifecycleAction::Complete,
        LifecycleAction::Cancel,
        LifecycleAction::MarkNoShow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::Start => "start",
            LifecycleAction::Complete => "complete",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::MarkNoShow => "mark as no-show",
        }
    }

    pub fn target(&self) -> AppointmentStatus {
        match self {
            LifecycleAction::Confirm => AppointmentStatus::Confirmed,
            LifecycleAction::Start => AppointmentStatus::InProgress,
            LifecycleAction::Complete => AppointmentStatus::Completed,
            LifecycleAction::Cancel => AppointmentStatus::Cancelled,
            LifecycleAction::MarkNoShow => AppointmentStatus::NoShow,
        }
    }

    /// Statuses from which this action may be taken.
    pub fn allowed_from(&self) -> &'static [AppointmentStatus] {
        match self {
            LifecycleAction::Confirm => &[AppointmentStatus::Scheduled],
            LifecycleAction::Start => &[AppointmentStatus::Confirmed],
            LifecycleAction::Complete => &[AppointmentStatus::Confirmed, AppointmentStatus::InProgress],
            LifecycleAction::Cancel => &[AppointmentStatus::Scheduled, AppointmentStatus::Confirmed],
            LifecycleAction::MarkNoShow => &[AppointmentStatus::Scheduled, AppointmentStatus::Confirmed],
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// All statuses reachable in one step from `current_status`.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        LifecycleAction::ALL
            .iter()
            .filter(|action| action.allowed_from().contains(&current_status))
            .map(|action| action.target())
            .collect()
    }

    pub fn validate_transition(
        &self,
        current_status: AppointmentStatus,
        action: LifecycleAction,
    ) -> Result<(), AppointmentError> {
        debug!("Validating {} from status {}", action.name(), current_status);

        if !action.allowed_from().contains(&current_status) {
            warn!("Invalid status transition attempted: {} from {}", action.name(), current_status);
            return Err(AppointmentError::InvalidStatusTransition {
                action: action.name(),
                current: current_status,
                allowed: self.get_valid_transitions(current_status),
            });
        }

        Ok(())
    }

    /// Moves `appointment` to the action's target status. On error the record
    /// is left untouched.
    pub fn apply(
        &self,
        appointment: &mut Appointment,
        action: LifecycleAction,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        self.validate_transition(appointment.status, action)?;

        let previous = appointment.status;
        appointment.status = action.target();
        appointment.stamp_lifecycle_timestamps(now);

        info!("Appointment {} transitioned {} -> {}", appointment.id, previous, appointment.status);
        Ok(())
    }
}
