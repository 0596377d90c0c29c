// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;

use shared_database::DatabaseError;

pub const MIN_DURATION_MINUTES: i32 = 15;
pub const MAX_DURATION_MINUTES: i32 = 480;
pub const DEFAULT_DURATION_MINUTES: i32 = 30;

/// Lead time subtracted from a candidate start before looking for overlaps.
/// Applied only in front of the candidate; its end is never padded.
pub const CONFLICT_BUFFER_MINUTES: i64 = 15;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub duration: i32,
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub priority: AppointmentPriority,
    #[serde(default)]
    pub is_emergency: bool,
    pub status: AppointmentStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,

    // Clinical payload, stored as given
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,

    // Payment fields are carried, never computed here
    #[serde(default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub final_cost: Option<f64>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,

    // Recurrence is recorded but never expanded
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_pattern: Option<String>,

    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,

    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Appointment {
    /// End instant, derived from start and duration.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.appointment_date + Duration::minutes(self.duration as i64)
    }

    /// Whether this record takes part in conflict detection.
    pub fn is_blocking(&self) -> bool {
        self.is_active && self.status.is_blocking()
    }

    /// Invariants checked on every insert and update.
    pub fn validate(&self) -> Result<(), AppointmentError> {
        validate_duration(self.duration)
    }

    /// Write hook run before every persist: sets the lifecycle timestamp matching
    /// the current status if it has not been set yet. Never overwrites.
    pub fn stamp_lifecycle_timestamps(&mut self, now: DateTime<Utc>) {
        match self.status {
            AppointmentStatus::Confirmed => {
                self.confirmed_at.get_or_insert(now);
            }
            AppointmentStatus::Completed => {
                self.completed_at.get_or_insert(now);
            }
            AppointmentStatus::Cancelled => {
                self.cancelled_at.get_or_insert(now);
            }
            _ => {}
        }
    }
}

pub fn validate_duration(duration: i32) -> Result<(), AppointmentError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(AppointmentError::Validation(format!(
            "Duration must be between {} and {} minutes, got {}",
            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES, duration
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
        AppointmentStatus::Rescheduled,
    ];

    /// Statuses that hold a doctor's time. Shared by conflict detection and
    /// the availability query.
    pub const BLOCKING: [AppointmentStatus; 3] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppointmentError::Validation(format!("Unknown appointment status: {}", value)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Emergency,
    Surgery,
    Laboratory,
    Imaging,
    Vaccination,
    Therapy,
    Other,
}

impl AppointmentType {
    pub const ALL: [AppointmentType; 9] = [
        AppointmentType::Consultation,
        AppointmentType::FollowUp,
        AppointmentType::Emergency,
        AppointmentType::Surgery,
        AppointmentType::Laboratory,
        AppointmentType::Imaging,
        AppointmentType::Vaccination,
        AppointmentType::Therapy,
        AppointmentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow_up",
            AppointmentType::Emergency => "emergency",
            AppointmentType::Surgery => "surgery",
            AppointmentType::Laboratory => "laboratory",
            AppointmentType::Imaging => "imaging",
            AppointmentType::Vaccination => "vaccination",
            AppointmentType::Therapy => "therapy",
            AppointmentType::Other => "other",
        }
    }
}

impl Default for AppointmentType {
    fn default() -> Self {
        AppointmentType::Consultation
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration: i32,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub priority: AppointmentPriority,
    #[serde(default)]
    pub is_emergency: bool,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurring_pattern: Option<String>,
}

fn default_duration() -> i32 {
    DEFAULT_DURATION_MINUTES
}

/// Generic field patch. Status is deliberately absent: status changes go
/// through the lifecycle operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub appointment_type: Option<AppointmentType>,
    pub priority: Option<AppointmentPriority>,
    pub is_emergency: Option<bool>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub estimated_cost: Option<f64>,
    pub final_cost: Option<f64>,
    pub is_paid: Option<bool>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    pub recurring_pattern: Option<String>,
}

impl UpdateAppointmentRequest {
    /// True when the patch moves the appointment's time window.
    pub fn changes_schedule(&self, current: &Appointment) -> bool {
        self.appointment_date.map_or(false, |date| date != current.appointment_date)
            || self.duration.map_or(false, |duration| duration != current.duration)
    }

    /// Merges the present fields into `appointment`.
    pub fn apply_to(self, appointment: &mut Appointment) {
        if let Some(date) = self.appointment_date {
            appointment.appointment_date = date;
        }
        if let Some(duration) = self.duration {
            appointment.duration = duration;
        }
        if let Some(appointment_type) = self.appointment_type {
            appointment.appointment_type = appointment_type;
        }
        if let Some(priority) = self.priority {
            appointment.priority = priority;
        }
        if let Some(is_emergency) = self.is_emergency {
            appointment.is_emergency = is_emergency;
        }
        if self.reason.is_some() {
            appointment.reason = self.reason;
        }
        if self.notes.is_some() {
            appointment.notes = self.notes;
        }
        if self.symptoms.is_some() {
            appointment.symptoms = self.symptoms;
        }
        if self.estimated_cost.is_some() {
            appointment.estimated_cost = self.estimated_cost;
        }
        if self.final_cost.is_some() {
            appointment.final_cost = self.final_cost;
        }
        if let Some(is_paid) = self.is_paid {
            appointment.is_paid = is_paid;
        }
        if self.payment_method.is_some() {
            appointment.payment_method = self.payment_method;
        }
        if self.paid_at.is_some() {
            appointment.paid_at = self.paid_at;
        }
        if let Some(is_recurring) = self.is_recurring {
            appointment.is_recurring = is_recurring;
        }
        if self.recurring_pattern.is_some() {
            appointment.recurring_pattern = self.recurring_pattern;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub cancellation_reason: String,
}

// ==============================================================================
// QUERY MODELS
// ==============================================================================

/// Typed filter for listing and statistics. Built from loosely-typed query
/// parameters at the handler boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub clinic_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn to_query(&self) -> AppointmentQuery {
        AppointmentQuery {
            clinic_id: self.clinic_id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            statuses: self.status.map(|status| vec![status]),
            starts_from: self.start_date,
            starts_until: self.end_date,
            exclude_id: None,
            include_inactive: false,
        }
    }
}

/// Store-level query. Date bounds are inclusive and apply to `appointment_date`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentQuery {
    pub clinic_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub statuses: Option<Vec<AppointmentStatus>>,
    pub starts_from: Option<DateTime<Utc>>,
    pub starts_until: Option<DateTime<Utc>>,
    pub exclude_id: Option<Uuid>,
    pub include_inactive: bool,
}

impl AppointmentQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        if !self.include_inactive && !appointment.is_active {
            return false;
        }
        if self.clinic_id.map_or(false, |id| id != appointment.clinic_id) {
            return false;
        }
        if self.doctor_id.map_or(false, |id| id != appointment.doctor_id) {
            return false;
        }
        if self.patient_id.map_or(false, |id| id != appointment.patient_id) {
            return false;
        }
        if self.exclude_id.map_or(false, |id| id == appointment.id) {
            return false;
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&appointment.status) {
                return false;
            }
        }
        if self.starts_from.map_or(false, |from| appointment.appointment_date < from) {
            return false;
        }
        if self.starts_until.map_or(false, |until| appointment.appointment_date > until) {
            return false;
        }
        true
    }
}

/// Parses a filter date. Accepts RFC 3339 instants or plain `YYYY-MM-DD` dates;
/// a plain date resolves to the start of the day, or to its last millisecond
/// when `end_of_day` is set.
pub fn parse_date_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppointmentError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppointmentError::Validation(format!(
            "Invalid date '{}': expected YYYY-MM-DD or RFC 3339",
            value
        ))
    })?;
    let (start, end) = day_bounds(date);
    Ok(if end_of_day { end } else { start })
}

/// `[00:00:00.000, 23:59:59.999]` of `date`, in UTC.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

impl AvailabilityResponse {
    pub fn from_conflicts(conflicting_appointments: Vec<Appointment>) -> Self {
        Self {
            available: conflicting_appointments.is_empty(),
            conflicting_appointments,
        }
    }

    /// Drops everything but timing and status from the booked slots.
    pub fn redacted(&self) -> SlotAvailability {
        SlotAvailability {
            available: self.available,
            conflicting_appointments: self.conflicting_appointments.iter().map(BookedSlot::from).collect(),
        }
    }
}

/// A booking as seen by callers who may not read its record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookedSlot {
    pub id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub duration: i32,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl From<&Appointment> for BookedSlot {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            appointment_date: appointment.appointment_date,
            duration: appointment.duration,
            end_time: appointment.end_time(),
            status: appointment.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotAvailability {
    pub available: bool,
    pub conflicting_appointments: Vec<BookedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub buffered_start: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// STATISTICS AND SUMMARY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCount {
    pub status: AppointmentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeCount {
    pub appointment_type: AppointmentType,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentStatistics {
    pub total_appointments: usize,
    pub status_stats: Vec<StatusCount>,
    pub type_stats: Vec<TypeCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySummary {
    pub id: Uuid,
    pub display_name: String,
    pub is_active: bool,
}

/// Appointment plus the display data of the records it references, resolved
/// on demand rather than loaded with every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDetails {
    pub appointment: Appointment,
    pub end_time: DateTime<Utc>,
    pub patient: Option<EntitySummary>,
    pub doctor: Option<EntitySummary>,
    pub clinic: Option<EntitySummary>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Patient not found or inactive: {0}")]
    PatientNotFound(Uuid),

    #[error("Doctor not found, inactive, or not a doctor: {0}")]
    DoctorNotFound(Uuid),

    #[error("Clinic not found or inactive: {0}")]
    ClinicNotFound(Uuid),

    #[error("Scheduling conflict: doctor {doctor_id} has {} overlapping appointment(s)", .conflicting.len())]
    Conflict { doctor_id: Uuid, conflicting: Vec<Uuid> },

    #[error("Cannot {action} appointment in status '{current}'; allowed transitions: {}", format_statuses(.allowed))]
    InvalidStatusTransition {
        action: &'static str,
        current: AppointmentStatus,
        allowed: Vec<AppointmentStatus>,
    },

    #[error("Database error: {0}")]
    Persistence(String),

    #[error("Constraint violation: {0}")]
    UniqueViolation(String),
}

fn format_statuses(statuses: &[AppointmentStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses
        .iter()
        .map(AppointmentStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<DatabaseError> for AppointmentError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(detail) => AppointmentError::UniqueViolation(detail),
            other => AppointmentError::Persistence(other.to_string()),
        }
    }
}
