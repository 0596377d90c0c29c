// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_staff;

use crate::models::{
    parse_date_bound, AppointmentError, AppointmentFilter, AppointmentStatus, CancelAppointmentRequest,
    CreateAppointmentRequest, UpdateAppointmentRequest, DEFAULT_DURATION_MINUTES,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::AppointmentBookingService;
use crate::services::clock::Clock;
use crate::services::identity::IdentityResolver;
use crate::services::statistics::StatisticsService;
use crate::services::store::AppointmentStore;

/// Everything the appointment routes need, shared across requests.
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub booking: AppointmentBookingService,
    pub availability: AvailabilityService,
    pub statistics: StatisticsService,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn AppointmentStore>,
        identity: Arc<dyn IdentityResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            booking: AppointmentBookingService::new(Arc::clone(&store), identity, clock),
            availability: AvailabilityService::new(Arc::clone(&store)),
            statistics: StatisticsService::new(store),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(_)
            | AppointmentError::PatientNotFound(_)
            | AppointmentError::DoctorNotFound(_)
            | AppointmentError::ClinicNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::Conflict { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::UniqueViolation(detail) => AppError::Conflict(detail),
            AppointmentError::Persistence(detail) => {
                error!("Appointment store failure: {}", detail);
                AppError::BadRequest("Unable to process appointment request".to_string())
            }
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

fn caller_patient_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Forbidden("Caller is not linked to a patient record".to_string()))
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQueryParams {
    #[serde(alias = "clinicId")]
    pub clinic_id: Option<Uuid>,
    #[serde(alias = "doctorId")]
    pub doctor_id: Option<Uuid>,
    #[serde(alias = "patientId")]
    pub patient_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
}

impl AppointmentQueryParams {
    pub fn into_filter(self) -> Result<AppointmentFilter, AppointmentError> {
        Ok(AppointmentFilter {
            clinic_id: self.clinic_id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            status: self.status.as_deref().map(str::parse::<AppointmentStatus>).transpose()?,
            start_date: self
                .start_date
                .as_deref()
                .map(|value| parse_date_bound(value, false))
                .transpose()?,
            end_date: self
                .end_date
                .as_deref()
                .map(|value| parse_date_bound(value, true))
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    #[serde(alias = "clinicId")]
    pub clinic_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    #[serde(alias = "doctorId")]
    pub doctor_id: Uuid,
    #[serde(alias = "startTime")]
    pub start_time: DateTime<Utc>,
    pub duration: Option<i32>,
    #[serde(alias = "excludeAppointmentId")]
    pub exclude_appointment_id: Option<Uuid>,
}

fn parse_calendar_date(value: &str) -> Result<NaiveDate, AppointmentError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| parse_date_bound(value, false).map(|instant| instant.date_naive()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "book appointments")?;
    let request = body(payload)?;

    let appointment = state.booking.create_appointment(request, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let mut filter = params.into_filter()?;

    // Non-staff callers only ever see their own bookings.
    if !user.is_staff() {
        filter.patient_id = Some(caller_patient_id(&user)?);
    }

    let appointments = state.booking.find_all(&filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.find_one(appointment_id).await?;

    if !user.is_staff() && appointment.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment_details(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let details = state.booking.get_details(appointment_id).await?;

    if !user.is_staff() && details.appointment.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    payload: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "update appointments")?;
    let patch = body(payload)?;

    let appointment = state
        .booking
        .update_appointment(appointment_id, patch, &user.id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn remove_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "delete appointments")?;

    let appointment = state.booking.remove(appointment_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment.id,
        "message": "Appointment deleted successfully"
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "confirm appointments")?;
    let appointment = state.booking.confirm(appointment_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn start_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "start appointments")?;
    let appointment = state.booking.start(appointment_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment started"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "complete appointments")?;
    let appointment = state.booking.complete(appointment_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    payload: Result<Json<CancelAppointmentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "cancel appointments")?;
    let request = body(payload)?;

    let appointment = state
        .booking
        .cancel(appointment_id, &request.cancellation_reason, &user.id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "mark appointments as no-show")?;
    let appointment = state.booking.mark_no_show(appointment_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment marked as no-show"
    })))
}

// ==============================================================================
// READ-ONLY QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn check_doctor_availability(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Query(params): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_calendar_date(&params.date)?;
    let availability = state
        .availability
        .check_availability(doctor_id, date, params.clinic_id)
        .await?;

    if !user.is_staff() {
        return Ok(Json(json!(availability.redacted())));
    }

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(params): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "check scheduling conflicts")?;

    let result = state
        .booking
        .check_conflicts(
            params.doctor_id,
            params.start_time,
            params.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            params.exclude_appointment_id,
        )
        .await?;

    Ok(Json(json!(result)))
}

#[axum::debug_handler]
pub async fn get_appointment_statistics(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "view appointment statistics")?;

    let filter = params.into_filter()?;
    let statistics = state.statistics.get_statistics(&filter).await?;

    Ok(Json(json!(statistics)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn maps_engine_errors_to_http_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (AppointmentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::NotFound(id), StatusCode::NOT_FOUND),
            (AppointmentError::DoctorNotFound(id), StatusCode::NOT_FOUND),
            (
                AppointmentError::Conflict { doctor_id: id, conflicting: vec![Uuid::new_v4()] },
                StatusCode::CONFLICT,
            ),
            (
                AppointmentError::InvalidStatusTransition {
                    action: "complete",
                    current: AppointmentStatus::Scheduled,
                    allowed: vec![AppointmentStatus::Confirmed],
                },
                StatusCode::BAD_REQUEST,
            ),
            (AppointmentError::Persistence("socket closed".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::UniqueViolation("Key (id) exists".into()), StatusCode::CONFLICT),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn persistence_detail_is_not_relayed() {
        let app_error = AppError::from(AppointmentError::Persistence("password=hunter2".into()));
        assert!(!app_error.to_string().contains("hunter2"));

        let unique = AppError::from(AppointmentError::UniqueViolation("Key (id)=(1) already exists.".into()));
        assert!(unique.to_string().contains("Key (id)=(1) already exists."));
    }

    #[test]
    fn query_params_parse_into_typed_filter() {
        let params = AppointmentQueryParams {
            status: Some("in_progress".into()),
            start_date: Some("2025-06-01".into()),
            end_date: Some("2025-06-02".into()),
            ..AppointmentQueryParams::default()
        };
        let filter = params.into_filter().unwrap();
        assert_eq!(filter.status, Some(AppointmentStatus::InProgress));
        assert!(filter.start_date.unwrap() < filter.end_date.unwrap());

        let bad = AppointmentQueryParams { status: Some("pending".into()), ..AppointmentQueryParams::default() };
        assert!(bad.into_filter().is_err());
    }

    #[test]
    fn calendar_date_accepts_plain_and_rfc3339() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(parse_calendar_date("2025-06-01").unwrap(), expected);
        assert_eq!(parse_calendar_date("2025-06-01T15:00:00Z").unwrap(), expected);
        assert!(parse_calendar_date("tomorrow").is_err());
    }
}
