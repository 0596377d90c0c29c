use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentQuery};
use crate::services::store::AppointmentStore;

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

/// PostgREST-backed store over the `appointments` table.
///
/// Expects a `SupabaseClient::service_role` client, which sends
/// `SUPABASE_SERVICE_ROLE_KEY` as both `apikey` and bearer token. Conflict
/// detection has to see every booking of a doctor, and row-level policies for
/// `anon` or the caller would return an empty set instead of an error.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        if !supabase.is_service_role() {
            warn!("Appointment store built without the service role key, row-level security may hide bookings");
        }
        Self { supabase }
    }

    fn encode_instant(instant: DateTime<Utc>) -> String {
        urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Millis, true)).into_owned()
    }

    /// Translates a store query into a PostgREST request path.
    pub fn query_path(query: &AppointmentQuery) -> String {
        let mut filters: Vec<String> = Vec::new();

        if !query.include_inactive {
            filters.push("is_active=eq.true".to_string());
        }
        if let Some(clinic_id) = query.clinic_id {
            filters.push(format!("clinic_id=eq.{}", clinic_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(statuses) = &query.statuses {
            let list = statuses
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(",");
            filters.push(format!("status=in.({})", list));
        }
        if let Some(from) = query.starts_from {
            filters.push(format!("appointment_date=gte.{}", Self::encode_instant(from)));
        }
        if let Some(until) = query.starts_until {
            filters.push(format!("appointment_date=lte.{}", Self::encode_instant(until)));
        }
        if let Some(exclude_id) = query.exclude_id {
            filters.push(format!("id=neq.{}", exclude_id));
        }
        filters.push("order=appointment_date.asc".to_string());

        format!("{}?{}", APPOINTMENTS_PATH, filters.join("&"))
    }

    fn first_row(rows: Vec<Appointment>, id: Uuid) -> Result<Appointment, AppointmentError> {
        rows.into_iter().next().ok_or(AppointmentError::NotFound(id))
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let body: Value = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::Persistence(e.to_string()))?;

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                APPOINTMENTS_PATH,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        debug!("Inserted appointment {}", appointment.id);
        Self::first_row(rows, appointment.id)
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let body: Value = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::Persistence(e.to_string()))?;
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, appointment.id);

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        Self::first_row(rows, appointment.id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("{}?id=eq.{}&limit=1", APPOINTMENTS_PATH, id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Self::query_path(query);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        debug!("Store query returned {} appointments", rows.len());
        Ok(rows)
    }
}
