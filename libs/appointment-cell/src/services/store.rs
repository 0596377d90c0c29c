use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentQuery};

/// Persistence seam for appointment records.
///
/// Implementations must treat `insert` of an existing id as a constraint
/// violation and `update` of a missing id as not-found. `find_by_id` returns
/// inactive (soft-deleted) rows as well; callers decide whether they count.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Rows matching `query`, ordered by `appointment_date` ascending.
    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAppointmentStore {
    rows: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&appointment.id) {
            return Err(AppointmentError::UniqueViolation(format!(
                "Key (id)=({}) already exists.",
                appointment.id
            )));
        }
        rows.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&appointment.id) {
            Some(existing) => {
                *existing = appointment.clone();
                Ok(appointment)
            }
            None => Err(AppointmentError::NotFound(appointment.id)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<Appointment> = rows
            .values()
            .filter(|appointment| query.matches(appointment))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.appointment_date
                .cmp(&b.appointment_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(matched)
    }
}
