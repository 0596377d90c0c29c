use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, EntitySummary};

pub const DOCTOR_ROLE: &str = "doctor";
pub const PATIENT_ROLE: &str = "patient";

/// A referenced record as seen by the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEntity {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl ResolvedEntity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            id: self.id,
            display_name: self.display_name.clone(),
            is_active: self.is_active,
        }
    }
}

/// Looks up patients, staff users and clinics by id. A missing record is
/// `Ok(None)`; errors are reserved for lookups that could not be made.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_patient(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError>;

    /// Looks up a staff user. Whether they hold the doctor role is left to
    /// the caller.
    async fn resolve_doctor(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError>;

    async fn resolve_clinic(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError>;
}

// ==============================================================================
// STATIC DIRECTORY
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    patients: Vec<ResolvedEntity>,
    #[serde(default)]
    users: Vec<ResolvedEntity>,
    #[serde(default)]
    clinics: Vec<ResolvedEntity>,
}

fn index(entities: Vec<ResolvedEntity>) -> HashMap<Uuid, ResolvedEntity> {
    entities.into_iter().map(|entity| (entity.id, entity)).collect()
}

/// In-process directory used with the in-memory store and in tests.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    patients: RwLock<HashMap<Uuid, ResolvedEntity>>,
    users: RwLock<HashMap<Uuid, ResolvedEntity>>,
    clinics: RwLock<HashMap<Uuid, ResolvedEntity>>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a directory from JSON of the form
    /// `{"patients": [...], "users": [...], "clinics": [...]}`.
    pub fn from_json(raw: &str) -> Result<Self, AppointmentError> {
        let file: DirectoryFile = serde_json::from_str(raw)
            .map_err(|e| AppointmentError::Validation(format!("Invalid identity directory: {}", e)))?;

        Ok(Self {
            patients: RwLock::new(index(file.patients)),
            users: RwLock::new(index(file.users)),
            clinics: RwLock::new(index(file.clinics)),
        })
    }

    pub async fn register_patient(&self, id: Uuid, display_name: &str, is_active: bool) {
        self.patients.write().await.insert(
            id,
            ResolvedEntity {
                id,
                display_name: display_name.to_string(),
                is_active,
                roles: vec![PATIENT_ROLE.to_string()],
            },
        );
    }

    pub async fn register_user(&self, id: Uuid, display_name: &str, roles: &[&str], is_active: bool) {
        self.users.write().await.insert(
            id,
            ResolvedEntity {
                id,
                display_name: display_name.to_string(),
                is_active,
                roles: roles.iter().map(|role| role.to_string()).collect(),
            },
        );
    }

    pub async fn register_clinic(&self, id: Uuid, display_name: &str, is_active: bool) {
        self.clinics.write().await.insert(
            id,
            ResolvedEntity {
                id,
                display_name: display_name.to_string(),
                is_active,
                roles: Vec::new(),
            },
        );
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve_patient(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        Ok(self.patients.read().await.get(&id).cloned())
    }

    async fn resolve_doctor(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn resolve_clinic(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        Ok(self.clinics.read().await.get(&id).cloned())
    }
}

// ==============================================================================
// SUPABASE DIRECTORY
// ==============================================================================

#[derive(Debug, Deserialize)]
struct PatientRow {
    id: Uuid,
    full_name: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Uuid,
    full_name: Option<String>,
    role: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ClinicRow {
    id: Uuid,
    name: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

/// Resolves references against the `patients`, `users` and `clinics` tables
/// through a service role client.
pub struct SupabaseIdentityResolver {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseIdentityResolver {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        if !supabase.is_service_role() {
            warn!("Identity resolver built without the service role key, lookups may miss rows");
        }
        Self { supabase }
    }
}

#[async_trait]
impl IdentityResolver for SupabaseIdentityResolver {
    async fn resolve_patient(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id,full_name,is_active&limit=1", id);
        let rows: Vec<PatientRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        debug!("Patient lookup {} returned {} rows", id, rows.len());

        Ok(rows.into_iter().next().map(|row| ResolvedEntity {
            id: row.id,
            display_name: row.full_name.unwrap_or_default(),
            is_active: row.is_active,
            roles: vec![PATIENT_ROLE.to_string()],
        }))
    }

    async fn resolve_doctor(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=id,full_name,role,is_active&limit=1", id);
        let rows: Vec<UserRow> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(rows.into_iter().next().map(|row| ResolvedEntity {
            id: row.id,
            display_name: row.full_name.unwrap_or_default(),
            is_active: row.is_active,
            roles: row.role.into_iter().collect(),
        }))
    }

    async fn resolve_clinic(&self, id: Uuid) -> Result<Option<ResolvedEntity>, AppointmentError> {
        let path = format!("/rest/v1/clinics?id=eq.{}&select=id,name,is_active&limit=1", id);
        let rows: Vec<ClinicRow> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(rows.into_iter().next().map(|row| ResolvedEntity {
            id: row.id,
            display_name: row.name.unwrap_or_default(),
            is_active: row.is_active,
            roles: Vec::new(),
        }))
    }
}
