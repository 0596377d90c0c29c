use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Postgres SQLSTATE codes that PostgREST relays for constraint violations
/// which should reach the caller with their detail intact.
const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    UniqueViolation(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error payload PostgREST returns for failed statements.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl DatabaseError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<PostgrestError>(body).ok();
        let code = parsed.as_ref().and_then(|e| e.code.as_deref());

        if matches!(code, Some(UNIQUE_VIOLATION) | Some(EXCLUSION_VIOLATION)) {
            let detail = parsed
                .as_ref()
                .and_then(|e| e.details.clone().or_else(|| e.message.clone()))
                .unwrap_or_else(|| body.to_string());
            return DatabaseError::UniqueViolation(detail);
        }

        match status.as_u16() {
            401 | 403 => DatabaseError::Auth(body.to_string()),
            404 => DatabaseError::NotFound(body.to_string()),
            409 => DatabaseError::UniqueViolation(body.to_string()),
            code => DatabaseError::Api {
                status: code,
                message: body.to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Bearer sent when a call carries no caller token.
    default_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_anon_key.clone(),
            default_token: None,
        }
    }

    /// Client that bypasses row-level security by sending the service role key
    /// as both `apikey` and bearer token.
    pub fn service_role(config: &AppConfig) -> Result<Self, DatabaseError> {
        if config.supabase_service_role_key.is_empty() {
            return Err(DatabaseError::Auth(
                "SUPABASE_SERVICE_ROLE_KEY is required for the Supabase appointment store".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_service_role_key.clone(),
            default_token: Some(config.supabase_service_role_key.clone()),
        })
    }

    pub fn is_service_role(&self) -> bool {
        self.default_token.is_some()
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| DatabaseError::InvalidHeader(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token.or(self.default_token.as_deref()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| DatabaseError::InvalidHeader(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(DatabaseError::from_response(status, &error_text));
        }

        let bytes = response.bytes().await?;
        let data = serde_json::from_slice::<T>(&bytes)?;
        Ok(data)
    }

    /// Headers asking PostgREST to echo written rows back.
    pub fn return_representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}
