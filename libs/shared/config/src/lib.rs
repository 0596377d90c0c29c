use std::env;
use std::fmt;
use tracing::warn;

/// Which appointment store backs the scheduling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" | "postgrest" => Some(StoreBackend::Supabase),
            "memory" | "in-memory" | "in_memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Supabase => write!(f, "supabase"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Key the appointment store runs under. Conflict queries must see every
    /// booking of a doctor, which row-level policies for `anon` hide.
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub server_host: String,
    pub server_port: u16,
    pub identity_directory_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

        let supabase_ready = !supabase_url.is_empty() && !supabase_service_role_key.is_empty();
        let store_backend = match env::var("APPOINTMENT_STORE") {
            Ok(value) => StoreBackend::parse(&value).unwrap_or_else(|| {
                warn!("Unknown APPOINTMENT_STORE '{}', falling back to memory", value);
                StoreBackend::Memory
            }),
            Err(_) if supabase_ready => StoreBackend::Supabase,
            Err(_) => {
                warn!("APPOINTMENT_STORE not set and Supabase not configured, using in-memory store");
                StoreBackend::Memory
            }
        };

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|port| {
                port.parse::<u16>()
                    .map_err(|_| warn!("SERVER_PORT '{}' is not a valid port, using 3000", port))
                    .ok()
            })
            .unwrap_or(3000);

        let identity_directory_path = env::var("IDENTITY_DIRECTORY_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty());

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            supabase_jwt_secret,
            store_backend,
            server_host,
            server_port,
            identity_directory_path,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_backend_names() {
        assert_eq!(StoreBackend::parse("supabase"), Some(StoreBackend::Supabase));
        assert_eq!(StoreBackend::parse(" Memory "), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("in_memory"), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("mysql"), None);
    }

    #[test]
    fn bind_address_joins_host_and_port() {
        let config = AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            store_backend: StoreBackend::Memory,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            identity_directory_path: None,
        };
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert!(!config.is_configured());
    }
}
