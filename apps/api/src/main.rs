use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::clock::SystemClock;
use appointment_cell::services::identity::{IdentityResolver, StaticIdentityResolver, SupabaseIdentityResolver};
use appointment_cell::services::store::{AppointmentStore, InMemoryAppointmentStore};
use appointment_cell::services::supabase_store::SupabaseAppointmentStore;
use appointment_cell::AppointmentState;
use shared_config::{AppConfig, StoreBackend};
use shared_database::SupabaseClient;

fn build_state(config: Arc<AppConfig>) -> anyhow::Result<Arc<AppointmentState>> {
    let (store, identity): (Arc<dyn AppointmentStore>, Arc<dyn IdentityResolver>) =
        match config.store_backend {
            StoreBackend::Supabase => {
                let supabase = Arc::new(
                    SupabaseClient::service_role(&config)
                        .context("configuring Supabase appointment store")?,
                );
                (
                    Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
                    Arc::new(SupabaseIdentityResolver::new(supabase)),
                )
            }
            StoreBackend::Memory => {
                let directory = match &config.identity_directory_path {
                    Some(path) => {
                        let raw = std::fs::read_to_string(path)
                            .with_context(|| format!("reading identity directory {}", path))?;
                        StaticIdentityResolver::from_json(&raw)?
                    }
                    None => {
                        warn!("IDENTITY_DIRECTORY_PATH not set, every booking will fail identity checks");
                        StaticIdentityResolver::new()
                    }
                };
                (Arc::new(InMemoryAppointmentStore::new()), Arc::new(directory))
            }
        };

    Ok(Arc::new(AppointmentState::new(
        config,
        store,
        identity,
        Arc::new(SystemClock),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API");

    let config = Arc::new(AppConfig::from_env());
    info!("Using {} appointment store", config.store_backend);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = build_state(Arc::clone(&config))?;

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
