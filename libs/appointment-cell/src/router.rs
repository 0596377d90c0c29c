// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    // Every appointment operation requires an authenticated caller
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::create_appointment))
        .route("/statistics", get(handlers::get_appointment_statistics))
        .route("/availability/{doctor_id}", get(handlers::check_doctor_availability))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .patch(handlers::update_appointment)
                .delete(handlers::remove_appointment),
        )
        .route("/{appointment_id}/details", get(handlers::get_appointment_details))

        // Lifecycle transitions
        .route("/{appointment_id}/confirm", patch(handlers::confirm_appointment))
        .route("/{appointment_id}/start", patch(handlers::start_appointment))
        .route("/{appointment_id}/complete", patch(handlers::complete_appointment))
        .route("/{appointment_id}/cancel", patch(handlers::cancel_appointment))
        .route("/{appointment_id}/no-show", patch(handlers::mark_no_show))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
