pub mod health;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::intake::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Applicant & wizard
        .route(
            "/api/v1/applicants/resolve",
            post(handlers::handle_resolve),
        )
        .route(
            "/api/v1/applications/advance",
            post(handlers::handle_advance),
        )
        .route(
            "/api/v1/applications/advance/documents",
            post(handlers::handle_advance_documents),
        )
        .route(
            "/api/v1/applications/draft",
            post(handlers::handle_save_draft),
        )
        .route("/api/v1/applications/resume", get(handlers::handle_resume))
        .route(
            "/api/v1/applications/finalize",
            post(handlers::handle_finalize),
        )
        // Documents
        .route("/api/v1/documents", post(handlers::handle_upload))
        .route(
            "/api/v1/documents/:id/url",
            get(handlers::handle_signed_url),
        )
        .route(
            "/api/v1/documents/:id",
            delete(handlers::handle_remove_document),
        )
        .route(
            "/api/v1/applicants/:id/documents",
            get(handlers::handle_list_documents),
        )
        // Review console
        .route(
            "/api/v1/admin/applications",
            get(handlers::handle_scored_applications),
        )
        .route(
            "/api/v1/admin/applications/:id/status",
            patch(handlers::handle_set_status),
        )
        .route(
            "/api/v1/scoring/preview",
            post(handlers::handle_scoring_preview),
        )
        .with_state(state)
}
