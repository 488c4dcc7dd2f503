pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, owner_context};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/campaigns",
            get(handlers::list_campaigns).post(handlers::create_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}",
            get(handlers::get_campaign).delete(handlers::delete_campaign),
        )
        .route("/api/v1/campaigns/{id}/send", post(handlers::send_campaign))
        .route(
            "/api/v1/campaigns/{id}/analytics",
            get(handlers::campaign_analytics),
        )
        .route(
            "/api/v1/campaigns/{id}/emails",
            get(handlers::list_campaign_emails),
        )
        .route(
            "/api/v1/contacts",
            get(handlers::list_contacts).post(handlers::create_contact),
        )
        .route(
            "/api/v1/contacts/{id}",
            get(handlers::get_contact)
                .put(handlers::update_contact)
                .delete(handlers::delete_contact),
        )
        .route(
            "/api/v1/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/v1/templates/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/api/v1/dashboard/stats", get(handlers::dashboard_stats))
        .layer(axum_middleware::from_fn(owner_context))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}
