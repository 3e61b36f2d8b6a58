//! Route handlers for the campaign HTTP surface.

pub mod campaigns;
pub mod events;
pub mod health;
pub mod invitations;
pub mod messages;
pub mod webhook;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // Operator API
        .route(
            "/api/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route("/api/campaigns/:id/templates", post(campaigns::create_template))
        .route(
            "/api/campaigns/:id/contacts",
            // Uploads are streamed to disk, so no in-memory cap.
            post(campaigns::upload_contacts).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/campaigns/:id/invitations",
            get(invitations::list).post(invitations::generate),
        )
        .route("/api/campaigns/:id/invitations/send", post(invitations::send))
        .route("/api/messages", get(messages::list).post(messages::send))
        .route("/api/events", get(events::stream))
        // Provider webhooks
        .route("/api/webhook", post(webhook::inbound))
        .route("/api/webhook/status", post(webhook::status))
}
