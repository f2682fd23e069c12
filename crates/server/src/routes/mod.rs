use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod chat;
mod extract;
mod health;
mod reports;
mod user;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.config.server.max_upload_bytes;

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        // Profile
        .route(
            "/api/user/profile",
            get(user::get_profile).put(user::update_profile),
        )
        // Chat sessions and history
        .route(
            "/api/chat/sessions",
            get(chat::list_sessions).post(chat::create_session),
        )
        .route(
            "/api/chat/history",
            get(chat::get_history).post(chat::append_history),
        )
        // Reports
        .route(
            "/api/reports/upload",
            post(reports::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/reports", get(reports::list))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
