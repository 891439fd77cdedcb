use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::state::SharedState;

mod account;
mod admin_groups;
mod admin_users;
pub mod auth;
mod error;
pub mod flash;
mod observability;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

use crate::services::{AccessController, AccountService, AuthService, DirectoryService};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<dyn AccountService> {
        &self.shared.account_service
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn DirectoryService> {
        &self.shared.directory_service
    }

    #[must_use]
    pub fn access(&self) -> &AccessController {
        &self.shared.access
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            server.cookie_idle_minutes.saturating_mul(60),
        )));

    let cors_layer = if server.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .merge(create_public_router())
        .merge(create_account_router())
        .merge(create_admin_router(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ))
        .layer(session_layer)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::track_requests))
        .layer(middleware::from_fn(observability::security_headers))
        .with_state(state)
}

fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/account/login", get(account::messages).post(auth::login))
        .route("/account/messages", get(account::messages))
        .route("/account/logout", get(auth::logout))
        .route("/account/register", post(account::register))
        .route("/account/activate/resend", post(account::resend_activation))
        .route(
            "/account/activate/{user_id}/{code}",
            get(account::activate),
        )
        .route("/account/forgot-password", post(account::forgot_password))
        .route(
            "/account/forgot-password/{user_id}/{code}",
            get(account::check_reset_code).post(account::confirm_password_reset),
        )
        .route("/health", get(observability::health))
}

fn create_account_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/account", get(auth::account))
        .route("/account/password", post(auth::change_password))
        .route_layer(middleware::from_fn(auth::require_login))
}

fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", get(admin_users::list_users))
        .route("/admin/users/create", post(admin_users::create_user))
        .route("/admin/users/{id}", get(admin_users::get_user))
        .route("/admin/users/{id}/edit", post(admin_users::update_user))
        .route("/admin/users/{id}/delete", post(admin_users::delete_user))
        .route("/admin/users/{id}/suspend", post(admin_users::suspend_user))
        .route(
            "/admin/users/{id}/unsuspend",
            post(admin_users::unsuspend_user),
        )
        .route("/admin/users/{id}/ban", post(admin_users::ban_user))
        .route("/admin/groups", get(admin_groups::list_groups))
        .route("/admin/groups/create", post(admin_groups::create_group))
        .route("/admin/groups/{id}", get(admin_groups::get_group))
        .route("/admin/groups/{id}/edit", post(admin_groups::update_group))
        .route("/admin/groups/{id}/delete", post(admin_groups::delete_group))
        .route("/admin/groups/{id}/members", post(admin_groups::add_member))
        .route(
            "/admin/groups/{id}/members/{user_id}/delete",
            post(admin_groups::remove_member),
        )
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::require_admin))
}
