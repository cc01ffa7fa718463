//! HTTP surface for the `CertGate` server.
//!
//! All routes live under `/api`. Each group gets the auth middleware with its
//! own [`AuthPolicy`], then the role guard it needs.

mod admin_routes;
mod auth_routes;
pub mod error;
pub mod extract;
mod me_routes;
mod middleware;
mod tenant_routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthPipeline, AuthPolicy, LoginService, TokenService};
use crate::lifecycle::CertificateEngine;
use crate::storage::ServerDatabase;

pub use error::ApiError;
pub use extract::{ClientIp, CurrentUser};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub engine: CertificateEngine,
    pub pipeline: AuthPipeline,
    pub login: Arc<LoginService>,
    pub tokens: Arc<TokenService>,
    /// Take the client IP from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
}

pub fn build_router(state: AppState) -> Router {
    let members = (state.clone(), AuthPolicy::members());

    let auth = Router::new()
        .route("/login", post(auth_routes::login))
        .route("/login/tenant", post(auth_routes::login_tenant))
        .route("/logout", post(auth_routes::logout));

    let me = Router::new()
        .route("/me", get(me_routes::me))
        .route_layer(from_fn_with_state(
            (state.clone(), AuthPolicy::allow_disabled_guest()),
            middleware::authenticate,
        ))
        .merge(
            Router::new()
                .route("/me/password", post(me_routes::change_password))
                .route("/me/2fa/generate", post(me_routes::generate_otp))
                .route("/me/2fa/verify", post(me_routes::verify_otp))
                .route_layer(from_fn(middleware::non_guest))
                .route_layer(from_fn_with_state(members.clone(), middleware::authenticate)),
        );

    let admin = Router::new()
        .route(
            "/users",
            get(admin_routes::list_users).post(admin_routes::create_user),
        )
        .route(
            "/users/{id}",
            get(admin_routes::get_user)
                .patch(admin_routes::update_user)
                .delete(admin_routes::delete_user),
        )
        .route(
            "/users/{id}/2fa/cancel",
            post(admin_routes::reset_user_otp),
        )
        .route(
            "/certificates",
            get(admin_routes::list_certificates).post(admin_routes::create_certificate),
        )
        .route(
            "/certificates/{id}",
            get(admin_routes::get_certificate)
                .patch(admin_routes::update_certificate)
                .delete(admin_routes::delete_certificate),
        )
        .route(
            "/certificates/{id}/download",
            get(admin_routes::download_certificate),
        )
        .route(
            "/certificates/{id}/revoke",
            post(admin_routes::revoke_certificate),
        )
        .route(
            "/certificate-requests",
            get(admin_routes::list_certificate_requests),
        )
        .route(
            "/certificate-requests/{id}/approve",
            post(admin_routes::approve_request),
        )
        .route(
            "/certificate-requests/{id}/reject",
            post(admin_routes::reject_request),
        )
        .route_layer(from_fn(middleware::admin_only))
        .route_layer(from_fn_with_state(members.clone(), middleware::authenticate));

    let tenant = Router::new()
        .route("/certificate", get(tenant_routes::get_certificate))
        .route(
            "/certificate/download",
            get(tenant_routes::download_certificate),
        )
        .route(
            "/certificate-requests",
            get(tenant_routes::list_requests).post(tenant_routes::create_request),
        )
        .route_layer(from_fn(middleware::non_guest))
        .route_layer(from_fn_with_state(members, middleware::authenticate));

    let api = Router::new()
        .nest("/auth", auth)
        .merge(me)
        .nest("/admin", admin)
        .nest("/tenant", tenant);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
