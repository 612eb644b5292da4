//! Router configuration module
//!
//! Mounts the attestation endpoints, puts the adopter's protected routes
//! behind the assertion middleware, and applies the common layer stack.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method, StatusCode},
    middleware::from_fn_with_state,
    routing::post,
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handler::{issue_challenge, verify_attestation, AttestationHandler};
use crate::middleware::{verify_assertion, AssertionMiddleware};

/// Attestation endpoints only, without shared layers.
pub fn attestation_routes(handler: Arc<AttestationHandler>) -> Router {
    Router::new()
        .route("/attest/challenge", post(issue_challenge))
        .route("/attest/verify", post(verify_attestation))
        .with_state(handler)
}

/// Wrap `routes` in the assertion middleware.
pub fn protect(routes: Router, middleware: Arc<AssertionMiddleware>) -> Router {
    routes.layer(from_fn_with_state(middleware, verify_assertion))
}

/// Create the application router.
///
/// `protected` holds the adopter's own routes; every request to them must
/// carry a valid assertion.
///
/// No router-wide body limit is applied. The attestation handler and the
/// assertion middleware bound their own reads and answer 400 when exceeded.
pub fn create_router(
    config: &Config,
    handler: Arc<AttestationHandler>,
    middleware: Arc<AssertionMiddleware>,
    protected: Router,
) -> Router {
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    appattest_core::REQUEST_ID_HEADER,
                ])
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    let router = attestation_routes(handler)
        .merge(protect(protected, middleware))
        .layer(cors)
        .layer(timeout);

    if config.rate_limit_enabled {
        let Some(governor_conf) = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
        else {
            tracing::error!(
                per_sec = config.rate_limit_per_sec,
                burst = config.rate_limit_burst,
                "Invalid rate limit settings, rate limiting disabled"
            );
            return router.layer(TraceLayer::new_for_http());
        };

        tracing::info!(
            "Rate limiting: {} req/s (burst: {})",
            config.rate_limit_per_sec,
            config.rate_limit_burst
        );

        router
            .layer(GovernorLayer::new(Arc::new(governor_conf)))
            .layer(TraceLayer::new_for_http())
    } else {
        tracing::warn!("Rate limiting: DISABLED");
        router.layer(TraceLayer::new_for_http())
    }
}
