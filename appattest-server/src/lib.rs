//! App Attest Server - axum boundary for device-attested APIs
//!
//! Exposes the attestation endpoints ([`AttestationHandler`]) and the
//! assertion middleware ([`AssertionMiddleware`]) that guards an adopter's
//! routes. Verification itself lives in `appattest-core`; this crate only
//! translates its outcomes into HTTP.

pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod routes;

pub use config::{AssertionConfig, Config, ConfigError, RequestIdGeneratorKind, DEFAULT_BODY_LIMIT};
pub use error::BoundaryError;
pub use handler::{issue_challenge, verify_attestation, AttestationHandler, ChallengeHooks, VerifyHooks};
pub use middleware::{verify_assertion, AssertionMiddleware};
pub use routes::{attestation_routes, create_router, protect};
