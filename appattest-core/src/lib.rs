//! App Attest Core - verification orchestration for device-attested APIs
//!
//! This crate drives the two phases of Apple's App Attest protocol without
//! tying itself to an HTTP framework or a storage backend:
//!
//! - **Attestation** (once per device): a device key is bound to a server-side
//!   identity after the attestation object has been verified.
//! - **Assertion** (every request): possession of that key is proven and the
//!   stored counter is advanced to stop replays.
//!
//! Persistence and request parsing are delegated to [`plugin`] traits, the
//! cryptographic checks to [`service`] traits. The [`adapter`] module contains
//! the state machines that sequence those calls and map every failure onto the
//! closed [`ErrorKind`] set. [`requestid`] tags each request with a
//! correlation id that appears on every log line.

pub mod adapter;
pub mod error;
pub mod object;
pub mod plugin;
pub mod request;
pub mod requestid;
pub mod service;

pub use adapter::{AssertionAdapter, AssertionFlow, AttestationAdapter, AttestationFlow};
pub use error::{AdapterError, BoxError, ErrorKind, Result};
pub use object::{AssertionObject, AttestationObject, AttestationResult, ObjectError, PublicKey};
pub use plugin::{AssertionData, AssertionPlugin, AttestationData, AttestationPlugin};
pub use request::{AssertionRequest, AttestationRequest};
pub use requestid::{Generator, GeneratorSlot, RequestId, RequestIdError, REQUEST_ID_HEADER};
pub use service::{AssertionContext, AssertionService, AssertionServiceFactory, AttestationService};
