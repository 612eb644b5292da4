//! Correlation IDs for request tracing.
//!
//! Every request handled by the attestation boundary or the assertion
//! middleware gets a [`RequestId`] attached to its extensions. The id is taken
//! from the `x-request-id` header when the client sends one and is otherwise
//! minted by the active [`Generator`].
//!
//! ## Generators
//!
//! - [`UuidV4Generator`] - random UUIDs (default)
//! - [`UuidV6Generator`] - time-ordered UUIDs
//! - [`SonyflakeGenerator`] - time-ordered 64-bit distributed ids
//! - any user type implementing [`Generator`]
//!
//! Exactly one generator is active per [`GeneratorSlot`]. Swapping it is a
//! single atomic store, so requests in flight keep using whichever generator
//! they loaded.
//!
//! ## Example
//!
//! ```
//! use appattest_core::requestid::{self, GeneratorSlot, UuidV4Generator};
//!
//! let slot = GeneratorSlot::new();
//! slot.set(UuidV4Generator);
//!
//! let request = http::Request::new(());
//! let (request, id) = slot.ensure(request).unwrap();
//! assert_eq!(requestid::from_extensions(request.extensions()), id.as_str());
//! ```

mod sonyflake;
mod uuid;

pub use self::sonyflake::{use_sonyflake, SonyflakeGenerator, SonyflakeSettings};
pub use self::uuid::{use_uuid, use_uuid_v6, UuidV4Generator, UuidV6Generator};

use std::fmt;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use http::{Extensions, HeaderName, Request};
use thiserror::Error;

use crate::error::BoxError;

/// Inbound header carrying a client-supplied correlation id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Produces new correlation ids.
///
/// Implementations are shared across request-handling threads.
pub trait Generator: Send + Sync {
    /// Mint a new, unique id.
    fn next_id(&self) -> Result<String, BoxError>;
}

/// Errors raised while assigning a correlation id.
#[derive(Error, Debug)]
pub enum RequestIdError {
    #[error("generator not initialized")]
    NotInitialized,

    #[error("failed to generate request id: {0}")]
    Generator(BoxError),

    #[error("failed to build request id generator: {0}")]
    Setup(BoxError),
}

/// Correlation id attached to a request's extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boxed generator stored in the slot (`ArcSwap` needs a sized pointee).
struct Installed(Box<dyn Generator>);

/// Atomically swappable holder of the active generator.
///
/// Reads are lock-free and never observe a half-installed generator.
#[derive(Default)]
pub struct GeneratorSlot {
    active: ArcSwapOption<Installed>,
}

impl GeneratorSlot {
    /// Create an empty slot. [`ensure`](Self::ensure) fails until a generator is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active generator.
    pub fn set<G: Generator + 'static>(&self, generator: G) {
        self.active
            .store(Some(Arc::new(Installed(Box::new(generator)))));
    }

    /// Remove the active generator, returning the slot to its initial state.
    pub fn clear(&self) {
        self.active.store(None);
    }

    /// Whether a generator has been installed.
    pub fn is_initialized(&self) -> bool {
        self.active.load().is_some()
    }

    /// Mint an id with the active generator.
    pub fn next_id(&self) -> Result<String, RequestIdError> {
        let current = self.active.load_full().ok_or(RequestIdError::NotInitialized)?;
        current.0.next_id().map_err(RequestIdError::Generator)
    }

    /// Attach a correlation id to `request`.
    ///
    /// Resolution order:
    /// 1. fail with [`RequestIdError::NotInitialized`] if no generator is set
    /// 2. an id already present in the extensions is kept
    /// 3. a non-empty `x-request-id` header is used verbatim
    /// 4. otherwise the generator is called exactly once
    pub fn ensure<B>(&self, mut request: Request<B>) -> Result<(Request<B>, RequestId), RequestIdError> {
        let current = self.active.load_full().ok_or(RequestIdError::NotInitialized)?;

        if let Some(existing) = request.extensions().get::<RequestId>() {
            let existing = existing.clone();
            return Ok((request, existing));
        }

        let id = match request.headers().get(REQUEST_ID_HEADER) {
            Some(value) if !value.is_empty() => {
                RequestId(String::from_utf8_lossy(value.as_bytes()).into_owned())
            }
            _ => RequestId(current.0.next_id().map_err(RequestIdError::Generator)?),
        };

        request.extensions_mut().insert(id.clone());
        Ok((request, id))
    }
}

impl fmt::Debug for GeneratorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorSlot")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

static GLOBAL: LazyLock<Arc<GeneratorSlot>> = LazyLock::new(|| Arc::new(GeneratorSlot::new()));

/// The process-wide generator slot.
pub fn global() -> Arc<GeneratorSlot> {
    Arc::clone(&GLOBAL)
}

/// Install `generator` as the process-wide generator.
pub fn use_generator<G: Generator + 'static>(generator: G) {
    GLOBAL.set(generator);
}

/// [`GeneratorSlot::ensure`] against the process-wide slot.
pub fn ensure<B>(request: Request<B>) -> Result<(Request<B>, RequestId), RequestIdError> {
    GLOBAL.ensure(request)
}

/// The correlation id stored in `extensions`, or `""` when none is attached.
pub fn from_extensions(extensions: &Extensions) -> &str {
    extensions
        .get::<RequestId>()
        .map(RequestId::as_str)
        .unwrap_or("")
}
