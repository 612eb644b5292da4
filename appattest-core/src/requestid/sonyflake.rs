//! Sonyflake generator: time-ordered 64-bit ids suitable for multi-node deployments.

use ::sonyflake::Sonyflake;
use chrono::{DateTime, Utc};

use super::{use_generator, Generator, RequestIdError};
use crate::error::BoxError;

/// Settings for [`SonyflakeGenerator`].
///
/// Unset fields fall back to the library defaults: the epoch
/// 2014-09-01T00:00:00Z and a machine id taken from the lower 16 bits of the
/// host's private IPv4 address.
#[derive(Debug, Clone, Default)]
pub struct SonyflakeSettings {
    pub start_time: Option<DateTime<Utc>>,
    pub machine_id: Option<u16>,
}

/// Generates decimal-encoded Sonyflake ids.
#[derive(Clone)]
pub struct SonyflakeGenerator {
    inner: Sonyflake,
}

impl SonyflakeGenerator {
    pub fn new(settings: SonyflakeSettings) -> Result<Self, BoxError> {
        let machine_id = settings.machine_id;
        let machine_id_fn = move || -> Result<u16, BoxError> {
            machine_id.ok_or_else(|| BoxError::from("machine id not configured"))
        };

        let mut builder = Sonyflake::builder();
        if let Some(start_time) = settings.start_time {
            builder = builder.start_time(start_time);
        }
        if machine_id.is_some() {
            builder = builder.machine_id(&machine_id_fn);
        }

        let inner = builder.finalize()?;
        tracing::debug!(
            machine_id = ?settings.machine_id,
            "Sonyflake generator created"
        );
        Ok(Self { inner })
    }
}

impl Generator for SonyflakeGenerator {
    fn next_id(&self) -> Result<String, BoxError> {
        let id = self.inner.next_id()?;
        Ok(id.to_string())
    }
}

impl std::fmt::Debug for SonyflakeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonyflakeGenerator").finish_non_exhaustive()
    }
}

/// Install a [`SonyflakeGenerator`] as the process-wide generator.
pub fn use_sonyflake(settings: SonyflakeSettings) -> Result<(), RequestIdError> {
    let generator = SonyflakeGenerator::new(settings).map_err(RequestIdError::Setup)?;
    use_generator(generator);
    Ok(())
}
