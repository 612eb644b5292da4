//! App Attest payload types.
//!
//! These are the values the plugins hand to the verification services. The
//! core never decodes request bodies itself; [`AttestationObject::from_cbor`]
//! and [`AssertionObject::from_cbor`] exist for plugin authors whose clients
//! send the raw CBOR produced by `DCAppAttestService`.

use ciborium::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an uncompressed SEC1-encoded P-256 point.
pub const P256_UNCOMPRESSED_LEN: usize = 65;

/// Errors raised while decoding payloads.
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("CBOR decoding failed: {0}")]
    Cbor(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {0} has an unexpected type")]
    InvalidField(&'static str),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Decoded attestation object (`fmt`, `attStmt`, `authData`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestationObject {
    /// Attestation statement format, `apple-appattest` for App Attest.
    pub fmt: String,
    /// Certificate chain from `attStmt.x5c`, leaf first.
    pub x5c: Vec<Vec<u8>>,
    /// Receipt from `attStmt.receipt`.
    pub receipt: Vec<u8>,
    /// Raw authenticator data.
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    /// Decode an attestation object from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ObjectError> {
        let entries = decode_map(bytes)?;

        let fmt = match lookup(&entries, "fmt")? {
            Value::Text(text) => text.clone(),
            _ => return Err(ObjectError::InvalidField("fmt")),
        };

        let statement = match lookup(&entries, "attStmt")? {
            Value::Map(map) => map,
            _ => return Err(ObjectError::InvalidField("attStmt")),
        };

        let x5c = match lookup(statement, "x5c")? {
            Value::Array(certs) => certs
                .iter()
                .map(|cert| match cert {
                    Value::Bytes(der) => Ok(der.clone()),
                    _ => Err(ObjectError::InvalidField("x5c")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(ObjectError::InvalidField("x5c")),
        };

        Ok(Self {
            fmt,
            x5c,
            receipt: bytes_field(statement, "receipt")?,
            auth_data: bytes_field(&entries, "authData")?,
        })
    }
}

/// Decoded assertion object (`signature`, `authenticatorData`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionObject {
    pub signature: Vec<u8>,
    pub authenticator_data: Vec<u8>,
}

impl AssertionObject {
    /// Decode an assertion object from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ObjectError> {
        let entries = decode_map(bytes)?;
        Ok(Self {
            signature: bytes_field(&entries, "signature")?,
            authenticator_data: bytes_field(&entries, "authenticatorData")?,
        })
    }
}

/// Device public key as an uncompressed SEC1 P-256 point.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, ObjectError> {
        if bytes.len() != P256_UNCOMPRESSED_LEN {
            return Err(ObjectError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                P256_UNCOMPRESSED_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != 0x04 {
            return Err(ObjectError::InvalidPublicKey(
                "point is not uncompressed".to_string(),
            ));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for PublicKey {
    type Error = ObjectError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_sec1_bytes(&bytes)
    }
}

impl From<PublicKey> for Vec<u8> {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// Outcome of a successful attestation verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    /// Key bound to the device; used for every later assertion.
    pub public_key: PublicKey,
    /// App Attest receipt, kept for fraud-metric refreshes.
    pub receipt: Vec<u8>,
    /// Initial sign counter (0 for a fresh key).
    pub counter: u32,
}

fn decode_map(bytes: &[u8]) -> Result<Vec<(Value, Value)>, ObjectError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| ObjectError::Cbor(e.to_string()))?;
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(ObjectError::Cbor("top-level value is not a map".to_string())),
    }
}

fn lookup<'a>(entries: &'a [(Value, Value)], key: &'static str) -> Result<&'a Value, ObjectError> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(text) if text == key))
        .map(|(_, v)| v)
        .ok_or(ObjectError::MissingField(key))
}

fn bytes_field(entries: &[(Value, Value)], key: &'static str) -> Result<Vec<u8>, ObjectError> {
    match lookup(entries, key)? {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        _ => Err(ObjectError::InvalidField(key)),
    }
}
