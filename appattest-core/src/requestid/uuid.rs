//! UUID based generators.

use ::uuid::Uuid;

use super::{use_generator, Generator};
use crate::error::BoxError;

/// Node id used for UUIDv6. Random per process, with the multicast bit set
/// as RFC 9562 asks for ids that are not derived from a MAC address.
fn random_node_id() -> [u8; 6] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut node = [0u8; 6];
    node.copy_from_slice(&bytes[10..16]);
    node[0] |= 0x01;
    node
}

/// Random (version 4) UUIDs. This is the default generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl Generator for UuidV4Generator {
    fn next_id(&self) -> Result<String, BoxError> {
        Ok(Uuid::new_v4().to_string())
    }
}

/// Time-ordered (version 6) UUIDs.
#[derive(Debug, Clone, Copy)]
pub struct UuidV6Generator {
    node_id: [u8; 6],
}

impl UuidV6Generator {
    pub fn new() -> Self {
        Self {
            node_id: random_node_id(),
        }
    }

    /// Use a fixed node id, e.g. one derived from the host.
    pub fn with_node_id(node_id: [u8; 6]) -> Self {
        Self { node_id }
    }
}

impl Default for UuidV6Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for UuidV6Generator {
    fn next_id(&self) -> Result<String, BoxError> {
        Ok(Uuid::now_v6(&self.node_id).to_string())
    }
}

/// Install [`UuidV4Generator`] as the process-wide generator.
pub fn use_uuid() {
    use_generator(UuidV4Generator);
}

/// Install [`UuidV6Generator`] as the process-wide generator.
pub fn use_uuid_v6() {
    use_generator(UuidV6Generator::new());
}
