//! # Persistence Format
//!
//! Binary snapshot of a whole workspace.
//!
//! Format: Header (5 bytes) + postcard-serialized [`SerializableWorkspace`].
//! - 4 bytes: Magic ("RLTA")
//! - 1 byte: Version
//!
//! The payload size and the header are validated before the payload is
//! decoded, so corrupted or oversized input fails without large allocations.

use crate::workspace::SerializableWorkspace;
use crate::{RelataError, Workspace, primitives};

/// Maximum accepted snapshot size (256 MB).
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Check magic bytes and version.
    pub fn validate(&self) -> Result<(), RelataError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(RelataError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(RelataError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelataError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RelataError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a workspace to bytes (header + payload).
pub fn workspace_to_bytes(workspace: &Workspace) -> Result<Vec<u8>, RelataError> {
    let payload = postcard::to_stdvec(&SerializableWorkspace::from(workspace))
        .map_err(|e| RelataError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a workspace from bytes.
pub fn workspace_from_bytes(bytes: &[u8]) -> Result<Workspace, RelataError> {
    if bytes.len() < HEADER_SIZE {
        return Err(RelataError::SerializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(RelataError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let serializable: SerializableWorkspace =
        postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
            RelataError::SerializationError(format!("Failed to deserialize workspace: {}", e))
        })?;
    Workspace::try_from(serializable)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::DataEntity;

    fn sample() -> Workspace {
        let mut ws = Workspace::new();
        ws.add_data("a", DataEntity::with_uid("a-1").kind("image").property_value("k", "v"))
            .expect("a");
        ws.add_node("n", Some("a")).expect("n");
        ws.set_property("n", "Relations.1.relationUID", "u1").expect("set");
        ws
    }

    #[test]
    fn header_roundtrip() {
        let bytes = PersistenceHeader::new().to_bytes();
        let restored = PersistenceHeader::from_bytes(&bytes).expect("parse header");
        assert_eq!(restored, PersistenceHeader::new());
        assert_eq!(&bytes[0..4], b"RLTA");
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let bytes1 = workspace_to_bytes(&sample()).expect("first serialize");
        let restored = workspace_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = workspace_to_bytes(&restored).expect("second serialize");
        assert_eq!(bytes1, bytes2, "save -> load -> save must produce identical bytes");
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(workspace_from_bytes(&bytes).is_err());
    }

    #[test]
    fn wrong_version_rejected() {
        let mut bytes = workspace_to_bytes(&sample()).expect("serialize");
        bytes[4] = primitives::FORMAT_VERSION.wrapping_add(1);
        assert!(matches!(
            workspace_from_bytes(&bytes),
            Err(RelataError::SerializationError(_))
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = workspace_to_bytes(&sample()).expect("serialize");
        assert!(workspace_from_bytes(&bytes[..bytes.len() - 3]).is_err());
        assert!(workspace_from_bytes(&bytes[..3]).is_err());
    }
}
