use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gadget::Role;

/// An opaque 32-byte symmetric key. Generated from the OS CSPRNG and never
/// serialised; its `Debug` impl deliberately does not print the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EncryptionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptionKey").field(&"<redacted>").finish()
    }
}

/// The only encryption scheme this engine implements is full-disk LUKS2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionType {
    Luks,
}

impl EncryptionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "luks" => Some(EncryptionType::Luks),
            _ => None,
        }
    }
}

/// One encrypted structure's setup: the role it backs, the raw partition
/// behind the LUKS container, the mapper node it was opened under, and the
/// key used to format it.
#[derive(Debug, Clone)]
pub struct EncryptionEntry {
    pub role: Role,
    pub raw_device_node: String,
    pub mapper_device_node: String,
    pub key: EncryptionKey,
}

/// Map from filesystem-label to its encryption setup. Produced by
/// `encrypt_partitions`, consumed by the content writer.
#[derive(Debug, Clone, Default)]
pub struct EncryptionSetupData {
    pub entries: BTreeMap<String, EncryptionEntry>,
}

impl EncryptionSetupData {
    pub fn mapper_node_for_label(&self, filesystem_label: &str) -> Option<&str> {
        self.entries
            .get(filesystem_label)
            .map(|e| e.mapper_device_node.as_str())
    }

    /// Sanity check that every expected `fs-label -> mapper-node` pair is
    /// present, used by the write path before mounting.
    pub fn check(&self, expected: &BTreeMap<String, String>) -> bool {
        expected.iter().all(|(label, mapper)| {
            self.entries
                .get(label)
                .is_some_and(|e| &e.mapper_device_node == mapper)
        })
    }
}
