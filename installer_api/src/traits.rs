use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sysdefs::osuuid::OsUuid;

use crate::constants::TRAITS_SCHEMA_VERSION;
use crate::gadget::Role;
use crate::probe::PartitionTableSchema;

/// Per-structure fingerprint recorded alongside the rest of a volume's
/// traits. Never carries key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StructureTraits {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub offset: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_uuid: Option<OsUuid>,
    pub partition_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_uuid: Option<OsUuid>,
}

/// Persisted fingerprint of the installed disk. Round-trips bit-identically
/// across engine versions that produce or consume it: this is the
/// install-time/boot-time handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiskVolumeDeviceTraits {
    pub schema_version: u32,
    pub disk_size: u64,
    pub sector_size: u64,
    pub partition_table_schema: PartitionTableSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<OsUuid>,
    pub kernel_dev_node: String,
    pub structures: Vec<StructureTraits>,
}

impl DiskVolumeDeviceTraits {
    pub fn new(
        disk_size: u64,
        sector_size: u64,
        partition_table_schema: PartitionTableSchema,
        disk_id: Option<OsUuid>,
        kernel_dev_node: String,
        structures: Vec<StructureTraits>,
    ) -> Self {
        DiskVolumeDeviceTraits {
            schema_version: TRAITS_SCHEMA_VERSION,
            disk_size,
            sector_size,
            partition_table_schema,
            disk_id,
            kernel_dev_node,
            structures,
        }
    }
}

/// Map keyed by volume name; this is the document actually serialised to
/// `disk-mapping.json`.
pub type TraitsDocument = BTreeMap<String, DiskVolumeDeviceTraits>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_document_round_trips_through_json() {
        let mut doc: TraitsDocument = BTreeMap::new();
        doc.insert(
            "pc".to_string(),
            DiskVolumeDeviceTraits::new(
                1_000_000,
                512,
                PartitionTableSchema::Gpt,
                None,
                "/dev/mmcblk0".to_string(),
                vec![StructureTraits {
                    name: "ubuntu-boot".to_string(),
                    role: Some(Role::SystemBoot),
                    offset: 1_048_576,
                    size: 786_432_000,
                    filesystem_label: Some("ubuntu-boot".to_string()),
                    filesystem_uuid: None,
                    partition_type: "0FC63DAF-8483-4772-8E79-3D69D8477DE4".to_string(),
                    partition_label: Some("ubuntu-boot".to_string()),
                    partition_uuid: None,
                }],
            ),
        );

        let serialized = serde_json::to_vec(&doc).unwrap();
        let deserialized: TraitsDocument = serde_json::from_slice(&serialized).unwrap();
        assert_eq!(doc, deserialized);
    }
}
