use serde::{Deserialize, Serialize};
use sysdefs::osuuid::OsUuid;

/// Partition table format discovered on the probed disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableSchema {
    Gpt,
    Mbr,
}

/// One partition as reported by the probe, in on-disk index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbedPartition {
    /// 1-based partition index within the table.
    pub index: u32,
    pub start: u64,
    pub size: u64,
    /// Partition type GUID (gpt) or type byte (mbr), as a string.
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_uuid: Option<OsUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_uuid: Option<OsUuid>,
    pub dev_node: String,
}

/// Observed state of a target block device, as produced by the disk probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbedDisk {
    pub dev_node: String,
    /// `major:minor` of the disk device.
    pub dev_num: String,
    pub sector_size: u64,
    pub partition_table_schema: PartitionTableSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<OsUuid>,
    pub partitions: Vec<ProbedPartition>,
}

impl ProbedDisk {
    pub fn partition_with_label(&self, label: &str) -> Option<&ProbedPartition> {
        self.partitions
            .iter()
            .find(|p| p.partition_label.as_deref() == Some(label))
    }

    pub fn highest_index(&self) -> u32 {
        self.partitions.iter().map(|p| p.index).max().unwrap_or(0)
    }
}
