use std::path::Path;

use diskutils::{blkid, block_devices, sfdisk::SfDisk};
use installer_api::{
    error::{EngineError, ReportError, ToolFailedError},
    probe::{PartitionTableSchema, ProbedDisk, ProbedPartition},
};
use log::debug;
use sysdefs::osuuid::OsUuid;

/// Resolves `partition_dev_node` (e.g. `/dev/sda2`) to its parent disk, then
/// probes that disk and builds the abstract description the Partition
/// Planner diffs against.
#[tracing::instrument(skip_all)]
pub fn probe(partition_dev_node: &Path) -> Result<ProbedDisk, EngineError> {
    let disk_path = block_devices::get_disk_for_partition(partition_dev_node).structured(
        installer_api::error::DeviceNotFoundError::NoContainingDisk {
            partition: partition_dev_node.display().to_string(),
        },
    )?;

    probe_resolved_disk(&disk_path)
}

fn probe_resolved_disk(disk_path: &Path) -> Result<ProbedDisk, EngineError> {
    debug!("Probing disk '{}'", disk_path.display());

    let sfdisk = SfDisk::get_info(disk_path).structured(ToolFailedError::SpawnFailed {
        tool: "sfdisk".to_string(),
        reason: "failed to probe disk layout".to_string(),
    })?;

    let partitions = sfdisk
        .partitions
        .iter()
        .enumerate()
        .map(|(idx, partition)| {
            let filesystem_label = blkid::get_partition_label(&partition.node).ok();
            let fs_uuid = blkid::get_filesystem_uuid(&partition.node).ok();

            ProbedPartition {
                index: (idx + 1) as u32,
                start: partition.start * sfdisk.sectorsize,
                size: partition.size,
                type_: partition.partition_type.to_uuid().to_string(),
                filesystem_label,
                partition_label: partition.name.clone(),
                fs_uuid,
                part_uuid: Some(OsUuid::from(partition.id)),
                dev_node: partition.node.display().to_string(),
            }
        })
        .collect();

    Ok(ProbedDisk {
        dev_node: disk_path.display().to_string(),
        dev_num: dev_num(disk_path).unwrap_or_default(),
        sector_size: sfdisk.sectorsize,
        partition_table_schema: PartitionTableSchema::Gpt,
        disk_id: Some(OsUuid::from(sfdisk.id)),
        partitions,
    })
}

fn dev_num(disk_path: &Path) -> Option<String> {
    let meta = std::fs::metadata(disk_path).ok()?;
    use std::os::unix::fs::MetadataExt;
    let rdev = meta.rdev();
    Some(format!("{}:{}", rdev >> 8, rdev & 0xff))
}
