use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use sysdefs::osuuid::OsUuid;

use crate::{dependencies::Dependency, exe::RunAndCheck};

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LsBlkOutput {
    pub blockdevices: Vec<BlockDevice>,
}

/// Represents a block device as returned by `lsblk --json`. See `man lsblk`
/// for more information.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    /// Device name
    pub name: String,

    /// Filesystem type
    pub fstype: Option<String>,

    /// Filesystem size, in bytes
    pub fssize: Option<u64>,

    /// Filesystem UUID
    #[serde(rename = "uuid")]
    pub fsuuid: Option<OsUuid>,

    /// Partition table UUID
    pub ptuuid: Option<OsUuid>,

    /// Partition UUID
    #[serde(rename = "partuuid")]
    pub part_uuid: Option<OsUuid>,

    /// Size of the device, in bytes
    pub size: u64,

    /// Internal parent kernel device name
    #[serde(rename = "pkname")]
    pub parent_kernel_name: Option<PathBuf>,

    /// List of children devices (e.g. partitions of a disk device). Not a
    /// column, only present when `--json` is specified.
    #[serde(default)]
    pub children: Vec<BlockDevice>,

    /// Where the device is mounted
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,

    /// All locations where device is mounted
    #[serde(default, deserialize_with = "skip_nulls")]
    pub mountpoints: Vec<PathBuf>,

    /// Partition table type
    #[serde(rename = "pttype")]
    pub partition_table_type: Option<PartitionTableType>,

    #[serde(default, rename = "ro")]
    pub readonly: bool,

    #[serde(default, rename = "type")]
    pub blkdev_type: BlockDeviceType,
}

/// All possible device types returned by lsblk
/// https://github.com/util-linux/util-linux/blob/master/misc-utils/lsblk.c#L402-L456
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockDeviceType {
    #[serde(alias = "part")]
    Partition,
    Lvm,
    Crypt,
    Dmraid,
    Mpath,
    Dm,
    Loop,
    Disk,
    Md,
    Raid,

    #[default]
    #[serde(other)]
    Unknown,
}

/// Partition table types recognized by `lsblk`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTableType {
    /// GUID Partition Table
    #[serde(rename = "gpt")]
    Gpt,

    /// Master Boot Record
    #[serde(rename = "mbr", alias = "dos")]
    Mbr,
}

/// Retrieves detailed information for a specific block device at the given
/// path, if it exists.
pub fn try_get(device_path: impl AsRef<Path>) -> Result<Option<BlockDevice>, Error> {
    let result = Dependency::Lsblk
        .cmd()
        .arg("--json")
        .arg("--path")
        .arg(device_path.as_ref())
        .arg("--output-all")
        .arg("--bytes")
        .output_and_check()
        .context("Failed to execute lsblk")?;

    let parsed = parse_lsblk_output(&result).context("Failed to parse output from lsblk")?;

    if parsed.len() > 1 {
        bail!(
            "Unexpected number of block devices returned for device '{}': {}",
            device_path.as_ref().display(),
            parsed.len()
        );
    }

    Ok(parsed.into_iter().next())
}

/// Retrieves detailed information about a specific block device at a given
/// path. Wraps `try_get`, failing if no device is found.
pub fn get(device_path: impl AsRef<Path>) -> Result<BlockDevice, Error> {
    try_get(device_path.as_ref())
        .with_context(|| {
            format!(
                "Failed to get block device information for '{}'",
                device_path.as_ref().display()
            )
        })?
        .with_context(|| {
            format!(
                "No block device found at '{}'",
                device_path.as_ref().display()
            )
        })
}

fn parse_lsblk_output(output: &str) -> Result<Vec<BlockDevice>, Error> {
    let parsed: LsBlkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk output")?;

    Ok(parsed.blockdevices)
}

fn skip_nulls<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let v: Vec<Option<T>> = serde::Deserialize::deserialize(deserializer)?;
    Ok(v.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LSBLK_OUTPUT: &str = r#"
        {
            "blockdevices": [
                {
                    "name": "/dev/sda",
                    "fssize": null,
                    "fstype": null,
                    "mountpoint": null,
                    "mountpoints": [null],
                    "uuid": null,
                    "ptuuid": "a8dbca6f-77a6-485c-8c67-b653758a8928",
                    "pttype": "gpt",
                    "partuuid": null,
                    "ro": false,
                    "size": 17179869184,
                    "pkname": null,
                    "type": "disk",
                    "children": [
                        {
                            "name": "/dev/sda1",
                            "fssize": 52293632,
                            "fstype": "vfat",
                            "mountpoint": "/boot/efi",
                            "mountpoints": ["/boot/efi"],
                            "uuid": "C19C-752D",
                            "ptuuid": null,
                            "pttype": null,
                            "partuuid": "24d90361-7b1f-47db-b5bb-7d3893ac6ab0",
                            "ro": false,
                            "size": 52428800,
                            "pkname": "/dev/sda",
                            "type": "part"
                        }
                    ]
                }
            ]
        }
        "#;

    #[test]
    fn test_parse_lsblk_output() {
        let parsed = parse_lsblk_output(SAMPLE_LSBLK_OUTPUT).unwrap();
        assert_eq!(parsed.len(), 1);
        let disk = &parsed[0];
        assert_eq!(disk.name, "/dev/sda");
        assert_eq!(disk.blkdev_type, BlockDeviceType::Disk);
        assert_eq!(disk.partition_table_type, Some(PartitionTableType::Gpt));
        assert_eq!(disk.children.len(), 1);

        let partition = &disk.children[0];
        assert_eq!(partition.blkdev_type, BlockDeviceType::Partition);
        assert_eq!(
            partition.parent_kernel_name,
            Some(PathBuf::from("/dev/sda"))
        );
        assert_eq!(partition.fstype.as_deref(), Some("vfat"));
    }
}
