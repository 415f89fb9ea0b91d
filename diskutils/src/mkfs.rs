use std::path::Path;

use anyhow::{Context, Error};

use crate::{dependencies::Dependency, exe::RunAndCheck, filesystems::MkfsFileSystemType};

/// Builds `filesystem` on `device_path`, labelling it `label`. `sector_size`
/// is passed through to the tool when the underlying filesystem builder
/// accepts it (required for LUKS-backed devices, whose effective sector
/// size is 4096 rather than the disk's native 512).
pub fn run(
    device_path: &Path,
    filesystem: MkfsFileSystemType,
    label: &str,
    sector_size: Option<u64>,
) -> Result<(), Error> {
    let mut command = Dependency::Mkfs.cmd();
    command.arg("--type").arg(filesystem.name());

    match filesystem {
        MkfsFileSystemType::Ext4 => {
            command.arg("-F").arg("-L").arg(label);
            if let Some(sector_size) = sector_size {
                command
                    .arg("-b")
                    .arg(sector_size.min(4096).to_string());
            }
        }
        MkfsFileSystemType::Vfat => {
            command.arg("-n").arg(label);
            if let Some(sector_size) = sector_size {
                command.arg("-S").arg(sector_size.to_string());
            }
        }
    }

    command.arg(device_path);
    command
        .run_and_check()
        .with_context(|| format!("Failed to build {filesystem} filesystem on '{}'", device_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkfs_filesystem_names_match_tool_vocabulary() {
        assert_eq!(MkfsFileSystemType::Ext4.name(), "ext4");
        assert_eq!(MkfsFileSystemType::Vfat.name(), "vfat");
    }
}
