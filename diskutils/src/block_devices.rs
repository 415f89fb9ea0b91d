use std::{
    fs,
    path::{Path, PathBuf},
    thread::sleep,
    time::{Duration, Instant},
};

use anyhow::{ensure, Context, Error};

use crate::{
    dependencies::Dependency,
    exe::RunAndCheck,
    lsblk::{self, BlockDeviceType},
};

/// Returns the path of the first symlink in `directory` whose canonical path
/// is `target`.
pub fn find_symlink_for_target(
    target: impl AsRef<Path>,
    directory: impl AsRef<Path>,
) -> Result<PathBuf, Error> {
    let target_canonicalized = target.as_ref().canonicalize().context(format!(
        "Failed to canonicalize target path '{}'",
        target.as_ref().display()
    ))?;

    fs::read_dir(directory.as_ref())?
        .flatten()
        .filter(|f| {
            f.file_type()
                .ok()
                .map(|t| t.is_symlink())
                .unwrap_or_default()
        })
        .map(|entry| entry.path())
        .filter(|path| {
            path.canonicalize()
                .map(|p| target_canonicalized == p)
                .unwrap_or_default()
        })
        .min()
        .context(format!(
            "Failed to find symlink for '{}' in directory '{}'",
            target.as_ref().display(),
            directory.as_ref().display()
        ))
}

/// Locate the `/dev/disk/by-partlabel/<label>` symlink for `label` and
/// return its resolved target.
pub fn resolve_partlabel(label: &str) -> Result<PathBuf, Error> {
    let symlink = Path::new("/dev/disk/by-partlabel").join(label);
    symlink.canonicalize().with_context(|| {
        format!(
            "Failed to resolve by-partlabel symlink for '{label}' at '{}'",
            symlink.display()
        )
    })
}

/// Retrieves the symlink for a given block device in `/dev/disk/by-path`.
pub fn block_device_by_path(path: impl AsRef<Path>) -> Result<PathBuf, Error> {
    find_symlink_for_target(path.as_ref(), Path::new("/dev/disk/by-path"))
}

/// Get the canonicalized path of the disk containing a given partition.
pub fn get_disk_for_partition(partition: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let partition_block_device = lsblk::get(partition.as_ref()).with_context(|| {
        format!(
            "Failed to get partition metadata for '{}'",
            partition.as_ref().display(),
        )
    })?;

    ensure!(
        partition_block_device.blkdev_type == BlockDeviceType::Partition,
        "Device '{}' is not a partition",
        partition.as_ref().display()
    );

    partition_block_device.parent_kernel_name.context(format!(
        "Failed to get disk for partition: {:?}, pk_name not found",
        partition.as_ref().display()
    ))
}

/// Force the kernel to re-read the partition table of `disk` with `partx`.
///
/// No built-in safety checking: `disk` must already be a valid block device
/// with a partition table.
pub fn partx_update(disk: impl AsRef<Path>) -> Result<(), Error> {
    Dependency::Partx
        .cmd()
        .arg("--update")
        .arg(disk.as_ref())
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to re-read partition table for disk '{}'",
                disk.as_ref().display()
            )
        })
}

/// Polls for every path in `nodes` to exist, at a short fixed interval.
/// Returns the still-missing subset if `timeout` elapses first.
pub fn ensure_nodes_exist(nodes: &[PathBuf], timeout: Duration) -> Result<(), Vec<PathBuf>> {
    let deadline = Instant::now() + timeout;
    loop {
        let missing: Vec<PathBuf> = nodes.iter().filter(|n| !n.exists()).cloned().collect();
        if missing.is_empty() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(missing);
        }
        sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_nodes_exist_returns_ok_when_all_present() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = temp_dir.path().join("sda1");
        fs::write(&node, b"").unwrap();
        assert!(ensure_nodes_exist(&[node], Duration::from_millis(200)).is_ok());
    }

    #[test]
    fn ensure_nodes_exist_reports_missing_on_timeout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let present = temp_dir.path().join("sda1");
        let missing = temp_dir.path().join("sda2");
        fs::write(&present, b"").unwrap();

        let result = ensure_nodes_exist(&[present, missing.clone()], Duration::from_millis(150));
        assert_eq!(result.unwrap_err(), vec![missing]);
    }

    #[test]
    fn test_find_symlink_for_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().canonicalize().unwrap();
        let symlink = temp_dir.path().join("symlink");
        std::os::unix::fs::symlink(&target, &symlink).unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir.path()).unwrap(),
            symlink
        );

        // Pick the first symlink if there are multiple.
        let symlink = temp_dir.path().join("asymlink");
        std::os::unix::fs::symlink(&target, &symlink).unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir.path()).unwrap(),
            symlink
        );
    }

    #[test]
    fn test_find_symlink_for_target_fail_no_symlink() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().canonicalize().unwrap();
        let temp_dir2 = tempfile::tempdir().unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir2.path())
                .unwrap_err()
                .to_string(),
            format!(
                "Failed to find symlink for '{}' in directory '{}'",
                target.display(),
                temp_dir2.path().display()
            )
        );
    }

    #[test]
    fn test_find_symlink_for_target_fail_bad_target() {
        let target = Path::new("/bad-target-path");
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            find_symlink_for_target(target, temp_dir.path())
                .unwrap_err()
                .to_string(),
            format!("Failed to canonicalize target path '{}'", target.display())
        );
    }
}
