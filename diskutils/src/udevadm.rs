use std::path::Path;

use anyhow::{Context, Error};

use crate::{dependencies::Dependency, exe::RunAndCheck};

pub fn settle() -> Result<(), Error> {
    Dependency::Udevadm
        .cmd()
        .arg("settle")
        .run_and_check()
        .context("Failed settle udev setup")
}

/// Same as `settle`, but bounds how long udev is allowed to keep the caller
/// waiting for queued events to drain.
pub fn settle_with_timeout(timeout_secs: u64) -> Result<(), Error> {
    Dependency::Udevadm
        .cmd()
        .arg("settle")
        .arg(format!("--timeout={timeout_secs}"))
        .run_and_check()
        .context("Failed settle udev setup")
}

pub fn trigger() -> Result<(), Error> {
    Dependency::Udevadm
        .cmd()
        .arg("trigger")
        .run_and_check()
        .context("Failed trigger udev")
}

/// Same as `trigger`, but scoped to a single device node.
pub fn trigger_device(dev_node: impl AsRef<Path>) -> Result<(), Error> {
    Dependency::Udevadm
        .cmd()
        .arg("trigger")
        .arg("--name-match")
        .arg(dev_node.as_ref())
        .run_and_check()
        .with_context(|| format!("Failed to trigger udev for '{}'", dev_node.as_ref().display()))
}

/// Trigger then settle, scoped to one device node: ensures its udev rules
/// (and by-label symlinks) are applied before the node is used.
pub fn settle_device(dev_node: impl AsRef<Path>) -> Result<(), Error> {
    trigger_device(dev_node.as_ref())?;
    settle()
}
