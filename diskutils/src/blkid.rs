use std::path::Path;

use anyhow::Context;
use anyhow::Error;

use sysdefs::osuuid::OsUuid;

use crate::{dependencies::Dependency, exe::RunAndCheck};

fn run(device_path: impl AsRef<Path>, tag: &str) -> Result<String, Error> {
    let output = Dependency::Blkid
        .cmd()
        .arg("-o") // output format
        .arg("value") // single value
        .arg("-s") // tag
        .arg(tag)
        .arg(device_path.as_ref())
        .output_and_check()
        .context("Failed to execute blkid")?;

    Ok(output.trim().to_owned())
}

/// Filesystem UUID as reported by `blkid`. Not every filesystem has a
/// proper RFC 4122 UUID (vfat uses a short hex volume ID), hence `OsUuid`
/// rather than `uuid::Uuid`.
pub fn get_filesystem_uuid(device_path: impl AsRef<Path>) -> Result<OsUuid, Error> {
    run(device_path, "UUID").map(OsUuid::from)
}

pub fn get_partition_label(device_path: impl AsRef<Path>) -> Result<String, Error> {
    run(device_path, "PARTLABEL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_uuid_falls_back_to_relaxed_for_non_uuid_values() {
        assert_eq!(
            OsUuid::from("C19C-752D"),
            OsUuid::Relaxed("C19C-752D".to_string())
        );
    }
}
