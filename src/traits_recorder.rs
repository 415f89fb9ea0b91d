use std::path::Path;

use installer_api::{
    constants::{TRAITS_PATH_UNDER_DATA, TRAITS_PATH_UNDER_SAVE},
    error::{EngineError, IoErrorKind, ReportError},
    gadget::LaidOutVolume,
    probe::ProbedDisk,
    traits::{DiskVolumeDeviceTraits, StructureTraits, TraitsDocument},
};
use log::info;

/// Builds the traits document for `volume`, merging its declared layout
/// with the post-format probe (which has filesystem UUIDs the declared
/// layout never carries).
pub fn build_traits(volume: &LaidOutVolume, probed: &ProbedDisk) -> DiskVolumeDeviceTraits {
    let structures = volume
        .structures
        .iter()
        .map(|laid_out| {
            let matching = laid_out
                .structure
                .filesystem_label
                .as_deref()
                .and_then(|label| probed.partition_with_label(label));

            StructureTraits {
                name: laid_out.structure.name.clone(),
                role: laid_out.structure.role,
                offset: laid_out.start_offset,
                size: laid_out.size,
                filesystem_label: laid_out.structure.filesystem_label.clone(),
                filesystem_uuid: matching.and_then(|p| p.fs_uuid.clone()),
                partition_type: laid_out.structure.type_.clone(),
                partition_label: matching.and_then(|p| p.partition_label.clone()),
                partition_uuid: matching.and_then(|p| p.part_uuid.clone()),
            }
        })
        .collect();

    DiskVolumeDeviceTraits::new(
        probed.partitions.iter().map(|p| p.start + p.size).max().unwrap_or(0),
        probed.sector_size,
        probed.partition_table_schema,
        probed.disk_id.clone(),
        probed.dev_node.clone(),
        structures,
    )
}

/// Serialises `doc` to both well-known locations under the mounted data and
/// save targets. Writes must be byte-identical: later boots compare them.
#[tracing::instrument(skip_all)]
pub fn record(doc: &TraitsDocument, data_mount: &Path, save_mount: Option<&Path>) -> Result<(), EngineError> {
    let serialized = serde_json::to_vec_pretty(doc).structured(IoErrorKind::Serialize {
        what: "disk-mapping.json".to_string(),
    })?;

    write_traits_file(&serialized, &data_mount.join(TRAITS_PATH_UNDER_DATA))?;

    if let Some(save_mount) = save_mount {
        write_traits_file(&serialized, &save_mount.join(TRAITS_PATH_UNDER_SAVE))?;
    }

    Ok(())
}

fn write_traits_file(serialized: &[u8], path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).structured(IoErrorKind::Write {
            path: parent.display().to_string(),
        })?;
    }

    info!("Writing traits document to '{}'", path.display());
    std::fs::write(path, serialized).structured(IoErrorKind::Write {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use installer_api::probe::PartitionTableSchema;
    use std::collections::BTreeMap;

    fn sample_doc() -> TraitsDocument {
        let mut doc = BTreeMap::new();
        doc.insert(
            "pc".to_string(),
            DiskVolumeDeviceTraits::new(
                1_000_000,
                512,
                PartitionTableSchema::Gpt,
                None,
                "/dev/sda".to_string(),
                Vec::new(),
            ),
        );
        doc
    }

    #[test]
    fn writes_byte_identical_copies_to_both_mounts() {
        let data_dir = tempfile::tempdir().unwrap();
        let save_dir = tempfile::tempdir().unwrap();

        let doc = sample_doc();
        record(&doc, data_dir.path(), Some(save_dir.path())).unwrap();

        let data_bytes = std::fs::read(data_dir.path().join(TRAITS_PATH_UNDER_DATA)).unwrap();
        let save_bytes = std::fs::read(save_dir.path().join(TRAITS_PATH_UNDER_SAVE)).unwrap();
        assert_eq!(data_bytes, save_bytes);
    }

    #[test]
    fn skips_save_mount_when_absent() {
        let data_dir = tempfile::tempdir().unwrap();
        let doc = sample_doc();
        record(&doc, data_dir.path(), None).unwrap();
        assert!(data_dir.path().join(TRAITS_PATH_UNDER_DATA).exists());
    }
}
