use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diskutils::{
    block_devices, encryption,
    filesystems::MkfsFileSystemType,
    mkfs,
    sfdisk::{apply_partition_changes, SfDiskScriptEntry},
    udevadm, wipefs,
};
use uuid::Uuid;
use installer_api::{
    constants::{
        LUKS_BACKED_SECTOR_SIZE, LUKS_LABEL_SUFFIX, MAPPER_UBUNTU_DATA, MAPPER_UBUNTU_SAVE,
        NODE_EXISTS_TIMEOUT_SECS,
    },
    encryption::{EncryptionEntry, EncryptionKey, EncryptionSetupData, EncryptionType},
    error::{
        BadInputError, DeviceNotFoundError, EngineError, ReportError, TimeoutError,
        ToolFailedError, UnsupportedEncryptionError,
    },
    gadget::{LaidOutVolume, Role},
    model::Model,
    probe::ProbedDisk,
    result::InstalledSystemSideData,
    roots::EngineRoots,
};
use log::info;

use crate::{
    content::{self, ContentObserver},
    layout, probe,
    planner::{self, PlanMode, PlannedAction},
    traits_recorder,
};

/// Runs a fresh install against the disk carrying `seed_partition` (a
/// partition device node, e.g. `/dev/sda1`, not the whole-disk path): lays
/// out the declared volume, reconciles it against whatever already exists
/// on disk, creates/recreates only what's missing or mismatched, formats
/// every structural partition, writes its content, and (when
/// `encryption_type` is set) LUKS-formats the encryptable roles first.
#[tracing::instrument(skip(roots, observer))]
pub fn install(
    seed_partition: &Path,
    roots: &EngineRoots,
    model: &Model,
    encryption_type: Option<&str>,
    observer: &mut dyn ContentObserver,
) -> Result<InstalledSystemSideData, EngineError> {
    if !model.has_modes {
        return Err(EngineError::new(BadInputError::PreModesSystem));
    }

    let laid_out = layout::resolve_gadget_layout(&roots.gadget_root)?;

    let resolved_disk = layout::disk_with_system_seed(&laid_out)?;
    let probed = probe::probe(seed_partition)?;
    if Path::new(&probed.dev_node) != resolved_disk.as_path() {
        return Err(EngineError::new(DeviceNotFoundError::NoContainingDisk {
            partition: seed_partition.display().to_string(),
        }));
    }
    let disk_path = PathBuf::from(&probed.dev_node);

    let planned = planner::plan_partitions(&laid_out, &probed, PlanMode::Install)?;

    let mut device_for_role = BTreeMap::new();
    let mut key_for_role = BTreeMap::new();
    let encryption_keys = encryption_type
        .map(|requested| {
            EncryptionType::parse(requested).ok_or_else(|| {
                EngineError::new(UnsupportedEncryptionError::UnknownType {
                    requested: requested.to_string(),
                })
            })
        })
        .transpose()?;

    let deletes: Vec<u32> = planned
        .iter()
        .filter_map(|p| match &p.action {
            PlannedAction::Recreate { existing_index, .. } => Some(*existing_index),
            _ => None,
        })
        .collect();

    let creates: Vec<_> = laid_out
        .structures
        .iter()
        .zip(planned.iter())
        .filter(|(structure, plan)| {
            structure.structure.role.is_some()
                && matches!(
                    plan.action,
                    PlannedAction::Create | PlannedAction::Recreate { .. }
                )
        })
        .collect();

    if !deletes.is_empty() || !creates.is_empty() {
        let entries: Vec<SfDiskScriptEntry> = creates
            .iter()
            .map(|(structure, _)| SfDiskScriptEntry {
                start_sectors: structure.start_offset / probed.sector_size,
                size_sectors: structure.size / probed.sector_size,
                partition_type: Uuid::parse_str(&structure.structure.type_).unwrap_or_default(),
                name: structure.structure.name.clone(),
            })
            .collect();

        apply_partition_changes(&disk_path, &deletes, &entries).structured(
            ToolFailedError::SpawnFailed {
                tool: "sfdisk".to_string(),
                reason: "failed to apply partition changes".to_string(),
            },
        )?;

        settle_and_refresh(&disk_path)?;

        let expected_nodes: Vec<PathBuf> = creates
            .iter()
            .filter_map(|(structure, _)| structure.structure.filesystem_label.as_deref())
            .map(|label| Path::new("/dev/disk/by-partlabel").join(label))
            .collect();

        block_devices::ensure_nodes_exist(
            &expected_nodes,
            Duration::from_secs(NODE_EXISTS_TIMEOUT_SECS),
        )
        .map_err(|missing| {
            EngineError::new(TimeoutError::NodesNotPresent {
                seconds: NODE_EXISTS_TIMEOUT_SECS,
                missing: missing.iter().map(|p| p.display().to_string()).collect(),
            })
        })?;

        for node in &expected_nodes {
            udevadm::settle_device(node).structured(ToolFailedError::SpawnFailed {
                tool: "udevadm".to_string(),
                reason: format!("failed to settle '{}'", node.display()),
            })?;
        }
    }

    for (structure, plan) in laid_out.structures.iter().zip(planned.iter()) {
        let Some(role) = structure.structure.role else {
            continue;
        };

        // system-seed is never part of the returned device map: it's the
        // partition this disk was resolved through, not a structural role
        // callers format or write content to.
        if matches!(role, Role::SystemSeed | Role::SystemSeedNull) {
            continue;
        }

        if let PlannedAction::Keep { dev_node } = &plan.action {
            device_for_role.insert(role, dev_node.clone());
            continue;
        }

        if !matches!(
            plan.action,
            PlannedAction::Create | PlannedAction::Recreate { .. }
        ) {
            continue;
        }

        let label = structure
            .structure
            .filesystem_label
            .as_deref()
            .unwrap_or(&structure.structure.name);
        let dev_node = block_devices::resolve_partlabel(label)
            .structured(ToolFailedError::SpawnFailed {
                tool: "udevadm".to_string(),
                reason: format!("partition label '{label}' never appeared"),
            })?
            .display()
            .to_string();

        let (format_target, sector_size) = if encryption_keys.is_some() && role.is_encryptable() {
            let key = encryption::generate_key().structured(ToolFailedError::KeyGenerationFailed)?;
            let label = format!("{}{}", role.as_str(), LUKS_LABEL_SUFFIX);
            encryption::luks_format(&key, &label, &dev_node).structured(ToolFailedError::LuksFormatFailed {
                device: dev_node.clone(),
            })?;

            let mapper_name = mapper_name_for_role(role);
            encryption::luks_open(&key, &dev_node, mapper_name).structured(ToolFailedError::LuksOpenFailed {
                device: dev_node.clone(),
                mapper_name: mapper_name.to_string(),
            })?;

            key_for_role.insert(role, key);
            (format!("/dev/mapper/{mapper_name}"), Some(LUKS_BACKED_SECTOR_SIZE))
        } else {
            (dev_node.clone(), Some(probed.sector_size))
        };

        if let Some(label) = &structure.structure.filesystem_label {
            if let Some(mkfs_type) = MkfsFileSystemType::from_gadget_type(structure.structure.filesystem) {
                mkfs::run(Path::new(&format_target), mkfs_type, label, sector_size).structured(
                    ToolFailedError::NonZeroExit {
                        tool: "mkfs".to_string(),
                        exit_code: -1,
                        stderr: String::new(),
                    },
                )?;
            }
        }

        device_for_role.insert(role, format_target);
    }

    for structure in &laid_out.structures {
        let Some(role) = structure.structure.role else {
            continue;
        };
        let Some(dev_node) = device_for_role.get(&role) else {
            continue;
        };
        content::write_structure_content(structure, dev_node, &roots.gadget_root, roots, observer)?;
    }

    traits_recorder::record(
        &build_traits_document(&laid_out, &probed),
        &roots.data_mount,
        Some(&roots.save_mount),
    )?;

    if key_for_role.is_empty() {
        Ok(InstalledSystemSideData::unencrypted(device_for_role))
    } else {
        Ok(InstalledSystemSideData::encrypted(device_for_role, key_for_role))
    }
}

/// Resets every structural role except `system-save` back to a freshly
/// formatted state. `system-data` always gets a fresh encryption key when
/// encryption is in use; `system-save`'s existing setup (if any) is
/// preserved and sanity-checked against `existing_keys` rather than
/// regenerated.
#[tracing::instrument(skip(roots, observer))]
pub fn factory_reset(
    partition: &Path,
    roots: &EngineRoots,
    existing_keys: &EncryptionSetupData,
    observer: &mut dyn ContentObserver,
) -> Result<InstalledSystemSideData, EngineError> {
    let laid_out = layout::resolve_gadget_layout(&roots.gadget_root)?;
    let probed = probe::probe(partition)?;
    let planned = planner::plan_partitions(&laid_out, &probed, PlanMode::FactoryReset)?;

    let mut device_for_role = BTreeMap::new();
    let mut key_for_role: BTreeMap<Role, EncryptionKey> = BTreeMap::new();
    let is_encrypted = !existing_keys.entries.is_empty();

    for (structure, plan) in laid_out.structures.iter().zip(planned.iter()) {
        let Some(role) = structure.structure.role else {
            continue;
        };

        let dev_node = match &plan.action {
            PlannedAction::Keep { dev_node } => {
                if role == Role::SystemSave && is_encrypted {
                    let expected_label = format!("{}{}", role.as_str(), LUKS_LABEL_SUFFIX);
                    let expected_mapper = format!("/dev/mapper/{}", MAPPER_UBUNTU_SAVE);

                    let mut expected = BTreeMap::new();
                    expected.insert(expected_label.clone(), expected_mapper.clone());
                    if !existing_keys.check(&expected) {
                        return Err(EngineError::new(DeviceNotFoundError::MissingDevice {
                            device: expected_mapper,
                        }));
                    }

                    existing_keys
                        .mapper_node_for_label(&expected_label)
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| dev_node.clone())
                } else {
                    dev_node.clone()
                }
            }
            PlannedAction::Reformat { dev_node } => {
                wipefs::all(dev_node).structured(ToolFailedError::NonZeroExit {
                    tool: "wipefs".to_string(),
                    exit_code: -1,
                    stderr: String::new(),
                })?;

                let (format_target, sector_size) = if role == Role::SystemData && is_encrypted {
                    let key = encryption::generate_key().structured(ToolFailedError::KeyGenerationFailed)?;
                    let label = format!("{}{}", role.as_str(), LUKS_LABEL_SUFFIX);
                    encryption::luks_format(&key, &label, dev_node).structured(ToolFailedError::LuksFormatFailed {
                        device: dev_node.clone(),
                    })?;

                    let mapper_name = mapper_name_for_role(role);
                    encryption::luks_open(&key, dev_node, mapper_name).structured(ToolFailedError::LuksOpenFailed {
                        device: dev_node.clone(),
                        mapper_name: mapper_name.to_string(),
                    })?;

                    key_for_role.insert(role, key);
                    (format!("/dev/mapper/{mapper_name}"), Some(LUKS_BACKED_SECTOR_SIZE))
                } else {
                    (dev_node.clone(), Some(probed.sector_size))
                };

                if let Some(label) = &structure.structure.filesystem_label {
                    if let Some(mkfs_type) = MkfsFileSystemType::from_gadget_type(structure.structure.filesystem) {
                        mkfs::run(Path::new(&format_target), mkfs_type, label, sector_size).structured(
                            ToolFailedError::NonZeroExit {
                                tool: "mkfs".to_string(),
                                exit_code: -1,
                                stderr: String::new(),
                            },
                        )?;
                    }
                }

                format_target
            }
            PlannedAction::Create | PlannedAction::Recreate { .. } => {
                unreachable!("factory-reset planning never produces Create/Recreate")
            }
        };

        device_for_role.insert(role, dev_node);
    }

    for structure in &laid_out.structures {
        let Some(role) = structure.structure.role else {
            continue;
        };
        if role == Role::SystemSave {
            continue;
        }
        let Some(dev_node) = device_for_role.get(&role) else {
            continue;
        };
        content::write_structure_content(structure, dev_node, &roots.gadget_root, roots, observer)?;
    }

    info!("Factory reset complete for '{}'", partition.display());

    if key_for_role.is_empty() {
        Ok(InstalledSystemSideData::unencrypted(device_for_role))
    } else {
        Ok(InstalledSystemSideData::encrypted(device_for_role, key_for_role))
    }
}

/// Settles udev and re-reads the partition table after writing a new layout,
/// so the `by-partlabel` symlinks the rest of the pipeline depends on exist.
fn settle_and_refresh(disk_path: &Path) -> Result<(), EngineError> {
    block_devices::partx_update(disk_path).structured(ToolFailedError::SpawnFailed {
        tool: "partx".to_string(),
        reason: "failed to refresh partition table".to_string(),
    })?;

    udevadm::trigger().structured(ToolFailedError::SpawnFailed {
        tool: "udevadm".to_string(),
        reason: "failed to trigger udev after partition table refresh".to_string(),
    })?;

    udevadm::settle_with_timeout(installer_api::constants::SETTLE_TIMEOUT_SECS).structured(
        ToolFailedError::SpawnFailed {
            tool: "udevadm".to_string(),
            reason: "failed to settle after partition creation".to_string(),
        },
    )
}

fn mapper_name_for_role(role: Role) -> &'static str {
    match role {
        Role::SystemSave => MAPPER_UBUNTU_SAVE,
        _ => MAPPER_UBUNTU_DATA,
    }
}

fn build_traits_document(
    laid_out: &LaidOutVolume,
    probed: &ProbedDisk,
) -> installer_api::traits::TraitsDocument {
    let mut doc = BTreeMap::new();
    doc.insert(laid_out.name.clone(), traits_recorder::build_traits(laid_out, probed));
    doc
}

/// Drives `system-save`/`system-data` LUKS setup independent of a full
/// install, used when encryption is enabled after the fact.
#[tracing::instrument(skip_all)]
pub fn encrypt_partitions(
    entries: &[(Role, String)],
) -> Result<EncryptionSetupData, EngineError> {
    let mut setup = EncryptionSetupData::default();

    for (role, raw_device_node) in entries {
        let key = encryption::generate_key().structured(ToolFailedError::KeyGenerationFailed)?;
        let label = format!("{}{}", role.as_str(), LUKS_LABEL_SUFFIX);
        encryption::luks_format(&key, &label, raw_device_node).structured(ToolFailedError::LuksFormatFailed {
            device: raw_device_node.clone(),
        })?;

        let mapper_name = mapper_name_for_role(*role);
        encryption::luks_open(&key, raw_device_node, mapper_name).structured(ToolFailedError::LuksOpenFailed {
            device: raw_device_node.clone(),
            mapper_name: mapper_name.to_string(),
        })?;

        setup.entries.insert(
            label,
            EncryptionEntry {
                role: *role,
                raw_device_node: raw_device_node.clone(),
                mapper_device_node: format!("/dev/mapper/{mapper_name}"),
                key,
            },
        );
    }

    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_name_for_role_is_deterministic() {
        assert_eq!(mapper_name_for_role(Role::SystemSave), MAPPER_UBUNTU_SAVE);
        assert_eq!(mapper_name_for_role(Role::SystemData), MAPPER_UBUNTU_DATA);
    }
}
