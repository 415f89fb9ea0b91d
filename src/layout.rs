use std::path::{Path, PathBuf};

use diskutils::block_devices;
use installer_api::{
    constants::GADGET_YAML_PATH,
    error::{BadInputError, DeviceNotFoundError, EngineError, LayoutInvalidError, ReportError},
    gadget::{lay_out_volume, GadgetYaml, LaidOutVolume, Role, Volume},
};
use log::debug;

/// Reads and resolves `meta/gadget.yaml` under `gadget_root`, returning the
/// laid-out volume named in the document. Gadget descriptions declare
/// exactly one volume in every layout this engine supports; if that
/// assumption ever needs to change, this is the seam to generalise.
#[tracing::instrument(skip_all)]
pub fn resolve_gadget_layout(gadget_root: &Path) -> Result<LaidOutVolume, EngineError> {
    if !gadget_root.exists() {
        return Err(EngineError::new(BadInputError::EmptyGadgetRoot {
            path: gadget_root.display().to_string(),
        }));
    }

    let yaml_path = gadget_root.join(GADGET_YAML_PATH);
    debug!("Reading gadget description from '{}'", yaml_path.display());

    let contents = std::fs::read_to_string(&yaml_path).structured(LayoutInvalidError::ReadGadgetYaml {
        path: yaml_path.display().to_string(),
    })?;

    let gadget: GadgetYaml = serde_yaml::from_str(&contents).structured(LayoutInvalidError::ParseGadgetYaml {
        path: yaml_path.display().to_string(),
    })?;

    let volume: &Volume = gadget
        .volumes
        .values()
        .next()
        .structured(LayoutInvalidError::ParseGadgetYaml {
            path: yaml_path.display().to_string(),
        })?;

    let laid_out = lay_out_volume(volume)?;

    if !laid_out.has_role(Role::SystemSeed) && !laid_out.has_role(Role::SystemSeedNull) {
        return Err(EngineError::new(LayoutInvalidError::RoleNotPresent));
    }

    Ok(laid_out)
}

/// Locates the disk whose partition carries the `system-seed` (or
/// `system-seed-null`) role, by following the `by-partlabel/<label>` udev
/// symlink for that role's filesystem-label and resolving upward to the
/// parent disk.
#[tracing::instrument(skip_all)]
pub fn disk_with_system_seed(laid_out: &LaidOutVolume) -> Result<PathBuf, EngineError> {
    let seed_label = laid_out
        .structure_with_role(Role::SystemSeed)
        .or_else(|| laid_out.structure_with_role(Role::SystemSeedNull))
        .and_then(|s| s.structure.filesystem_label.as_deref())
        .structured(LayoutInvalidError::RoleNotPresent)?;

    let partition = block_devices::resolve_partlabel(seed_label).structured(
        DeviceNotFoundError::NoPartlabelSymlink {
            path: format!("/dev/disk/by-partlabel/{seed_label}"),
            label: seed_label.to_string(),
        },
    )?;

    block_devices::get_disk_for_partition(&partition).structured(DeviceNotFoundError::NoContainingDisk {
        partition: partition.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_gadget_yaml(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir.join("meta")).unwrap();
        std::fs::write(dir.join(GADGET_YAML_PATH), body).unwrap();
    }

    const MINIMAL_GADGET: &str = r#"
volumes:
  pc:
    bootloader: grub
    structure:
      - name: mbr
        type: mbr
        size: 440
        filesystem: none
      - name: ubuntu-seed
        role: system-seed
        type: C12A7328-F81F-11D2-BA4B-00A0C93EC93B
        filesystem: vfat
        filesystem-label: ubuntu-seed
        size: 1200000000
      - name: ubuntu-boot
        role: system-boot
        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
        filesystem: ext4
        filesystem-label: ubuntu-boot
        size: 786432000
      - name: ubuntu-data
        role: system-data
        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
        filesystem: ext4
        filesystem-label: ubuntu-data
        size: 0
"#;

    #[test]
    fn resolves_a_minimal_gadget_yaml() {
        let dir = tempfile::tempdir().unwrap();
        write_gadget_yaml(dir.path(), MINIMAL_GADGET);

        let laid_out = resolve_gadget_layout(dir.path()).unwrap();
        assert!(laid_out.has_role(Role::SystemSeed));
        assert!(laid_out.has_role(Role::SystemData));
        assert_eq!(laid_out.structures.len(), 4);
    }

    #[test]
    fn missing_gadget_root_is_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(resolve_gadget_layout(&missing).is_err());
    }

    #[test]
    fn missing_seed_role_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_gadget_yaml(
            dir.path(),
            r#"
volumes:
  pc:
    bootloader: grub
    structure:
      - name: ubuntu-boot
        role: system-boot
        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
        filesystem: ext4
        filesystem-label: ubuntu-boot
        size: 786432000
"#,
        );
        assert!(resolve_gadget_layout(dir.path()).is_err());
    }

    #[test]
    fn disk_with_system_seed_fails_when_seed_role_absent() {
        let laid_out = LaidOutVolume {
            name: "pc".to_string(),
            bootloader: "grub".to_string(),
            structures: Vec::new(),
        };
        assert!(disk_with_system_seed(&laid_out).is_err());
    }
}
