use std::path::Path;

use diskutils::{filesystems::MountFileSystemType, mount};
use installer_api::{
    error::{EngineError, IoErrorKind, ReportError},
    gadget::{ContentEntry, FilesystemType, LaidOutStructure},
    roots::EngineRoots,
};
use log::{debug, info};

/// Called once per copied content entry, after the copy succeeds. Lets
/// external collaborators (e.g. a sealing-policy measurer) observe what was
/// written without this module needing to know about them.
pub trait ContentObserver {
    fn on_copied(&mut self, source: &Path, target: &Path);
}

impl ContentObserver for () {
    fn on_copied(&mut self, _source: &Path, _target: &Path) {}
}

/// Mounts `dev_node`, copies every content entry from `gadget_root` onto it,
/// and unmounts, regardless of whether the copy succeeded.
#[tracing::instrument(skip(roots, observer))]
pub fn write_structure_content(
    structure: &LaidOutStructure,
    dev_node: &str,
    gadget_root: &Path,
    roots: &EngineRoots,
    observer: &mut dyn ContentObserver,
) -> Result<(), EngineError> {
    if structure.structure.content.is_empty() {
        return Ok(());
    }

    let filesystem = match structure.structure.filesystem {
        FilesystemType::None => return Ok(()),
        other => MountFileSystemType::from_gadget_type(other)
            .expect("non-none gadget filesystem always maps to a mount filesystem"),
    };

    let scratch_mount = roots.scratch_mount_for(dev_node);
    mount::ensure_mount_directory(&scratch_mount).structured(IoErrorKind::Write {
        path: scratch_mount.display().to_string(),
    })?;

    info!(
        "Mounting '{}' at '{}' to write content",
        dev_node,
        scratch_mount.display()
    );
    mount::mount(dev_node, &scratch_mount, filesystem, &[]).structured(IoErrorKind::Write {
        path: dev_node.to_string(),
    })?;

    let guard = mount::MountGuard {
        mount_dir: &scratch_mount,
    };

    let result = copy_all(&structure.structure.content, gadget_root, &scratch_mount, observer);

    drop(guard);

    result
}

fn copy_all(
    entries: &[ContentEntry],
    gadget_root: &Path,
    mount_point: &Path,
    observer: &mut dyn ContentObserver,
) -> Result<(), EngineError> {
    for entry in entries {
        let source = gadget_root.join(&entry.source);
        let target = mount_point.join(&entry.target);

        debug!("Copying '{}' to '{}'", source.display(), target.display());

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).structured(IoErrorKind::Write {
                path: parent.display().to_string(),
            })?;
        }

        copy_recursive(&source, &target)?;
        observer.on_copied(&source, &target);
    }

    Ok(())
}

fn copy_recursive(source: &Path, target: &Path) -> Result<(), EngineError> {
    if source.is_dir() {
        std::fs::create_dir_all(target).structured(IoErrorKind::Write {
            path: target.display().to_string(),
        })?;
        for entry in std::fs::read_dir(source).structured(IoErrorKind::Read {
            path: source.display().to_string(),
        })? {
            let entry = entry.structured(IoErrorKind::Read {
                path: source.display().to_string(),
            })?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(source, target).structured(IoErrorKind::Write {
            path: target.display().to_string(),
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_recursive_copies_nested_directories() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();

        std::fs::create_dir_all(src_dir.path().join("EFI/boot")).unwrap();
        std::fs::write(src_dir.path().join("EFI/boot/bootx64.efi"), b"stub").unwrap();

        copy_recursive(src_dir.path(), &dst_dir.path().join("out")).unwrap();

        assert_eq!(
            std::fs::read(dst_dir.path().join("out/EFI/boot/bootx64.efi")).unwrap(),
            b"stub"
        );
    }
}
