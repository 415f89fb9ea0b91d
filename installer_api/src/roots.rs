use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_DATA_MOUNT, DEFAULT_SAVE_MOUNT};

/// The single root-override the engine exposes: every well-known directory
/// it reads or writes is reachable through this struct, so tests can run
/// against a temporary tree instead of the real filesystem.
#[derive(Debug, Clone)]
pub struct EngineRoots {
    /// Directory containing `meta/gadget.yaml` and content assets.
    pub gadget_root: PathBuf,
    /// Root under which scratch mount points (`gadget-install/<dev>`) are
    /// created.
    pub runtime_dir: PathBuf,
    /// Mounted `ubuntu-data` target at install time.
    pub data_mount: PathBuf,
    /// Mounted `ubuntu-save` target at install time.
    pub save_mount: PathBuf,
}

impl EngineRoots {
    pub fn new(gadget_root: impl Into<PathBuf>, runtime_dir: impl Into<PathBuf>) -> Self {
        EngineRoots {
            gadget_root: gadget_root.into(),
            runtime_dir: runtime_dir.into(),
            data_mount: PathBuf::from(DEFAULT_DATA_MOUNT),
            save_mount: PathBuf::from(DEFAULT_SAVE_MOUNT),
        }
    }

    pub fn with_data_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_mount = path.into();
        self
    }

    pub fn with_save_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_mount = path.into();
        self
    }

    pub fn scratch_mount_for(&self, dev_node: impl AsRef<Path>) -> PathBuf {
        let basename = dev_node
            .as_ref()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| dev_node.as_ref().to_string_lossy().into_owned());
        self.runtime_dir.join("gadget-install").join(basename)
    }
}
