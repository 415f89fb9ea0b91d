use installer_api::gadget::FilesystemType;

/// File system types accepted by `mount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountFileSystemType {
    Ext4,
    Vfat,
    Auto,
}

/// File system types accepted by `mkfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkfsFileSystemType {
    Ext4,
    Vfat,
}

impl MountFileSystemType {
    pub fn name(self) -> &'static str {
        match self {
            MountFileSystemType::Ext4 => "ext4",
            MountFileSystemType::Vfat => "vfat",
            MountFileSystemType::Auto => "auto",
        }
    }

    pub fn from_gadget_type(filesystem: FilesystemType) -> Option<Self> {
        match filesystem {
            FilesystemType::Ext4 => Some(MountFileSystemType::Ext4),
            FilesystemType::Vfat => Some(MountFileSystemType::Vfat),
            FilesystemType::None => None,
        }
    }
}

impl std::fmt::Display for MountFileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Provides a conversion from `MountFileSystemType` to `sys_mount::FilesystemType`.
impl From<MountFileSystemType> for sys_mount::FilesystemType<'static> {
    fn from(s: MountFileSystemType) -> Self {
        sys_mount::FilesystemType::Manual(s.name())
    }
}

impl MkfsFileSystemType {
    pub fn name(self) -> &'static str {
        match self {
            MkfsFileSystemType::Ext4 => "ext4",
            MkfsFileSystemType::Vfat => "vfat",
        }
    }

    pub fn from_gadget_type(filesystem: FilesystemType) -> Option<Self> {
        match filesystem {
            FilesystemType::Ext4 => Some(MkfsFileSystemType::Ext4),
            FilesystemType::Vfat => Some(MkfsFileSystemType::Vfat),
            FilesystemType::None => None,
        }
    }
}

impl std::fmt::Display for MkfsFileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
