pub mod blkid;
pub mod block_devices;
pub mod dependencies;
pub mod encryption;
pub mod exe;
pub mod files;
pub mod filesystems;
pub mod lsblk;
pub mod lsof;
pub mod mkfs;
pub mod mount;
pub mod partition_types;
pub mod sfdisk;
pub mod udevadm;
pub mod wipefs;

pub(crate) mod crate_private {
    pub trait Sealed {}
}
