// Engine-wide constants

/// Relative path, under the gadget root, of the gadget description document.
pub const GADGET_YAML_PATH: &str = "meta/gadget.yaml";

/// Size token meaning "grow to fill the remainder of the disk".
pub const SIZE_GROW: u64 = 0;

/// Deterministic mapper name for the encrypted save partition.
pub const MAPPER_UBUNTU_SAVE: &str = "ubuntu-save";

/// Deterministic mapper name for the encrypted data partition.
pub const MAPPER_UBUNTU_DATA: &str = "ubuntu-data";

/// Deterministic LUKS label suffix applied to an encrypted role's filesystem label.
pub const LUKS_LABEL_SUFFIX: &str = "-enc";

/// Bound on waiting for a device node to appear after a partition change.
pub const NODE_EXISTS_TIMEOUT_SECS: u64 = 5;

/// Bound on waiting for udev to settle.
pub const SETTLE_TIMEOUT_SECS: u64 = 180;

/// Sector size (bytes) used for filesystems built on top of a LUKS mapper node.
pub const LUKS_BACKED_SECTOR_SIZE: u64 = 4096;

/// Relative path, under a mounted data device, of the traits document.
pub const TRAITS_PATH_UNDER_DATA: &str = "system-data/var/lib/snapd/device/disk-mapping.json";

/// Relative path, under a mounted save device, of the traits document.
pub const TRAITS_PATH_UNDER_SAVE: &str = "device/disk-mapping.json";

/// Default target mount for the data role at install time.
pub const DEFAULT_DATA_MOUNT: &str = "/run/mnt/ubuntu-data";

/// Default target mount for the save role at install time.
pub const DEFAULT_SAVE_MOUNT: &str = "/run/mnt/ubuntu-save";

/// Schema version written into every persisted traits document.
pub const TRAITS_SCHEMA_VERSION: u32 = 1;
