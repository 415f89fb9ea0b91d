use std::path::Path;

use anyhow::{Context, Error};

use installer_api::encryption::EncryptionKey;

use crate::{dependencies::Dependency, exe::RunAndCheck};

/// Cipher specification string for the LUKS2 data segment.
pub const CIPHER: &str = "aes-xts-plain64";

/// Key size in bits, as required by the cipher specification above.
pub const KEY_SIZE: &str = "512";

/// PBKDF used for the LUKS2 keyslot. Its cost parameters are deliberately
/// low: memory-hardness for the passphrase isn't the point here, the key
/// itself is a freshly generated 32-byte random value handed to an external
/// sealing service, not typed by a human.
const PBKDF: &str = "argon2i";
const PBKDF_FORCE_ITERATIONS: &str = "4";
const PBKDF_MEMORY_KIB: &str = "32";

const LUKS_METADATA_SIZE: &str = "2048k";
const LUKS_KEYSLOTS_SIZE: &str = "2560k";

/// Draws a fresh 32-byte key from the OS CSPRNG via `getrandom(2)`.
pub fn generate_key() -> Result<EncryptionKey, Error> {
    let mut buf = [0u8; 32];
    getrandom_fill(&mut buf).context("Failed to read random bytes for encryption key")?;
    Ok(EncryptionKey::from_bytes(buf))
}

#[cfg(target_os = "linux")]
fn getrandom_fill(buf: &mut [u8]) -> Result<(), Error> {
    use std::io::Read;
    let mut file = std::fs::File::open("/dev/urandom")
        .context("Failed to open /dev/urandom for key generation")?;
    file.read_exact(buf)
        .context("Failed to read enough entropy from /dev/urandom")
}

#[cfg(not(target_os = "linux"))]
fn getrandom_fill(_buf: &mut [u8]) -> Result<(), Error> {
    anyhow::bail!("CSPRNG key generation is only supported on Linux")
}

/// Writes a key to a private temporary file so that it can be passed to
/// `cryptsetup` via `--key-file` without ever appearing on a command line
/// (and therefore in `ps`/logs).
fn write_key_file(key: &EncryptionKey) -> Result<tempfile::NamedTempFile, Error> {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().context("Failed to create temporary key file")?;
    file.write_all(key.as_bytes())
        .context("Failed to write key material to temporary file")?;
    Ok(file)
}

/// Formats `device_path` as a LUKS2 container labelled `label`, with its
/// single keyslot (slot 0) unlocked by `key`. LUKS parameters are fixed by
/// policy, see module-level constants.
pub fn luks_format(key: &EncryptionKey, label: &str, device_path: impl AsRef<Path>) -> Result<(), Error> {
    let key_file = write_key_file(key)?;

    Dependency::Cryptsetup
        .cmd()
        .arg("luksFormat")
        .arg("--batch-mode")
        .arg("--type")
        .arg("luks2")
        .arg("--cipher")
        .arg(CIPHER)
        .arg("--key-size")
        .arg(KEY_SIZE)
        .arg("--pbkdf")
        .arg(PBKDF)
        .arg("--pbkdf-force-iterations")
        .arg(PBKDF_FORCE_ITERATIONS)
        .arg("--pbkdf-memory")
        .arg(PBKDF_MEMORY_KIB)
        .arg("--luks2-metadata-size")
        .arg(LUKS_METADATA_SIZE)
        .arg("--luks2-keyslots-size")
        .arg(LUKS_KEYSLOTS_SIZE)
        .arg("--label")
        .arg(label)
        .arg("--key-file")
        .arg(key_file.path())
        .arg(device_path.as_ref())
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to LUKS-format device '{}' as '{}'",
                device_path.as_ref().display(),
                label
            )
        })?;

    configure_primary_keyslot_preferred(device_path.as_ref())
}

/// Marks keyslot 0 (the only slot this engine ever writes) as the preferred
/// unlock slot, so future passphrase-less unlock attempts try it first.
fn configure_primary_keyslot_preferred(device_path: &Path) -> Result<(), Error> {
    Dependency::Cryptsetup
        .cmd()
        .arg("config")
        .arg("--priority")
        .arg("prefer")
        .arg("--key-slot")
        .arg("0")
        .arg(device_path)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to set keyslot 0 priority to prefer on '{}'",
                device_path.display()
            )
        })
}

/// Opens a LUKS2 device unlocked by `key` under the deterministic mapper
/// name `mapper_name` (appears at `/dev/mapper/<mapper_name>`).
pub fn luks_open(
    key: &EncryptionKey,
    device_path: impl AsRef<Path>,
    mapper_name: &str,
) -> Result<(), Error> {
    let key_file = write_key_file(key)?;

    Dependency::Cryptsetup
        .cmd()
        .arg("luksOpen")
        .arg("--key-file")
        .arg(key_file.path())
        .arg(device_path.as_ref())
        .arg(mapper_name)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to open encrypted device '{}' as '{}'",
                device_path.as_ref().display(),
                mapper_name
            )
        })
}

/// Closes a previously opened mapper device.
pub fn luks_close(mapper_name: &str) -> Result<(), Error> {
    Dependency::Cryptsetup
        .cmd()
        .arg("luksClose")
        .arg(mapper_name)
        .run_and_check()
        .with_context(|| format!("Failed to close encrypted volume '{mapper_name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_32_bytes_and_differ() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_eq!(a.as_bytes().len(), 32);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
