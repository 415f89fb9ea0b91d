use std::collections::BTreeMap;

use serde::Serialize;

use crate::encryption::EncryptionKey;
use crate::gadget::Role;

/// Return value of `install`/`factory_reset`/`write_content`: the resolved
/// device for each role, and (for encrypted installs) the key for each
/// encrypted role.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstalledSystemSideData {
    pub device_for_role: BTreeMap<Role, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_for_role: Option<BTreeMap<Role, EncryptionKey>>,
}

impl Serialize for EncryptionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Key bytes never leave process memory through this type; the only
        // reason it implements Serialize at all is so InstalledSystemSideData
        // can be reported as JSON by the CLI without a key-shaped hole in the
        // shape of the type. Emit only its length as a sanity marker.
        serializer.serialize_str(&format!("<{}-byte key>", self.as_bytes().len()))
    }
}

impl InstalledSystemSideData {
    pub fn unencrypted(device_for_role: BTreeMap<Role, String>) -> Self {
        InstalledSystemSideData {
            device_for_role,
            key_for_role: None,
        }
    }

    pub fn encrypted(
        device_for_role: BTreeMap<Role, String>,
        key_for_role: BTreeMap<Role, EncryptionKey>,
    ) -> Self {
        InstalledSystemSideData {
            device_for_role,
            key_for_role: Some(key_for_role),
        }
    }
}
