use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, LayoutInvalidError};

/// Semantic tag on a partition, stable across installs regardless of
/// physical device naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Mbr,
    SystemSeed,
    SystemSeedNull,
    SystemBoot,
    SystemSave,
    SystemData,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mbr => "mbr",
            Role::SystemSeed => "system-seed",
            Role::SystemSeedNull => "system-seed-null",
            Role::SystemBoot => "system-boot",
            Role::SystemSave => "system-save",
            Role::SystemData => "system-data",
        }
    }

    /// Roles that may carry encryption (system-save, system-data).
    pub fn is_encryptable(&self) -> bool {
        matches!(self, Role::SystemSave | Role::SystemData)
    }
}

/// Filesystem to build on a structure, or none for raw/mbr structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    None,
    Vfat,
    Ext4,
}

/// A single source→target copy instruction carried by a structure's
/// `content` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContentEntry {
    pub source: String,
    pub target: String,
}

/// One entry of the declared layout, as parsed from `meta/gadget.yaml`,
/// before offsets are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GadgetStructure {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Partition-type GUID (GPT) or MBR type byte, exactly as declared.
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_filesystem")]
    pub filesystem: FilesystemType,
    #[serde(default, rename = "filesystem-label", skip_serializing_if = "Option::is_none")]
    pub filesystem_label: Option<String>,
    /// Size in bytes; `0` on `system-data` means "fill remainder".
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentEntry>,
}

fn default_filesystem() -> FilesystemType {
    FilesystemType::None
}

/// Ordered sequence of structures plus bootloader identifier, as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Volume {
    pub name: String,
    pub bootloader: String,
    pub structure: Vec<GadgetStructure>,
}

/// Root of `meta/gadget.yaml`: one or more named volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GadgetYaml {
    pub volumes: BTreeMap<String, Volume>,
}

/// A structure after its byte offset has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LaidOutStructure {
    pub structure: GadgetStructure,
    pub start_offset: u64,
    pub size: u64,
}

/// A `Volume` after offsets have been computed. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LaidOutVolume {
    pub name: String,
    pub bootloader: String,
    pub structures: Vec<LaidOutStructure>,
}

impl LaidOutVolume {
    pub fn structure_with_role(&self, role: Role) -> Option<&LaidOutStructure> {
        self.structures
            .iter()
            .find(|s| s.structure.role == Some(role))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.structure_with_role(role).is_some()
    }
}

/// Resolve every structure's byte offset within `volume`, validating the
/// invariants the layout resolver is responsible for.
pub fn lay_out_volume(volume: &Volume) -> Result<LaidOutVolume, EngineError> {
    let mut seen_roles = std::collections::HashSet::new();
    let mut structures = Vec::with_capacity(volume.structure.len());
    let mut cursor: u64 = 0;

    for (idx, structure) in volume.structure.iter().enumerate() {
        if let Some(role) = structure.role {
            if !seen_roles.insert(role) {
                return Err(EngineError::new(LayoutInvalidError::DuplicateRole {
                    volume: volume.name.clone(),
                    role: role.as_str().to_string(),
                }));
            }
        }

        if (structure.filesystem == FilesystemType::None) != structure.filesystem_label.is_none()
        {
            return Err(EngineError::new(LayoutInvalidError::FilesystemLabelMismatch {
                name: structure.name.clone(),
            }));
        }

        let start_offset = structure.offset.unwrap_or(cursor);
        if start_offset < cursor {
            return Err(EngineError::new(LayoutInvalidError::OverlappingStructures {
                volume: volume.name.clone(),
                name: structure.name.clone(),
            }));
        }

        let is_grow = structure.size == 0 && structure.role == Some(Role::SystemData);
        if structure.size == 0 && !is_grow {
            return Err(EngineError::new(LayoutInvalidError::GrowNotLast {
                name: structure.name.clone(),
            }));
        }
        if is_grow && idx != volume.structure.len() - 1 {
            return Err(EngineError::new(LayoutInvalidError::GrowNotLast {
                name: structure.name.clone(),
            }));
        }

        cursor = start_offset + structure.size;
        structures.push(LaidOutStructure {
            structure: structure.clone(),
            start_offset,
            size: structure.size,
        });
    }

    Ok(LaidOutVolume {
        name: volume.name.clone(),
        bootloader: volume.bootloader.clone(),
        structures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(name: &str, role: Option<Role>, size: u64) -> GadgetStructure {
        GadgetStructure {
            name: name.to_string(),
            role,
            type_: "0FC63DAF-8483-4772-8E79-3D69D8477DE4".to_string(),
            filesystem: if role.is_some() {
                FilesystemType::Ext4
            } else {
                FilesystemType::None
            },
            filesystem_label: role.map(|r| r.as_str().to_string()),
            size,
            offset: None,
            content: Vec::new(),
        }
    }

    #[test]
    fn lay_out_volume_resolves_sequential_offsets() {
        let volume = Volume {
            name: "pc".to_string(),
            bootloader: "grub".to_string(),
            structure: vec![
                structure("seed", Some(Role::SystemSeed), 100),
                structure("boot", Some(Role::SystemBoot), 50),
                structure("data", Some(Role::SystemData), 0),
            ],
        };

        let laid_out = lay_out_volume(&volume).unwrap();
        assert_eq!(laid_out.structures[0].start_offset, 0);
        assert_eq!(laid_out.structures[1].start_offset, 100);
        assert_eq!(laid_out.structures[2].start_offset, 150);
        assert!(laid_out.has_role(Role::SystemData));
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let volume = Volume {
            name: "pc".to_string(),
            bootloader: "grub".to_string(),
            structure: vec![
                structure("a", Some(Role::SystemBoot), 10),
                structure("b", Some(Role::SystemBoot), 10),
            ],
        };
        assert!(lay_out_volume(&volume).is_err());
    }

    #[test]
    fn grow_structure_must_be_last() {
        let volume = Volume {
            name: "pc".to_string(),
            bootloader: "grub".to_string(),
            structure: vec![
                structure("data", Some(Role::SystemData), 0),
                structure("boot", Some(Role::SystemBoot), 10),
            ],
        };
        assert!(lay_out_volume(&volume).is_err());
    }
}
