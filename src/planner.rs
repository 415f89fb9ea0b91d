use installer_api::{
    error::{EngineError, IncompatibleLayoutError},
    gadget::{LaidOutStructure, LaidOutVolume, Role},
    probe::ProbedDisk,
};

/// One action the Partition Planner decided on for a single structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// No matching partition exists yet; create it.
    Create,
    /// A matching partition already exists at the declared offset/size; its
    /// device node is reused as-is.
    Keep { dev_node: String },
    /// A matching partition exists but its filesystem must be rebuilt
    /// (factory-reset mode for non-preserved roles).
    Reformat { dev_node: String },
    /// A partition occupies this role's declared slot but at the wrong
    /// offset/size (install mode only): delete it by its current index, then
    /// create the declared one in its place.
    Recreate {
        existing_index: u32,
        existing_dev_node: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStructure {
    pub name: String,
    pub role: Option<Role>,
    pub action: PlannedAction,
}

/// Planning mode. Install reconciles the declared layout against whatever is
/// already on the disk; factory-reset expects the structural skeleton to
/// already exist and preserves `system-save` untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    Install,
    FactoryReset,
}

/// Diff `laid_out` against `probed` and decide, per structure, whether it
/// must be created, kept as-is, recreated, or reformatted. Pure function: no
/// I/O.
pub fn plan_partitions(
    laid_out: &LaidOutVolume,
    probed: &ProbedDisk,
    mode: PlanMode,
) -> Result<Vec<PlannedStructure>, EngineError> {
    let seed_index = system_seed_index(laid_out, probed);

    laid_out
        .structures
        .iter()
        .map(|structure| plan_one(structure, probed, mode, seed_index))
        .collect()
}

/// Probed index of the partition backing this volume's `system-seed` (or
/// `system-seed-null`) role, if it is present on disk. Used to enforce that
/// install-mode reconciliation never schedules a partition at or before it
/// for deletion.
fn system_seed_index(laid_out: &LaidOutVolume, probed: &ProbedDisk) -> Option<u32> {
    [Role::SystemSeed, Role::SystemSeedNull]
        .into_iter()
        .find_map(|role| {
            laid_out
                .structure_with_role(role)
                .and_then(|s| s.structure.filesystem_label.as_deref())
                .and_then(|label| probed.partition_with_label(label))
                .map(|p| p.index)
        })
}

fn plan_one(
    structure: &LaidOutStructure,
    probed: &ProbedDisk,
    mode: PlanMode,
    seed_index: Option<u32>,
) -> Result<PlannedStructure, EngineError> {
    let role = structure.structure.role;
    let name = structure.structure.name.clone();

    let existing = structure
        .structure
        .filesystem_label
        .as_deref()
        .and_then(|label| probed.partition_with_label(label));

    match mode {
        PlanMode::Install => plan_install(structure, role, name, existing, seed_index),
        PlanMode::FactoryReset => plan_factory_reset(structure, role, name, existing),
    }
}

fn plan_install(
    structure: &LaidOutStructure,
    role: Option<Role>,
    name: String,
    existing: Option<&installer_api::probe::ProbedPartition>,
    seed_index: Option<u32>,
) -> Result<PlannedStructure, EngineError> {
    let Some(existing) = existing else {
        return Ok(PlannedStructure {
            name,
            role,
            action: PlannedAction::Create,
        });
    };

    if existing.start == structure.start_offset && existing.size == structure.size {
        return Ok(PlannedStructure {
            name,
            role,
            action: PlannedAction::Keep {
                dev_node: existing.dev_node.clone(),
            },
        });
    }

    // system-seed is preserved unconditionally: it is never scheduled for
    // deletion even if its geometry drifts from the declared layout, since
    // it is the very partition this disk was resolved through.
    if matches!(role, Some(Role::SystemSeed) | Some(Role::SystemSeedNull)) {
        return Ok(PlannedStructure {
            name,
            role,
            action: PlannedAction::Keep {
                dev_node: existing.dev_node.clone(),
            },
        });
    }

    if let Some(seed_index) = seed_index {
        if existing.index <= seed_index {
            return Err(EngineError::new(IncompatibleLayoutError::UnsafeDeletion {
                index: existing.index,
            }));
        }
    }

    Ok(PlannedStructure {
        name,
        role,
        action: PlannedAction::Recreate {
            existing_index: existing.index,
            existing_dev_node: existing.dev_node.clone(),
        },
    })
}

fn plan_factory_reset(
    structure: &LaidOutStructure,
    role: Option<Role>,
    name: String,
    existing: Option<&installer_api::probe::ProbedPartition>,
) -> Result<PlannedStructure, EngineError> {
    let existing = existing.ok_or_else(|| {
        EngineError::new(IncompatibleLayoutError::MissingStructuralPartition {
            role: role.map(|r| r.as_str().to_string()).unwrap_or_default(),
        })
    })?;

    if existing.start != structure.start_offset {
        return Err(EngineError::new(IncompatibleLayoutError::OffsetMismatch {
            role: role.map(|r| r.as_str().to_string()).unwrap_or_default(),
            actual_offset: existing.start,
            expected_offset: structure.start_offset,
        }));
    }

    if existing.size != structure.size {
        return Err(EngineError::new(IncompatibleLayoutError::SizeMismatch {
            role: role.map(|r| r.as_str().to_string()).unwrap_or_default(),
            actual_size: existing.size,
            expected_size: structure.size,
        }));
    }

    // system-save is the one role factory-reset always preserves;
    // every other structural role is wiped and rebuilt.
    let action = if role == Some(Role::SystemSave) {
        PlannedAction::Keep {
            dev_node: existing.dev_node.clone(),
        }
    } else {
        PlannedAction::Reformat {
            dev_node: existing.dev_node.clone(),
        }
    };

    Ok(PlannedStructure { name, role, action })
}
