use serde::{Deserialize, Serialize};

/// The subset of the host model the installer engine consumes directly.
/// `grade` and `architecture` are carried through untouched so the same
/// value can be handed to the sealing layer without a second parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Model {
    pub has_modes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl Model {
    pub fn has_modes(has_modes: bool) -> Self {
        Model {
            has_modes,
            grade: None,
            architecture: None,
        }
    }
}
