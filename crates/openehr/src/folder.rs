//! RM `FOLDER` wire model.
//!
//! A folder has a name, optional references to items stored elsewhere, and nested sub-folders.
//! The `uid` is only meaningful on output, where it carries the version id of the directory the
//! tree was read from; it is ignored on input.

use crate::{DvText, HierObjectId, ObjectRef, OpenehrError};
use serde::{Deserialize, Serialize};

pub const RM_TYPE: &str = "FOLDER";
pub const DEFAULT_ARCHETYPE_NODE_ID: &str = "openEHR-EHR-FOLDER.generic.v1";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Folder {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<HierObjectId>,
    #[serde(default = "default_archetype_node_id")]
    pub archetype_node_id: String,
    pub name: DvText,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<Folder>,
}

fn default_archetype_node_id() -> String {
    DEFAULT_ARCHETYPE_NODE_ID.to_owned()
}

impl Folder {
    /// An empty folder with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            rm_type: Some(RM_TYPE.into()),
            uid: None,
            archetype_node_id: default_archetype_node_id(),
            name: DvText::new(name),
            items: Vec::new(),
            folders: Vec::new(),
        }
    }

    /// Rejects any node in the tree whose `_type` is present but not `FOLDER`.
    pub(crate) fn check_types(&self) -> Result<(), OpenehrError> {
        if let Some(found) = self.rm_type.as_deref() {
            if found != RM_TYPE {
                return Err(OpenehrError::UnexpectedType {
                    expected: RM_TYPE,
                    found: found.to_owned(),
                });
            }
        }
        self.folders.iter().try_for_each(Folder::check_types)
    }
}
