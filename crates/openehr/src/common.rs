//! RM data types shared by several classes.
//!
//! These are deliberately thin wire structs: only the fields VRS reads or writes are modelled.
//! The optional `_type` discriminator is accepted on input so canonical JSON from other openEHR
//! systems parses, and emitted on output.

use serde::{Deserialize, Serialize};

/// RM `DV_TEXT` (value only).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DvText {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    pub value: String,
}

impl DvText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            rm_type: Some("DV_TEXT".into()),
            value: value.into(),
        }
    }
}

/// RM `OBJECT_ID` descendants (`HIER_OBJECT_ID`, `OBJECT_VERSION_ID`, `GENERIC_ID`), reduced to
/// the `value` string.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(deny_unknown_fields)]
pub struct HierObjectId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    pub value: String,
}

impl HierObjectId {
    pub fn object_version_id(value: impl Into<String>) -> Self {
        Self {
            rm_type: Some("OBJECT_VERSION_ID".into()),
            value: value.into(),
        }
    }

    pub fn hier_object_id(value: impl Into<String>) -> Self {
        Self {
            rm_type: Some("HIER_OBJECT_ID".into()),
            value: value.into(),
        }
    }
}

/// RM `OBJECT_REF`: an opaque reference to something stored elsewhere.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(deny_unknown_fields)]
pub struct ObjectRef {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    pub id: HierObjectId,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// RM `PARTY_REF`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PartyRef {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    pub id: HierObjectId,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
}
