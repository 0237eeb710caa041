//! RM `EHR_STATUS` wire model.
//!
//! Responsibilities:
//! - Define the wire struct used for request bodies, responses and the file store.
//! - Accept `subject.external_ref` when it is absent, a single object, or a list (older YAML
//!   written a single reference).
//!
//! `other_details` is kept as an opaque JSON value; VRS does not interpret it.

use crate::{DvText, HierObjectId, OpenehrError, PartyRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const RM_TYPE: &str = "EHR_STATUS";
pub const DEFAULT_ARCHETYPE_NODE_ID: &str = "openEHR-EHR-EHR_STATUS.generic.v1";
pub const DEFAULT_NAME: &str = "EHR Status";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EhrStatus {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<HierObjectId>,
    pub archetype_node_id: String,
    pub name: DvText,
    #[serde(default, skip_serializing_if = "PartySelf::is_empty")]
    pub subject: PartySelf,
    pub is_queryable: bool,
    pub is_modifiable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_details: Option<serde_json::Value>,
}

impl Default for EhrStatus {
    /// The status every new EHR starts with: queryable, modifiable, no subject.
    fn default() -> Self {
        Self {
            rm_type: Some(RM_TYPE.into()),
            uid: None,
            archetype_node_id: DEFAULT_ARCHETYPE_NODE_ID.into(),
            name: DvText::new(DEFAULT_NAME),
            subject: PartySelf::default(),
            is_queryable: true,
            is_modifiable: true,
            other_details: None,
        }
    }
}

impl EhrStatus {
    /// Default status with the given subject reference.
    pub fn for_subject(subject: Option<PartyRef>) -> Self {
        Self {
            subject: PartySelf {
                rm_type: Some("PARTY_SELF".into()),
                external_ref: ExternalRefs(subject.into_iter().collect()),
            },
            ..Self::default()
        }
    }

    pub(crate) fn check_type(&self) -> Result<(), OpenehrError> {
        match self.rm_type.as_deref() {
            Some(found) if found != RM_TYPE => Err(OpenehrError::UnexpectedType {
                expected: RM_TYPE,
                found: found.to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

/// RM `PARTY_SELF`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PartySelf {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub rm_type: Option<String>,
    #[serde(default, skip_serializing_if = "ExternalRefs::is_empty")]
    pub external_ref: ExternalRefs,
}

impl PartySelf {
    fn is_empty(&self) -> bool {
        self.external_ref.is_empty()
    }
}

/// `subject.external_ref` may be absent, a single object, or a list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalRefs(pub Vec<PartyRef>);

impl ExternalRefs {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
enum OneOrManyPartyRef {
    One(PartyRef),
    Many(Vec<PartyRef>),
}

impl<'de> Deserialize<'de> for ExternalRefs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<OneOrManyPartyRef>::deserialize(deserializer)?;
        let refs = match value {
            None => Vec::new(),
            Some(OneOrManyPartyRef::One(r)) => vec![r],
            Some(OneOrManyPartyRef::Many(rs)) => rs,
        };
        Ok(Self(refs))
    }
}

impl Serialize for ExternalRefs {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0.as_slice() {
            [] => serializer.serialize_none(),
            [one] => one.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}
