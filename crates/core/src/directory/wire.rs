//! Conversion between openEHR `FOLDER` documents and [`FolderNode`] trees.
//!
//! Parsing and schema checks live in the `openehr` crate; this module applies the tree rules
//! (valid segment names, unique siblings, deduplicated items). A `uid` on input is ignored; on
//! output the root carries the directory version it was read from.

use super::{FolderNode, ItemRef};
use crate::{CoreError, CoreResult};
use openehr::{DvText, Folder, HierObjectId, ObjectRef, OpenehrError};
use vrs_identifiers::ObjectVersionId;
use vrs_types::SegmentName;

pub fn folder_from_wire(folder: &Folder) -> CoreResult<FolderNode> {
    let name = SegmentName::new(&folder.name.value).map_err(|err| {
        CoreError::InvalidInput(format!("invalid folder name '{}': {err}", folder.name.value))
    })?;

    let mut node = FolderNode::new(name).with_archetype_node_id(folder.archetype_node_id.clone());
    for item in &folder.items {
        node = node.with_item(ItemRef {
            id: item.id.value.clone(),
            namespace: item.namespace.clone(),
            kind: item.type_.clone(),
        });
    }
    for child in &folder.folders {
        node = node.with_child(folder_from_wire(child)?)?;
    }
    Ok(node)
}

pub fn folder_to_wire(node: &FolderNode, uid: Option<&ObjectVersionId>) -> Folder {
    let mut folder = Folder::named(node.name().as_str());
    folder.uid = uid.map(|v| HierObjectId::object_version_id(v.to_string()));
    folder.archetype_node_id = node.archetype_node_id().to_owned();
    folder.name = DvText::new(node.name().as_str());
    folder.items = node.items().iter().map(item_to_wire).collect();
    folder.folders = node
        .children()
        .iter()
        .map(|child| folder_to_wire(child, None))
        .collect();
    folder
}

fn item_to_wire(item: &ItemRef) -> ObjectRef {
    let id = if item.id.contains("::") {
        HierObjectId::object_version_id(item.id.clone())
    } else {
        HierObjectId::hier_object_id(item.id.clone())
    };
    ObjectRef {
        rm_type: Some("OBJECT_REF".into()),
        id,
        namespace: item.namespace.clone(),
        type_: item.kind.clone(),
    }
}

/// Parses a request body into a tree.
pub fn tree_from_json_value(value: serde_json::Value) -> CoreResult<FolderNode> {
    folder_from_wire(&openehr::read_folder_value(value)?)
}

pub fn tree_from_yaml(yaml: &str) -> CoreResult<FolderNode> {
    folder_from_wire(&openehr::read_folder_yaml(yaml)?)
}

pub fn tree_to_json_value(
    node: &FolderNode,
    uid: Option<&ObjectVersionId>,
) -> CoreResult<serde_json::Value> {
    serde_json::to_value(folder_to_wire(node, uid))
        .map_err(|err| CoreError::Openehr(OpenehrError::from(err)))
}

pub fn tree_to_yaml(node: &FolderNode, uid: Option<&ObjectVersionId>) -> CoreResult<String> {
    Ok(openehr::write_folder_yaml(&folder_to_wire(node, uid))?)
}
