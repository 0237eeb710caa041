//! Immutable folder trees with structural sharing.
//!
//! A [`FolderNode`] is never changed once built. Editing a node deep in a tree produces a new
//! root whose path down to the edited node is freshly allocated, while every untouched subtree
//! is shared (`Arc`) with the previous version. Each committed directory version therefore costs
//! O(depth) new nodes rather than a copy of the whole tree.

use super::FolderPath;
use crate::{CoreError, CoreResult};
use openehr::folder::DEFAULT_ARCHETYPE_NODE_ID;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vrs_types::SegmentName;

/// Reference to an item filed in a folder. The referenced resource is not owned by the folder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    name: SegmentName,
    archetype_node_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    items: Vec<ItemRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Arc<FolderNode>>,
}

impl FolderNode {
    pub fn new(name: SegmentName) -> Self {
        Self {
            name,
            archetype_node_id: DEFAULT_ARCHETYPE_NODE_ID.to_owned(),
            items: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_archetype_node_id(mut self, archetype_node_id: impl Into<String>) -> Self {
        self.archetype_node_id = archetype_node_id.into();
        self
    }

    /// Adds `item` unless an equal reference is already filed here.
    pub fn with_item(mut self, item: ItemRef) -> Self {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
        self
    }

    /// Appends a sub-folder.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if a sibling with the same name exists.
    pub fn with_child(mut self, child: FolderNode) -> CoreResult<Self> {
        if self.child(child.name.as_str()).is_some() {
            return Err(duplicate_sibling(&self.name, &child.name));
        }
        self.children.push(Arc::new(child));
        Ok(self)
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn archetype_node_id(&self) -> &str {
        &self.archetype_node_id
    }

    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    pub fn children(&self) -> &[Arc<FolderNode>] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Arc<FolderNode>> {
        self.children.iter().find(|c| c.name.as_str() == name)
    }

    /// Walks `path` from this node, one child name per segment.
    ///
    /// Returns `None` when any segment is missing. Has no side effects.
    pub fn find(self: &Arc<Self>, path: &FolderPath) -> Option<Arc<FolderNode>> {
        let mut node = self;
        for segment in path.segments() {
            node = node.child(segment)?;
        }
        Some(Arc::clone(node))
    }

    /// Returns a new tree in which the node at `path` is replaced by `subtree`.
    ///
    /// Only the nodes on `path` are reallocated; all other subtrees are shared with `self`.
    /// Replacing the root returns `subtree` itself.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ResourceNotFound`] if `path` does not exist in this tree.
    /// - [`CoreError::InvalidInput`] if `subtree`'s name clashes with one of its new siblings.
    pub fn replace_at(
        self: &Arc<Self>,
        path: &FolderPath,
        subtree: FolderNode,
    ) -> CoreResult<Arc<FolderNode>> {
        self.replace_segments(path.segments(), subtree)
            .map_err(|err| match err {
                CoreError::ResourceNotFound(_) => {
                    CoreError::ResourceNotFound(format!("folder {path}"))
                }
                other => other,
            })
    }

    fn replace_segments(
        self: &Arc<Self>,
        segments: &[String],
        subtree: FolderNode,
    ) -> CoreResult<Arc<FolderNode>> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(Arc::new(subtree));
        };

        let index = self
            .children
            .iter()
            .position(|c| c.name.as_str() == head)
            .ok_or_else(|| CoreError::ResourceNotFound(head.clone()))?;

        let replaced = self.children[index].replace_segments(rest, subtree)?;
        let clashes = self
            .children
            .iter()
            .enumerate()
            .any(|(i, c)| i != index && c.name == replaced.name);
        if clashes {
            return Err(duplicate_sibling(&self.name, &replaced.name));
        }

        let mut children = self.children.clone();
        children[index] = replaced;
        Ok(Arc::new(FolderNode {
            name: self.name.clone(),
            archetype_node_id: self.archetype_node_id.clone(),
            items: self.items.clone(),
            children,
        }))
    }
}

fn duplicate_sibling(parent: &SegmentName, name: &SegmentName) -> CoreError {
    CoreError::InvalidInput(format!(
        "folder '{parent}' already has a sub-folder named '{name}'"
    ))
}
