//! Subtree discovery and mirrored-move planning.

use std::collections::HashMap;

use crate::directory::ChildEntry;
use crate::error::MoveError;

pub mod collector;
pub mod mirror;
pub mod plan;
pub mod walker;

pub use collector::collect_files;
pub use mirror::{DestinationMap, MirrorFolder, MirrorReport, mirror};
pub use plan::{MovePlan, PlanResult, build_plan, movable_file_count};
pub use walker::discover;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    /// `None` only for a root without a visible parent.
    pub parent_id: Option<String>,
    /// Ids from the discovery root down to and including `id`.
    pub ancestry: Vec<String>,
}

/// Every folder reachable from a root, in discovery order.
#[derive(Debug, Clone)]
pub struct SubtreeIndex {
    nodes: Vec<FolderNode>,
    positions: HashMap<String, usize>,
}

impl SubtreeIndex {
    pub fn new(root: FolderNode) -> Self {
        let mut positions = HashMap::new();
        positions.insert(root.id.clone(), 0);
        Self {
            nodes: vec![root],
            positions,
        }
    }

    pub fn root(&self) -> &FolderNode {
        &self.nodes[0]
    }

    /// Records `node`; a second sighting of an id means the remote tree is
    /// not a tree.
    pub fn insert(&mut self, node: FolderNode) -> Result<(), MoveError> {
        if let Some(existing) = self.get(&node.id) {
            return Err(MoveError::Inconsistency(format!(
                "folder {} seen at depth {} after depth {}",
                node.id,
                node.ancestry.len(),
                existing.ancestry.len()
            )));
        }
        self.positions.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&FolderNode> {
        self.positions.get(id).map(|&pos| &self.nodes[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn nodes(&self) -> &[FolderNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTreeEntry {
    pub folder_chain_by_id: Vec<String>,
    pub folder_chain_by_name: Vec<String>,
    /// Immediate children of the folder at the end of the chain, folders included.
    pub files_in_folder: Vec<ChildEntry>,
}

impl FolderTreeEntry {
    pub fn folder_id(&self) -> &str {
        self.folder_chain_by_id
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }
}
