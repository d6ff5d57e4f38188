use std::collections::HashSet;

use crate::directory::MoveOperation;
use crate::error::Diagnostic;

use super::{DestinationMap, FolderTreeEntry};

/// Attach operations first, then deletes of the emptied source folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    operations: Vec<MoveOperation>,
    attach_count: usize,
    /// Source folders that keep existing because something below them stays.
    pub retained_folder_ids: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MovePlan {
    pub fn operations(&self) -> &[MoveOperation] {
        &self.operations
    }

    pub fn attach_operations(&self) -> &[MoveOperation] {
        &self.operations[..self.attach_count]
    }

    pub fn delete_operations(&self) -> &[MoveOperation] {
        &self.operations[self.attach_count..]
    }

    pub fn into_operations(self) -> Vec<MoveOperation> {
        self.operations
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanResult {
    Ready(MovePlan),
    /// No file can be attached anywhere; nothing is deleted either.
    NothingToMove { diagnostics: Vec<Diagnostic> },
}

/// Every folder id of the subtree, in first-seen order.
pub fn internal_folder_ids(entries: &[FolderTreeEntry]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    entries
        .iter()
        .flat_map(|entry| entry.folder_chain_by_id.iter())
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Number of children that are not themselves subtree folders.
pub fn movable_file_count(entries: &[FolderTreeEntry]) -> usize {
    let internal: HashSet<String> = internal_folder_ids(entries).into_iter().collect();
    entries
        .iter()
        .flat_map(|entry| entry.files_in_folder.iter())
        .filter(|child| !internal.contains(&child.id))
        .count()
}

/// `folder_ids` together with every ancestor recorded for them in `entries`.
pub(crate) fn with_ancestors<'a>(
    entries: &[FolderTreeEntry],
    folder_ids: impl IntoIterator<Item = &'a str>,
) -> HashSet<String> {
    let seeds: HashSet<&str> = folder_ids.into_iter().collect();
    entries
        .iter()
        .filter(|entry| seeds.contains(entry.folder_id()))
        .flat_map(|entry| entry.folder_chain_by_id.iter().cloned())
        .chain(seeds.iter().map(|id| id.to_string()))
        .collect()
}

pub fn build_plan(entries: &[FolderTreeEntry], destinations: &DestinationMap) -> PlanResult {
    let internal_ids = internal_folder_ids(entries);
    let internal: HashSet<&str> = internal_ids.iter().map(String::as_str).collect();
    let mut operations = Vec::new();
    let mut diagnostics = Vec::new();

    for entry in entries {
        let folder_id = entry.folder_id();
        let files = entry
            .files_in_folder
            .iter()
            .filter(|child| !internal.contains(child.id.as_str()));
        match destinations.get(folder_id) {
            Some(mirror) => operations.extend(files.map(|file| MoveOperation::Attach {
                file_id: file.id.clone(),
                new_parent_id: mirror.new_id.clone(),
                old_parent_id: folder_id.to_string(),
            })),
            None => {
                let file_ids: Vec<String> = files.map(|file| file.id.clone()).collect();
                if !file_ids.is_empty() {
                    let diagnostic = Diagnostic::FilesWithoutMirror {
                        folder_id: folder_id.to_string(),
                        file_ids,
                    };
                    tracing::warn!("{diagnostic}");
                    diagnostics.push(diagnostic);
                }
            }
        }
    }

    let attach_count = operations.len();
    if attach_count == 0 {
        tracing::warn!("no files eligible for moving");
        return PlanResult::NothingToMove { diagnostics };
    }

    let unmirrored = internal_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !destinations.contains(id));
    let retained = with_ancestors(entries, unmirrored);
    for id in &internal_ids {
        if retained.contains(id) && destinations.contains(id) {
            diagnostics.push(Diagnostic::DeleteWithheld {
                folder_id: id.clone(),
            });
        }
    }
    // Deepest folders first.
    operations.extend(
        internal_ids
            .iter()
            .rev()
            .filter(|id| !retained.contains(*id))
            .map(|id| MoveOperation::Delete {
                folder_id: id.clone(),
            }),
    );
    let retained_folder_ids = internal_ids
        .iter()
        .filter(|id| retained.contains(*id))
        .cloned()
        .collect();

    PlanResult::Ready(MovePlan {
        operations,
        attach_count,
        retained_folder_ids,
        diagnostics,
    })
}
