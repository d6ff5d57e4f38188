use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::directory::{DirectoryClient, DirectoryError};
use crate::error::{Diagnostic, MoveError};

use super::FolderTreeEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorFolder {
    pub new_id: String,
    pub name: String,
}

/// Source folder id to the folder recreated for it at the destination.
/// Entries are only ever added.
#[derive(Debug, Clone, Default)]
pub struct DestinationMap {
    entries: HashMap<String, MirrorFolder>,
}

impl DestinationMap {
    pub fn get(&self, source_id: &str) -> Option<&MirrorFolder> {
        self.entries.get(source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, source_id: &str, folder: MirrorFolder) {
        self.entries.entry(source_id.to_string()).or_insert(folder);
    }
}

#[derive(Debug, Default)]
pub struct MirrorReport {
    pub destinations: DestinationMap,
    pub created_count: usize,
    /// Source folders left without a mirror.
    pub skipped_folder_ids: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MirrorReport {
    fn skip(&mut self, skipped: &mut HashSet<String>, folder_id: &str, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        if skipped.insert(folder_id.to_string()) {
            self.skipped_folder_ids.push(folder_id.to_string());
        }
        self.diagnostics.push(diagnostic);
    }
}

/// Recreates the folder skeleton of `entries` under `destination_root_id`.
///
/// Each chain is walked root-first, so a folder's parent mirror always exists
/// before the folder itself is created. A source folder is created at most
/// once no matter how many chains pass through it. A refused creation skips
/// that folder and its descendants; an unreachable remote aborts.
pub async fn mirror<C: DirectoryClient>(
    client: &C,
    entries: &[FolderTreeEntry],
    destination_root_id: &str,
) -> Result<MirrorReport, MoveError> {
    let mut report = MirrorReport::default();
    let mut skipped = HashSet::new();

    for entry in entries {
        let chain = entry
            .folder_chain_by_id
            .iter()
            .zip(&entry.folder_chain_by_name);
        for (depth, (source_id, name)) in chain.enumerate() {
            if skipped.contains(source_id) {
                continue;
            }
            if let Some(existing) = report.destinations.get(source_id) {
                if existing.name != *name {
                    let diagnostic = Diagnostic::MirrorNameMismatch {
                        folder_id: source_id.clone(),
                        recorded: existing.name.clone(),
                        observed: name.clone(),
                    };
                    tracing::warn!("{diagnostic}");
                    report.diagnostics.push(diagnostic);
                }
                continue;
            }

            let parent_id = if depth == 0 {
                destination_root_id.to_string()
            } else {
                let source_parent = &entry.folder_chain_by_id[depth - 1];
                match report.destinations.get(source_parent) {
                    Some(parent) => parent.new_id.clone(),
                    None => {
                        let diagnostic = Diagnostic::MirrorParentMissing {
                            folder_id: source_id.clone(),
                            parent_id: source_parent.clone(),
                        };
                        report.skip(&mut skipped, source_id, diagnostic);
                        continue;
                    }
                }
            };

            match client.create_folder(name, &parent_id).await {
                Ok(new_id) => {
                    tracing::debug!(source = %source_id, new_id = %new_id, "folder mirrored");
                    report.destinations.insert(
                        source_id,
                        MirrorFolder {
                            new_id,
                            name: name.clone(),
                        },
                    );
                    report.created_count += 1;
                }
                Err(DirectoryError::Unavailable(message)) => {
                    return Err(MoveError::RemoteUnavailable(message));
                }
                Err(err) => {
                    let diagnostic = Diagnostic::MirrorCreateFailed {
                        folder_id: source_id.clone(),
                        name: name.clone(),
                        reason: err.to_string(),
                    };
                    report.skip(&mut skipped, source_id, diagnostic);
                }
            }
        }
    }

    tracing::info!(
        created = report.created_count,
        skipped = report.skipped_folder_ids.len(),
        "folder tree mirrored"
    );
    Ok(report)
}
