//! Top-level move: pick direct reparenting or the mirrored tree move, run it
//! and report per-item results.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::directory::{
    ChildEntry, DirectoryClient, DirectoryError, FolderMetadata, MoveOperation, OperationResult,
};
use crate::error::{Diagnostic, MoveError};
use crate::tree::{self, PlanResult, plan::with_ancestors};

pub const DEFAULT_LIST_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct MoveOptions {
    /// Skip shared-drive detection and always mirror the tree.
    pub force_tree_mirror: bool,
    /// Discover and plan only; nothing on the drive is modified.
    pub dry_run: bool,
    pub list_concurrency: usize,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            force_tree_mirror: false,
            dry_run: false,
            list_concurrency: DEFAULT_LIST_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    Direct,
    TreeMirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Done,
    NothingToMove,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStage {
    CheckingContext,
    DirectMove,
    TreeMirror,
    Submitted,
    Done,
    Failed,
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MoveStage::CheckingContext => "checking_context",
            MoveStage::DirectMove => "direct_move",
            MoveStage::TreeMirror => "tree_mirror",
            MoveStage::Submitted => "submitted",
            MoveStage::Done => "done",
            MoveStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub mode: MoveMode,
    pub status: MoveStatus,
    pub moved_file_count: usize,
    pub moved_file_ids: Vec<String>,
    pub recreated_folder_count: usize,
    pub deleted_folder_count: usize,
    /// Source folders whose mirror could not be created.
    pub skipped_folder_ids: Vec<String>,
    /// Source folders left in place because they still hold unmoved items.
    pub retained_folder_ids: Vec<String>,
    pub errors: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned_operations: Vec<MoveOperation>,
}

impl MoveOutcome {
    fn new(mode: MoveMode, status: MoveStatus) -> Self {
        Self {
            mode,
            status,
            moved_file_count: 0,
            moved_file_ids: Vec::new(),
            recreated_folder_count: 0,
            deleted_folder_count: 0,
            skipped_folder_ids: Vec::new(),
            retained_folder_ids: Vec::new(),
            errors: Vec::new(),
            planned_operations: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct FolderMover<C> {
    client: C,
    options: MoveOptions,
}

impl<C: DirectoryClient> FolderMover<C> {
    pub fn new(client: C, options: MoveOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Moves `source_id` with everything below it into `destination_id`.
    pub async fn move_folder(
        &self,
        source_id: &str,
        destination_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let result = self.run(source_id, destination_id).await;
        if let Err(err) = &result {
            tracing::error!(stage = %MoveStage::Failed, error = %err, "move aborted");
        }
        result
    }

    async fn run(&self, source_id: &str, destination_id: &str) -> Result<MoveOutcome, MoveError> {
        if source_id.trim().is_empty() || destination_id.trim().is_empty() {
            return Err(MoveError::InvalidInput(
                "source and destination folder ids are required".into(),
            ));
        }
        if source_id == destination_id {
            return Err(MoveError::InvalidInput(
                "source and destination are the same folder".into(),
            ));
        }

        tracing::info!(stage = %MoveStage::CheckingContext, source_id, destination_id);
        let source = self.client.get_metadata(source_id).await?;
        let destination = self.client.get_metadata(destination_id).await?;
        let shared = source.drive_id.is_some() || destination.drive_id.is_some();

        if !shared && !self.options.force_tree_mirror {
            return self.direct_move(&source, destination_id).await;
        }
        self.tree_mirror(source_id, destination_id).await
    }

    async fn direct_move(
        &self,
        source: &FolderMetadata,
        destination_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        tracing::info!(stage = %MoveStage::DirectMove, "neither folder is in a shared drive");
        if self.options.dry_run {
            return Ok(MoveOutcome::new(MoveMode::Direct, MoveStatus::DryRun));
        }
        self.client
            .reparent(&source.id, destination_id, &source.parents)
            .await?;
        tracing::info!(stage = %MoveStage::Done, "folder reparented");
        Ok(MoveOutcome::new(MoveMode::Direct, MoveStatus::Done))
    }

    async fn tree_mirror(
        &self,
        source_id: &str,
        destination_id: &str,
    ) -> Result<MoveOutcome, MoveError> {
        tracing::info!(stage = %MoveStage::TreeMirror, "moving by recreating the folder tree");
        let index = tree::discover(&self.client, source_id).await?;
        if index.contains(destination_id) {
            return Err(MoveError::InvalidInput(format!(
                "destination {destination_id} is inside the source folder"
            )));
        }
        let entries =
            tree::collect_files(&self.client, &index, self.options.list_concurrency).await?;

        if tree::movable_file_count(&entries) == 0 {
            tracing::warn!("source folder holds no files");
            return Ok(MoveOutcome::new(
                MoveMode::TreeMirror,
                MoveStatus::NothingToMove,
            ));
        }

        let report = if self.options.dry_run {
            tree::mirror(&DryRunDirectory::new(&self.client), &entries, destination_id).await?
        } else {
            tree::mirror(&self.client, &entries, destination_id).await?
        };

        let mut outcome = MoveOutcome::new(MoveMode::TreeMirror, MoveStatus::Done);
        outcome.recreated_folder_count = report.created_count;
        outcome.skipped_folder_ids = report.skipped_folder_ids;
        outcome.errors = report.diagnostics;

        let plan = match tree::build_plan(&entries, &report.destinations) {
            PlanResult::Ready(plan) => plan,
            PlanResult::NothingToMove { diagnostics } => {
                outcome.status = MoveStatus::NothingToMove;
                outcome.errors.extend(diagnostics);
                return Ok(outcome);
            }
        };
        outcome.errors.extend(plan.diagnostics.iter().cloned());
        outcome.retained_folder_ids = plan.retained_folder_ids.clone();
        if outcome.errors.iter().any(Diagnostic::is_partial_mirror_failure) {
            tracing::warn!(
                skipped = outcome.skipped_folder_ids.len(),
                "folder tree only partly mirrored; unmirrored files stay in place"
            );
        }

        if self.options.dry_run {
            outcome.status = MoveStatus::DryRun;
            outcome.planned_operations = plan.into_operations();
            return Ok(outcome);
        }

        let attach = plan.attach_operations();
        tracing::info!(count = attach.len(), "attaching files to mirrored folders");
        let results = self.submit(attach).await;
        let mut failed_folders = HashSet::new();
        for (operation, result) in attach.iter().zip(results) {
            match (operation, result) {
                (MoveOperation::Attach { file_id, .. }, Ok(())) => {
                    outcome.moved_file_ids.push(file_id.clone());
                }
                (MoveOperation::Attach { old_parent_id, .. }, Err(err)) => {
                    failed_folders.insert(old_parent_id.as_str());
                    record_failure(&mut outcome, operation, &err);
                }
                (_, result) => {
                    if let Err(err) = result {
                        record_failure(&mut outcome, operation, &err);
                    }
                }
            }
        }
        outcome.moved_file_count = outcome.moved_file_ids.len();

        let withheld = with_ancestors(&entries, failed_folders);
        let mut deletes = Vec::new();
        for operation in plan.delete_operations() {
            let folder_id = operation.target_id();
            if withheld.contains(folder_id) {
                let diagnostic = Diagnostic::DeleteWithheld {
                    folder_id: folder_id.to_string(),
                };
                tracing::warn!("{diagnostic}");
                outcome.errors.push(diagnostic);
                outcome.retained_folder_ids.push(folder_id.to_string());
            } else {
                deletes.push(operation.clone());
            }
        }

        if !deletes.is_empty() {
            tracing::info!(count = deletes.len(), "deleting emptied source folders");
            let results = self.submit(&deletes).await;
            for (operation, result) in deletes.iter().zip(results) {
                match result {
                    Ok(()) => outcome.deleted_folder_count += 1,
                    Err(err) => {
                        record_failure(&mut outcome, operation, &err);
                        outcome
                            .retained_folder_ids
                            .push(operation.target_id().to_string());
                    }
                }
            }
        }

        tracing::info!(
            stage = %MoveStage::Submitted,
            moved = outcome.moved_file_count,
            deleted = outcome.deleted_folder_count,
            errors = outcome.errors.len(),
            "batch submitted"
        );
        tracing::info!(stage = %MoveStage::Done, "tree move finished");
        Ok(outcome)
    }

    /// One result per operation even when the submission fails outright, so
    /// the outcome still accounts for every operation.
    async fn submit(&self, operations: &[MoveOperation]) -> Vec<OperationResult> {
        let mut results = match self.client.submit_batch(operations).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(count = operations.len(), error = %err, "batch submission failed");
                vec![Err(err); operations.len()]
            }
        };
        results.resize(
            operations.len(),
            Err(DirectoryError::Rejected("no result returned".into())),
        );
        results
    }
}

/// One-shot form of [`FolderMover::move_folder`].
pub async fn move_folder<C: DirectoryClient>(
    client: C,
    source_id: &str,
    destination_id: &str,
    options: MoveOptions,
) -> Result<MoveOutcome, MoveError> {
    FolderMover::new(client, options)
        .move_folder(source_id, destination_id)
        .await
}

fn record_failure(outcome: &mut MoveOutcome, operation: &MoveOperation, err: &DirectoryError) {
    let diagnostic = Diagnostic::OperationFailed {
        operation: operation.clone(),
        reason: err.to_string(),
    };
    tracing::warn!("{diagnostic}");
    outcome.errors.push(diagnostic);
}

/// Read-through view of a directory that fakes folder creation and refuses
/// every other mutation.
struct DryRunDirectory<'a, C> {
    inner: &'a C,
    created: AtomicUsize,
}

impl<'a, C> DryRunDirectory<'a, C> {
    fn new(inner: &'a C) -> Self {
        Self {
            inner,
            created: AtomicUsize::new(0),
        }
    }
}

impl<C: DirectoryClient> DirectoryClient for DryRunDirectory<'_, C> {
    async fn get_metadata(&self, id: &str) -> Result<FolderMetadata, DirectoryError> {
        self.inner.get_metadata(id).await
    }

    async fn list_children(
        &self,
        parent_id: &str,
        folders_only: bool,
    ) -> Result<Vec<ChildEntry>, DirectoryError> {
        self.inner.list_children(parent_id, folders_only).await
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DirectoryError> {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(name, parent_id, "dry run: would create folder");
        Ok(format!("dry-run-folder-{n}"))
    }

    async fn reparent(
        &self,
        _id: &str,
        _new_parent_id: &str,
        _old_parent_ids: &[String],
    ) -> Result<(), DirectoryError> {
        Err(DirectoryError::Rejected("dry run does not modify the drive".into()))
    }

    async fn submit_batch(
        &self,
        _operations: &[MoveOperation],
    ) -> Result<Vec<OperationResult>, DirectoryError> {
        Err(DirectoryError::Rejected("dry run does not modify the drive".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDirectory;

    fn tree_options() -> MoveOptions {
        MoveOptions {
            force_tree_mirror: true,
            ..MoveOptions::default()
        }
    }

    fn attach_ops(batch: &[MoveOperation]) -> usize {
        batch
            .iter()
            .filter(|op| matches!(op, MoveOperation::Attach { .. }))
            .count()
    }

    #[tokio::test]
    async fn outside_shared_drives_a_single_reparent_is_issued() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "B")
            .folder("D", "Dest", "Q");
        let mover = FolderMover::new(drive, MoveOptions::default());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.mode, MoveMode::Direct);
        assert_eq!(outcome.status, MoveStatus::Done);
        let drive = mover.client();
        assert_eq!(drive.reparents(), vec![("A".to_string(), "D".to_string())]);
        assert!(drive.folder_only_listings().is_empty());
        assert!(drive.batches().is_empty());
        assert!(drive.created_folders().is_empty());
    }

    #[tokio::test]
    async fn shared_drive_source_moves_by_mirroring() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "B")
            .folder("D", "Dest", "Q")
            .shared("A", "team-1");
        let mover = FolderMover::new(drive, MoveOptions::default());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.mode, MoveMode::TreeMirror);
        assert_eq!(outcome.status, MoveStatus::Done);
        assert_eq!(outcome.moved_file_count, 1);
        assert_eq!(outcome.moved_file_ids, vec!["F1"]);
        assert_eq!(outcome.recreated_folder_count, 2);
        assert_eq!(outcome.deleted_folder_count, 2);
        assert!(outcome.skipped_folder_ids.is_empty());
        assert!(outcome.errors.is_empty());

        let drive = mover.client();
        let created = drive.created_folders();
        assert_eq!(created[0].name, "Root");
        assert_eq!(created[0].parent_id, "D");
        assert_eq!(created[1].name, "Child");
        assert_eq!(created[1].parent_id, created[0].id);
        assert_eq!(drive.parents_of("F1"), Some(vec![created[1].id.clone()]));

        let batches = drive.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(attach_ops(&batches[0]), 1);
        assert_eq!(
            batches[1],
            vec![
                MoveOperation::Delete {
                    folder_id: "B".into()
                },
                MoveOperation::Delete {
                    folder_id: "A".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn shared_destination_also_triggers_mirroring() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .file("F1", "one.txt", "A")
            .folder("D", "Dest", "Q")
            .shared("D", "team-2");
        let mover = FolderMover::new(drive, MoveOptions::default());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.mode, MoveMode::TreeMirror);
        assert_eq!(outcome.moved_file_count, 1);
        assert!(mover.client().reparents().is_empty());
    }

    #[tokio::test]
    async fn failed_mirror_keeps_files_and_their_ancestors() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Locked", "A")
            .folder("C", "Open", "A")
            .file("F1", "one.txt", "B")
            .file("F2", "two.txt", "C")
            .folder("D", "Dest", "Q")
            .fail_create("Locked");
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.moved_file_ids, vec!["F2"]);
        assert_eq!(outcome.skipped_folder_ids, vec!["B"]);
        assert_eq!(outcome.recreated_folder_count, 2);
        assert!(outcome.errors.contains(&Diagnostic::FilesWithoutMirror {
            folder_id: "B".into(),
            file_ids: vec!["F1".into()],
        }));
        assert!(outcome.errors.iter().any(|e| matches!(
            e,
            Diagnostic::MirrorCreateFailed { folder_id, .. } if folder_id == "B"
        )));
        assert_eq!(outcome.retained_folder_ids, vec!["A", "B"]);
        assert_eq!(outcome.deleted_folder_count, 1);
        assert_eq!(mover.client().parents_of("F1"), Some(vec!["B".to_string()]));
    }

    #[tokio::test]
    async fn failed_attach_withholds_folder_deletes() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .folder("C", "Other", "A")
            .file("F1", "one.txt", "B")
            .file("F2", "two.txt", "C")
            .folder("D", "Dest", "Q")
            .fail_operation("F1");
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.moved_file_ids, vec!["F2"]);
        assert_eq!(outcome.deleted_folder_count, 1);
        assert!(outcome.retained_folder_ids.contains(&"A".to_string()));
        assert!(outcome.retained_folder_ids.contains(&"B".to_string()));
        assert!(outcome.errors.iter().any(|e| matches!(
            e,
            Diagnostic::OperationFailed {
                operation: MoveOperation::Attach { file_id, .. },
                ..
            } if file_id == "F1"
        )));
        let batches = mover.client().batches();
        assert_eq!(
            batches[1],
            vec![MoveOperation::Delete {
                folder_id: "C".into()
            }]
        );
    }

    #[tokio::test]
    async fn failed_delete_submission_still_reports_moved_files() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "B")
            .folder("D", "Dest", "Q")
            .fail_batch(1);
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.status, MoveStatus::Done);
        assert_eq!(outcome.moved_file_ids, vec!["F1"]);
        assert_eq!(outcome.recreated_folder_count, 2);
        assert_eq!(outcome.deleted_folder_count, 0);
        assert_eq!(outcome.retained_folder_ids, vec!["B", "A"]);
        let failed_deletes = outcome
            .errors
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Diagnostic::OperationFailed {
                        operation: MoveOperation::Delete { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(failed_deletes, 2);
        let created = mover.client().created_folders();
        assert_eq!(
            mover.client().parents_of("F1"),
            Some(vec![created[1].id.clone()])
        );
    }

    #[tokio::test]
    async fn failed_attach_submission_withholds_every_delete() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "B")
            .file("F2", "two.txt", "A")
            .folder("D", "Dest", "Q")
            .fail_batch(0);
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert!(outcome.moved_file_ids.is_empty());
        assert_eq!(outcome.recreated_folder_count, 2);
        assert_eq!(outcome.deleted_folder_count, 0);
        assert!(outcome.retained_folder_ids.contains(&"A".to_string()));
        assert!(outcome.retained_folder_ids.contains(&"B".to_string()));
        let failed_attaches: Vec<&str> = outcome
            .errors
            .iter()
            .filter_map(|e| match e {
                Diagnostic::OperationFailed {
                    operation: MoveOperation::Attach { file_id, .. },
                    ..
                } => Some(file_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failed_attaches.len(), 2);
        assert!(failed_attaches.contains(&"F1") && failed_attaches.contains(&"F2"));
        assert_eq!(mover.client().batches().len(), 1);
        assert_eq!(mover.client().parents_of("F1"), Some(vec!["B".to_string()]));
    }

    #[tokio::test]
    async fn empty_source_is_nothing_to_move_without_mutations() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Empty", "A")
            .folder("D", "Dest", "Q");
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.status, MoveStatus::NothingToMove);
        assert_eq!(mover.client().mutation_count(), 0);
    }

    #[tokio::test]
    async fn nothing_to_move_when_every_mirror_fails() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .file("F1", "one.txt", "A")
            .folder("D", "Dest", "Q")
            .fail_create("Root");
        let mover = FolderMover::new(drive, tree_options());

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.status, MoveStatus::NothingToMove);
        assert!(mover.client().batches().is_empty());
        assert!(outcome.errors.iter().any(Diagnostic::is_partial_mirror_failure));
    }

    #[tokio::test]
    async fn dry_run_plans_without_touching_the_drive() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "B")
            .folder("D", "Dest", "Q");
        let mover = FolderMover::new(
            drive,
            MoveOptions {
                dry_run: true,
                ..tree_options()
            },
        );

        let outcome = mover.move_folder("A", "D").await.unwrap();

        assert_eq!(outcome.status, MoveStatus::DryRun);
        assert_eq!(outcome.recreated_folder_count, 2);
        assert_eq!(outcome.planned_operations.len(), 3);
        assert_eq!(outcome.moved_file_count, 0);
        assert_eq!(mover.client().mutation_count(), 0);
    }

    #[tokio::test]
    async fn rejects_missing_or_identical_ids() {
        let mover = FolderMover::new(FakeDirectory::new(), MoveOptions::default());

        assert!(matches!(
            mover.move_folder("", "D").await,
            Err(MoveError::InvalidInput(_))
        ));
        assert!(matches!(
            mover.move_folder("A", "A").await,
            Err(MoveError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn rejects_destination_inside_source() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .file("F1", "one.txt", "A");
        let mover = FolderMover::new(drive, tree_options());

        let err = mover.move_folder("A", "B").await.unwrap_err();

        assert!(matches!(err, MoveError::InvalidInput(_)));
        assert_eq!(mover.client().mutation_count(), 0);
    }

    #[tokio::test]
    async fn missing_source_aborts() {
        let drive = FakeDirectory::new().folder("D", "Dest", "Q");
        let mover = FolderMover::new(drive, MoveOptions::default());

        let err = mover.move_folder("nope", "D").await.unwrap_err();

        assert_eq!(
            err,
            MoveError::Remote(DirectoryError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn unavailable_listing_aborts_tree_move() {
        let drive = FakeDirectory::new()
            .folder("A", "Root", "P")
            .folder("B", "Child", "A")
            .folder("D", "Dest", "Q")
            .unavailable_listing("B");
        let mover = FolderMover::new(drive, tree_options());

        let err = mover.move_folder("A", "D").await.unwrap_err();

        assert!(matches!(err, MoveError::RemoteUnavailable(_)));
        assert_eq!(mover.client().mutation_count(), 0);
    }
}
