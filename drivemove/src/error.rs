use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::directory::{DirectoryError, MoveOperation};

/// Failures that abort a move.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote error: {0}")]
    Remote(DirectoryError),
    #[error("inconsistent folder tree: {0}")]
    Inconsistency(String),
}

impl From<DirectoryError> for MoveError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(message) => MoveError::RemoteUnavailable(message),
            other => MoveError::Remote(other),
        }
    }
}

/// Problems recorded while planning or submitting; the affected branch is
/// skipped and the rest of the move continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MirrorCreateFailed {
        folder_id: String,
        name: String,
        reason: String,
    },
    MirrorParentMissing {
        folder_id: String,
        parent_id: String,
    },
    MirrorNameMismatch {
        folder_id: String,
        recorded: String,
        observed: String,
    },
    FilesWithoutMirror {
        folder_id: String,
        file_ids: Vec<String>,
    },
    OperationFailed {
        operation: MoveOperation,
        reason: String,
    },
    DeleteWithheld {
        folder_id: String,
    },
}

impl Diagnostic {
    /// True for diagnostics caused by a folder creation that did not happen.
    pub fn is_partial_mirror_failure(&self) -> bool {
        matches!(
            self,
            Diagnostic::MirrorCreateFailed { .. } | Diagnostic::FilesWithoutMirror { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MirrorCreateFailed {
                folder_id,
                name,
                reason,
            } => write!(f, "could not mirror folder {folder_id} ({name}): {reason}"),
            Diagnostic::MirrorParentMissing {
                folder_id,
                parent_id,
            } => write!(
                f,
                "folder {folder_id} not mirrored: parent {parent_id} has no mirror"
            ),
            Diagnostic::MirrorNameMismatch {
                folder_id,
                recorded,
                observed,
            } => write!(
                f,
                "folder {folder_id} already mirrored as {recorded:?} but seen as {observed:?}"
            ),
            Diagnostic::FilesWithoutMirror { folder_id, file_ids } => write!(
                f,
                "{} file(s) in {folder_id} left in place: folder has no mirror",
                file_ids.len()
            ),
            Diagnostic::OperationFailed { operation, reason } => {
                write!(f, "operation on {} failed: {reason}", operation.target_id())
            }
            Diagnostic::DeleteWithheld { folder_id } => write!(
                f,
                "folder {folder_id} kept: it still holds items that were not moved"
            ),
        }
    }
}
