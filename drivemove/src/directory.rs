//! Capability interface the move engine runs against, plus its Google Drive
//! implementation.

use drivemove_core::{
    ApiErrorClass, BatchRequest, BatchResponse, DriveClient, DriveError, MAX_BATCH_REQUESTS,
    children_query,
};
use serde::Serialize;
use thiserror::Error;

const METADATA_FIELDS: &[&str] = &["id", "name", "parents", "driveId"];
const CHILD_FIELDS: &[&str] = &["id", "name", "mimeType", "parents"];
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("rejected by remote: {0}")]
    Rejected(String),
}

impl DirectoryError {
    fn from_class(class: ApiErrorClass, message: String) -> Self {
        match class {
            ApiErrorClass::NotFound => DirectoryError::NotFound(message),
            ApiErrorClass::Auth => DirectoryError::PermissionDenied(message),
            ApiErrorClass::Quota => DirectoryError::QuotaExceeded(message),
            ApiErrorClass::RateLimit | ApiErrorClass::Transient => {
                DirectoryError::Unavailable(message)
            }
            ApiErrorClass::Permanent => DirectoryError::Rejected(message),
        }
    }
}

impl From<DriveError> for DirectoryError {
    fn from(err: DriveError) -> Self {
        let message = err.to_string();
        match err.classification() {
            Some(class) => DirectoryError::from_class(class, message),
            None => match err {
                DriveError::Request(_) | DriveError::MalformedBatch(_) => {
                    DirectoryError::Unavailable(message)
                }
                _ => DirectoryError::Rejected(message),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMetadata {
    pub id: String,
    pub name: String,
    pub parents: Vec<String>,
    /// Set when the item lives in a shared drive.
    pub drive_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub id: String,
    pub name: String,
    pub parents: Vec<String>,
    pub is_folder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MoveOperation {
    /// Add `new_parent_id` and drop `old_parent_id` in one update.
    Attach {
        file_id: String,
        new_parent_id: String,
        old_parent_id: String,
    },
    Detach {
        file_id: String,
        parent_id: String,
    },
    Delete {
        folder_id: String,
    },
}

impl MoveOperation {
    pub fn target_id(&self) -> &str {
        match self {
            MoveOperation::Attach { file_id, .. } | MoveOperation::Detach { file_id, .. } => {
                file_id
            }
            MoveOperation::Delete { folder_id } => folder_id,
        }
    }
}

pub type OperationResult = Result<(), DirectoryError>;

#[allow(async_fn_in_trait)]
pub trait DirectoryClient {
    async fn get_metadata(&self, id: &str) -> Result<FolderMetadata, DirectoryError>;

    /// Every non-trashed child of `parent_id`, across all pages. An empty
    /// folder yields an empty vec.
    async fn list_children(
        &self,
        parent_id: &str,
        folders_only: bool,
    ) -> Result<Vec<ChildEntry>, DirectoryError>;

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DirectoryError>;

    /// Atomic reparent, only valid outside shared drives.
    async fn reparent(
        &self,
        id: &str,
        new_parent_id: &str,
        old_parent_ids: &[String],
    ) -> Result<(), DirectoryError>;

    /// Submits independent sub-operations and reports one result per
    /// operation, in input order. A transport failure that hits part of the
    /// submission fails only the operations it covered; the outer error is
    /// for problems found before anything is sent.
    async fn submit_batch(
        &self,
        operations: &[MoveOperation],
    ) -> Result<Vec<OperationResult>, DirectoryError>;
}

#[derive(Clone)]
pub struct DriveDirectory {
    client: DriveClient,
    page_size: u32,
}

impl DriveDirectory {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn batch_request(&self, operation: &MoveOperation) -> Result<BatchRequest, DriveError> {
        match operation {
            MoveOperation::Attach {
                file_id,
                new_parent_id,
                old_parent_id,
            } => self.client.update_parents_request(
                file_id,
                &[new_parent_id.as_str()],
                &[old_parent_id.as_str()],
            ),
            MoveOperation::Detach { file_id, parent_id } => {
                self.client
                    .update_parents_request(file_id, &[], &[parent_id.as_str()])
            }
            MoveOperation::Delete { folder_id } => self.client.delete_request(folder_id),
        }
    }
}

impl DirectoryClient for DriveDirectory {
    async fn get_metadata(&self, id: &str) -> Result<FolderMetadata, DirectoryError> {
        tracing::debug!(id, "fetching metadata");
        let file = self.client.get_file(id, Some(METADATA_FIELDS)).await?;
        Ok(FolderMetadata {
            id: file.id,
            name: file.name,
            parents: file.parents,
            drive_id: file.drive_id,
        })
    }

    async fn list_children(
        &self,
        parent_id: &str,
        folders_only: bool,
    ) -> Result<Vec<ChildEntry>, DirectoryError> {
        tracing::debug!(parent_id, folders_only, "listing children");
        let q = children_query(parent_id, folders_only);
        let files = self
            .client
            .list_files_all(&q, self.page_size, Some(CHILD_FIELDS))
            .await?;
        Ok(files
            .into_iter()
            .map(|file| ChildEntry {
                is_folder: file.is_folder(),
                id: file.id,
                name: file.name,
                parents: file.parents,
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DirectoryError> {
        tracing::debug!(name, parent_id, "creating folder");
        let folder = self.client.create_folder(name, parent_id).await?;
        Ok(folder.id)
    }

    async fn reparent(
        &self,
        id: &str,
        new_parent_id: &str,
        old_parent_ids: &[String],
    ) -> Result<(), DirectoryError> {
        let remove: Vec<&str> = old_parent_ids
            .iter()
            .map(String::as_str)
            .filter(|parent| *parent != new_parent_id)
            .collect();
        self.client
            .update_parents(id, &[new_parent_id], &remove)
            .await?;
        Ok(())
    }

    async fn submit_batch(
        &self,
        operations: &[MoveOperation],
    ) -> Result<Vec<OperationResult>, DirectoryError> {
        let requests = operations
            .iter()
            .map(|op| self.batch_request(op))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = requests.len(), "submitting batch");
        let chunks = self.client.execute_batch(&requests).await;
        let mut results = Vec::with_capacity(operations.len());
        for (sent, chunk) in operations.chunks(MAX_BATCH_REQUESTS).zip(chunks) {
            match chunk {
                Ok(responses) => results.extend(
                    sent.iter()
                        .zip(responses)
                        .map(|(operation, response)| operation_result(operation, response)),
                ),
                Err(err) => {
                    let err = DirectoryError::from(err);
                    tracing::warn!(count = sent.len(), error = %err, "batch chunk failed");
                    results.extend(sent.iter().map(|_| Err(err.clone())));
                }
            }
        }
        Ok(results)
    }
}

fn operation_result(operation: &MoveOperation, response: BatchResponse) -> OperationResult {
    if response.is_success() {
        return Ok(());
    }
    let class = ApiErrorClass::from_status(response.status, &response.body);
    // Deleting an ancestor already removed its descendants.
    if class == ApiErrorClass::NotFound && matches!(operation, MoveOperation::Delete { .. }) {
        return Ok(());
    }
    Err(DirectoryError::from_class(
        class,
        format!("{} {}", response.status, response.body),
    ))
}
