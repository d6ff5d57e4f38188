//! In-memory directory used by the engine's unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::directory::{
    ChildEntry, DirectoryClient, DirectoryError, FolderMetadata, MoveOperation, OperationResult,
};

#[derive(Debug, Clone)]
struct FakeItem {
    id: String,
    name: String,
    parents: Vec<String>,
    is_folder: bool,
    drive_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedFolder {
    pub name: String,
    pub parent_id: String,
    pub id: String,
}

#[derive(Default)]
struct Recorded {
    items: Vec<FakeItem>,
    folder_only_listings: Vec<String>,
    created: Vec<CreatedFolder>,
    reparents: Vec<(String, String)>,
    batches: Vec<Vec<MoveOperation>>,
}

#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<Recorded>,
    fail_create: HashSet<String>,
    fail_ops: HashSet<String>,
    failing_batches: HashSet<usize>,
    unavailable_listing: HashSet<String>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, id: &str, name: &str, parent: &str, is_folder: bool) -> Self {
        self.state.lock().unwrap().items.push(FakeItem {
            id: id.to_string(),
            name: name.to_string(),
            parents: vec![parent.to_string()],
            is_folder,
            drive_id: None,
        });
        self
    }

    pub fn folder(self, id: &str, name: &str, parent: &str) -> Self {
        self.push(id, name, parent, true)
    }

    pub fn file(self, id: &str, name: &str, parent: &str) -> Self {
        self.push(id, name, parent, false)
    }

    pub fn extra_parent(self, id: &str, parent: &str) -> Self {
        self.with_item(id, |item| item.parents.push(parent.to_string()))
    }

    pub fn shared(self, id: &str, drive_id: &str) -> Self {
        self.with_item(id, |item| item.drive_id = Some(drive_id.to_string()))
    }

    /// Folder creation for `name` is refused with `PermissionDenied`.
    pub fn fail_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    /// Batch sub-operations targeting `id` are refused.
    pub fn fail_operation(mut self, id: &str) -> Self {
        self.fail_ops.insert(id.to_string());
        self
    }

    /// The `n`th batch submission (0-based) fails as a whole with `Unavailable`.
    pub fn fail_batch(mut self, n: usize) -> Self {
        self.failing_batches.insert(n);
        self
    }

    pub fn unavailable_listing(mut self, id: &str) -> Self {
        self.unavailable_listing.insert(id.to_string());
        self
    }

    fn with_item(self, id: &str, apply: impl FnOnce(&mut FakeItem)) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let item = state
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .expect("item must be added first");
            apply(item);
        }
        self
    }

    pub fn created_folders(&self) -> Vec<CreatedFolder> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn folder_only_listings(&self) -> Vec<String> {
        self.state.lock().unwrap().folder_only_listings.clone()
    }

    pub fn reparents(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().reparents.clone()
    }

    pub fn batches(&self) -> Vec<Vec<MoveOperation>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn mutation_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.created.len() + state.reparents.len() + state.batches.len()
    }

    pub fn parents_of(&self, id: &str) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.parents.clone())
    }
}

impl DirectoryClient for FakeDirectory {
    async fn get_metadata(&self, id: &str) -> Result<FolderMetadata, DirectoryError> {
        let state = self.state.lock().unwrap();
        state
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| FolderMetadata {
                id: item.id.clone(),
                name: item.name.clone(),
                parents: item.parents.clone(),
                drive_id: item.drive_id.clone(),
            })
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    async fn list_children(
        &self,
        parent_id: &str,
        folders_only: bool,
    ) -> Result<Vec<ChildEntry>, DirectoryError> {
        if self.unavailable_listing.contains(parent_id) {
            return Err(DirectoryError::Unavailable(format!("listing {parent_id}")));
        }
        let mut state = self.state.lock().unwrap();
        if folders_only {
            state.folder_only_listings.push(parent_id.to_string());
        }
        Ok(state
            .items
            .iter()
            .filter(|item| item.parents.iter().any(|p| p == parent_id))
            .filter(|item| !folders_only || item.is_folder)
            .map(|item| ChildEntry {
                id: item.id.clone(),
                name: item.name.clone(),
                parents: item.parents.clone(),
                is_folder: item.is_folder,
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, DirectoryError> {
        if self.fail_create.contains(name) {
            return Err(DirectoryError::PermissionDenied(format!("create {name}")));
        }
        let mut state = self.state.lock().unwrap();
        let id = format!("mirror-{}", state.created.len() + 1);
        state.created.push(CreatedFolder {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            id: id.clone(),
        });
        state.items.push(FakeItem {
            id: id.clone(),
            name: name.to_string(),
            parents: vec![parent_id.to_string()],
            is_folder: true,
            drive_id: None,
        });
        Ok(id)
    }

    async fn reparent(
        &self,
        id: &str,
        new_parent_id: &str,
        _old_parent_ids: &[String],
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state
            .reparents
            .push((id.to_string(), new_parent_id.to_string()));
        if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
            item.parents = vec![new_parent_id.to_string()];
        }
        Ok(())
    }

    async fn submit_batch(
        &self,
        operations: &[MoveOperation],
    ) -> Result<Vec<OperationResult>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        let batch = state.batches.len();
        state.batches.push(operations.to_vec());
        if self.failing_batches.contains(&batch) {
            return Err(DirectoryError::Unavailable(format!("batch {batch}")));
        }
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            if self.fail_ops.contains(operation.target_id()) {
                results.push(Err(DirectoryError::PermissionDenied(
                    operation.target_id().to_string(),
                )));
                continue;
            }
            match operation {
                MoveOperation::Attach {
                    file_id,
                    new_parent_id,
                    old_parent_id,
                } => {
                    if let Some(item) = state.items.iter_mut().find(|item| &item.id == file_id) {
                        item.parents.retain(|p| p != old_parent_id);
                        item.parents.push(new_parent_id.clone());
                    }
                }
                MoveOperation::Detach { file_id, parent_id } => {
                    if let Some(item) = state.items.iter_mut().find(|item| &item.id == file_id) {
                        item.parents.retain(|p| p != parent_id);
                    }
                }
                MoveOperation::Delete { folder_id } => {
                    state.items.retain(|item| &item.id != folder_id);
                }
            }
            results.push(Ok(()));
        }
        Ok(results)
    }
}
