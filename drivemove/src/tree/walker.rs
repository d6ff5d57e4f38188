use crate::directory::DirectoryClient;
use crate::error::MoveError;

use super::{FolderNode, SubtreeIndex};

/// Discovers every folder below `root_id`, depth-first, with an explicit
/// worklist instead of recursion.
pub async fn discover<C: DirectoryClient>(
    client: &C,
    root_id: &str,
) -> Result<SubtreeIndex, MoveError> {
    let root = client.get_metadata(root_id).await?;
    let mut index = SubtreeIndex::new(FolderNode {
        id: root.id.clone(),
        name: root.name,
        parent_id: root.parents.into_iter().next(),
        ancestry: vec![root.id.clone()],
    });
    let mut frontier = vec![root.id];
    while let Some(folder_id) = frontier.pop() {
        discover_step(client, &mut index, &mut frontier, &folder_id).await?;
    }
    tracing::info!(folders = index.len(), root = root_id, "subtree discovered");
    Ok(index)
}

/// Lists the subfolders of `folder_id`, records them and queues them for
/// their own listing. The index is the single writer of discovered state.
async fn discover_step<C: DirectoryClient>(
    client: &C,
    index: &mut SubtreeIndex,
    frontier: &mut Vec<String>,
    folder_id: &str,
) -> Result<(), MoveError> {
    let ancestry = index
        .get(folder_id)
        .map(|node| node.ancestry.clone())
        .ok_or_else(|| {
            MoveError::Inconsistency(format!("folder {folder_id} queued but never recorded"))
        })?;
    let children = client.list_children(folder_id, true).await?;
    let mut queued = Vec::with_capacity(children.len());
    for child in children.into_iter().filter(|child| child.is_folder) {
        let mut chain = ancestry.clone();
        chain.push(child.id.clone());
        index.insert(FolderNode {
            id: child.id.clone(),
            name: child.name,
            parent_id: Some(folder_id.to_string()),
            ancestry: chain,
        })?;
        queued.push(child.id);
    }
    // Reversed so the first listed child is walked first.
    frontier.extend(queued.into_iter().rev());
    Ok(())
}
