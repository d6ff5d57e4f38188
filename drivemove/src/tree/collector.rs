use futures_util::{StreamExt, TryStreamExt, stream};

use crate::directory::DirectoryClient;
use crate::error::MoveError;

use super::{FolderNode, FolderTreeEntry, SubtreeIndex};

/// Lists the immediate children of every folder in `index`, root included.
/// Up to `concurrency` listings run at once; entries keep the index order.
pub async fn collect_files<C: DirectoryClient>(
    client: &C,
    index: &SubtreeIndex,
    concurrency: usize,
) -> Result<Vec<FolderTreeEntry>, MoveError> {
    let entries: Vec<FolderTreeEntry> = stream::iter(index.nodes())
        .map(|node| collect_folder(client, index, node))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    let children: usize = entries.iter().map(|e| e.files_in_folder.len()).sum();
    tracing::info!(folders = entries.len(), children, "folder contents collected");
    Ok(entries)
}

async fn collect_folder<C: DirectoryClient>(
    client: &C,
    index: &SubtreeIndex,
    node: &FolderNode,
) -> Result<FolderTreeEntry, MoveError> {
    let folder_chain_by_name = node
        .ancestry
        .iter()
        .map(|id| {
            index.get(id).map(|n| n.name.clone()).ok_or_else(|| {
                MoveError::Inconsistency(format!("ancestor {id} of {} is not indexed", node.id))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let files_in_folder = client.list_children(&node.id, false).await?;
    Ok(FolderTreeEntry {
        folder_chain_by_id: node.ancestry.clone(),
        folder_chain_by_name,
        files_in_folder,
    })
}
