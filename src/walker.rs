//! Folder traversal over share and drive listings.

use tracing::{debug, info};

use crate::client::{QuarkClient, FOLDER_SORT};
use crate::error::Result;
use crate::models::{SharePageSession, ShareEntry};

/// Source of folder listings the walker expands.
#[allow(async_fn_in_trait)]
pub trait ListDirectory {
    /// All children of a folder, in listing order.
    async fn list_children(&self, pdir_fid: &str) -> Result<Vec<ShareEntry>>;
}

/// Lists folders inside a share.
pub struct ShareDirectoryLister<'a> {
    client: &'a QuarkClient,
    session: &'a SharePageSession,
}

impl<'a> ShareDirectoryLister<'a> {
    pub fn new(client: &'a QuarkClient, session: &'a SharePageSession) -> Self {
        Self { client, session }
    }
}

impl ListDirectory for ShareDirectoryLister<'_> {
    async fn list_children(&self, pdir_fid: &str) -> Result<Vec<ShareEntry>> {
        let detail = self.client.get_share_detail(self.session, pdir_fid).await?;
        Ok(detail.entries)
    }
}

/// Lists folders of the user's own drive, ordered by type then name.
pub struct DriveDirectoryLister<'a> {
    client: &'a QuarkClient,
}

impl<'a> DriveDirectoryLister<'a> {
    pub fn new(client: &'a QuarkClient) -> Self {
        Self { client }
    }
}

impl ListDirectory for DriveDirectoryLister<'_> {
    async fn list_children(&self, pdir_fid: &str) -> Result<Vec<ShareEntry>> {
        self.client.list_drive_dir(pdir_fid, FOLDER_SORT).await
    }
}

/// A file found by the walker, with the names of the folders above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub entry: ShareEntry,
    /// Folder names from the top-level folder down; empty for top-level files.
    pub folder_path: Vec<String>,
}

impl WalkedFile {
    /// Name of the top-level folder this file belongs to.
    pub fn top_folder(&self) -> Option<&str> {
        self.folder_path.first().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<WalkedFile>,
    /// Every folder visited, empty ones included.
    pub folders_count: usize,
}

/// Flatten `roots` into the files they contain.
///
/// Each top-level folder is expanded one level at a time until a level has no
/// subfolders left.
pub async fn expand<L: ListDirectory>(lister: &L, roots: &[ShareEntry]) -> Result<WalkResult> {
    let mut result = WalkResult::default();

    for root in roots {
        if !root.is_dir {
            result.files.push(WalkedFile {
                entry: root.clone(),
                folder_path: Vec::new(),
            });
            continue;
        }

        result.folders_count += 1;
        let mut level = vec![(root.fid.clone(), vec![root.file_name.clone()])];
        let mut depth = 1;

        while !level.is_empty() {
            debug!("Expanding {} folder(s) at depth {}", level.len(), depth);
            let mut next_level = Vec::new();

            for (fid, path) in level {
                for child in lister.list_children(&fid).await? {
                    if child.is_dir {
                        result.folders_count += 1;
                        let mut child_path = path.clone();
                        child_path.push(child.file_name.clone());
                        next_level.push((child.fid, child_path));
                    } else {
                        result.files.push(WalkedFile {
                            entry: child,
                            folder_path: path.clone(),
                        });
                    }
                }
            }

            level = next_level;
            depth += 1;
        }
    }

    info!(
        "Found {} file(s) in {} folder(s)",
        result.files.len(),
        result.folders_count
    );
    Ok(result)
}

/// Call `visit(parent_name, child)` for every folder one level below each
/// top-level folder in `roots`. Files at either level are skipped.
///
/// Returns the number of visited folders.
pub async fn for_each_directory<L, F>(lister: &L, roots: &[ShareEntry], mut visit: F) -> Result<usize>
where
    L: ListDirectory,
    F: FnMut(&str, &ShareEntry),
{
    let mut visited = 0;

    for parent in roots.iter().filter(|e| e.is_dir) {
        for child in lister.list_children(&parent.fid).await? {
            if child.is_dir {
                visit(&parent.file_name, &child);
                visited += 1;
            }
        }
    }

    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn node(fid: &str, name: &str, parent: &str, is_dir: bool) -> ShareEntry {
        ShareEntry {
            fid: fid.to_string(),
            file_name: name.to_string(),
            file_type: if is_dir { 0 } else { 1 },
            is_dir,
            parent_fid: parent.to_string(),
            item_count: None,
            share_fid_token: String::new(),
            status: 1,
            size: 1,
        }
    }

    #[derive(Default)]
    struct MemoryTree {
        children: HashMap<String, Vec<ShareEntry>>,
        listed: RefCell<Vec<String>>,
    }

    impl MemoryTree {
        fn add(&mut self, parent: &str, fid: &str, name: &str, is_dir: bool) -> ShareEntry {
            let entry = node(fid, name, parent, is_dir);
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(entry.clone());
            entry
        }
    }

    impl ListDirectory for MemoryTree {
        async fn list_children(&self, pdir_fid: &str) -> Result<Vec<ShareEntry>> {
            self.listed.borrow_mut().push(pdir_fid.to_string());
            Ok(self.children.get(pdir_fid).cloned().unwrap_or_default())
        }
    }

    /// root: A/{a1, B/{b1, C/{c1, c2}}}, D/ (empty), top.txt
    fn sample_tree() -> (MemoryTree, Vec<ShareEntry>) {
        let mut tree = MemoryTree::default();
        let a = tree.add("0", "A", "A", true);
        let d = tree.add("0", "D", "D", true);
        let top = tree.add("0", "top", "top.txt", false);
        tree.add("A", "a1", "a1.mkv", false);
        tree.add("A", "B", "B", true);
        tree.add("B", "b1", "b1.mkv", false);
        tree.add("B", "C", "C", true);
        tree.add("C", "c1", "c1.mkv", false);
        tree.add("C", "c2", "c2.mkv", false);
        (tree, vec![a, d, top])
    }

    #[tokio::test]
    async fn test_expand_collects_every_leaf_file() {
        let (tree, roots) = sample_tree();
        let result = expand(&tree, &roots).await.unwrap();

        let mut names: Vec<(String, Option<String>)> = result
            .files
            .iter()
            .map(|f| {
                (
                    f.entry.file_name.clone(),
                    f.top_folder().map(str::to_string),
                )
            })
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                ("a1.mkv".to_string(), Some("A".to_string())),
                ("b1.mkv".to_string(), Some("A".to_string())),
                ("c1.mkv".to_string(), Some("A".to_string())),
                ("c2.mkv".to_string(), Some("A".to_string())),
                ("top.txt".to_string(), None),
            ]
        );
        // A, B, C and the empty D
        assert_eq!(result.folders_count, 4);
    }

    #[tokio::test]
    async fn test_expand_records_full_folder_path() {
        let (tree, roots) = sample_tree();
        let result = expand(&tree, &roots).await.unwrap();
        let c1 = result
            .files
            .iter()
            .find(|f| f.entry.fid == "c1")
            .unwrap();
        assert_eq!(c1.folder_path, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_expand_lists_each_folder_once() {
        let (tree, roots) = sample_tree();
        expand(&tree, &roots).await.unwrap();
        let listed = tree.listed.borrow();
        assert_eq!(*listed, vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_for_each_directory_visits_second_level_only() {
        let (mut tree, _) = sample_tree();
        tree.add("D", "E", "E", true);
        let roots = tree.children.get("0").cloned().unwrap();

        let mut seen = Vec::new();
        let count = for_each_directory(&tree, &roots, |parent, child| {
            seen.push(format!("{}/{}", parent, child.file_name));
        })
        .await
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(seen, vec!["A/B", "D/E"]);
    }
}
