//! Snapshots a working directory into tree objects.

use crate::bootstrap::GIT_DIR;
use crate::Result;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use verz_storage::{ObjectId, ObjectStore, ObjectType, Tree, TreeEntry};

/// Stores every file under `root` (except `.git`) and returns the root
/// tree's id.
///
/// Directories with nothing to store are left out, as git does. Symlinks are
/// stored as links, never followed.
pub fn write_tree(store: &dyn ObjectStore, root: &Path) -> Result<ObjectId> {
    let tree = build_tree(store, root)?;
    let id = store.write(ObjectType::Tree, &tree.to_bytes())?;
    tracing::debug!(path = %root.display(), id = %id, entries = tree.entries.len(), "tree written");
    Ok(id)
}

fn build_tree(store: &dyn ObjectStore, dir: &Path) -> Result<Tree> {
    let mut tree = Tree::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == GIT_DIR {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;

        let (mode, id) = if file_type.is_dir() {
            let subtree = build_tree(store, &path)?;
            if subtree.entries.is_empty() {
                continue;
            }
            ("40000", store.write(ObjectType::Tree, &subtree.to_bytes())?)
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let target = name_bytes(target.as_os_str())?;
            ("120000", store.write(ObjectType::Blob, &target)?)
        } else {
            let content = fs::read(&path)?;
            let mode = if is_executable(&entry.metadata()?) {
                "100755"
            } else {
                "100644"
            };
            (mode, store.write(ObjectType::Blob, &content)?)
        };

        tracing::trace!(path = %path.display(), mode, id = %id, "stored entry");
        tree.entries.push(TreeEntry {
            mode: mode.to_string(),
            name: name_bytes(&name)?.into(),
            id,
        });
    }

    tree.sort();
    Ok(tree)
}

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(name.as_bytes().to_vec())
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Result<Vec<u8>> {
    name.to_str()
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| crate::GitError::Repository(format!("path {:?} is not valid unicode", name)))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
