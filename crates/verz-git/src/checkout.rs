//! Materialises a commit's tree into a working directory.

use crate::{GitError, Result};
use bstr::ByteSlice;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::Path;
use verz_storage::{commit_tree_id, EntryKind, ObjectId, ObjectStore, ObjectType, Tree};

/// Writes the tree of `commit` under `root` and returns the number of files
/// written.
///
/// Gitlinks are skipped; symlinks become real links on unix and plain files
/// holding the target elsewhere.
pub fn checkout_commit(store: &dyn ObjectStore, commit: &ObjectId, root: &Path) -> Result<usize> {
    let object = store.read(commit)?;
    if object.object_type != ObjectType::Commit {
        return Err(GitError::Repository(format!(
            "{} is a {}, not a commit",
            commit, object.object_type
        )));
    }
    let tree = commit_tree_id(&object.data)?;

    let written = write_tree(store, &tree, root)?;
    tracing::info!(commit = %commit, files = written, "checked out");
    Ok(written)
}

fn write_tree(store: &dyn ObjectStore, id: &ObjectId, dir: &Path) -> Result<usize> {
    let object = store.read(id)?;
    if object.object_type != ObjectType::Tree {
        return Err(GitError::Repository(format!(
            "{} is a {}, not a tree",
            id, object.object_type
        )));
    }

    let mut written = 0;
    for entry in Tree::parse(&object.data)?.entries {
        check_entry_name(&entry.name)?;
        let path = dir.join(file_name(&entry.name)?);
        ensure_vacant(&path)?;

        match entry.kind()? {
            EntryKind::Directory => {
                fs::create_dir(&path)?;
                written += write_tree(store, &entry.id, &path)?;
            }
            EntryKind::File => {
                write_new(&path, &read_blob(store, &entry.id)?)?;
                written += 1;
            }
            EntryKind::Executable => {
                write_new(&path, &read_blob(store, &entry.id)?)?;
                set_executable(&path)?;
                written += 1;
            }
            EntryKind::Symlink => {
                write_symlink(&read_blob(store, &entry.id)?, &path)?;
                written += 1;
            }
            EntryKind::Submodule => {
                tracing::debug!(path = %path.display(), "skipping submodule");
            }
        }
        tracing::trace!(path = %path.display(), id = %entry.id, "checked out entry");
    }
    Ok(written)
}

fn read_blob(store: &dyn ObjectStore, id: &ObjectId) -> Result<bytes::Bytes> {
    let object = store.read(id)?;
    if object.object_type != ObjectType::Blob {
        return Err(GitError::Repository(format!(
            "{} is a {}, not a blob",
            id, object.object_type
        )));
    }
    Ok(object.data)
}

/// Rejects names that would escape the directory or touch `.git`.
fn check_entry_name(name: &[u8]) -> Result<()> {
    if name.is_empty()
        || name == b"."
        || name == b".."
        || name.contains(&b'/')
        || name.contains(&b'\\')
        || name.eq_ignore_ascii_case(b".git")
    {
        return Err(GitError::Repository(format!(
            "refusing to check out path {:?}",
            name.as_bstr()
        )));
    }
    Ok(())
}

/// Every path is written exactly once. Anything already there, including a
/// symlink laid down earlier in the same checkout, would redirect the write.
fn ensure_vacant(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(GitError::Repository(format!(
            "refusing to overwrite {}",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_new(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(content)?;
    Ok(())
}

#[cfg(unix)]
fn file_name(name: &[u8]) -> Result<&OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn file_name(name: &[u8]) -> Result<&OsStr> {
    name.to_str().map(OsStr::new).map_err(|_| {
        GitError::Repository(format!(
            "path {:?} is not representable on this platform",
            name.as_bstr()
        ))
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(std::ffi::OsStr::from_bytes(target), path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    write_new(path, target)
}
