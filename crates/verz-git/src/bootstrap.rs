//! Repository skeleton and ref seeding.

use crate::discovery::{resolve_head, RefMap};
use crate::{GitError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use verz_storage::{ObjectId, RefStore};

/// Name of the repository metadata directory.
pub const GIT_DIR: &str = ".git";

/// Branch HEAD points at in a freshly initialised empty repository.
pub const INITIAL_BRANCH: &str = "refs/heads/main";

/// Fails if `root` already holds a repository.
pub fn ensure_absent(root: &Path) -> Result<()> {
    let git_dir = root.join(GIT_DIR);
    if git_dir.exists() {
        return Err(GitError::Repository(format!(
            "{} already exists",
            git_dir.display()
        )));
    }
    Ok(())
}

/// Creates `<root>/.git/{objects,refs/heads}` and returns the `.git` path.
///
/// HEAD is not written here; a skeleton without HEAD is not a repository.
pub fn create_skeleton(root: &Path) -> Result<PathBuf> {
    ensure_absent(root)?;
    let git_dir = root.join(GIT_DIR);
    fs::create_dir_all(git_dir.join("objects"))?;
    fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    tracing::debug!(path = %git_dir.display(), "created repository skeleton");
    Ok(git_dir)
}

/// Points the default branch and HEAD at the remote's state.
///
/// The branch ref is written before HEAD so that HEAD never dangles.
/// Returns the branch name and the commit it points at.
pub fn write_refs(git_dir: &Path, refs: &RefMap) -> Result<(String, ObjectId)> {
    let branch = resolve_head(refs)?;
    let id = refs
        .get(&branch)
        .ok_or_else(|| GitError::Repository(format!("{} not advertised", branch)))?;

    let store = RefStore::new(git_dir);
    store.set(&branch, id)?;
    store.set_symbolic("HEAD", &branch)?;

    tracing::debug!(branch = %branch, id = %id, "refs written");
    Ok((branch, id))
}

/// Creates the skeleton and seeds HEAD and the default branch.
///
/// Returns the commit HEAD resolves to.
pub fn initialise(root: &Path, refs: &RefMap) -> Result<ObjectId> {
    resolve_head(refs)?;
    let git_dir = create_skeleton(root)?;
    let (_, id) = write_refs(&git_dir, refs)?;
    Ok(id)
}

/// Creates an empty repository whose HEAD names an unborn `main` branch.
pub fn init_empty(root: &Path) -> Result<PathBuf> {
    let git_dir = create_skeleton(root)?;
    RefStore::new(&git_dir).set_symbolic("HEAD", INITIAL_BRANCH)?;
    Ok(git_dir)
}

/// Walks up from `start` to the first directory containing `.git`.
pub fn find_git_dir(start: &Path) -> Result<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(GIT_DIR))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| {
            GitError::Repository(format!(
                "not a repository (or any parent up to /): {}",
                start.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn refs_with(names: &[&str]) -> RefMap {
        let mut refs = RefMap::new();
        for (i, name) in names.iter().enumerate() {
            refs.insert(*name, ObjectId::from_bytes([i as u8 + 1; 20]));
        }
        refs
    }

    #[test]
    fn test_initialise_main_only() {
        let dir = TempDir::new().unwrap();
        let refs = refs_with(&["refs/heads/main"]);

        let id = initialise(dir.path(), &refs).unwrap();
        assert_eq!(id, ObjectId::from_bytes([1u8; 20]));

        let git_dir = dir.path().join(GIT_DIR);
        assert!(git_dir.join("objects").is_dir());
        assert!(git_dir.join("refs/heads").is_dir());
        assert_eq!(
            fs::read_to_string(git_dir.join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(
            fs::read_to_string(git_dir.join("refs/heads/main")).unwrap(),
            format!("{}\n", id)
        );
    }

    #[test]
    fn test_initialise_prefers_master() {
        let dir = TempDir::new().unwrap();
        let refs = refs_with(&["refs/heads/main", "refs/heads/master"]);

        let id = initialise(dir.path(), &refs).unwrap();
        assert_eq!(id, ObjectId::from_bytes([2u8; 20]));
        let head = fs::read_to_string(dir.path().join(".git/HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/master\n");
    }

    #[test]
    fn test_initialise_without_default_branch() {
        let dir = TempDir::new().unwrap();
        let refs = refs_with(&["refs/heads/develop"]);

        assert!(matches!(
            initialise(dir.path(), &refs),
            Err(GitError::Repository(_))
        ));
        assert!(!dir.path().join(GIT_DIR).exists());
    }

    #[test]
    fn test_existing_repository_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(GIT_DIR)).unwrap();

        assert!(matches!(ensure_absent(dir.path()), Err(GitError::Repository(_))));
        assert!(matches!(
            initialise(dir.path(), &refs_with(&["refs/heads/main"])),
            Err(GitError::Repository(_))
        ));
    }

    #[test]
    fn test_skeleton_has_no_head() {
        let dir = TempDir::new().unwrap();
        let git_dir = create_skeleton(dir.path()).unwrap();
        assert!(!git_dir.join("HEAD").exists());
    }

    #[test]
    fn test_init_empty() {
        let dir = TempDir::new().unwrap();
        let git_dir = init_empty(dir.path()).unwrap();
        let store = RefStore::new(&git_dir);
        assert_eq!(store.current_branch(), Some("main".to_string()));
        assert!(store.resolve_head().is_err());
    }

    #[test]
    fn test_find_git_dir_walks_up() {
        let dir = TempDir::new().unwrap();
        init_empty(dir.path()).unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_git_dir(&nested).unwrap(), dir.path().join(GIT_DIR));
    }

    #[test]
    fn test_find_git_dir_missing() {
        let dir = TempDir::new().unwrap();
        assert!(find_git_dir(dir.path()).is_err());
    }
}
