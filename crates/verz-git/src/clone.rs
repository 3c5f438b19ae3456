//! The clone pipeline.

use crate::bootstrap::{create_skeleton, ensure_absent, write_refs};
use crate::checkout::checkout_commit;
use crate::discovery::{discover_refs, resolve_head};
use crate::negotiate::negotiate;
use crate::pack::{decode_pack, PackSummary};
use crate::transport::Transport;
use crate::{GitError, Result};
use std::path::{Path, PathBuf};
use verz_storage::{LooseStore, ObjectId};

/// Options for [`clone`].
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Write the HEAD commit's files into the clone root.
    pub checkout: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self { checkout: true }
    }
}

/// What a successful clone produced.
#[derive(Debug, Clone)]
pub struct CloneOutcome {
    /// The new repository's `.git` directory.
    pub git_dir: PathBuf,
    /// Branch HEAD points at, e.g. `refs/heads/main`.
    pub branch: String,
    /// Commit the branch points at.
    pub head: ObjectId,
    /// Objects unpacked from the remote.
    pub summary: PackSummary,
    /// Files written by checkout.
    pub files: usize,
}

/// Clones `url` into `root`.
///
/// Refs are written only after every object has been decoded and stored, so
/// a clone that fails part way leaves a directory without HEAD, which later
/// commands do not treat as a repository.
pub fn clone(
    transport: &dyn Transport,
    url: &str,
    root: &Path,
    options: &CloneOptions,
) -> Result<CloneOutcome> {
    ensure_absent(root)?;

    let refs = discover_refs(transport, url)?;
    let branch = resolve_head(&refs)?;
    let want = refs
        .get(&branch)
        .ok_or_else(|| GitError::Repository(format!("{} not advertised", branch)))?;
    tracing::info!(url, branch = %branch, want = %want, "cloning");

    let git_dir = create_skeleton(root)?;
    let pack = negotiate(transport, url, &want)?;

    let store = LooseStore::open(&git_dir);
    let summary = decode_pack(&pack, &store)?;

    let (branch, head) = write_refs(&git_dir, &refs)?;

    let files = if options.checkout {
        checkout_commit(&store, &head, root)?
    } else {
        0
    };

    tracing::info!(
        path = %root.display(),
        objects = summary.objects,
        files,
        "clone complete"
    );
    Ok(CloneOutcome {
        git_dir,
        branch,
        head,
        summary,
        files,
    })
}
