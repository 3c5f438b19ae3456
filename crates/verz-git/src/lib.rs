//! Smart HTTP clone for verz.
//!
//! This crate fetches a remote repository over the git smart HTTP protocol:
//! it discovers the advertised refs, negotiates a packfile from
//! `git-upload-pack`, decodes that packfile into loose objects and seeds the
//! new repository's refs.
//!
//! ```text
//! discover_refs ─► RefMap ─► negotiate ─► packfile ─► decode_pack ─► initialise
//! ```

mod bootstrap;
mod checkout;
mod clone;
mod delta;
mod discovery;
mod error;
mod negotiate;
mod pack;
mod pktline;
#[cfg(test)]
mod test_support;
mod transport;
mod worktree;

pub use bootstrap::{
    create_skeleton, ensure_absent, find_git_dir, init_empty, initialise, write_refs, GIT_DIR,
    INITIAL_BRANCH,
};
pub use checkout::checkout_commit;
pub use clone::{clone, CloneOptions, CloneOutcome};
pub use delta::{resolve_delta, DeltaBuilder};
pub use discovery::{
    discover_refs, parse_advertisement, resolve_head, RefMap, DEFAULT_BRANCHES,
};
pub use error::GitError;
pub use negotiate::{
    build_request, negotiate, Phase, UploadPackParser, REQUEST_CONTENT_TYPE, RESULT_CONTENT_TYPE,
};
pub use pack::{decode_pack, PackBuilder, PackDecoder, PackSummary};
pub use pktline::{decode_one, encode, try_decode, PktLine, PktLineCursor, PktLineWriter};
pub use transport::{HttpTransport, Transport, TransportOptions};
pub use worktree::write_tree;

/// Result type for clone operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// Joins a remote base URL and a service path, dropping trailing slashes.
pub(crate) fn service_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
