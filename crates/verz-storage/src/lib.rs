//! Object storage for verz.
//!
//! This crate provides content-addressed storage for git objects
//! (blobs, trees, commits, tags) laid out the way git lays out loose
//! objects, plus the on-disk reference files of a repository.

mod commit;
mod error;
mod object;
mod refs;
mod store;
mod tree;

pub use commit::{Commit, Signature};
pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectType};
pub use refs::{RefStore, Reference};
pub use store::{LooseStore, MemoryStore, ObjectStore};
pub use tree::{commit_tree_id, EntryKind, Tree, TreeEntry};

pub use bstr::BString;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
