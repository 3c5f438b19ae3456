//! Git reference management backed by loose ref files.

use crate::{ObjectId, Result, StorageError};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Symbolic refs deeper than this are treated as a loop.
const MAX_SYMREF_DEPTH: usize = 5;

const SYMREF_PREFIX: &str = "ref: ";

/// A git reference (branch, tag, or symbolic ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Parses the content of a ref file.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim_end();
        match content.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Ok(Self::Symbolic(target.trim().to_string())),
            None => ObjectId::from_hex(content)
                .map(Self::Direct)
                .map_err(|_| StorageError::InvalidRef(format!("malformed ref: {:?}", content))),
        }
    }

    /// Renders the ref file content, newline-terminated.
    pub fn to_file_content(&self) -> String {
        match self {
            Self::Direct(id) => format!("{}\n", id),
            Self::Symbolic(target) => format!("{}{}\n", SYMREF_PREFIX, target),
        }
    }

    /// Returns the object ID if this is a direct reference.
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }
}

/// Reference store over the loose ref files of one `.git` directory.
#[derive(Debug, Clone)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    /// Creates a ref store rooted at a `.git` directory.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    /// Returns the `.git` directory this store writes into.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_ref_name(name)?;
        Ok(self.git_dir.join(name))
    }

    /// Returns true if the ref file exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Gets a reference by name.
    pub fn get(&self, name: &str) -> Result<Reference> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(content) => Reference::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::RefNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sets a reference to point to an object.
    pub fn set(&self, name: &str, target: ObjectId) -> Result<()> {
        self.write(name, &Reference::Direct(target))
    }

    /// Sets a symbolic reference.
    pub fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        validate_ref_name(target)?;
        self.write(name, &Reference::Symbolic(target.to_string()))
    }

    fn write(&self, name: &str, reference: &Reference) -> Result<()> {
        let path = self.path_for(name)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, reference.to_file_content())?;
        tracing::debug!(name, reference = ?reference, "ref written");
        Ok(())
    }

    /// Follows symbolic refs until a direct object id is reached.
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.get(&current)? {
                Reference::Direct(id) => return Ok(id),
                Reference::Symbolic(target) => current = target,
            }
        }
        Err(StorageError::InvalidRef(format!(
            "symbolic ref chain from {} is too deep",
            name
        )))
    }

    /// Resolves HEAD to the commit it currently points at.
    pub fn resolve_head(&self) -> Result<ObjectId> {
        self.resolve("HEAD")
    }

    /// Gets the current branch name (if HEAD is symbolic).
    pub fn current_branch(&self) -> Option<String> {
        match self.get("HEAD").ok()? {
            Reference::Symbolic(target) => {
                target.strip_prefix("refs/heads/").map(|s| s.to_string())
            }
            Reference::Direct(_) => None,
        }
    }
}

/// Rejects names that would escape the `.git` directory or are not refs.
fn validate_ref_name(name: &str) -> Result<()> {
    let invalid = || StorageError::InvalidRef(format!("invalid ref name: {:?}", name));

    if name.is_empty() || name.ends_with('/') || name.contains('\0') {
        return Err(invalid());
    }
    if name != "HEAD" && !name.starts_with("refs/") {
        return Err(invalid());
    }
    let all_normal = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal || name.split('/').any(|part| part.is_empty() || part == "..") {
        return Err(invalid());
    }
    Ok(())
}
