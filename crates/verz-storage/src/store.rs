//! Content-addressed object stores.
//!
//! [`LooseStore`] is the on-disk store: each object lives at
//! `<objects>/<hash[0:2]>/<hash[2:]>` as zlib-deflated
//! `"<type> <len>\0<content>"`. [`MemoryStore`] keeps objects in a map and
//! is used where nothing should touch the filesystem.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Object storage capability consumed by the clone pipeline.
///
/// Writes are idempotent. Storing the same `(type, content)` twice yields the
/// same id and leaves the store unchanged.
pub trait ObjectStore: Send + Sync {
    /// Hashes and stores an object, returning its id.
    fn write(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId>;

    /// Retrieves an object by id.
    fn read(&self, id: &ObjectId) -> Result<GitObject>;

    /// Checks if an object exists.
    fn exists(&self, id: &ObjectId) -> bool;

    /// Stores an already-built object.
    fn put(&self, object: &GitObject) -> Result<ObjectId> {
        self.write(object.object_type, &object.data)
    }
}

/// Loose-object store rooted at a repository's `objects` directory.
#[derive(Debug, Clone)]
pub struct LooseStore {
    objects_dir: PathBuf,
}

impl LooseStore {
    /// Creates a store over an `objects` directory.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    /// Creates a store for the `objects` directory inside a `.git` directory.
    pub fn open(git_dir: impl AsRef<Path>) -> Self {
        Self::new(git_dir.as_ref().join("objects"))
    }

    /// Returns the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Returns the path an object is stored at.
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Compresses an object into its loose on-disk form.
    pub fn compress(object: &GitObject) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&object.object_type.header(object.data.len()))?;
        encoder.write_all(&object.data)?;
        Ok(encoder.finish()?)
    }

    /// Decompresses a loose object file.
    pub fn decompress(compressed: &[u8]) -> Result<GitObject> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| StorageError::InvalidObject(format!("inflate failed: {}", e)))?;
        GitObject::from_loose_bytes(&raw)
    }
}

impl ObjectStore for LooseStore {
    fn write(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId> {
        let object = GitObject::new(object_type, content.to_vec());
        let path = self.path_for(&object.id);

        if path.exists() {
            tracing::trace!(id = %object.id, "object already stored");
            return Ok(object.id);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write beside the final name and rename so readers never see a
        // partially written object.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, Self::compress(&object)?)?;
        fs::rename(&tmp, &path)?;

        tracing::trace!(id = %object.id, kind = %object_type, size = content.len(), "object written");
        Ok(object.id)
    }

    fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let path = self.path_for(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };

        let object = Self::decompress(&compressed)?;
        if object.id != *id {
            return Err(StorageError::Corruption(format!(
                "object {} hashes to {}",
                id, object.id
            )));
        }
        Ok(object)
    }

    fn exists(&self, id: &ObjectId) -> bool {
        self.path_for(id).is_file()
    }
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectId, GitObject>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Lists all object IDs.
    pub fn list_objects(&self) -> Vec<ObjectId> {
        self.objects.read().keys().copied().collect()
    }
}

impl ObjectStore for MemoryStore {
    fn write(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId> {
        let object = GitObject::new(object_type, content.to_vec());
        let id = object.id;
        self.objects.write().entry(id).or_insert(object);
        Ok(id)
    }

    fn read(&self, id: &ObjectId) -> Result<GitObject> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_hex()))
    }

    fn exists(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }
}
