//! Git pack file format implementation.
//!
//! Pack files are the format used by git for efficient object transfer.
//! See: https://git-scm.com/docs/pack-format
//!
//! Decoding is a single forward pass. Every resolved entry is kept in an
//! arena keyed by the byte offset it started at, so an ofs-delta (which can
//! only point backwards) always finds its base already resolved. A second
//! index by object id serves ref-deltas.

use crate::delta::resolve_delta;
use crate::{GitError, Result};
use bytes::Bytes;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{Read, Write};
use verz_storage::{GitObject, ObjectId, ObjectStore, ObjectType};

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack version written by [`PackBuilder`].
const PACK_VERSION: u32 = 2;
/// Pack versions the decoder accepts.
const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];
/// Signature, version and object count.
const HEADER_LEN: usize = 12;
/// SHA-1 checksum trailing the pack.
const TRAILER_LEN: usize = 20;
/// Upper bound on the inflate buffer reserved up front.
const MAX_PREALLOC: usize = 1 << 24;

/// Type code of an offset delta entry.
const OFS_DELTA: u8 = 6;
/// Type code of a ref delta entry.
const REF_DELTA: u8 = 7;

/// Counts from one decoded pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Objects written to the store.
    pub objects: usize,
    /// How many of them were reconstructed from deltas.
    pub deltas: usize,
}

/// A fully resolved entry, kept for later deltas.
struct Resolved {
    kind: ObjectType,
    data: Bytes,
}

/// Decodes a pack and writes every object into `store`.
pub fn decode_pack(pack: &[u8], store: &dyn ObjectStore) -> Result<PackSummary> {
    PackDecoder::new(pack, store).decode()
}

/// Single-pass pack decoder.
pub struct PackDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    store: &'a dyn ObjectStore,
    arena: HashMap<usize, Resolved>,
    by_id: HashMap<ObjectId, usize>,
    summary: PackSummary,
}

impl<'a> PackDecoder<'a> {
    /// Creates a decoder over a complete pack, trailer included.
    pub fn new(data: &'a [u8], store: &'a dyn ObjectStore) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len().saturating_sub(TRAILER_LEN),
            store,
            arena: HashMap::new(),
            by_id: HashMap::new(),
            summary: PackSummary::default(),
        }
    }

    /// Verifies the pack and writes its objects, in pack order.
    pub fn decode(mut self) -> Result<PackSummary> {
        let count = self.read_header()?;
        self.verify_trailer()?;
        tracing::debug!(objects = count, bytes = self.data.len(), "decoding pack");

        self.pos = HEADER_LEN;
        for index in 0..count {
            let offset = self.pos;
            self.decode_object(offset).map_err(|e| match e {
                GitError::Format(msg) => GitError::Format(format!(
                    "object {} at offset {}: {}",
                    index, offset, msg
                )),
                other => other,
            })?;
        }

        if self.pos != self.end {
            return Err(GitError::Format(format!(
                "{} unexpected bytes after object {}",
                self.end - self.pos,
                count
            )));
        }

        tracing::info!(
            objects = self.summary.objects,
            deltas = self.summary.deltas,
            "pack decoded"
        );
        Ok(self.summary)
    }

    fn read_header(&self) -> Result<usize> {
        if self.data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(GitError::Format(format!(
                "pack too small: {} bytes",
                self.data.len()
            )));
        }
        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(GitError::Format("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(GitError::Format(format!(
                "unsupported version: {}",
                version
            )));
        }

        let count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]);
        Ok(count as usize)
    }

    fn verify_trailer(&self) -> Result<()> {
        let mut hasher = Sha1::new();
        hasher.update(&self.data[..self.end]);
        let computed = hasher.finalize();

        if computed.as_slice() != &self.data[self.end..] {
            return Err(GitError::Format("checksum mismatch".to_string()));
        }
        Ok(())
    }

    fn decode_object(&mut self, offset: usize) -> Result<()> {
        let (code, size) = self.read_entry_header()?;

        let (kind, content, delta) = match code {
            OFS_DELTA => {
                let distance = self.read_base_distance()?;
                let base_offset = offset.checked_sub(distance).ok_or_else(|| {
                    GitError::Format(format!("ofs-delta distance {} points before the pack", distance))
                })?;
                let delta = self.inflate(size)?;
                let base = self.arena.get(&base_offset).ok_or_else(|| {
                    GitError::Format(format!(
                        "ofs-delta base offset {} is not an earlier object",
                        base_offset
                    ))
                })?;
                (base.kind, resolve_delta(&base.data, &delta)?, true)
            }
            REF_DELTA => {
                let base_id = self.read_base_id()?;
                let delta = self.inflate(size)?;
                let (kind, base) = self.lookup_base(&base_id)?;
                (kind, resolve_delta(&base, &delta)?, true)
            }
            code => {
                let kind = ObjectType::from_pack_type(code)
                    .ok_or_else(|| GitError::Format(format!("invalid object type: {}", code)))?;
                (kind, self.inflate(size)?, false)
            }
        };

        let id = self.store.write(kind, &content)?;
        tracing::trace!(offset, id = %id, kind = %kind, size = content.len(), delta, "object decoded");

        self.arena.insert(
            offset,
            Resolved {
                kind,
                data: Bytes::from(content),
            },
        );
        self.by_id.entry(id).or_insert(offset);
        self.summary.objects += 1;
        if delta {
            self.summary.deltas += 1;
        }
        Ok(())
    }

    /// Base of a ref-delta: this pack first, then the store.
    fn lookup_base(&self, id: &ObjectId) -> Result<(ObjectType, Bytes)> {
        if let Some(resolved) = self.by_id.get(id).and_then(|off| self.arena.get(off)) {
            return Ok((resolved.kind, resolved.data.clone()));
        }
        if self.store.exists(id) {
            let object = self.store.read(id)?;
            return Ok((object.object_type, object.data));
        }
        Err(GitError::Format(format!("ref-delta base {} not found", id)))
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.pos >= self.end {
            return Err(GitError::Format("unexpected end of pack".to_string()));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads the type code and inflated size.
    ///
    /// First byte: MSB continue, 3 bits type, 4 low bits of size. Each
    /// following byte adds 7 more size bits, least significant first.
    fn read_entry_header(&mut self) -> Result<(u8, usize)> {
        let mut byte = self.next_byte()?;
        let code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0F) as usize;
        let mut shift = 4u32;

        while byte & 0x80 != 0 {
            byte = self.next_byte()?;
            if shift >= usize::BITS {
                return Err(GitError::Format("object size overflows".to_string()));
            }
            size |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
        }
        Ok((code, size))
    }

    /// Reads an ofs-delta distance: big-endian groups of 7 bits where every
    /// continuation adds one before shifting.
    fn read_base_distance(&mut self) -> Result<usize> {
        let mut byte = self.next_byte()?;
        let mut value = (byte & 0x7F) as usize;

        while byte & 0x80 != 0 {
            byte = self.next_byte()?;
            value = value
                .checked_add(1)
                .and_then(|v| v.checked_mul(128))
                .ok_or_else(|| GitError::Format("ofs-delta distance overflows".to_string()))?
                | (byte & 0x7F) as usize;
        }
        Ok(value)
    }

    fn read_base_id(&mut self) -> Result<ObjectId> {
        let raw = self
            .data
            .get(self.pos..self.pos + ObjectId::LEN)
            .filter(|_| self.pos + ObjectId::LEN <= self.end)
            .ok_or_else(|| GitError::Format("truncated ref-delta base id".to_string()))?;
        let id = ObjectId::from_slice(raw)?;
        self.pos += ObjectId::LEN;
        Ok(id)
    }

    /// Inflates exactly one zlib stream starting at the cursor and advances
    /// past the compressed bytes it consumed.
    fn inflate(&mut self, expected: usize) -> Result<Vec<u8>> {
        let data = self.data;
        let mut decoder = ZlibDecoder::new(&data[self.pos..self.end]);
        let mut out = Vec::with_capacity(expected.min(MAX_PREALLOC));

        (&mut decoder)
            .take((expected as u64).saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| GitError::Format(format!("inflate failed: {}", e)))?;

        if out.len() != expected {
            return Err(GitError::Format(format!(
                "inflated size {} does not match header size {}",
                out.len(),
                expected
            )));
        }

        self.pos += decoder.total_in() as usize;
        Ok(out)
    }
}

/// One entry queued in a [`PackBuilder`].
enum Entry {
    Base(GitObject),
    OfsDelta { base: usize, delta: Vec<u8> },
    RefDelta { base: ObjectId, delta: Vec<u8> },
}

/// Builds a pack file from objects and deltas.
pub struct PackBuilder {
    entries: Vec<Entry>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a whole object, returning its entry index.
    pub fn add(&mut self, object: GitObject) -> usize {
        self.entries.push(Entry::Base(object));
        self.entries.len() - 1
    }

    /// Adds a delta against the earlier entry at index `base`.
    pub fn add_ofs_delta(&mut self, base: usize, delta: Vec<u8>) -> usize {
        self.entries.push(Entry::OfsDelta { base, delta });
        self.entries.len() - 1
    }

    /// Adds a delta against the object named `base`.
    pub fn add_ref_delta(&mut self, base: ObjectId, delta: Vec<u8>) -> usize {
        self.entries.push(Entry::RefDelta { base, delta });
        self.entries.len() - 1
    }

    /// Builds the pack file.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut pack = Vec::new();

        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        let mut offsets = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let offset = pack.len();
            offsets.push(offset);

            match entry {
                Entry::Base(object) => {
                    write_entry_header(&mut pack, object.object_type.pack_type(), object.data.len());
                    pack.extend_from_slice(&compress(&object.data)?);
                }
                Entry::OfsDelta { base, delta } => {
                    if *base >= index {
                        return Err(GitError::Format(format!(
                            "entry {} deltas against later entry {}",
                            index, base
                        )));
                    }
                    write_entry_header(&mut pack, OFS_DELTA, delta.len());
                    write_base_distance(&mut pack, offset - offsets[*base]);
                    pack.extend_from_slice(&compress(delta)?);
                }
                Entry::RefDelta { base, delta } => {
                    write_entry_header(&mut pack, REF_DELTA, delta.len());
                    pack.extend_from_slice(base.as_bytes());
                    pack.extend_from_slice(&compress(delta)?);
                }
            }
        }

        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let checksum = hasher.finalize();
        pack.extend_from_slice(&checksum);

        Ok(pack)
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the type and size header of one entry.
fn write_entry_header(pack: &mut Vec<u8>, code: u8, size: usize) {
    // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
    let mut first_byte = (code << 4) | ((size & 0x0F) as u8);
    let mut remaining_size = size >> 4;

    if remaining_size > 0 {
        first_byte |= 0x80;
    }
    pack.push(first_byte);

    while remaining_size > 0 {
        let mut byte = (remaining_size & 0x7F) as u8;
        remaining_size >>= 7;
        if remaining_size > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }
}

fn write_base_distance(pack: &mut Vec<u8>, mut distance: usize) {
    let mut encoded = vec![(distance & 0x7F) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        encoded.push(0x80 | (distance & 0x7F) as u8);
        distance >>= 7;
    }
    encoded.reverse();
    pack.extend_from_slice(&encoded);
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
