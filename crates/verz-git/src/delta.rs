//! Delta instruction streams.
//!
//! A delta starts with the source and target sizes as little-endian base-128
//! varints, followed by copy and insert opcodes:
//!
//! ```text
//! 1oooosss  copy: bits 0-3 select offset bytes, bits 4-6 select size bytes
//! 0nnnnnnn  insert: the next n (1..=127) bytes are literal target data
//! ```
//!
//! See: https://git-scm.com/docs/pack-format#_deltified_representation

use crate::{GitError, Result};

/// Opcode flag marking a copy instruction.
const COPY_FLAG: u8 = 0x80;
/// Number of optional offset bytes in a copy instruction.
const COPY_OFFSET_BYTES: u8 = 4;
/// Number of optional size bytes in a copy instruction.
const COPY_SIZE_BYTES: u8 = 3;
/// Copy size used when no size bytes are present.
const COPY_ZERO_SIZE: usize = 0x10000;
/// Longest literal run a single insert can carry.
const MAX_INSERT: usize = 0x7f;
/// Upper bound on the output buffer reserved up front.
const MAX_PREALLOC: usize = 1 << 24;

/// Applies `delta` to `base` and returns the reconstructed content.
pub fn resolve_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;

    let source_size = read_varint(delta, &mut pos)?;
    if source_size != base.len() {
        return Err(GitError::Format(format!(
            "base size mismatch: delta expects {} bytes, base has {}",
            source_size,
            base.len()
        )));
    }
    let target_size = read_varint(delta, &mut pos)?;
    let mut out = Vec::with_capacity(target_size.min(MAX_PREALLOC));

    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;

        if opcode & COPY_FLAG != 0 {
            let mut present = opcode;
            let offset = read_partial_int(delta, &mut pos, COPY_OFFSET_BYTES, &mut present)?;
            let mut size = read_partial_int(delta, &mut pos, COPY_SIZE_BYTES, &mut present)?;
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| {
                    GitError::Format(format!(
                        "copy of {} bytes at {} outside base of {} bytes",
                        size,
                        offset,
                        base.len()
                    ))
                })?;
            out.extend_from_slice(chunk);
        } else {
            if opcode == 0 {
                return Err(GitError::Format("zero-length insert in delta".to_string()));
            }
            let len = opcode as usize;
            let literal = delta.get(pos..pos + len).ok_or_else(|| {
                GitError::Format(format!("insert of {} bytes runs past end of delta", len))
            })?;
            out.extend_from_slice(literal);
            pos += len;
        }

        if out.len() > target_size {
            return Err(GitError::Format(format!(
                "delta output exceeds declared size {}",
                target_size
            )));
        }
    }

    if out.len() != target_size {
        return Err(GitError::Format(format!(
            "delta produced {} bytes, expected {}",
            out.len(),
            target_size
        )));
    }
    Ok(out)
}

/// Reads a little-endian base-128 varint.
pub(crate) fn read_varint(data: &[u8], pos: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GitError::Format("truncated delta size".to_string()))?;
        *pos += 1;
        if shift >= usize::BITS {
            return Err(GitError::Format("delta size overflows".to_string()));
        }
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Appends `value` as a little-endian base-128 varint.
pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_partial_int(data: &[u8], pos: &mut usize, bytes: u8, present: &mut u8) -> Result<usize> {
    let mut value = 0usize;
    for index in 0..bytes {
        if *present & 1 != 0 {
            let byte = *data
                .get(*pos)
                .ok_or_else(|| GitError::Format("truncated copy instruction".to_string()))?;
            *pos += 1;
            value |= (byte as usize) << (index * 8);
        }
        *present >>= 1;
    }
    Ok(value)
}

/// Builds delta streams from copy and insert instructions.
///
/// Used to produce deltified pack entries.
#[derive(Debug, Clone)]
pub struct DeltaBuilder {
    source_size: usize,
    target_size: usize,
    ops: Vec<u8>,
}

impl DeltaBuilder {
    /// Starts a delta against a base of `source_size` bytes.
    pub fn new(source_size: usize) -> Self {
        Self {
            source_size,
            target_size: 0,
            ops: Vec::new(),
        }
    }

    /// Copies `len` bytes of the base starting at `offset`.
    pub fn copy(mut self, offset: usize, len: usize) -> Self {
        let mut offset = offset;
        let mut remaining = len;
        while remaining > 0 {
            let size = remaining.min(COPY_ZERO_SIZE);
            self.push_copy(offset, size);
            offset += size;
            remaining -= size;
        }
        self.target_size += len;
        self
    }

    fn push_copy(&mut self, offset: usize, size: usize) {
        let at = self.ops.len();
        let mut opcode = COPY_FLAG;
        self.ops.push(0);

        for index in 0..COPY_OFFSET_BYTES {
            let byte = (offset >> (index * 8)) as u8;
            if byte != 0 {
                opcode |= 1 << index;
                self.ops.push(byte);
            }
        }
        // A size of exactly 0x10000 is encoded by omitting every size byte.
        if size != COPY_ZERO_SIZE {
            for index in 0..COPY_SIZE_BYTES {
                let byte = (size >> (index * 8)) as u8;
                if byte != 0 {
                    opcode |= 1 << (COPY_OFFSET_BYTES + index);
                    self.ops.push(byte);
                }
            }
        }
        self.ops[at] = opcode;
    }

    /// Inserts literal bytes.
    pub fn insert(mut self, data: &[u8]) -> Self {
        for chunk in data.chunks(MAX_INSERT) {
            self.ops.push(chunk.len() as u8);
            self.ops.extend_from_slice(chunk);
        }
        self.target_size += data.len();
        self
    }

    /// Returns the encoded delta stream.
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ops.len() + 8);
        write_varint(&mut out, self.source_size);
        write_varint(&mut out, self.target_size);
        out.extend_from_slice(&self.ops);
        out
    }
}
