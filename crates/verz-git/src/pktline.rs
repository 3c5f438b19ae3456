//! Git pkt-line format implementation.
//!
//! Every frame of the smart protocol is prefixed with a 4-character hex
//! length that counts itself, or is the literal `0000` flush marker.

use crate::{GitError, Result};
use std::io::Write;

/// Size of the hex length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Largest payload whose framed length still fits the 16-bit length field.
pub const MAX_PAYLOAD: usize = 0xFFFF - LENGTH_PREFIX;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Data(data) => encode(data),
            Self::Flush => Ok(b"0000".to_vec()),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the payload, or None for a flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the payload as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Frames a payload: 4 lowercase hex digits of `len + 4`, then the payload.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(GitError::Protocol(format!(
            "payload of {} bytes exceeds pkt-line limit of {}",
            payload.len(),
            MAX_PAYLOAD
        )));
    }
    let mut out = format!("{:04x}", payload.len() + LENGTH_PREFIX).into_bytes();
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decodes exactly one frame at `offset`, returning it and the offset after it.
///
/// Fails if fewer than 4 bytes remain or the declared length runs past the
/// end of `buffer`.
pub fn decode_one(buffer: &[u8], offset: usize) -> Result<(PktLine, usize)> {
    match try_decode(buffer, offset)? {
        Some(decoded) => Ok(decoded),
        None if buffer.len().saturating_sub(offset) < LENGTH_PREFIX => Err(GitError::Protocol(
            format!("truncated length field at offset {}", offset),
        )),
        None => Err(GitError::Protocol(format!(
            "pkt-line at offset {} runs past end of buffer",
            offset
        ))),
    }
}

/// Decodes one frame at `offset` if it is complete.
///
/// Returns `Ok(None)` when more bytes are needed, which lets callers keep a
/// partial frame around until the next chunk arrives.
pub fn try_decode(buffer: &[u8], offset: usize) -> Result<Option<(PktLine, usize)>> {
    let available = buffer.len().saturating_sub(offset);
    if available < LENGTH_PREFIX {
        return Ok(None);
    }

    let len = parse_length(&buffer[offset..offset + LENGTH_PREFIX], offset)?;
    if len == 0 {
        return Ok(Some((PktLine::Flush, offset + LENGTH_PREFIX)));
    }
    if len < LENGTH_PREFIX {
        return Err(GitError::Protocol(format!(
            "pkt-line length {:04x} at offset {} is below the minimum",
            len, offset
        )));
    }
    if available < len {
        return Ok(None);
    }

    let payload = buffer[offset + LENGTH_PREFIX..offset + len].to_vec();
    Ok(Some((PktLine::Data(payload), offset + len)))
}

fn parse_length(field: &[u8], offset: usize) -> Result<usize> {
    let mut len = 0usize;
    for &b in field {
        let digit = (b as char).to_digit(16).ok_or_else(|| {
            GitError::Protocol(format!(
                "invalid length prefix {:?} at offset {}",
                String::from_utf8_lossy(field),
                offset
            ))
        })?;
        len = (len << 4) | digit as usize;
    }
    Ok(len)
}

/// Sequential reader over a fully received pkt-line buffer.
pub struct PktLineCursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> PktLineCursor<'a> {
    /// Creates a cursor at the start of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Reads the next frame.
    pub fn read(&mut self) -> Result<PktLine> {
        let (pkt, next) = decode_one(self.buffer, self.offset)?;
        self.offset = next;
        Ok(pkt)
    }

    /// Returns the current byte offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true once every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Writes a string line, appending a newline if it lacks one.
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pktline_encode() {
        assert_eq!(PktLine::from_string("hello\n").encode().unwrap(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode().unwrap(), b"0000");
        assert_eq!(encode(b"").unwrap(), b"0004");
    }

    #[test]
    fn test_encode_uses_lowercase_hex() {
        let payload = vec![b'x'; 0xab - 4];
        assert!(encode(&payload).unwrap().starts_with(b"00ab"));
    }

    #[test]
    fn test_encode_limit() {
        assert!(encode(&vec![0u8; MAX_PAYLOAD]).unwrap().starts_with(b"ffff"));
        assert!(matches!(
            encode(&vec![0u8; MAX_PAYLOAD + 1]),
            Err(GitError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_one() {
        let buf = b"000ahello\n0000";
        let (pkt, next) = decode_one(buf, 0).unwrap();
        assert_eq!(pkt, PktLine::from_string("hello\n"));
        assert_eq!(next, 10);

        let (pkt, next) = decode_one(buf, next).unwrap();
        assert!(pkt.is_flush());
        assert_eq!(next, buf.len());
    }

    #[test]
    fn test_flush_consumes_exactly_four_bytes() {
        let (pkt, next) = decode_one(b"0000garbage-after", 0).unwrap();
        assert!(pkt.is_flush());
        assert_eq!(next, 4);
    }

    #[test]
    fn test_decode_truncated_length() {
        assert!(matches!(decode_one(b"00", 0), Err(GitError::Protocol(_))));
        assert!(matches!(decode_one(b"0000", 4), Err(GitError::Protocol(_))));
    }

    #[test]
    fn test_decode_length_past_end() {
        assert!(matches!(decode_one(b"0010abc", 0), Err(GitError::Protocol(_))));
    }

    #[test]
    fn test_decode_invalid_length() {
        assert!(decode_one(b"zzzz", 0).is_err());
        assert!(decode_one(b"+fff", 0).is_err());
        assert!(decode_one(b"0003", 0).is_err());
    }

    #[test]
    fn test_decode_accepts_uppercase_hex() {
        let mut buf = b"000A".to_vec();
        buf.extend_from_slice(b"hello\n");
        let (pkt, _) = decode_one(&buf, 0).unwrap();
        assert_eq!(pkt.as_str(), Some("hello"));
    }

    #[test]
    fn test_try_decode_incomplete() {
        assert!(try_decode(b"", 0).unwrap().is_none());
        assert!(try_decode(b"000", 0).unwrap().is_none());
        assert!(try_decode(b"000ahel", 0).unwrap().is_none());
        assert!(try_decode(b"000ahello\n", 0).unwrap().is_some());
    }

    #[test]
    fn test_cursor() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.write_line("line2\n").unwrap();
            writer.flush_pkt().unwrap();
        }

        let mut cursor = PktLineCursor::new(&buf);
        assert_eq!(cursor.read().unwrap().as_str(), Some("line1"));
        assert_eq!(cursor.read().unwrap().as_str(), Some("line2"));
        assert!(cursor.read().unwrap().is_flush());
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.offset(), buf.len());
        assert!(cursor.read().is_err());
    }

    #[test]
    fn test_pktline_as_str_invalid_utf8() {
        assert!(PktLine::from_bytes(vec![0xff, 0xfe]).as_str().is_none());
        assert!(PktLine::Flush.as_str().is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: any payload within the limit decodes back to itself.
        #[test]
        fn prop_encode_decode(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            let framed = encode(&payload).unwrap();
            let (pkt, next) = decode_one(&framed, 0).unwrap();
            prop_assert_eq!(pkt, PktLine::Data(payload));
            prop_assert_eq!(next, framed.len());
        }

        /// Property: arbitrary input never panics the decoder.
        #[test]
        fn prop_decode_no_panic(data in prop::collection::vec(any::<u8>(), 0..64), offset in 0usize..80) {
            let _ = decode_one(&data, offset);
        }
    }
}
