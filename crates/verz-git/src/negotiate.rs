//! Upload-pack negotiation and the streaming side-band parser.
//!
//! A clone sends a single `want` and immediately says `done`. The server
//! replies with `NAK` followed by the packfile multiplexed over side-band-64k
//! and a closing flush. The response is parsed chunk by chunk as the transport
//! delivers it, so a frame may be split across any number of reads.

use crate::pktline::{try_decode, PktLine, PktLineWriter};
use crate::transport::Transport;
use crate::{service_url, GitError, Result};
use verz_storage::ObjectId;

/// Capabilities requested on the `want` line.
const WANT_CAPABILITIES: &str = "side-band-64k ofs-delta thin-pack";

/// Request content type for `git-upload-pack`.
pub const REQUEST_CONTENT_TYPE: &str = "application/x-git-upload-pack-request";

/// Accepted response content type for `git-upload-pack`.
pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

/// Side-band channel carrying pack data.
const BAND_PACK: u8 = 1;
/// Side-band channel carrying progress text.
const BAND_PROGRESS: u8 = 2;
/// Side-band channel carrying a fatal remote error.
const BAND_ERROR: u8 = 3;

/// Builds the upload-pack request body for a single wanted commit.
///
/// `want <oid> <caps>`, a flush ending the want list, then `done`.
pub fn build_request(want: &ObjectId) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut writer = PktLineWriter::new(&mut body);
    writer.write_line(&format!("want {} {}", want, WANT_CAPABILITIES))?;
    writer.flush_pkt()?;
    writer.write_line("done")?;
    Ok(body)
}

/// Where the parser is in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the server's `NAK`.
    ReadAck,
    /// Demultiplexing side-band frames.
    ReadSideBand,
    /// A flush was seen; later bytes are ignored.
    Done,
}

/// Incremental parser for one upload-pack response.
///
/// Feed it response chunks in arrival order. Phases only move forward.
#[derive(Debug)]
pub struct UploadPackParser {
    phase: Phase,
    pending: Vec<u8>,
    packfile: Vec<u8>,
    saw_nak: bool,
}

impl UploadPackParser {
    /// Creates a parser waiting for the acknowledgement.
    pub fn new() -> Self {
        Self {
            phase: Phase::ReadAck,
            pending: Vec::new(),
            packfile: Vec::new(),
            saw_nak: false,
        }
    }

    /// Consumes one chunk of the response.
    ///
    /// Every complete frame is handled; a trailing partial frame stays
    /// buffered until the next chunk completes it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if self.phase == Phase::Done {
            return Ok(());
        }
        self.pending.extend_from_slice(chunk);

        let mut offset = 0;
        while let Some((pkt, next)) = try_decode(&self.pending, offset)? {
            offset = next;
            self.handle(pkt)?;
            if self.phase == Phase::Done {
                self.pending.clear();
                return Ok(());
            }
        }
        self.pending.drain(..offset);
        Ok(())
    }

    fn handle(&mut self, pkt: PktLine) -> Result<()> {
        let payload = match pkt {
            PktLine::Flush => {
                tracing::debug!(pack_bytes = self.packfile.len(), "upload-pack response complete");
                self.phase = Phase::Done;
                return Ok(());
            }
            PktLine::Data(payload) => payload,
        };

        match self.phase {
            Phase::ReadAck => {
                if payload.starts_with(b"NAK") {
                    tracing::debug!("received NAK, reading side-band");
                    self.saw_nak = true;
                    self.phase = Phase::ReadSideBand;
                } else if let Some(message) = payload.strip_prefix(b"ERR ") {
                    return Err(GitError::Remote(text(message)));
                } else {
                    tracing::trace!(line = %text(&payload), "ignoring acknowledgement line");
                }
            }
            Phase::ReadSideBand => self.demux(&payload)?,
            Phase::Done => {}
        }
        Ok(())
    }

    fn demux(&mut self, payload: &[u8]) -> Result<()> {
        let Some((&band, data)) = payload.split_first() else {
            return Ok(());
        };
        match band {
            BAND_PACK => self.packfile.extend_from_slice(data),
            BAND_PROGRESS => tracing::debug!(progress = %text(data), "remote"),
            BAND_ERROR => return Err(GitError::Remote(text(data))),
            other => {
                return Err(GitError::Protocol(format!(
                    "unknown side-band channel {}",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true once the closing flush has been seen.
    pub fn finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Pack bytes received so far.
    pub fn packfile(&self) -> &[u8] {
        &self.packfile
    }

    /// Ends the session and returns the reassembled packfile.
    ///
    /// Fails if the server never acknowledged, the response stopped inside a
    /// frame, or no pack data arrived.
    pub fn into_packfile(self) -> Result<Vec<u8>> {
        if !self.saw_nak {
            return Err(GitError::Protocol(
                "upload-pack response ended before NAK".to_string(),
            ));
        }
        if !self.pending.is_empty() {
            return Err(GitError::Protocol(format!(
                "upload-pack response ended inside a frame ({} bytes pending)",
                self.pending.len()
            )));
        }
        if self.packfile.is_empty() {
            return Err(GitError::Protocol(
                "upload-pack response carried no pack data".to_string(),
            ));
        }
        Ok(self.packfile)
    }
}

impl Default for UploadPackParser {
    fn default() -> Self {
        Self::new()
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Requests the packfile for `want` and returns it once fully received.
pub fn negotiate(transport: &dyn Transport, base_url: &str, want: &ObjectId) -> Result<Vec<u8>> {
    let url = service_url(base_url, "git-upload-pack");
    let body = build_request(want)?;
    tracing::debug!(url = %url, want = %want, "negotiating pack");

    let mut parser = UploadPackParser::new();
    transport.post_streaming(
        &url,
        REQUEST_CONTENT_TYPE,
        RESULT_CONTENT_TYPE,
        body,
        &mut |chunk| parser.feed(chunk),
    )?;

    let packfile = parser.into_packfile()?;
    tracing::info!(bytes = packfile.len(), "received pack");
    Ok(packfile)
}
