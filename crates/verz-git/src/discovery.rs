//! Ref discovery: the `info/refs` advertisement exchange.

use crate::pktline::{PktLine, PktLineCursor};
use crate::transport::Transport;
use crate::{service_url, GitError, Result};
use std::collections::BTreeMap;
use verz_storage::ObjectId;

/// Service announcement that must open a smart HTTP advertisement.
const SERVICE_ANNOUNCEMENT: &str = "# service=git-upload-pack";

/// Placeholder ref name an empty repository advertises.
const EMPTY_REPO_MARKER: &str = "capabilities^{}";

/// Branches a clone checks out, in order of preference.
pub const DEFAULT_BRANCHES: [&str; 2] = ["refs/heads/master", "refs/heads/main"];

/// Refs advertised by a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefMap {
    refs: BTreeMap<String, ObjectId>,
    head: Option<String>,
    capabilities: Vec<String>,
}

impl RefMap {
    /// Creates an empty ref map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ref. The first ref added becomes the head entry.
    pub fn insert(&mut self, name: impl Into<String>, id: ObjectId) {
        let name = name.into();
        if self.head.is_none() {
            self.head = Some(name.clone());
        }
        self.refs.insert(name, id);
    }

    /// Looks up the object a ref points at.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.refs.get(name).copied()
    }

    /// Returns true if the ref was advertised.
    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    /// Name of the first advertised ref, which carried the capability list.
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Capabilities announced on the first ref line.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Iterates refs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectId)> {
        self.refs.iter().map(|(name, id)| (name.as_str(), id))
    }

    /// Number of advertised refs.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns true when the remote advertised no refs.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Fetches and parses the ref advertisement of `base_url`.
pub fn discover_refs(transport: &dyn Transport, base_url: &str) -> Result<RefMap> {
    let url = service_url(base_url, "info/refs?service=git-upload-pack");
    let body = transport.get(&url)?;
    let refs = parse_advertisement(&body)?;
    tracing::info!(url = %url, refs = refs.len(), head = ?refs.head(), "discovered refs");
    Ok(refs)
}

/// Parses a smart HTTP `git-upload-pack` ref advertisement.
///
/// Layout: the service announcement, a flush, the ref lines, a final flush.
/// The first ref line carries `\0`-separated capabilities after its name.
pub fn parse_advertisement(body: &[u8]) -> Result<RefMap> {
    let mut cursor = PktLineCursor::new(body);

    match cursor.read()? {
        PktLine::Data(line) if trim_line(&line) == SERVICE_ANNOUNCEMENT.as_bytes() => {}
        other => {
            return Err(GitError::Protocol(format!(
                "expected service announcement, got {:?}",
                other.as_str().unwrap_or("<flush>")
            )))
        }
    }
    if !cursor.read()?.is_flush() {
        return Err(GitError::Protocol(
            "expected flush after service announcement".to_string(),
        ));
    }

    let mut refs = RefMap::new();
    let mut first = true;
    loop {
        let line = match cursor.read()? {
            PktLine::Flush => break,
            PktLine::Data(line) => line,
        };

        let line = trim_line(&line);
        let line = if first {
            first = false;
            match line.iter().position(|&b| b == 0) {
                Some(nul) => {
                    refs.capabilities = String::from_utf8_lossy(&line[nul + 1..])
                        .split_whitespace()
                        .map(str::to_string)
                        .collect();
                    &line[..nul]
                }
                None => line,
            }
        } else {
            line
        };

        let (id, name) = parse_ref_line(line)?;
        if name == EMPTY_REPO_MARKER && id.is_zero() {
            tracing::debug!("remote repository is empty");
            continue;
        }
        if name.ends_with("^{}") {
            tracing::trace!(name, "skipping peeled tag");
            continue;
        }
        tracing::trace!(name, id = %id, "advertised ref");
        refs.insert(name, id);
    }

    Ok(refs)
}

fn parse_ref_line(line: &[u8]) -> Result<(ObjectId, String)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| GitError::Protocol("ref line is not utf-8".to_string()))?;
    let (hex, name) = text
        .split_once(' ')
        .ok_or_else(|| GitError::Protocol(format!("malformed ref line: {:?}", text)))?;
    let id = ObjectId::from_hex(hex)
        .map_err(|_| GitError::Protocol(format!("malformed object id in ref line: {:?}", text)))?;
    if name.is_empty() {
        return Err(GitError::Protocol(format!("ref line without a name: {:?}", text)));
    }
    Ok((id, name.to_string()))
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

/// Picks the branch a clone should check out.
///
/// `refs/heads/master` wins over `refs/heads/main`; a remote with neither
/// has no default branch.
pub fn resolve_head(refs: &RefMap) -> Result<String> {
    DEFAULT_BRANCHES
        .iter()
        .find(|name| refs.contains(name))
        .map(|name| name.to_string())
        .ok_or_else(|| GitError::Repository("no default branch".to_string()))
}
