//! Tree and commit content parsing.

use crate::{ObjectId, Result, StorageError};
use bstr::BString;
use std::cmp::Ordering;

/// What a tree entry's mode says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// `40000`: a subdirectory (tree).
    Directory,
    /// `100644`: a regular file.
    File,
    /// `100755`: an executable file.
    Executable,
    /// `120000`: a symbolic link whose blob is the target path.
    Symlink,
    /// `160000`: a gitlink to a submodule commit.
    Submodule,
}

impl EntryKind {
    /// Classifies an octal mode string as stored in a tree.
    pub fn from_mode(mode: &str) -> Result<Self> {
        match mode {
            "40000" | "040000" => Ok(Self::Directory),
            "100644" | "100664" => Ok(Self::File),
            "100755" => Ok(Self::Executable),
            "120000" => Ok(Self::Symlink),
            "160000" => Ok(Self::Submodule),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown tree entry mode: {}",
                mode
            ))),
        }
    }

    /// Object type name the entry points at, as `ls-tree` prints it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Directory => "tree",
            Self::Submodule => "commit",
            _ => "blob",
        }
    }
}

/// One `<mode> <name>\0<20-byte id>` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Mode as written in the tree, e.g. `100644` or `40000`.
    pub mode: String,
    /// Entry file name. Git allows any bytes except `/` and NUL.
    pub name: BString,
    /// Object the entry points at.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Returns the entry kind derived from its mode.
    pub fn kind(&self) -> Result<EntryKind> {
        EntryKind::from_mode(&self.mode)
    }

    /// Orders entries the way git stores them: byte order on the name, with
    /// a directory compared as if its name ended in `/`.
    pub fn git_cmp(&self, other: &Self) -> Ordering {
        sort_key(self).cmp(sort_key(other))
    }
}

fn sort_key(entry: &TreeEntry) -> impl Iterator<Item = u8> + '_ {
    let slash = matches!(entry.kind(), Ok(EntryKind::Directory)).then_some(b'/');
    entry.name.iter().copied().chain(slash)
}

/// A parsed tree object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    /// Entries in stored order.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Parses raw tree content.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let space = find(data, pos, b' ')
                .ok_or_else(|| invalid_tree(pos, "missing space after mode"))?;
            let nul = find(data, space + 1, 0)
                .ok_or_else(|| invalid_tree(pos, "unterminated entry name"))?;
            let id_end = nul + 1 + ObjectId::LEN;
            if id_end > data.len() {
                return Err(invalid_tree(pos, "truncated object id"));
            }

            let mode = std::str::from_utf8(&data[pos..space])
                .map_err(|_| invalid_tree(pos, "mode is not ascii"))?;
            let name = &data[space + 1..nul];
            if name.is_empty() {
                return Err(invalid_tree(pos, "empty entry name"));
            }

            entries.push(TreeEntry {
                mode: mode.to_string(),
                name: BString::from(name),
                id: ObjectId::from_slice(&data[nul + 1..id_end])?,
            });
            pos = id_end;
        }

        Ok(Self { entries })
    }

    /// Serialises entries back to raw tree content.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Sorts entries into git's canonical tree order.
    pub fn sort(&mut self) {
        self.entries.sort_by(TreeEntry::git_cmp);
    }
}

fn find(data: &[u8], from: usize, byte: u8) -> Option<usize> {
    data[from..].iter().position(|&b| b == byte).map(|i| from + i)
}

fn invalid_tree(pos: usize, what: &str) -> StorageError {
    StorageError::InvalidObject(format!("tree entry at byte {}: {}", pos, what))
}

/// Extracts the root tree id from commit content (its first `tree` header).
pub fn commit_tree_id(data: &[u8]) -> Result<ObjectId> {
    let text = String::from_utf8_lossy(data);
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(hex) = line.strip_prefix("tree ") {
            return ObjectId::from_hex(hex.trim());
        }
    }
    Err(StorageError::InvalidObject(
        "commit has no tree header".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GitObject;

    fn entry(mode: &str, name: &str, byte: u8) -> TreeEntry {
        TreeEntry {
            mode: mode.to_string(),
            name: name.into(),
            id: ObjectId::from_bytes([byte; 20]),
        }
    }

    #[test]
    fn test_tree_parse_roundtrip() {
        let tree = Tree {
            entries: vec![
                entry("100644", "README.md", 1),
                entry("40000", "src", 2),
                entry("100755", "run.sh", 3),
            ],
        };
        let parsed = Tree::parse(&tree.to_bytes()).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(parsed.entries[1].kind().unwrap(), EntryKind::Directory);
        assert_eq!(parsed.entries[2].kind().unwrap(), EntryKind::Executable);
    }

    #[test]
    fn test_tree_parse_empty() {
        assert!(Tree::parse(b"").unwrap().entries.is_empty());
    }

    #[test]
    fn test_tree_parse_truncated() {
        let mut bytes = Tree {
            entries: vec![entry("100644", "a", 1)],
        }
        .to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(Tree::parse(&bytes).is_err());
        assert!(Tree::parse(b"100644 name-without-nul").is_err());
        assert!(Tree::parse(b"100644").is_err());
    }

    #[test]
    fn test_entry_kinds() {
        assert_eq!(EntryKind::from_mode("120000").unwrap(), EntryKind::Symlink);
        assert_eq!(EntryKind::from_mode("160000").unwrap(), EntryKind::Submodule);
        assert_eq!(EntryKind::from_mode("040000").unwrap(), EntryKind::Directory);
        assert!(EntryKind::from_mode("777").is_err());
        assert_eq!(EntryKind::Submodule.type_name(), "commit");
        assert_eq!(EntryKind::File.type_name(), "blob");
    }

    #[test]
    fn test_commit_tree_id() {
        let tree_id = ObjectId::from_bytes([4u8; 20]);
        let commit = GitObject::commit(&tree_id, &[], "A <a@b> 0 +0000", "A <a@b> 0 +0000", "m");
        assert_eq!(commit_tree_id(&commit.data).unwrap(), tree_id);
        assert!(commit_tree_id(b"author nobody\n\nmessage").is_err());
    }

    #[test]
    fn test_tree_parse_non_utf8_name() {
        let mut bytes = b"100644 caf\xe9.txt\0".to_vec();
        bytes.extend_from_slice(&[7u8; 20]);

        let tree = Tree::parse(&bytes).unwrap();
        assert_eq!(tree.entries[0].name, BString::from(&b"caf\xe9.txt"[..]));
        assert_eq!(tree.to_bytes(), bytes);
    }

    #[test]
    fn test_sort_orders_directories_with_trailing_slash() {
        let mut tree = Tree {
            entries: vec![
                entry("100644", "foo.c", 1),
                entry("40000", "foo", 2),
                entry("100644", "foo-bar", 3),
                entry("100644", "Zebra", 4),
            ],
        };
        tree.sort();
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.to_string()).collect();
        // '-' (0x2d) < '.' (0x2e) < '/' (0x2f)
        assert_eq!(names, ["Zebra", "foo-bar", "foo.c", "foo"]);
    }
}
