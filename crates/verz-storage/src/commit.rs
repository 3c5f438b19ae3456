//! Commit content parsing.

use crate::{ObjectId, Result, StorageError};
use bstr::{BString, ByteSlice};

/// An author or committer line: `Name <email> <seconds> <+hhmm>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub time: i64,
    /// Offset from UTC in minutes.
    pub offset_minutes: i32,
}

impl Signature {
    /// Parses the value of an `author` or `committer` header.
    pub fn parse(value: &[u8]) -> Result<Self> {
        let invalid = || {
            StorageError::InvalidObject(format!("malformed signature: {:?}", value.as_bstr()))
        };

        let open = value.find_byte(b'<').ok_or_else(invalid)?;
        let close = value[open..]
            .find_byte(b'>')
            .map(|i| open + i)
            .ok_or_else(invalid)?;

        let mut fields = value[close + 1..].fields();
        let time = fields
            .next()
            .and_then(|t| t.to_str().ok()?.parse::<i64>().ok())
            .ok_or_else(invalid)?;
        let offset_minutes = fields.next().and_then(parse_offset).ok_or_else(invalid)?;

        Ok(Self {
            name: value[..open].trim().into(),
            email: value[open + 1..close].into(),
            time,
            offset_minutes,
        })
    }
}

/// `+hhmm` / `-hhmm` to minutes.
fn parse_offset(raw: &[u8]) -> Option<i32> {
    let (sign, digits) = match raw.split_first()? {
        (b'+', rest) => (1, rest),
        (b'-', rest) => (-1, rest),
        _ => return None,
    };
    if digits.len() != 4 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value: i32 = digits.to_str().ok()?.parse().ok()?;
    Some(sign * (value / 100 * 60 + value % 100))
}

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Parents in header order; the first is the mainline.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Everything after the blank line that ends the headers.
    pub message: BString,
}

impl Commit {
    /// Parses raw commit content.
    ///
    /// Headers this type does not model (`gpgsig`, `encoding`, `mergetag`,
    /// their continuation lines) are skipped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (headers, message) = match data.find(b"\n\n") {
            Some(at) => (&data[..at], &data[at + 2..]),
            None => (data, &b""[..]),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            let Some((key, value)) = line.split_once_str(" ") else {
                continue;
            };
            match key {
                b"tree" => tree = Some(parse_id(value)?),
                b"parent" => parents.push(parse_id(value)?),
                b"author" => author = Some(Signature::parse(value)?),
                b"committer" => committer = Some(Signature::parse(value)?),
                _ => {}
            }
        }

        let missing = |header: &str| {
            StorageError::InvalidObject(format!("commit has no {} header", header))
        };
        Ok(Self {
            tree: tree.ok_or_else(|| missing("tree"))?,
            parents,
            author: author.ok_or_else(|| missing("author"))?,
            committer: committer.ok_or_else(|| missing("committer"))?,
            message: message.into(),
        })
    }
}

fn parse_id(value: &[u8]) -> Result<ObjectId> {
    let hex = value
        .to_str()
        .map_err(|_| StorageError::InvalidObject("object id is not ascii".to_string()))?;
    ObjectId::from_hex(hex.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GitObject;

    const AUTHOR: &str = "A U Thor <author@example.com> 1700000000 +0130";
    const COMMITTER: &str = "C O Mitter <committer@example.com> 1700000100 -0800";

    #[test]
    fn test_parse_commit() {
        let tree = ObjectId::from_bytes([1u8; 20]);
        let parents = [ObjectId::from_bytes([2u8; 20]), ObjectId::from_bytes([3u8; 20])];
        let object = GitObject::commit(&tree, &parents, AUTHOR, COMMITTER, "merge\n\nbody\n");

        let commit = Commit::parse(&object.data).unwrap();
        assert_eq!(commit.tree, tree);
        assert_eq!(commit.parents, parents);
        assert_eq!(commit.author.name, "A U Thor");
        assert_eq!(commit.author.email, "author@example.com");
        assert_eq!(commit.author.time, 1_700_000_000);
        assert_eq!(commit.author.offset_minutes, 90);
        assert_eq!(commit.committer.offset_minutes, -480);
        assert_eq!(commit.message, "merge\n\nbody\n");
    }

    #[test]
    fn test_parse_skips_unknown_headers() {
        let data = format!(
            "tree {}\nauthor {}\ncommitter {}\ngpgsig -----BEGIN PGP SIGNATURE-----\n \n -----END PGP SIGNATURE-----\n\nsigned\n",
            ObjectId::from_bytes([5u8; 20]),
            AUTHOR,
            AUTHOR
        );
        let commit = Commit::parse(data.as_bytes()).unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(commit.message, "signed\n");
    }

    #[test]
    fn test_parse_missing_headers() {
        assert!(Commit::parse(b"author x <y> 0 +0000\n\nmsg").is_err());
        let no_author = format!("tree {}\n\nmsg", ObjectId::from_bytes([5u8; 20]));
        assert!(Commit::parse(no_author.as_bytes()).is_err());
    }

    #[test]
    fn test_signature_rejects_garbage() {
        assert!(Signature::parse(b"nobody").is_err());
        assert!(Signature::parse(b"A <a@b> soon +0000").is_err());
        assert!(Signature::parse(b"A <a@b> 0 0000").is_err());
    }
}
