//! CLI command implementations.

use crate::settings::Config;
use chrono::{DateTime, FixedOffset};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use verz_git::{find_git_dir, init_empty, GitError, HttpTransport};
use verz_storage::{
    commit_tree_id, Commit, GitObject, LooseStore, ObjectId, ObjectStore, ObjectType, RefStore,
    Signature, StorageError, Tree,
};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// What `cat-file` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatMode {
    /// Object content (`-p`).
    Pretty,
    /// Object type (`-t`).
    Type,
    /// Content size (`-s`).
    Size,
}

/// Options for `ls-tree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsTreeOptions {
    /// Descend into subtrees (`-r`).
    pub recursive: bool,
    /// Print paths only (`--name-only`).
    pub name_only: bool,
}

/// Clone a repository.
pub fn clone(url: &str, dir: Option<&Path>, config: &Config) -> Result<()> {
    let root = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_clone_dir(url)?,
    };
    tracing::info!(url = %url, path = %root.display(), "Cloning repository");

    let transport = HttpTransport::new(&config.transport_options())?;
    let outcome = verz_git::clone(&transport, url, &root, &config.clone_options())?;

    println!(
        "Cloned {} into {} ({} objects, {} at {})",
        url,
        root.display(),
        outcome.summary.objects,
        outcome.branch,
        outcome.head
    );
    Ok(())
}

/// Directory a clone lands in when none is given: the last URL path
/// segment without a `.git` suffix.
pub fn default_clone_dir(url: &str) -> Result<PathBuf> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() || name.contains(':') || name == "." || name == ".." {
        return Err(CliError::InvalidArgument(format!(
            "cannot derive a directory name from {url}; pass one explicitly"
        )));
    }
    Ok(PathBuf::from(name))
}

/// Initialize a new repository.
pub fn init(dir: Option<&Path>) -> Result<()> {
    let root = dir.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(root)?;
    let git_dir = init_empty(root)?;

    tracing::info!(path = %git_dir.display(), "Initialized repository");
    println!("Initialized empty verz repository in {}", git_dir.display());
    Ok(())
}

/// Print an object's content, type or size.
pub fn cat_file(start: &Path, mode: CatMode, object: &str, out: &mut dyn Write) -> Result<()> {
    let store = open_store(start)?;
    let id = parse_id(object)?;
    let object = store.read(&id)?;

    match mode {
        CatMode::Type => writeln!(out, "{}", object.object_type)?,
        CatMode::Size => writeln!(out, "{}", object.size())?,
        CatMode::Pretty if object.object_type == ObjectType::Tree => {
            let tree = Tree::parse(&object.data)?;
            print_tree(&store, &tree, "", LsTreeOptions::default(), out)?;
        }
        CatMode::Pretty => out.write_all(&object.data)?,
    }
    Ok(())
}

/// Print the blob id of a file, storing it when `write` is set.
pub fn hash_object(start: &Path, file: &Path, write: bool, out: &mut dyn Write) -> Result<()> {
    let content = fs::read(file)?;
    let id = if write {
        open_store(start)?.write(ObjectType::Blob, &content)?
    } else {
        GitObject::blob(content).id
    };
    writeln!(out, "{id}")?;
    Ok(())
}

/// List the entries of a tree, or of a commit's root tree.
pub fn ls_tree(
    start: &Path,
    object: &str,
    options: LsTreeOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let store = open_store(start)?;
    let mut object = store.read(&parse_id(object)?)?;
    if object.object_type == ObjectType::Commit {
        object = store.read(&commit_tree_id(&object.data)?)?;
    }
    if object.object_type != ObjectType::Tree {
        return Err(CliError::InvalidArgument(format!(
            "{} is a {}, not a tree",
            object.id, object.object_type
        )));
    }

    print_tree(&store, &Tree::parse(&object.data)?, "", options, out)
}

/// Store the working tree (everything beside `.git`) and print the root
/// tree id.
pub fn write_tree(start: &Path, out: &mut dyn Write) -> Result<()> {
    let git_dir = find_git_dir(start)?;
    let root = git_dir.parent().unwrap_or(start);
    let id = verz_git::write_tree(&LooseStore::open(&git_dir), root)?;
    writeln!(out, "{id}")?;
    Ok(())
}

/// Print the first-parent history of HEAD, newest first.
pub fn log(start: &Path, max_count: Option<usize>, out: &mut dyn Write) -> Result<()> {
    let git_dir = find_git_dir(start)?;
    let mut next = match RefStore::new(&git_dir).resolve_head() {
        Ok(id) => Some(id),
        Err(StorageError::RefNotFound(_)) => {
            writeln!(out, "No commits yet.")?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let store = LooseStore::open(&git_dir);

    let mut shown = 0;
    while let Some(id) = next {
        if max_count.is_some_and(|max| shown >= max) {
            break;
        }
        let object = store.read(&id)?;
        if object.object_type != ObjectType::Commit {
            return Err(CliError::InvalidArgument(format!(
                "{id} is a {}, not a commit",
                object.object_type
            )));
        }
        let commit = Commit::parse(&object.data)?;

        writeln!(out, "commit {id}")?;
        writeln!(out, "Author: {} <{}>", commit.author.name, commit.author.email)?;
        writeln!(out, "Date:   {}", format_date(&commit.author))?;
        writeln!(out)?;
        for line in String::from_utf8_lossy(&commit.message).lines() {
            writeln!(out, "    {line}")?;
        }
        writeln!(out)?;

        next = commit.parents.first().copied();
        shown += 1;
    }
    Ok(())
}

/// Git's default date format, in the signature's own time zone.
fn format_date(signature: &Signature) -> String {
    let minutes = signature.offset_minutes;
    let zone = format!(
        "{}{:02}{:02}",
        if minutes < 0 { '-' } else { '+' },
        minutes.abs() / 60,
        minutes.abs() % 60
    );

    let local = FixedOffset::east_opt(minutes * 60).and_then(|offset| {
        DateTime::from_timestamp(signature.time, 0).map(|utc| utc.with_timezone(&offset))
    });
    match local {
        Some(time) => format!("{} {zone}", time.format("%a %b %-d %H:%M:%S %Y")),
        None => format!("{} {zone}", signature.time),
    }
}

fn print_tree(
    store: &LooseStore,
    tree: &Tree,
    prefix: &str,
    options: LsTreeOptions,
    out: &mut dyn Write,
) -> Result<()> {
    for entry in &tree.entries {
        let kind = entry.kind()?;
        let path = format!("{prefix}{}", entry.name);

        if options.recursive && kind == verz_storage::EntryKind::Directory {
            let subtree = store.read(&entry.id)?;
            print_tree(
                store,
                &Tree::parse(&subtree.data)?,
                &format!("{path}/"),
                options,
                out,
            )?;
            continue;
        }

        if options.name_only {
            writeln!(out, "{path}")?;
        } else {
            writeln!(
                out,
                "{:0>6} {} {}\t{}",
                entry.mode,
                kind.type_name(),
                entry.id,
                path
            )?;
        }
    }
    Ok(())
}

fn open_store(start: &Path) -> Result<LooseStore> {
    Ok(LooseStore::open(find_git_dir(start)?))
}

fn parse_id(hex: &str) -> Result<ObjectId> {
    ObjectId::from_hex(hex)
        .map_err(|_| CliError::InvalidArgument(format!("not a valid object name: {hex}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verz_storage::TreeEntry;

    const SIG: &str = "A U Thor <author@example.com> 1700000000 +0000";

    fn repo() -> (TempDir, LooseStore) {
        let dir = TempDir::new().unwrap();
        init(Some(dir.path())).unwrap();
        let store = LooseStore::open(dir.path().join(".git"));
        (dir, store)
    }

    fn output(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// Commit -> { README, src/ -> { main.rs } }
    fn sample(store: &LooseStore) -> (ObjectId, ObjectId) {
        let readme = store.write(ObjectType::Blob, b"hi\n").unwrap();
        let main = store.write(ObjectType::Blob, b"fn main() {}\n").unwrap();
        let src = Tree {
            entries: vec![TreeEntry {
                mode: "100644".to_string(),
                name: "main.rs".into(),
                id: main,
            }],
        };
        let src = store.write(ObjectType::Tree, &src.to_bytes()).unwrap();
        let root = Tree {
            entries: vec![
                TreeEntry {
                    mode: "100644".to_string(),
                    name: "README".into(),
                    id: readme,
                },
                TreeEntry {
                    mode: "40000".to_string(),
                    name: "src".into(),
                    id: src,
                },
            ],
        };
        let root = store.write(ObjectType::Tree, &root.to_bytes()).unwrap();
        let commit = store
            .put(&GitObject::commit(&root, &[], SIG, SIG, "init\n"))
            .unwrap();
        (commit, root)
    }

    #[test]
    fn test_default_clone_dir() {
        assert_eq!(
            default_clone_dir("https://github.com/owner/project.git").unwrap(),
            PathBuf::from("project")
        );
        assert_eq!(
            default_clone_dir("https://example.com/owner/project/").unwrap(),
            PathBuf::from("project")
        );
        assert!(default_clone_dir("https://").is_err());
        assert!(default_clone_dir("https://example.com/.git").is_err());
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = TempDir::new().unwrap();
        init(Some(dir.path())).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(dir.path().join(".git/objects").is_dir());
        assert!(init(Some(dir.path())).is_err());
    }

    #[test]
    fn test_hash_object() {
        let (dir, store) = repo();
        let file = dir.path().join("hello.txt");
        fs::write(&file, "hello\n").unwrap();

        let printed = output(|out| hash_object(dir.path(), &file, false, out));
        assert_eq!(printed, "ce013625030ba8dba906f756967f9e9ca394464a\n");
        let id = ObjectId::from_hex(printed.trim()).unwrap();
        assert!(!store.exists(&id));

        output(|out| hash_object(dir.path(), &file, true, out));
        assert!(store.exists(&id));
    }

    #[test]
    fn test_cat_file_modes() {
        let (dir, store) = repo();
        let id = store.write(ObjectType::Blob, b"content\n").unwrap();
        let hex = id.to_hex();

        assert_eq!(
            output(|out| cat_file(dir.path(), CatMode::Pretty, &hex, out)),
            "content\n"
        );
        assert_eq!(
            output(|out| cat_file(dir.path(), CatMode::Type, &hex, out)),
            "blob\n"
        );
        assert_eq!(
            output(|out| cat_file(dir.path(), CatMode::Size, &hex, out)),
            "8\n"
        );
    }

    #[test]
    fn test_cat_file_from_subdirectory() {
        let (dir, store) = repo();
        let id = store.write(ObjectType::Blob, b"nested").unwrap();
        let sub = dir.path().join("deep/er");
        fs::create_dir_all(&sub).unwrap();

        assert_eq!(
            output(|out| cat_file(&sub, CatMode::Pretty, &id.to_hex(), out)),
            "nested"
        );
    }

    #[test]
    fn test_cat_file_errors() {
        let (dir, _store) = repo();
        let mut sink = Vec::new();
        assert!(matches!(
            cat_file(dir.path(), CatMode::Type, "xyz", &mut sink),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(matches!(
            cat_file(dir.path(), CatMode::Type, &"1".repeat(40), &mut sink),
            Err(CliError::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn test_ls_tree() {
        let (dir, store) = repo();
        let (commit, root) = sample(&store);

        let listing = output(|out| ls_tree(dir.path(), &root.to_hex(), LsTreeOptions::default(), out));
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("100644 blob "));
        assert!(lines[0].ends_with("\tREADME"));
        assert!(lines[1].starts_with("040000 tree "));

        let names = output(|out| {
            ls_tree(
                dir.path(),
                &commit.to_hex(),
                LsTreeOptions {
                    recursive: true,
                    name_only: true,
                },
                out,
            )
        });
        assert_eq!(names, "README\nsrc/main.rs\n");
    }

    #[test]
    fn test_ls_tree_rejects_blob() {
        let (dir, store) = repo();
        let blob = store.write(ObjectType::Blob, b"x").unwrap();
        let mut sink = Vec::new();
        assert!(ls_tree(dir.path(), &blob.to_hex(), LsTreeOptions::default(), &mut sink).is_err());
    }

    #[test]
    fn test_outside_repository() {
        let dir = TempDir::new().unwrap();
        let mut sink = Vec::new();
        assert!(matches!(
            cat_file(dir.path(), CatMode::Type, &"1".repeat(40), &mut sink),
            Err(CliError::Git(GitError::Repository(_)))
        ));
    }

    #[test]
    fn test_write_tree_from_subdirectory() {
        let (dir, store) = repo();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/guide.md"), "# guide\n").unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();

        let printed = output(|out| write_tree(&dir.path().join("docs"), out));
        let id = ObjectId::from_hex(printed.trim()).unwrap();
        let tree = Tree::parse(&store.read(&id).unwrap().data).unwrap();
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, ["docs", "hello.txt"]);

        let options = LsTreeOptions {
            recursive: true,
            name_only: true,
        };
        let listing = output(|out| ls_tree(dir.path(), &id.to_hex(), options, out));
        assert_eq!(listing, "docs/guide.md\nhello.txt\n");
    }

    #[test]
    fn test_log_follows_first_parent() {
        let (dir, store) = repo();
        let (first, root) = sample(&store);
        let second = store
            .put(&GitObject::commit(&root, &[first], SIG, SIG, "second\n\nwith a body\n"))
            .unwrap();
        RefStore::new(dir.path().join(".git"))
            .set("refs/heads/main", second)
            .unwrap();

        let printed = output(|out| log(dir.path(), None, out));
        let expected = format!(
            "commit {second}\n\
             Author: A U Thor <author@example.com>\n\
             Date:   Tue Nov 14 22:13:20 2023 +0000\n\
             \n    second\n    \n    with a body\n\n\
             commit {first}\n\
             Author: A U Thor <author@example.com>\n\
             Date:   Tue Nov 14 22:13:20 2023 +0000\n\
             \n    init\n\n"
        );
        assert_eq!(printed, expected);

        let limited = output(|out| log(dir.path(), Some(1), out));
        assert_eq!(limited.matches("commit ").count(), 1);
    }

    #[test]
    fn test_log_unborn_branch() {
        let (dir, _store) = repo();
        assert_eq!(output(|out| log(dir.path(), None, out)), "No commits yet.\n");
    }

    #[test]
    fn test_format_date_uses_signature_zone() {
        let signature = Signature::parse(b"A <a@b> 1700000000 +0130").unwrap();
        assert_eq!(format_date(&signature), "Tue Nov 14 23:43:20 2023 +0130");
        let signature = Signature::parse(b"A <a@b> 1700000000 -0800").unwrap();
        assert_eq!(format_date(&signature), "Tue Nov 14 14:13:20 2023 -0800");
    }
}
