//! Durable file materialization: atomic overwrite and create-if-absent.
//!
//! These two primitives are what makes regeneration crash-safe. An observer
//! of any destination path sees either the old content in full or the new
//! content in full, never a partial or truncated file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Replace the file at `path` with `content` atomically.
///
/// The content is first written to a temporary file in the destination's own
/// directory (same filesystem, so the final rename is atomic), then renamed
/// over the destination. If any step fails the temp file is removed and the
/// destination is left exactly as it was.
pub fn write_overwrite_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    // atomic rename over the destination; NamedTempFile cleans up on error
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create `path` with `content` only if no file exists there.
///
/// Returns `Ok(true)` when the file was written and `Ok(false)` when an
/// existing file was preserved untouched. The content is staged in a
/// same-directory temp file and linked into place with a no-clobber persist,
/// so the destination only ever appears fully written: a crash mid-write
/// cannot leave a truncated file that later runs would "preserve" forever,
/// and two concurrent callers cannot both win.
pub fn write_if_not_exists(path: &Path, content: &str) -> io::Result<bool> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overwrite_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/File.java");
        write_overwrite_atomic(&path, "class File {}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "class File {}");
    }

    #[test]
    fn test_overwrite_replaces_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("File.java");
        write_overwrite_atomic(&path, "old").unwrap();
        write_overwrite_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("File.java");
        write_overwrite_atomic(&path, "content").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_interrupted_overwrite_preserves_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("File.java");
        write_overwrite_atomic(&path, "original").unwrap();

        // replay the first half of the operation and stop before the rename,
        // as a crash between temp write and persist would
        {
            let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
            tmp.write_all(b"half-finished").unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        // the abandoned temp file must not linger either
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_create_if_absent_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Impl.java");
        assert!(write_if_not_exists(&path, "generated").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "generated");
    }

    #[test]
    fn test_interrupted_create_leaves_no_partial_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Impl.java");

        // replay a crash between staging and persist: the destination must
        // not exist, or the next run would preserve a truncated file forever
        {
            let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
            tmp.write_all(b"half-fin").unwrap();
        }
        assert!(!path.exists());

        // the next run creates the file with its full content
        assert!(write_if_not_exists(&path, "complete").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "complete");
    }

    #[test]
    fn test_existing_file_is_preserved_byte_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Impl.java");
        fs::write(&path, "hand edited\n// do not touch").unwrap();
        assert!(!write_if_not_exists(&path, "regenerated").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "hand edited\n// do not touch"
        );
    }

    #[test]
    fn test_write_failure_surfaces_io_error() {
        let dir = TempDir::new().unwrap();
        // destination parent is a regular file, so directory creation fails
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let path = blocker.join("File.java");
        assert!(write_overwrite_atomic(&path, "content").is_err());
    }
}
