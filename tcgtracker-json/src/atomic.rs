use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Replaces `path` with `bytes` via a synced temp file and a rename, so a
/// reader sees either the old contents or the new, never a mix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    write_atomic_with(path, bytes, |_| Ok(()))
}

fn write_atomic_with<F>(path: &Path, bytes: &[u8], before_rename: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    // Same directory as the target so the rename stays on one filesystem.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    before_rename(tmp.path())?;

    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(dir);
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn failure_before_rename_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        write_atomic(&path, b"{\"good\": true}").unwrap();

        let err = write_atomic_with(&path, b"{\"half\":", |_| {
            Err(io::Error::new(io::ErrorKind::Other, "simulated crash"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "simulated crash");

        assert_eq!(fs::read(&path).unwrap(), b"{\"good\": true}");
        // The temp file is cleaned up on drop.
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
