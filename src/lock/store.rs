//! Lock file persistence.
//!
//! Writers hold an exclusive advisory lock on the lock file for the whole
//! truncate-and-write; readers hold a shared one. Two mooring processes
//! resolving the same project therefore never interleave bytes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use fs4::fs_std::FileExt;

use crate::lock::record::{LockFileError, LockRecord};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LockFileError + '_ {
    move |source| LockFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the lock record at `path`. `Ok(None)` when there is no file.
pub fn read_lock(path: &Path) -> Result<Option<LockRecord>, LockFileError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };

    FileExt::lock_shared(&file).map_err(io_error(path))?;
    let mut content = String::new();
    let read = file.read_to_string(&mut content);
    let _ = FileExt::unlock(&file);
    read.map_err(io_error(path))?;

    LockRecord::parse(&content, path).map(Some)
}

/// Write `record` to `path`, replacing any previous content.
pub fn write_lock(path: &Path, record: &LockRecord) -> Result<(), LockFileError> {
    let content = record.to_toml_string()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(path))?;
    }

    // Truncation happens only once the lock is held.
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(io_error(path))?;

    FileExt::lock_exclusive(&file).map_err(io_error(path))?;
    let written = file
        .set_len(0)
        .and_then(|_| file.write_all(content.as_bytes()))
        .and_then(|_| file.sync_all());
    let _ = FileExt::unlock(&file);
    written.map_err(io_error(path))?;

    tracing::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BackendId, DependencyManifest, TargetTriple};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(version: &str) -> LockRecord {
        let mut manifest = DependencyManifest::new(BackendId::Conan, TargetTriple::host());
        manifest.insert("fmt", version, "/p/fmt");
        LockRecord::from_manifest(&manifest)
    }

    #[test]
    fn test_missing_lock_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_lock(&tmp.path().join("Mooring.conan.lock"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Mooring.conan.lock");

        write_lock(&path, &record("10.2.1")).unwrap();
        // A shorter record must not leave trailing bytes behind.
        let shorter = record("9");
        write_lock(&path, &shorter).unwrap();

        assert_eq!(read_lock(&path).unwrap(), Some(shorter));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Mooring.conan.lock");
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(matches!(
            read_lock(&path),
            Err(LockFileError::Parse { .. })
        ));
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let tmp = TempDir::new().unwrap();
        let path = Arc::new(tmp.path().join("Mooring.conan.lock"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = Arc::clone(&path);
                std::thread::spawn(move || {
                    write_lock(&path, &record(&format!("{}.0.0", i))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whichever writer won, the file parses and its hash checks out.
        assert!(read_lock(&path).unwrap().is_some());
    }
}
