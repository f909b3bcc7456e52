use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use crate::Result;

/// Handles disk I/O for the [`Store`](crate::engine::Store).
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data integrity.
/// The whole encoded envelope lives in a single file.
#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler for the file at `path`.
    ///
    /// If the parent directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. A missing file is `Ok(None)`, the first-run signal.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.path)
    }

    /// Replaces the file contents atomically.
    pub fn save(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path, bytes)
    }
}

pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `bytes` to a temporary file next to `path`, syncs it, and renames it
/// over `path`, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    log::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}
