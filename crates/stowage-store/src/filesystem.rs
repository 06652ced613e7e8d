use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::backend::{Backend, Finalize, WriteTarget};
use crate::error::{StoreError, StoreResult};

/// Length of a raw id: a UUID in simple (hex, no dashes) form.
const RAW_ID_LEN: usize = 32;

fn is_raw_id(raw: &str) -> bool {
    raw.len() == RAW_ID_LEN && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Stores each blob as one file under a base directory.
///
/// On-disk layout, with a two-level fan-out to keep directories small:
/// ```text
/// <base_dir>/<raw[0..2]>/<raw[2..4]>/<raw>
/// ```
///
/// The file is written in place and `fsync`ed when the write is finalized.
/// Removal unlinks the file immediately. Concurrent writers never collide
/// because every write gets a fresh random id.
#[derive(Clone, Debug)]
pub struct FilesystemBackend {
    base_dir: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the blob file for a raw id, or `None` if the id is malformed.
    pub fn path_for(&self, raw_id: &str) -> Option<PathBuf> {
        if !is_raw_id(raw_id) {
            return None;
        }
        Some(
            self.base_dir
                .join(&raw_id[..2])
                .join(&raw_id[2..4])
                .join(raw_id),
        )
    }

    fn checked_path(&self, raw_id: &str) -> StoreResult<PathBuf> {
        self.path_for(raw_id)
            .ok_or_else(|| StoreError::not_found(raw_id))
    }
}

fn map_not_found(e: io::Error, raw_id: &str) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::not_found(raw_id)
    } else {
        StoreError::Io(e)
    }
}

/// Create the blob file at `path` and a second handle to it for writing.
///
/// If the second handle cannot be made, the new file is unlinked so no
/// unreachable blob is left behind.
fn create_blob_file<F>(path: &Path, duplicate: F) -> io::Result<(File, File)>
where
    F: FnOnce(&File) -> io::Result<File>,
{
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    match duplicate(&file) {
        Ok(sink) => Ok((file, sink)),
        Err(e) => {
            drop(file);
            if let Err(unlink) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %unlink, "failed to unlink blob file");
            }
            Err(e)
        }
    }
}

impl Backend for FilesystemBackend {
    fn kind(&self) -> &str {
        "filesystem"
    }

    fn open_write(&self) -> StoreResult<WriteTarget> {
        let raw_id = Uuid::new_v4().simple().to_string();
        let path = self.checked_path(&raw_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (file, sink) = create_blob_file(&path, File::try_clone)?;
        Ok(WriteTarget::new(
            sink,
            FileFinalizer {
                raw_id,
                file: Some(file),
            },
        ))
    }

    fn open_read(&self, raw_id: &str) -> StoreResult<Box<dyn Read + Send>> {
        let path = self.checked_path(raw_id)?;
        let file = File::open(&path).map_err(|e| map_not_found(e, raw_id))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn remove(&self, raw_id: &str) -> StoreResult<()> {
        let path = self.checked_path(raw_id)?;
        fs::remove_file(&path).map_err(|e| map_not_found(e, raw_id))
    }
}

struct FileFinalizer {
    raw_id: String,
    /// Second handle to the blob file; the sink holds the first.
    file: Option<File>,
}

impl Finalize for FileFinalizer {
    fn acquire(&mut self) -> StoreResult<String> {
        if let Some(file) = &self.file {
            file.sync_all()?;
        }
        Ok(self.raw_id.clone())
    }

    fn release(&mut self) -> StoreResult<()> {
        // Closing the last handle makes further writes impossible.
        drop(self.file.take());
        Ok(())
    }
}
