use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use crate::backend::{Backend, Finalize, WriteTarget};
use crate::error::{StoreError, StoreResult};

type BlobMap = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. Clones share the same blobs. A write is
/// buffered privately and only becomes readable once its finalizer is
/// acquired. Removal is immediate.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    blobs: BlobMap,
}

impl InMemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no blob is committed.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if a blob is committed under this raw id.
    pub fn contains(&self, raw_id: &str) -> bool {
        self.blobs
            .read()
            .expect("lock poisoned")
            .contains_key(raw_id)
    }

    /// Total bytes across all committed blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.len() as u64)
            .sum()
    }
}

impl Backend for InMemoryBackend {
    fn kind(&self) -> &str {
        "memory"
    }

    fn open_write(&self) -> StoreResult<WriteTarget> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let finalizer = MemoryFinalizer {
            raw_id: Uuid::new_v4().simple().to_string(),
            buffer: Arc::clone(&buffer),
            blobs: Arc::clone(&self.blobs),
        };
        Ok(WriteTarget::new(SharedBuffer(buffer), finalizer))
    }

    fn open_read(&self, raw_id: &str) -> StoreResult<Box<dyn Read + Send>> {
        let map = self.blobs.read().expect("lock poisoned");
        let blob = map
            .get(raw_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(raw_id))?;
        Ok(Box::new(Cursor::new(blob)))
    }

    fn remove(&self, raw_id: &str) -> StoreResult<()> {
        let mut map = self.blobs.write().expect("lock poisoned");
        match map.remove(raw_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(raw_id)),
        }
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("blob_count", &self.len())
            .finish()
    }
}

/// Write sink appending to a buffer shared with the finalizer.
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemoryFinalizer {
    raw_id: String,
    buffer: Arc<Mutex<Vec<u8>>>,
    blobs: BlobMap,
}

impl Finalize for MemoryFinalizer {
    fn acquire(&mut self) -> StoreResult<String> {
        let data = std::mem::take(&mut *self.buffer.lock().expect("lock poisoned"));
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(self.raw_id.clone(), Arc::from(data));
        Ok(self.raw_id.clone())
    }

    fn release(&mut self) -> StoreResult<()> {
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        buffer.clear();
        buffer.shrink_to_fit();
        Ok(())
    }
}
