//! Fault-injecting backend used by the commit protocol tests.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stowage_types::StorageKey;

use crate::backend::{Backend, Finalize, WriteTarget};
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryBackend;
use crate::storage::Storage;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Faults {
    /// `acquire` fails before yielding an id.
    pub acquire: bool,
    /// `release` fails after the blob was persisted.
    pub release: bool,
    pub remove: bool,
    pub write: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub acquire: AtomicUsize,
    pub release: AtomicUsize,
    pub remove: AtomicUsize,
    /// Raw ids passed to `remove`, in call order.
    pub removed: Mutex<Vec<String>>,
}

impl Calls {
    pub fn acquires(&self) -> usize {
        self.acquire.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.release.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.remove.load(Ordering::SeqCst)
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.removed.lock().expect("lock poisoned").clone()
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Io(io::Error::other(format!("injected {what} fault")))
}

pub(crate) struct FaultyBackend {
    inner: InMemoryBackend,
    faults: Faults,
    calls: Arc<Calls>,
}

impl Backend for FaultyBackend {
    fn kind(&self) -> &str {
        "faulty"
    }

    fn open_write(&self) -> StoreResult<WriteTarget> {
        let WriteTarget { sink, finalizer } = self.inner.open_write()?;
        let sink: Box<dyn Write + Send> = if self.faults.write {
            Box::new(FailingSink)
        } else {
            sink
        };
        Ok(WriteTarget {
            sink,
            finalizer: Box::new(FaultyFinalizer {
                inner: finalizer,
                faults: self.faults,
                calls: Arc::clone(&self.calls),
            }),
        })
    }

    fn open_read(&self, raw_id: &str) -> StoreResult<Box<dyn Read + Send>> {
        self.inner.open_read(raw_id)
    }

    fn remove(&self, raw_id: &str) -> StoreResult<()> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.calls
            .removed
            .lock()
            .expect("lock poisoned")
            .push(raw_id.to_string());
        if self.faults.remove {
            return Err(injected("remove"));
        }
        self.inner.remove(raw_id)
    }
}

struct FaultyFinalizer {
    inner: Box<dyn Finalize>,
    faults: Faults,
    calls: Arc<Calls>,
}

impl Finalize for FaultyFinalizer {
    fn acquire(&mut self) -> StoreResult<String> {
        self.calls.acquire.fetch_add(1, Ordering::SeqCst);
        if self.faults.acquire {
            return Err(injected("acquire"));
        }
        self.inner.acquire()
    }

    fn release(&mut self) -> StoreResult<()> {
        self.calls.release.fetch_add(1, Ordering::SeqCst);
        self.inner.release()?;
        if self.faults.release {
            return Err(injected("release"));
        }
        Ok(())
    }
}

struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("injected write fault"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A storage keyed `k1` over a fresh in-memory backend.
pub(crate) fn memory_storage() -> (Storage, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    let storage = Storage::new(StorageKey::new("k1").unwrap(), backend.clone());
    (storage, backend)
}

/// A storage keyed `k1` whose backend injects `faults`.
pub(crate) fn faulty_storage(faults: Faults) -> (Storage, InMemoryBackend, Arc<Calls>) {
    let inner = InMemoryBackend::new();
    let calls = Arc::new(Calls::default());
    let backend = FaultyBackend {
        inner: inner.clone(),
        faults,
        calls: Arc::clone(&calls),
    };
    let storage = Storage::new(StorageKey::new("k1").unwrap(), backend);
    (storage, inner, calls)
}
