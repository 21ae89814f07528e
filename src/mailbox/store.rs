use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::core::{Error, MailboxId, Result};

/// Record name for a mailbox
pub fn record_name(id: MailboxId) -> String {
    format!("mailbox{}.cfg", id)
}

/// Named text records on stable storage
pub trait Store {
    /// True if a record called `name` exists
    fn exists(&self, name: &str) -> bool;

    /// Reads the whole record
    fn read(&self, name: &str) -> Result<String>;

    /// Creates or replaces a record
    fn write(&mut self, name: &str, contents: &str) -> Result<()>;

    /// Removes a record; removing a missing record is not an error
    fn remove(&mut self, name: &str) -> Result<()>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn read(&self, name: &str) -> Result<String> {
        (**self).read(name)
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<()> {
        (**self).write(name, contents)
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        (**self).remove(name)
    }
}

/// One file per record in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Uses `dir`, creating it if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::storage(format!("Cannot create {}: {}", dir.display(), e)))?;
        Ok(FileStore { dir })
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Store for FileStore {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn read(&self, name: &str) -> Result<String> {
        fs::read_to_string(self.path(name))
            .map_err(|e| Error::storage(format!("Cannot read {}: {}", name, e)))
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<()> {
        debug!(record = name, "writing record");
        fs::write(self.path(name), contents)
            .map_err(|e| Error::storage(format!("Cannot write {}: {}", name, e)))
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!("Cannot remove {}: {}", name, e))),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryRecords {
    records: BTreeMap<String, String>,
    fail_writes: bool,
}

/// Records kept in memory, with switchable write failures; clones share
/// the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryRecords>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write (and remove) fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Copy of the stored records by name
    pub fn records(&self) -> BTreeMap<String, String> {
        self.lock().records.clone()
    }

    /// Inserts a record directly, bypassing failure injection
    pub fn insert(&self, name: &str, contents: &str) {
        self.lock().records.insert(name.to_string(), contents.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRecords> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.lock().records.contains_key(name)
    }

    fn read(&self, name: &str) -> Result<String> {
        self.lock()
            .records
            .get(name)
            .cloned()
            .ok_or_else(|| Error::storage(format!("No record {}", name)))
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(Error::storage("store is read-only"));
        }
        inner.records.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(Error::storage("store is read-only"));
        }
        inner.records.remove(name);
        Ok(())
    }
}
