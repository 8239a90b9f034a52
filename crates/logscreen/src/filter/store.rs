//! Store — persisted banned-term list.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::engine::{Term, TermId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Term store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Term store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable backing for the content filter.
///
/// Loaded once at startup; every mutation made through the admin surface is
/// written here before it is considered done.
pub trait TermStore: Send + Sync {
    fn load(&self) -> Result<Vec<Term>, StoreError>;
    fn insert(&self, term: &Term) -> Result<(), StoreError>;
    /// Returns `false` when no term had this id.
    fn delete(&self, id: TermId) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TermFile {
    terms: Vec<Term>,
}

/// JSON file store. Writes go to a sibling temp file which is then renamed
/// over the original.
pub struct JsonTermStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonTermStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<TermFile, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(TermFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TermFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &TermFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(file)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TermStore for JsonTermStore {
    fn load(&self) -> Result<Vec<Term>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.terms)
    }

    fn insert(&self, term: &Term) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        file.terms.retain(|t| t.id != term.id);
        file.terms.push(term.clone());
        self.write(&file)
    }

    fn delete(&self, id: TermId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        let before = file.terms.len();
        file.terms.retain(|t| t.id != id);
        if file.terms.len() == before {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }
}

/// In-memory store, mostly for tests and one-shot CLI runs.
#[derive(Default)]
pub struct MemoryTermStore {
    terms: Mutex<Vec<Term>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terms(terms: Vec<Term>) -> Self {
        Self {
            terms: Mutex::new(terms),
            ..Default::default()
        }
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(std::io::Error::other("store is read-only").into());
        }
        Ok(())
    }
}

impl TermStore for MemoryTermStore {
    fn load(&self) -> Result<Vec<Term>, StoreError> {
        Ok(self.terms.lock().clone())
    }

    fn insert(&self, term: &Term) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut terms = self.terms.lock();
        terms.retain(|t| t.id != term.id);
        terms.push(term.clone());
        Ok(())
    }

    fn delete(&self, id: TermId) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut terms = self.terms.lock();
        let before = terms.len();
        terms.retain(|t| t.id != id);
        Ok(terms.len() != before)
    }
}
