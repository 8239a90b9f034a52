//! Admin — moderator-facing operations on the banned-term list.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::engine::{ContentFilter, Term, TermId};
use super::store::{StoreError, TermStore};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Term must not be empty")]
    EmptyTerm,
    #[error("Term is {len} characters long, the minimum is {min}")]
    TermTooShort { len: usize, min: usize },
    #[error("Failed to build term matcher: {0}")]
    Build(#[from] aho_corasick::BuildError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Keeps the in-memory filter and the persistent store in step.
pub struct FilterAdmin {
    filter: Arc<ContentFilter>,
    store: Arc<dyn TermStore>,
    min_term_length: usize,
}

impl FilterAdmin {
    /// Load every stored term into a fresh filter.
    pub fn load(store: Arc<dyn TermStore>, min_term_length: usize) -> Result<Self, FilterError> {
        let terms = store.load()?;
        let count = terms.len();
        let filter = ContentFilter::with_terms(terms)?;
        info!("Loaded {} banned terms ({} active)", count, filter.len());

        Ok(Self {
            filter: Arc::new(filter),
            store,
            min_term_length,
        })
    }

    pub fn filter(&self) -> Arc<ContentFilter> {
        Arc::clone(&self.filter)
    }

    /// Ban a term. `Ok(false)` when it is already banned.
    pub fn add_term(&self, text: &str) -> Result<bool, FilterError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FilterError::EmptyTerm);
        }
        let len = text.chars().count();
        if len < self.min_term_length {
            return Err(FilterError::TermTooShort { len, min: self.min_term_length });
        }

        let Some(id) = self.filter.add(text)? else {
            return Ok(false);
        };

        let term = Term { id, text: text.to_string() };
        if let Err(e) = self.store.insert(&term) {
            warn!("Failed to persist banned term #{}, rolling back: {}", id, e);
            if let Err(rollback) = self.filter.remove(id) {
                error!("Rollback of banned term #{} failed: {}", id, rollback);
            }
            return Err(e.into());
        }

        info!("Banned term #{} added", id);
        Ok(true)
    }

    /// Lift a ban. `Ok(false)` for unknown ids.
    pub fn remove_term(&self, id: TermId) -> Result<bool, FilterError> {
        if !self.filter.contains_id(id) {
            return Ok(false);
        }

        self.store.delete(id)?;
        let removed = self.filter.remove(id)?;
        if removed {
            info!("Banned term #{} removed", id);
        }
        Ok(removed)
    }

    pub fn list_terms(&self) -> Vec<Term> {
        let mut terms = self.filter.terms();
        terms.sort_by_key(|t| t.id);
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::store::MemoryTermStore;

    fn admin_with(store: Arc<MemoryTermStore>) -> FilterAdmin {
        FilterAdmin::load(store, 4).unwrap()
    }

    #[test]
    fn test_load_mirrors_store() {
        let store = Arc::new(MemoryTermStore::with_terms(vec![
            Term { id: 5, text: "warez".into() },
            Term { id: 2, text: "keygen".into() },
        ]));
        let admin = admin_with(store);

        let ids: Vec<TermId> = admin.list_terms().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert!(admin.filter().find_first("free KEYGEN here").is_some());
    }

    #[test]
    fn test_add_term_persists() {
        let store = Arc::new(MemoryTermStore::new());
        let admin = admin_with(Arc::clone(&store));

        assert!(admin.add_term("  crack  ").unwrap());
        assert!(!admin.add_term("CRACK").unwrap());

        let stored = store.load().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "crack");
    }

    #[test]
    fn test_add_term_duplicate_is_not_an_error() {
        let admin = admin_with(Arc::new(MemoryTermStore::new()));
        assert!(admin.add_term("keygen").unwrap());
        let again = admin.add_term("KeyGen");
        assert!(matches!(again, Ok(false)), "Duplicate must be Ok(false), got {:?}", again);
        assert_eq!(admin.list_terms().len(), 1);
    }

    #[test]
    fn test_add_term_too_short() {
        let admin = admin_with(Arc::new(MemoryTermStore::new()));
        let err = admin.add_term("abc").unwrap_err();
        assert!(matches!(err, FilterError::TermTooShort { len: 3, min: 4 }));
        assert!(matches!(admin.add_term("   "), Err(FilterError::EmptyTerm)));
        assert!(admin.list_terms().is_empty());
    }

    #[test]
    fn test_add_term_rolls_back_on_store_failure() {
        let store = Arc::new(MemoryTermStore::new());
        let admin = admin_with(Arc::clone(&store));
        store.set_fail_writes(true);

        assert!(matches!(admin.add_term("pirated"), Err(FilterError::Store(_))));
        assert!(admin.filter().find_first("pirated copy").is_none());
        assert!(admin.list_terms().is_empty());
    }

    #[test]
    fn test_remove_term() {
        let store = Arc::new(MemoryTermStore::new());
        let admin = admin_with(Arc::clone(&store));
        admin.add_term("pirated").unwrap();
        let id = admin.list_terms()[0].id;

        assert!(!admin.remove_term(id + 100).unwrap());
        assert!(admin.remove_term(id).unwrap());
        assert!(store.load().unwrap().is_empty());
        assert!(admin.filter().find_first("pirated").is_none());
    }
}
