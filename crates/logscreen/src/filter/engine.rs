use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub type TermId = u64;

/// A banned term as stored by moderators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub text: String,
}

/// First hit of a lookup.
///
/// `span` is the byte range of the match inside the searched text. It is `None`
/// when the text had to be case-folded before the scan, since folding can shift
/// byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterHit {
    pub term: Term,
    pub span: Option<Range<usize>>,
}

#[derive(Debug, Default)]
pub struct FilterStats {
    pub lookups: AtomicU64,
    pub hits: AtomicU64,
    pub rebuilds: AtomicU64,
}

/// Immutable view of the term list together with the automaton compiled from it.
struct Snapshot {
    terms: Vec<Term>,
    /// Lowercased `terms[i].text`, same order as `terms`.
    folded: Vec<String>,
    automaton: Option<AhoCorasick>,
    /// Length in chars of the longest folded term.
    max_chars: usize,
}

/// Case fold used on both sides of a lookup. Final sigma depends on the
/// following character, so it is mapped to the plain form.
fn fold(text: &str) -> String {
    text.to_lowercase().replace('ς', "σ")
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            terms: Vec::new(),
            folded: Vec::new(),
            automaton: None,
            max_chars: 0,
        }
    }

    fn build(terms: Vec<Term>) -> Result<Self, BuildError> {
        let folded: Vec<String> = terms.iter().map(|t| fold(&t.text)).collect();
        let max_chars = folded.iter().map(|f| f.chars().count()).max().unwrap_or(0);
        let automaton = if folded.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&folded)?,
            )
        };
        Ok(Self { terms, folded, automaton, max_chars })
    }

    fn contains_folded(&self, folded: &str) -> bool {
        self.folded.iter().any(|f| f == folded)
    }

    fn contains_id(&self, id: TermId) -> bool {
        self.terms.iter().any(|t| t.id == id)
    }
}

/// Multi-pattern banned-term matcher.
///
/// Readers load the current snapshot without locking. Writers check the
/// snapshot first, then re-check under `write_lock`, rebuild the automaton and
/// publish the new snapshot with a single pointer swap. A reader racing a
/// writer sees either the old or the new snapshot, never a partial one.
pub struct ContentFilter {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
    next_id: AtomicU64,
    stats: FilterStats,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            stats: FilterStats::default(),
        }
    }

    /// Build a filter from persisted terms with a single rebuild.
    ///
    /// Case-insensitive duplicates are dropped (first one wins). New ids are
    /// allocated after the largest loaded id.
    pub fn with_terms(terms: impl IntoIterator<Item = Term>) -> Result<Self, BuildError> {
        let mut unique: Vec<Term> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for term in terms {
            let text = term.text.trim();
            if text.is_empty() {
                continue;
            }
            let folded = fold(text);
            if seen.contains(&folded) {
                tracing::warn!("Duplicate banned term #{} ignored: {}", term.id, text);
                continue;
            }
            seen.push(folded);
            unique.push(Term { id: term.id, text: text.to_string() });
        }

        let max_id = unique.iter().map(|t| t.id).max().unwrap_or(0);
        let filter = Self::new();
        filter.next_id.store(max_id + 1, Ordering::Relaxed);
        if !unique.is_empty() {
            filter.snapshot.store(Arc::new(Snapshot::build(unique)?));
            filter.stats.rebuilds.fetch_add(1, Ordering::Relaxed);
        }
        Ok(filter)
    }

    /// Insert a term. Returns the new id, or `None` when the term is empty or
    /// already present (case-insensitive). A failed rebuild leaves the
    /// previous snapshot in place.
    pub fn add(&self, text: &str) -> Result<Option<TermId>, BuildError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let folded = fold(text);

        // Lock-free fast path
        if self.snapshot.load().contains_folded(&folded) {
            return Ok(None);
        }

        let _guard = self.write_lock.lock();
        let current = self.snapshot.load_full();
        if current.contains_folded(&folded) {
            return Ok(None);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut terms = current.terms.clone();
        terms.push(Term { id, text: text.to_string() });
        self.publish(terms)?;
        Ok(Some(id))
    }

    /// Remove a term by id. Returns `Ok(false)` for unknown ids.
    pub fn remove(&self, id: TermId) -> Result<bool, BuildError> {
        if !self.snapshot.load().contains_id(id) {
            return Ok(false);
        }

        let _guard = self.write_lock.lock();
        let current = self.snapshot.load_full();
        if !current.contains_id(id) {
            return Ok(false);
        }

        let terms: Vec<Term> = current.terms.iter().filter(|t| t.id != id).cloned().collect();
        self.publish(terms)?;
        Ok(true)
    }

    /// First banned term found in `text` in automaton scan order.
    pub fn find_first(&self, text: &str) -> Option<Term> {
        self.find_first_hit(text).map(|hit| hit.term)
    }

    pub fn find_first_hit(&self, text: &str) -> Option<FilterHit> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.snapshot.load();
        let automaton = snapshot.automaton.as_ref()?;
        let text = text.trim_end();
        if text.is_empty() {
            return None;
        }

        let (found, span_valid) = if text.is_ascii() {
            (automaton.find(text), true)
        } else {
            let lowered = fold(text);
            (automaton.find(lowered.as_str()), false)
        };
        let found = found?;

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(FilterHit {
            term: snapshot.terms[found.pattern().as_usize()].clone(),
            span: span_valid.then(|| found.start()..found.end()),
        })
    }

    pub fn contains(&self, text: &str) -> bool {
        self.snapshot.load().contains_folded(&fold(text.trim()))
    }

    pub fn contains_id(&self, id: TermId) -> bool {
        self.snapshot.load().contains_id(id)
    }

    /// Length in chars of the longest term, 0 when empty. A match can span at
    /// most this many chars of unfolded text.
    pub fn max_term_chars(&self) -> usize {
        self.snapshot.load().max_chars
    }

    pub fn terms(&self) -> Vec<Term> {
        self.snapshot.load().terms.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of automaton rebuilds since creation.
    pub fn rebuild_count(&self) -> u64 {
        self.stats.rebuilds.load(Ordering::Relaxed)
    }

    /// (lookups, hits, rebuilds)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.lookups.load(Ordering::Relaxed),
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.rebuilds.load(Ordering::Relaxed),
        )
    }

    /// Must be called with `write_lock` held.
    fn publish(&self, terms: Vec<Term>) -> Result<(), BuildError> {
        let snapshot = Snapshot::build(terms).map_err(|e| {
            tracing::error!("Failed to rebuild content filter automaton: {}", e);
            e
        })?;
        self.snapshot.store(Arc::new(snapshot));
        self.stats.rebuilds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}
