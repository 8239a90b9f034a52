//! Filter module — banned-term matching, persistence and administration.

pub mod admin;
pub mod engine;
pub mod store;

pub use admin::{FilterAdmin, FilterError};
pub use engine::{ContentFilter, FilterHit, Term, TermId};
pub use store::{JsonTermStore, MemoryTermStore, StoreError, TermStore};
