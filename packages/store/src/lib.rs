//! Saksflyt Store: Transactional Case Persistence
//!
//! SQLite-backed store for cases, documents, rule results, users and the
//! append-only audit trail, plus the `case_locks` table backing the
//! at-most-one-processing invariant.
//!
//! Conventions: ids are uuid-v4 TEXT, timestamps are fixed-width RFC 3339
//! TEXT (lexicographically sortable), structured bags are JSON TEXT.
//! Status transitions are validated against the case graph inside the same
//! transaction that applies them.

pub mod audit;
pub mod cases;
pub mod documents;
pub mod lock;
pub mod schema;
pub mod store;
pub mod users;

pub use cases::{CasePatch, DerivedFields, NewCase};
pub use documents::NewDocument;
pub use lock::CaseLock;
pub use store::Store;
