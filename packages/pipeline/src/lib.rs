//! Saksflyt Pipeline: Processing Orchestrator
//!
//! Executes per-case processing jobs: runs the extractor over unprocessed
//! documents, evaluates the rule engine, persists results and derived
//! fields, and drives the status transitions — all under a per-case
//! exclusive lock so at most one job touches a case at a time.
//!
//! A bounded worker pool consumes queued cases FIFO; a recovery sweeper
//! requeues cases whose lock holder died.

pub mod blob;
pub mod orchestrator;
pub mod worker;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use orchestrator::Orchestrator;
pub use worker::WorkerPool;
