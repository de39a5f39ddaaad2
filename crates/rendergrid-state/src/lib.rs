//! rendergrid-state: embedded registry for RenderGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the records that must
//! outlive a single process: deployed workers, uploaded sites, and render
//! progress snapshots.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{region}/{name}`) enable prefix scans per region.
//!
//! Worker creation goes through [`StateStore::put_worker_if_absent`], a
//! single write transaction that inserts only when the key is free. Every
//! racing creator after the first observes the stored record instead.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{InsertOutcome, StateStore};
pub use types::*;
