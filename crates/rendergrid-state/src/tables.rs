//! redb table definitions for the RenderGrid registry.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Deployed workers keyed by `{region}/{name}`.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Uploaded sites keyed by `{region}/{site_name}`.
pub const SITES: TableDefinition<&str, &[u8]> = TableDefinition::new("sites");

/// Render records keyed by `{job_id}`.
pub const RENDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("renders");
