//! facet-store — SQLite persistence for the face clustering engine.
//!
//! Implements [`facet_core::ClusterStore`] on a single `rusqlite` connection.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;
