//! presence-store: SQLite persistence for the attendance pipeline.
//!
//! One [`Store`] implements all three pipeline collaborators: the
//! candidate source, the camera directory and the idempotent ledger. The
//! ledger's per-day uniqueness is a `UNIQUE` constraint hit by a single
//! conditional insert, so concurrent writers never race.

pub mod sample;
mod schema;
mod store;

pub use store::Store;
