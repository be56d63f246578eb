//! Core data models for the product catalog.
//!
//! Row types map to SQLite tables via `sqlx::FromRow`; view types serialize
//! as camelCase JSON via `serde`.

pub mod category;
pub mod product;
