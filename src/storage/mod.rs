//! Storage layer: the SQLite topology store and tabular exports.

pub mod db;
pub mod export;

pub use db::{Store, SampleInsert};
