//! Server half of the procurement tracker: a single `/api/data`
//! resource that reads and replaces the entire dataset as one
//! snapshot, backed by either a flat JSON file or SQLite.

pub mod config;
pub mod error;
pub mod legacy;
pub mod rest;
pub mod storage;
