//! Local-first tracker for water intake, running sessions and todos.
//! Everything is kept in a small key-value store on disk, fronted by a cache that batches writes.
//!

pub mod backup;
pub mod cli;
pub mod fs;
pub mod hydration;
pub mod running;
pub mod settings;
pub mod storage;
pub mod todo;
pub mod utils;
