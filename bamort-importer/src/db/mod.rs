//! Database access for bamort-importer
//!
//! Writes take `&mut SqliteConnection` so they run on whatever transaction
//! the caller holds; read-only lookups for the HTTP layer take the pool.

pub mod catalog;
pub mod characters;
pub mod game_systems;
pub mod history;
