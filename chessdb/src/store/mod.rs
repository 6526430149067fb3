//! SQLite-backed game and position store.
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** and a busy timeout, so the ingestion writers can share the
//!   database with concurrent readers.
//! - **Foreign keys enabled**, so deleting a game removes its positions and
//!   their index rows.
//! - **Embedded migrations** from `migrations/`, applied on open.
//!
//! The fingerprint key table is stored alongside the games; see
//! [`load_or_create_keys`].

mod database;
mod fingerprint_keys;
pub(crate) mod game_repo;
pub(crate) mod helpers;

pub use database::Database;
pub use fingerprint_keys::load_or_create_keys;
pub use game_repo::{
    fetch_games, insert_game, GameMetadata, GameRecord, GameRepository, NewGame, NewPosition,
    StoreStats,
};
