//! Persistence of the fingerprint key table.
//!
//! Stored fingerprints are only comparable with fingerprints computed from
//! the same keys, so the table is drawn once per database and read back on
//! every later open.

use chess::FingerprintKeys;
use sqlx::SqlitePool;

use super::helpers::{decode_fingerprint, encode_fingerprint};
use crate::error::{Error, Result};

/// Load the database's key table, generating and storing one first if the
/// database has none.
pub async fn load_or_create_keys(pool: &SqlitePool) -> Result<FingerprintKeys> {
    if let Some(keys) = load_keys(pool).await? {
        return Ok(keys);
    }

    let fresh = FingerprintKeys::generate(&mut rand::thread_rng());
    let mut tx = pool.begin().await?;
    // A concurrent opener may have stored its table first; OR IGNORE keeps
    // whichever table landed first and the re-read below returns it.
    for (slot, key) in fresh.to_words().iter().enumerate() {
        sqlx::query("INSERT OR IGNORE INTO fingerprint_keys (slot, key) VALUES (?, ?)")
            .bind(slot as i64)
            .bind(encode_fingerprint(*key))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    tracing::info!(keys = FingerprintKeys::LEN, "Generated fingerprint key table");

    load_keys(pool).await?.ok_or(Error::CorruptKeyTable {
        expected: FingerprintKeys::LEN,
        found: 0,
    })
}

/// Read the stored key table. `Ok(None)` when the table is empty.
async fn load_keys(pool: &SqlitePool) -> Result<Option<FingerprintKeys>> {
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT slot, key FROM fingerprint_keys ORDER BY slot")
            .fetch_all(pool)
            .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let corrupt = Error::CorruptKeyTable {
        expected: FingerprintKeys::LEN,
        found: rows.len(),
    };
    if rows
        .iter()
        .enumerate()
        .any(|(i, (slot, _))| *slot != i as i64)
    {
        return Err(corrupt);
    }

    let words: Vec<u64> = rows.into_iter().map(|(_, key)| decode_fingerprint(key)).collect();
    FingerprintKeys::from_words(&words).map(Some).ok_or(corrupt)
}
