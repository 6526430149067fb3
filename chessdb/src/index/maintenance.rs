//! Index maintenance: full rebuild, repair of unindexed positions, and a
//! coverage report.
//!
//! Rebuild and repair run one transaction per game. A game that fails is
//! recorded in the report and the run continues with the next game.

use chess::decode_occupied_squares;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use super::{reindex_position, row_count};
use crate::error::{Error, Result};
use crate::store::Database;

/// Positions are scanned in keyset pages of this size.
const SCAN_CHUNK: i64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub games_processed: u64,
    pub positions_indexed: u64,
    pub rows_written: u64,
    pub failures: Vec<GameFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFailure {
    pub game_id: i64,
    pub error: String,
}

/// A position whose stored row count differs from its occupied squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInconsistency {
    pub position_id: i64,
    pub expected: usize,
    pub actual: usize,
}

impl From<IndexInconsistency> for Error {
    fn from(i: IndexInconsistency) -> Self {
        Error::IndexInconsistency {
            position_id: i.position_id,
            expected: i.expected,
            actual: i.actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub total_games: u64,
    pub total_positions: u64,
    pub total_rows: u64,
    pub indexed_positions: u64,
    /// Share of positions with at least one index row, in `[0, 1]`.
    pub coverage: f64,
    pub inconsistencies: Vec<IndexInconsistency>,
}

/// Drop every index row and rebuild the index from stored positions.
pub async fn rebuild_index(db: &Database) -> Result<MaintenanceReport> {
    let cleared = sqlx::query("DELETE FROM piece_locations")
        .execute(db.pool())
        .await?
        .rows_affected();
    tracing::info!(rows = cleared, "Cleared index");

    let game_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM games ORDER BY id")
        .fetch_all(db.pool())
        .await?;

    let report = reindex_games(db, game_ids.into_iter().map(|(id,)| id)).await;
    tracing::info!(
        games = report.games_processed,
        rows = report.rows_written,
        failures = report.failures.len(),
        "Index rebuild finished"
    );
    Ok(report)
}

/// Re-index only the games that have at least one position without rows.
pub async fn fix_missing_index(db: &Database) -> Result<MaintenanceReport> {
    let game_ids: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT p.game_id
        FROM positions p
        WHERE NOT EXISTS (SELECT 1 FROM piece_locations l WHERE l.position_id = p.id)
        ORDER BY p.game_id
        "#,
    )
    .fetch_all(db.pool())
    .await?;

    tracing::info!(games = game_ids.len(), "Repairing games with unindexed positions");
    let report = reindex_games(db, game_ids.into_iter().map(|(id,)| id)).await;
    tracing::info!(
        games = report.games_processed,
        failures = report.failures.len(),
        "Index repair finished"
    );
    Ok(report)
}

async fn reindex_games(db: &Database, game_ids: impl Iterator<Item = i64>) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();
    for game_id in game_ids {
        match reindex_game(db, game_id).await {
            Ok((positions, rows)) => {
                report.games_processed += 1;
                report.positions_indexed += positions;
                report.rows_written += rows;
            }
            Err(e) => {
                tracing::warn!(game_id, error = %e, "Failed to re-index game");
                report.failures.push(GameFailure {
                    game_id,
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

/// Re-index every position of one game in its own transaction, verifying
/// the row count of each position before committing.
async fn reindex_game(db: &Database, game_id: i64) -> Result<(u64, u64)> {
    let mut tx = db.pool().begin().await?;
    let positions: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, board FROM positions WHERE game_id = ? ORDER BY move_number")
            .bind(game_id)
            .fetch_all(&mut *tx)
            .await?;

    let mut rows = 0u64;
    for (position_id, board) in &positions {
        let written = reindex_position(&mut tx, *position_id, board).await?;
        verify_position(&mut tx, *position_id, written).await?;
        rows += written as u64;
    }
    tx.commit().await?;
    tracing::debug!(game_id, positions = positions.len(), rows, "Re-indexed game");
    Ok((positions.len() as u64, rows))
}

async fn verify_position(
    conn: &mut SqliteConnection,
    position_id: i64,
    expected: usize,
) -> Result<()> {
    let actual = row_count(conn, position_id).await?;
    if actual != expected {
        return Err(IndexInconsistency {
            position_id,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Summarize index coverage and list positions whose row count disagrees
/// with their board.
pub async fn coverage_report(db: &Database) -> Result<CoverageReport> {
    let (total_games, total_positions, total_rows, indexed_positions): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM games),
                   (SELECT COUNT(*) FROM positions),
                   (SELECT COUNT(*) FROM piece_locations),
                   (SELECT COUNT(DISTINCT position_id) FROM piece_locations)
            "#,
        )
        .fetch_one(db.pool())
        .await?;

    let mut inconsistencies = Vec::new();
    let mut after = 0i64;
    loop {
        let chunk: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT p.id, p.board,
                   (SELECT COUNT(*) FROM piece_locations l WHERE l.position_id = p.id)
            FROM positions p
            WHERE p.id > ?
            ORDER BY p.id
            LIMIT ?
            "#,
        )
        .bind(after)
        .bind(SCAN_CHUNK)
        .fetch_all(db.pool())
        .await?;

        let Some((last_id, _, _)) = chunk.last() else {
            break;
        };
        after = *last_id;

        for (position_id, board, actual) in chunk {
            // An undecodable board cannot have a correct index; report it
            // as expecting zero rows.
            let expected = decode_occupied_squares(&board).map_or(0, |o| o.len());
            if expected != actual as usize {
                inconsistencies.push(IndexInconsistency {
                    position_id,
                    expected,
                    actual: actual as usize,
                });
            }
        }
    }

    let coverage = if total_positions == 0 {
        1.0
    } else {
        indexed_positions as f64 / total_positions as f64
    };

    Ok(CoverageReport {
        total_games: total_games as u64,
        total_positions: total_positions as u64,
        total_rows: total_rows as u64,
        indexed_positions: indexed_positions as u64,
        coverage,
        inconsistencies,
    })
}
