//! Inverted index over `(square, piece)`.
//!
//! Every stored position has exactly one `piece_locations` row per occupied
//! square. Rows are never updated: re-indexing deletes a position's rows and
//! inserts them again. Searches are rendered from a typed [`QueryPlan`] by
//! [`compile_query`]; maintenance lives in [`maintenance`].

pub mod maintenance;
mod plan;
mod planner;

use chess::{decode_occupied_squares, Piece, Square};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::Result;

pub use plan::{GameFilter, PlanNode, QueryPlan};
pub use planner::{
    compile_game_query, compile_positions_query, compile_query, CompiledQuery, Page, SearchSql,
    SqlParam,
};

/// Insert the index rows of a stored position from its board encoding.
/// Returns the number of rows written.
pub async fn index_position(
    conn: &mut SqliteConnection,
    position_id: i64,
    board: &str,
) -> Result<usize> {
    let occupied = decode_occupied_squares(board)?;
    index_occupied(conn, position_id, &occupied).await
}

/// Replace the index rows of a position. Runs inside the caller's
/// transaction.
pub async fn reindex_position(
    conn: &mut SqliteConnection,
    position_id: i64,
    board: &str,
) -> Result<usize> {
    let occupied = decode_occupied_squares(board)?;
    sqlx::query("DELETE FROM piece_locations WHERE position_id = ?")
        .bind(position_id)
        .execute(&mut *conn)
        .await?;
    index_occupied(conn, position_id, &occupied).await
}

/// Insert one row per already-decoded occupied square.
pub(crate) async fn index_occupied(
    conn: &mut SqliteConnection,
    position_id: i64,
    occupied: &[(Square, Piece)],
) -> Result<usize> {
    if occupied.is_empty() {
        return Ok(0);
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO piece_locations (position_id, square, piece) ");
    query.push_values(occupied, |mut row, (square, piece)| {
        row.push_bind(position_id)
            .push_bind(square.index() as i64)
            .push_bind(piece.symbol().to_string());
    });
    query.build().execute(&mut *conn).await?;
    Ok(occupied.len())
}

/// Number of index rows currently stored for a position.
pub async fn row_count(conn: &mut SqliteConnection, position_id: i64) -> Result<usize> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM piece_locations WHERE position_id = ?")
            .bind(position_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use sqlx::Connection;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR";

    async fn seed_position(conn: &mut SqliteConnection) -> i64 {
        let game_id = sqlx::query(
            "INSERT INTO games (white, black, result, moves, created_at) VALUES ('A', 'B', '*', 'e4', 0)",
        )
        .execute(&mut *conn)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO positions (game_id, move_number, board, side_to_move, castling, fingerprint, material_signature)
             VALUES (?, 1, ?, 'b', 'KQkq', 0, '')",
        )
        .bind(game_id)
        .bind(AFTER_E4)
        .execute(&mut *conn)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_rows_match_occupied_squares() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let position_id = seed_position(&mut conn).await;

        assert_eq!(index_position(&mut conn, position_id, AFTER_E4).await.unwrap(), 32);
        assert_eq!(row_count(&mut conn, position_id).await.unwrap(), 32);

        let (piece,): (String,) = sqlx::query_as(
            "SELECT piece FROM piece_locations WHERE position_id = ? AND square = ?",
        )
        .bind(position_id)
        .bind(Square::parse("e4").unwrap().index() as i64)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(piece, "P");
    }

    #[tokio::test]
    async fn test_reindex_replaces_rows() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let position_id = seed_position(&mut conn).await;

        index_position(&mut conn, position_id, AFTER_E4).await.unwrap();
        index_position(&mut conn, position_id, AFTER_E4).await.unwrap();
        assert_eq!(row_count(&mut conn, position_id).await.unwrap(), 64);

        let mut tx = conn.begin().await.unwrap();
        reindex_position(&mut tx, position_id, AFTER_E4).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(row_count(&mut conn, position_id).await.unwrap(), 32);
    }

    #[tokio::test]
    async fn test_bad_board_writes_nothing() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let position_id = seed_position(&mut conn).await;

        assert!(reindex_position(&mut conn, position_id, "8/8/8").await.is_err());
        assert_eq!(row_count(&mut conn, position_id).await.unwrap(), 0);
    }
}
