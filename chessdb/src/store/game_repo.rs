//! Games and their positions.

use std::collections::{BTreeMap, HashMap};

use chess::{CastlingRights, GameResult, Piece, PieceColor, Square};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::helpers::{encode_fingerprint, encode_side, now_timestamp};
use crate::error::Result;
use crate::index::index_occupied;

/// PGN header fields kept with every game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub round: Option<String>,
    pub white: String,
    pub black: String,
    pub result: String,
    pub white_elo: Option<i64>,
    pub black_elo: Option<i64>,
    pub eco: Option<String>,
    pub opening: Option<String>,
    pub variation: Option<String>,
}

impl GameMetadata {
    /// Build metadata from PGN tag pairs. Missing player names become `?`
    /// and an unrecognised result becomes `*`.
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let text = |name: &str| {
            tags.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let elo = |name: &str| tags.get(name).and_then(|v| v.trim().parse::<i64>().ok());

        Self {
            event: text("Event"),
            site: text("Site"),
            date: text("Date"),
            round: text("Round"),
            white: text("White").unwrap_or_else(|| "?".to_string()),
            black: text("Black").unwrap_or_else(|| "?".to_string()),
            result: tags
                .get("Result")
                .and_then(|r| GameResult::from_token(r.trim()))
                .unwrap_or_default()
                .as_str()
                .to_string(),
            white_elo: elo("WhiteElo"),
            black_elo: elo("BlackElo"),
            eco: text("ECO"),
            opening: text("Opening"),
            variation: text("Variation"),
        }
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.white, self.black)
    }
}

/// A position ready to be stored, with its derived keys already computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosition {
    pub move_number: u32,
    pub move_san: Option<String>,
    pub board: String,
    pub side_to_move: PieceColor,
    pub castling: CastlingRights,
    pub fingerprint: u64,
    pub material_signature: String,
    pub occupied: Vec<(Square, Piece)>,
}

/// A fully decoded game ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub metadata: GameMetadata,
    pub moves: Vec<String>,
    pub start_fen: Option<String>,
    pub positions: Vec<NewPosition>,
}

/// A stored game as returned by lookups and searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: i64,
    #[serde(flatten)]
    pub metadata: GameMetadata,
    pub moves: String,
    pub start_fen: Option<String>,
    pub created_at: i64,
}

#[derive(sqlx::FromRow)]
struct GameRow {
    id: i64,
    event: Option<String>,
    site: Option<String>,
    date: Option<String>,
    round: Option<String>,
    white: String,
    black: String,
    result: String,
    white_elo: Option<i64>,
    black_elo: Option<i64>,
    eco: Option<String>,
    opening: Option<String>,
    variation: Option<String>,
    moves: String,
    start_fen: Option<String>,
    created_at: i64,
}

impl From<GameRow> for GameRecord {
    fn from(r: GameRow) -> Self {
        Self {
            id: r.id,
            metadata: GameMetadata {
                event: r.event,
                site: r.site,
                date: r.date,
                round: r.round,
                white: r.white,
                black: r.black,
                result: r.result,
                white_elo: r.white_elo,
                black_elo: r.black_elo,
                eco: r.eco,
                opening: r.opening,
                variation: r.variation,
            },
            moves: r.moves,
            start_fen: r.start_fen,
            created_at: r.created_at,
        }
    }
}

const GAME_COLUMNS: &str = "id, event, site, date, round, white, black, result, white_elo, \
     black_elo, eco, opening, variation, moves, start_fen, created_at";

/// Counts and size of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub games: u64,
    pub positions: u64,
    pub index_rows: u64,
    pub database_size_bytes: u64,
}

/// Write one game with its positions and index rows under a savepoint of
/// the caller's transaction. On failure only this game is rolled back.
pub async fn insert_game(conn: &mut SqliteConnection, game: &NewGame) -> Result<i64> {
    let mut savepoint = conn.begin().await?;
    match write_game(&mut savepoint, game).await {
        Ok(game_id) => {
            savepoint.commit().await?;
            Ok(game_id)
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e)
        }
    }
}

async fn write_game(conn: &mut SqliteConnection, game: &NewGame) -> Result<i64> {
    let m = &game.metadata;
    let game_id = sqlx::query(
        r#"
        INSERT INTO games
            (event, site, date, round, white, black, result, white_elo,
             black_elo, eco, opening, variation, moves, start_fen, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&m.event)
    .bind(&m.site)
    .bind(&m.date)
    .bind(&m.round)
    .bind(&m.white)
    .bind(&m.black)
    .bind(&m.result)
    .bind(m.white_elo)
    .bind(m.black_elo)
    .bind(&m.eco)
    .bind(&m.opening)
    .bind(&m.variation)
    .bind(game.moves.join(" "))
    .bind(&game.start_fen)
    .bind(now_timestamp())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for position in &game.positions {
        let position_id = sqlx::query(
            r#"
            INSERT INTO positions
                (game_id, move_number, move_san, board, side_to_move,
                 castling, fingerprint, material_signature)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id)
        .bind(position.move_number as i64)
        .bind(&position.move_san)
        .bind(&position.board)
        .bind(encode_side(position.side_to_move))
        .bind(position.castling.to_string())
        .bind(encode_fingerprint(position.fingerprint))
        .bind(&position.material_signature)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        index_occupied(&mut *conn, position_id, &position.occupied).await?;
    }

    Ok(game_id)
}

/// Fetch the games with the given ids, keyed by id. Unknown ids are skipped.
pub async fn fetch_games(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, GameRecord>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {GAME_COLUMNS} FROM games WHERE id IN ("));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows: Vec<GameRow> = query.build_query_as().fetch_all(&mut *conn).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.id, GameRecord::from(row)))
        .collect())
}

/// Pool-level operations on stored games.
#[derive(Clone, Debug)]
pub struct GameRepository {
    pool: SqlitePool,
}

impl GameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load_game(&self, id: i64) -> Result<Option<GameRecord>> {
        let row: Option<GameRow> =
            sqlx::query_as(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(GameRecord::from))
    }

    /// Delete a game; its positions and index rows go with it. Returns
    /// whether the game existed.
    pub async fn delete_game(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM games WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        tracing::info!(game_id = id, deleted, "Delete game");
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let (games, positions, index_rows): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM games),
                   (SELECT COUNT(*) FROM positions),
                   (SELECT COUNT(*) FROM piece_locations)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let (size,): (i64,) = sqlx::query_as(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            games: games as u64,
            positions: positions as u64,
            index_rows: index_rows as u64,
            database_size_bytes: size as u64,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::Database;
    use chess::{FingerprintKeys, StandardReplayer};

    /// Decode a SAN move list into a storable game, using fixed keys.
    pub(crate) fn sample_game(white: &str, black: &str, moves: &[&str]) -> NewGame {
        let moves: Vec<String> = moves.iter().map(|s| s.to_string()).collect();
        let mut tags = BTreeMap::new();
        tags.insert("White".to_string(), white.to_string());
        tags.insert("Black".to_string(), black.to_string());
        tags.insert("Result".to_string(), "*".to_string());
        crate::ingest::decode_game(
            &StandardReplayer,
            &FingerprintKeys::from_seed(7),
            crate::ingest::RawGame {
                tags,
                moves,
                start_fen: None,
            },
        )
        .unwrap()
    }

    async fn insert(db: &Database, game: &NewGame) -> i64 {
        let mut tx = db.pool().begin().await.unwrap();
        let id = insert_game(&mut tx, game).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[test]
    fn metadata_from_tags() {
        let tags: BTreeMap<String, String> = [
            ("White", "Carlsen"),
            ("WhiteElo", "2850"),
            ("BlackElo", "n/a"),
            ("Result", "1/2-1/2"),
            ("ECO", "C65"),
            ("Site", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let meta = GameMetadata::from_tags(&tags);
        assert_eq!(meta.white, "Carlsen");
        assert_eq!(meta.black, "?");
        assert_eq!(meta.white_elo, Some(2850));
        assert_eq!(meta.black_elo, None);
        assert_eq!(meta.result, "1/2-1/2");
        assert_eq!(meta.eco.as_deref(), Some("C65"));
        assert_eq!(meta.site, None);
        assert_eq!(meta.label(), "Carlsen vs ?");
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let db = Database::new_in_memory().await.unwrap();
        let game = sample_game("Alice", "Bob", &["e4", "e5", "Nf3"]);
        let id = insert(&db, &game).await;

        let repo = GameRepository::new(db.pool().clone());
        let loaded = repo.load_game(id).await.unwrap().unwrap();
        assert_eq!(loaded.metadata.white, "Alice");
        assert_eq!(loaded.moves, "e4 e5 Nf3");

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.games, 1);
        assert_eq!(stats.positions, 4);
        // 32 pieces in each of the four positions.
        assert_eq!(stats.index_rows, 4 * 32);
        assert!(stats.database_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_failed_game_rolls_back_only_itself() {
        let db = Database::new_in_memory().await.unwrap();
        let good = sample_game("Alice", "Bob", &["d4"]);
        let mut bad = sample_game("Carol", "Dave", &["e4"]);
        // Duplicate move number violates UNIQUE (game_id, move_number).
        bad.positions[1].move_number = 0;

        let mut tx = db.pool().begin().await.unwrap();
        assert!(insert_game(&mut tx, &good).await.is_ok());
        assert!(insert_game(&mut tx, &bad).await.is_err());
        tx.commit().await.unwrap();

        let stats = GameRepository::new(db.pool().clone()).stats().await.unwrap();
        assert_eq!(stats.games, 1);
        assert_eq!(stats.positions, 2);
        assert_eq!(stats.index_rows, 64);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = Database::new_in_memory().await.unwrap();
        let keep = insert(&db, &sample_game("A", "B", &["e4"])).await;
        let gone = insert(&db, &sample_game("C", "D", &["d4", "d5"])).await;

        let repo = GameRepository::new(db.pool().clone());
        assert!(repo.delete_game(gone).await.unwrap());
        assert!(!repo.delete_game(gone).await.unwrap());

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.games, 1);
        assert_eq!(stats.positions, 2);
        assert_eq!(stats.index_rows, 64);
        assert!(repo.load_game(keep).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fetch_games_by_id() {
        let db = Database::new_in_memory().await.unwrap();
        let a = insert(&db, &sample_game("A", "B", &["e4"])).await;
        let b = insert(&db, &sample_game("C", "D", &["d4"])).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let games = fetch_games(&mut conn, &[a, b, 999]).await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[&b].metadata.white, "C");
        assert!(fetch_games(&mut conn, &[]).await.unwrap().is_empty());
    }
}
