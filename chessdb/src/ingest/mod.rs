//! Concurrent ingestion pipeline.
//!
//! ```text
//! RawGame queue ──► decode workers ──► decoded queue ──► writer workers ──► SQLite
//!                   (spawn_blocking)                     (batch per writer)
//! ```
//!
//! Both stages are fixed-size task pools sharing a bounded queue. Each
//! writer owns its batch and flushes it in one transaction when it is full
//! or when the flush interval elapses; each game inside runs under its own
//! savepoint. Outcome counters move only after a commit, so a progress
//! snapshot never counts a game that could still be rolled back.

mod cancel;
mod progress;
mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;

use chess::{
    FenPosition, FingerprintKeys, MaterialSignature, MoveReplayer, PgnGame, STARTING_FEN,
};
use tokio::sync::{mpsc, Mutex};

use crate::config::ImportConfig;
use crate::error::Result;
use crate::store::{Database, GameMetadata, NewGame, NewPosition};

pub use cancel::CancelSignal;
pub use progress::{ImportProgress, ImportStatus, ImportSummary};
pub use worker::WriterState;

use progress::{ImportCounters, ProgressReporter};
use worker::{discard_pending, run_decode_worker, run_writer_worker, WriterConfig};

/// A game as it arrives from a reader: tags and moves, not yet replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGame {
    pub tags: BTreeMap<String, String>,
    pub moves: Vec<String>,
    pub start_fen: Option<String>,
}

impl RawGame {
    pub fn label(&self) -> String {
        format!(
            "{} vs {}",
            self.tags.get("White").map_or("?", String::as_str),
            self.tags.get("Black").map_or("?", String::as_str)
        )
    }
}

impl From<PgnGame> for RawGame {
    fn from(game: PgnGame) -> Self {
        let start_fen = game.start_fen().map(str::to_string);
        let mut tags = game.tags;
        tags.entry("Result".to_string())
            .or_insert_with(|| game.result.as_str().to_string());
        Self {
            tags,
            moves: game.moves,
            start_fen,
        }
    }
}

/// Replay a game and derive every stored key of every position.
pub fn decode_game<R: MoveReplayer + ?Sized>(
    replayer: &R,
    keys: &FingerprintKeys,
    raw: RawGame,
) -> Result<NewGame> {
    let replayed = replayer.replay(raw.start_fen.as_deref(), &raw.moves)?;

    let mut positions = Vec::with_capacity(replayed.len());
    for step in replayed {
        let fen = FenPosition::parse(&step.fen)?;
        let occupied = chess::decode_occupied_squares(&fen.placement)?;
        positions.push(NewPosition {
            move_number: step.move_number,
            move_san: step.san,
            fingerprint: keys.fingerprint(&fen.placement, fen.side_to_move, fen.castling)?,
            material_signature: MaterialSignature::of(&fen.placement)?.to_string(),
            side_to_move: fen.side_to_move,
            castling: fen.castling,
            board: fen.placement,
            occupied,
        });
    }

    // The standard start is implied; only a custom start is kept.
    let start_fen = raw.start_fen.filter(|f| f.trim() != STARTING_FEN);

    Ok(NewGame {
        metadata: GameMetadata::from_tags(&raw.tags),
        moves: raw.moves,
        start_fen,
        positions,
    })
}

/// Runs imports into one database.
pub struct ImportPipeline<R> {
    db: Database,
    keys: Arc<FingerprintKeys>,
    replayer: Arc<R>,
    config: ImportConfig,
    progress: Option<mpsc::Sender<ImportProgress>>,
}

impl<R: MoveReplayer> ImportPipeline<R> {
    pub fn new(db: Database, keys: Arc<FingerprintKeys>, replayer: R) -> Self {
        Self {
            db,
            keys,
            replayer: Arc::new(replayer),
            config: ImportConfig::default(),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive progress snapshots on `tx`. Snapshots are dropped when the
    /// channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<ImportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Ingest every game from `input` until it closes or `cancel` is raised.
    pub async fn run(&self, input: mpsc::Receiver<RawGame>, cancel: CancelSignal) -> ImportSummary {
        let config = self.config.clone().normalized();
        let counters = Arc::new(ImportCounters::default());
        let reporter = ProgressReporter::new(Arc::clone(&counters), self.progress.clone());

        tracing::info!(
            decode_workers = config.decode_workers,
            writer_workers = config.writer_workers,
            batch_size = config.batch_size,
            "Import started"
        );

        let input = Arc::new(Mutex::new(input));
        let (decoded_tx, decoded_rx) = mpsc::channel::<NewGame>(config.queue_capacity);
        let decoded_rx = Arc::new(Mutex::new(decoded_rx));

        let decoders: Vec<_> = (0..config.decode_workers)
            .map(|worker_id| {
                tokio::spawn(run_decode_worker(
                    worker_id,
                    Arc::clone(&input),
                    decoded_tx.clone(),
                    Arc::clone(&self.replayer),
                    Arc::clone(&self.keys),
                    cancel.clone(),
                    reporter.clone(),
                ))
            })
            .collect();
        // Writers see the queue close once every decoder has exited.
        drop(decoded_tx);

        let writer_config = WriterConfig {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
        };
        let writers: Vec<_> = (0..config.writer_workers)
            .map(|worker_id| {
                tokio::spawn(run_writer_worker(
                    worker_id,
                    Arc::clone(&decoded_rx),
                    self.db.pool().clone(),
                    writer_config,
                    cancel.clone(),
                    reporter.clone(),
                ))
            })
            .collect();

        for handle in decoders {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Decode worker panicked");
            }
        }

        let mut batch_errors = Vec::new();
        for handle in writers {
            match handle.await {
                Ok(errors) => batch_errors.extend(errors),
                Err(e) => batch_errors.push(format!("writer task failed: {e}")),
            }
        }

        // Writers stop receiving on cancel; whatever is still queued was
        // decoded but will never be written.
        counters.add_discarded(discard_pending(&decoded_rx).await);
        if counters.discarded() > 0 {
            tracing::warn!(discarded = counters.discarded(), "Decoded games dropped by cancellation");
        }

        reporter.report("");

        let status = match batch_errors.into_iter().next() {
            Some(error) => ImportStatus::Failed { error },
            None if cancel.is_cancelled() => ImportStatus::Cancelled,
            None => ImportStatus::Completed,
        };
        let summary = ImportSummary {
            status,
            imported: counters.imported(),
            failed: counters.failed(),
            discarded: counters.discarded(),
        };
        tracing::info!(
            status = ?summary.status,
            imported = summary.imported,
            failed = summary.failed,
            discarded = summary.discarded,
            "Import finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{load_or_create_keys, GameRepository};
    use chess::{ReplayError, ReplayedPosition, StandardReplayer};
    use std::time::Duration;

    fn raw(white: &str, moves: &[&str]) -> RawGame {
        let mut tags = BTreeMap::new();
        tags.insert("White".to_string(), white.to_string());
        tags.insert("Black".to_string(), "Opponent".to_string());
        RawGame {
            tags,
            moves: moves.iter().map(|s| s.to_string()).collect(),
            start_fen: None,
        }
    }

    fn small_config() -> ImportConfig {
        ImportConfig {
            decode_workers: 3,
            writer_workers: 2,
            batch_size: 4,
            flush_interval: Duration::from_millis(20),
            queue_capacity: 8,
            progress_capacity: 16,
        }
    }

    async fn pipeline() -> (Database, ImportPipeline<StandardReplayer>) {
        let db = Database::new_in_memory().await.unwrap();
        let keys = Arc::new(load_or_create_keys(db.pool()).await.unwrap());
        let pipeline = ImportPipeline::new(db.clone(), keys, StandardReplayer).with_config(small_config());
        (db, pipeline)
    }

    fn feed(games: Vec<RawGame>) -> mpsc::Receiver<RawGame> {
        let (tx, rx) = mpsc::channel(games.len().max(1));
        for game in games {
            tx.try_send(game).unwrap();
        }
        rx
    }

    #[test]
    fn test_decode_game_positions() {
        let keys = FingerprintKeys::from_seed(1);
        let game = decode_game(&StandardReplayer, &keys, raw("A", &["e4", "e5"])).unwrap();
        assert_eq!(game.positions.len(), 3);
        assert_eq!(game.positions[0].move_number, 0);
        assert_eq!(game.positions[0].move_san, None);
        assert_eq!(game.positions[1].board, "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR");
        assert_eq!(game.positions[1].side_to_move, chess::PieceColor::Black);
        assert_eq!(game.positions[2].occupied.len(), 32);
        assert_eq!(game.positions[0].material_signature, "08.02.02.02.01.01/08.02.02.02.01.01");
        assert_eq!(
            game.positions[1].fingerprint,
            keys.fingerprint_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap()
        );
        assert_eq!(game.metadata.white, "A");
        assert_eq!(game.start_fen, None);
    }

    #[test]
    fn test_decode_game_rejects_illegal_move() {
        let keys = FingerprintKeys::from_seed(1);
        let err = decode_game(&StandardReplayer, &keys, raw("A", &["e4", "e5", "Ke3"])).unwrap_err();
        assert!(matches!(err, crate::Error::Replay(_)));
    }

    #[test]
    fn test_raw_game_from_pgn() {
        let pgn = chess::parse_pgn("[White \"X\"]\n[FEN \"4k3/8/8/8/8/8/8/4K3 w - - 0 1\"]\n\n1. Kd2 1-0").unwrap();
        let raw = RawGame::from(pgn);
        assert_eq!(raw.start_fen.as_deref(), Some("4k3/8/8/8/8/8/8/4K3 w - - 0 1"));
        assert_eq!(raw.tags.get("Result").map(String::as_str), Some("1-0"));
        assert_eq!(raw.label(), "X vs ?");
    }

    #[tokio::test]
    async fn test_import_completes() {
        let (db, pipeline) = pipeline().await;
        let mut games: Vec<RawGame> = (0..10).map(|i| raw(&format!("P{i}"), &["e4", "e5", "Nf3"])).collect();
        games.push(raw("Broken", &["e4", "e4"]));
        games.push(raw("Also broken", &["Zz9"]));

        let summary = pipeline.run(feed(games), CancelSignal::new()).await;
        assert_eq!(summary.status, ImportStatus::Completed);
        assert_eq!(summary.imported, 10);
        assert_eq!(summary.failed, 2);

        let stats = GameRepository::new(db.pool().clone()).stats().await.unwrap();
        assert_eq!(stats.games, 10);
        assert_eq!(stats.positions, 40);
        assert_eq!(stats.index_rows, 40 * 32);
    }

    #[tokio::test]
    async fn test_progress_reports_final_snapshot() {
        let db = Database::new_in_memory().await.unwrap();
        let keys = Arc::new(load_or_create_keys(db.pool()).await.unwrap());
        let (tx, mut rx) = mpsc::channel(256);
        let pipeline = ImportPipeline::new(db, keys, StandardReplayer)
            .with_config(small_config())
            .with_progress(tx);

        let games = (0..5).map(|i| raw(&format!("P{i}"), &["d4"])).collect();
        let summary = pipeline.run(feed(games), CancelSignal::new()).await;
        drop(pipeline);

        let mut last = None;
        while let Some(snapshot) = rx.recv().await {
            assert_eq!(snapshot.total_processed, snapshot.imported + snapshot.failed);
            last = Some(snapshot);
        }
        let last = last.unwrap();
        assert_eq!(last.imported, summary.imported);
        assert_eq!(last.total_processed, 5);
    }

    /// Replayer that raises the cancel signal after a number of games.
    struct CancellingReplayer {
        cancel: CancelSignal,
        after: usize,
        seen: std::sync::atomic::AtomicUsize,
    }

    impl MoveReplayer for CancellingReplayer {
        fn replay(
            &self,
            start_fen: Option<&str>,
            moves: &[String],
        ) -> Result<Vec<ReplayedPosition>, ReplayError> {
            let seen = self.seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if seen == self.after {
                self.cancel.cancel();
            }
            StandardReplayer.replay(start_fen, moves)
        }
    }

    #[tokio::test]
    async fn test_cancel_keeps_committed_games_only() {
        let db = Database::new_in_memory().await.unwrap();
        let keys = Arc::new(load_or_create_keys(db.pool()).await.unwrap());
        let cancel = CancelSignal::new();
        let replayer = CancellingReplayer {
            cancel: cancel.clone(),
            after: 20,
            seen: Default::default(),
        };
        let pipeline = ImportPipeline::new(db.clone(), keys, replayer).with_config(small_config());

        let total = 200u64;
        let (tx, rx) = mpsc::channel(8);
        let producer = tokio::spawn(async move {
            for i in 0..total {
                if tx.send(raw(&format!("P{i}"), &["e4", "c5"])).await.is_err() {
                    break;
                }
            }
        });

        let summary = pipeline.run(rx, cancel).await;
        producer.abort();

        assert_eq!(summary.status, ImportStatus::Cancelled);
        assert!(summary.imported + summary.failed <= total);
        assert!(summary.imported < total);

        assert!(summary.imported + summary.failed + summary.discarded <= total);

        let stats = GameRepository::new(db.pool().clone()).stats().await.unwrap();
        assert_eq!(stats.games, summary.imported);
        assert_eq!(stats.positions, summary.imported * 3);
        assert_eq!(stats.index_rows, summary.imported * 3 * 32);
    }

    #[tokio::test]
    async fn test_cancel_counts_decoded_games_it_drops() {
        let db = Database::new_in_memory().await.unwrap();
        let keys = Arc::new(load_or_create_keys(db.pool()).await.unwrap());
        let cancel = CancelSignal::new();
        // The only game raises the cancel signal while it is being decoded,
        // so it is decoded but never reaches a writer.
        let replayer = CancellingReplayer {
            cancel: cancel.clone(),
            after: 1,
            seen: Default::default(),
        };
        let config = ImportConfig {
            decode_workers: 1,
            writer_workers: 1,
            ..small_config()
        };
        let pipeline = ImportPipeline::new(db.clone(), keys, replayer).with_config(config);

        let summary = pipeline.run(feed(vec![raw("Late", &["e4"])]), cancel).await;
        assert_eq!(summary.status, ImportStatus::Cancelled);
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.discarded, 1);
        assert_eq!(GameRepository::new(db.pool().clone()).stats().await.unwrap().games, 0);
    }

    #[tokio::test]
    async fn test_partial_batch_flushes_on_timer() {
        let db = Database::new_in_memory().await.unwrap();
        let keys = Arc::new(load_or_create_keys(db.pool()).await.unwrap());
        let config = ImportConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(30),
            ..small_config()
        };
        let pipeline = ImportPipeline::new(db.clone(), keys, StandardReplayer).with_config(config);
        let cancel = CancelSignal::new();

        let (tx, rx) = mpsc::channel(8);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { pipeline.run(rx, cancel).await }
        });

        // The input stays open, so only the flush timer can commit the game.
        tx.send(raw("Lonely", &["e4", "e5"])).await.unwrap();
        let repo = GameRepository::new(db.pool().clone());
        let mut games = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            games = repo.stats().await.unwrap().games;
            if games == 1 {
                break;
            }
        }
        assert_eq!(games, 1);

        cancel.cancel();
        let summary = run.await.unwrap();
        drop(tx);
        assert_eq!(summary.status, ImportStatus::Cancelled);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.discarded, 0);
    }

    #[tokio::test]
    async fn test_game_failures_roll_back_individually() {
        let (db, pipeline) = pipeline().await;
        // Index rows can no longer be written, so every game fails under
        // its savepoint while the batch transaction itself commits.
        sqlx::query("DROP TABLE piece_locations")
            .execute(db.pool())
            .await
            .unwrap();

        let games = (0..3).map(|i| raw(&format!("P{i}"), &["e4"])).collect();
        let summary = pipeline.run(feed(games), CancelSignal::new()).await;

        assert_eq!(summary.status, ImportStatus::Completed);
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.failed, 3);

        let (games,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM games")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(games, 0);
    }

    #[tokio::test]
    async fn test_transaction_failure_marks_import_failed() {
        let (db, pipeline) = pipeline().await;
        db.close().await;

        let games = (0..3).map(|i| raw(&format!("P{i}"), &["e4"])).collect();
        let summary = pipeline.run(feed(games), CancelSignal::new()).await;

        assert!(matches!(summary.status, ImportStatus::Failed { .. }));
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.failed, 3);
    }

    #[tokio::test]
    async fn test_custom_start_position_is_kept() {
        let (db, pipeline) = pipeline().await;
        let mut game = raw("Endgame", &["Kd2", "Kd7"]);
        game.start_fen = Some("4k3/8/8/8/8/8/8/4K3 w - - 0 1".to_string());

        let summary = pipeline.run(feed(vec![game]), CancelSignal::new()).await;
        assert_eq!(summary.imported, 1);

        let repo = GameRepository::new(db.pool().clone());
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM games")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let record = repo.load_game(id).await.unwrap().unwrap();
        assert_eq!(record.start_fen.as_deref(), Some("4k3/8/8/8/8/8/8/4K3 w - - 0 1"));
        assert_eq!(repo.stats().await.unwrap().index_rows, 3 * 2);
    }
}
