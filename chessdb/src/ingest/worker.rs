use std::sync::Arc;
use std::time::Duration;

use chess::{FingerprintKeys, MoveReplayer};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, MissedTickBehavior};

use super::cancel::CancelSignal;
use super::progress::ProgressReporter;
use super::{decode_game, RawGame};
use crate::error::{Error, Result};
use crate::store::{insert_game, NewGame};

/// Lifecycle of an index writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No games held.
    Idle,
    /// Holding a partial batch.
    Accumulating,
    /// Writing the batch in one transaction.
    Flushing,
    /// Input closed or cancelled; writing what is left.
    Draining,
    Done,
}

/// Receive from a queue shared by a worker pool. Only one worker waits on
/// the queue at a time; the others wait on the lock.
async fn recv_shared<T>(rx: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    rx.lock().await.recv().await
}

/// Empty a queue whose consumers have stopped. Returns how many items were
/// still in it.
pub(crate) async fn discard_pending<T>(rx: &Mutex<mpsc::Receiver<T>>) -> u64 {
    let mut rx = rx.lock().await;
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

/// Replays games from the shared input queue and forwards the decoded
/// result to the writers. A game that fails to decode is counted failed and
/// skipped.
pub(crate) async fn run_decode_worker<R: MoveReplayer>(
    worker_id: usize,
    input: Arc<Mutex<mpsc::Receiver<RawGame>>>,
    output: mpsc::Sender<NewGame>,
    replayer: Arc<R>,
    keys: Arc<FingerprintKeys>,
    cancel: CancelSignal,
    progress: ProgressReporter,
) {
    tracing::debug!(worker_id, "Decode worker started");

    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id, "Decode worker cancelled");
                break;
            }
            raw = recv_shared(&input) => match raw {
                Some(raw) => raw,
                None => break,
            },
        };

        let label = raw.label();
        let replayer = Arc::clone(&replayer);
        let keys = Arc::clone(&keys);
        let decoded =
            tokio::task::spawn_blocking(move || decode_game(replayer.as_ref(), &keys, raw)).await;

        let game = match decoded {
            Ok(Ok(game)) => game,
            Ok(Err(e)) => {
                tracing::warn!(worker_id, game = %label, error = %e, "Skipping game that failed to decode");
                progress.counters().add_failed(1);
                progress.report(&label);
                continue;
            }
            Err(e) => {
                tracing::error!(worker_id, game = %label, error = %e, "Decode task panicked");
                progress.counters().add_failed(1);
                progress.report(&label);
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id, game = %label, "Decoded game discarded on cancel");
                progress.counters().add_discarded(1);
                break;
            }
            sent = output.send(game) => {
                if sent.is_err() {
                    tracing::debug!(worker_id, "Writers gone, decode worker exiting");
                    break;
                }
            }
        }
    }

    tracing::debug!(worker_id, "Decode worker finished");
}

/// Batching settings of a writer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

/// Owns one batch and writes it whenever it is full or the flush interval
/// elapses. Returns the errors of batch transactions that failed.
pub(crate) async fn run_writer_worker(
    worker_id: usize,
    input: Arc<Mutex<mpsc::Receiver<NewGame>>>,
    pool: SqlitePool,
    config: WriterConfig,
    cancel: CancelSignal,
    progress: ProgressReporter,
) -> Vec<String> {
    let mut writer = Writer {
        worker_id,
        pool,
        progress,
        batch: Vec::with_capacity(config.batch_size),
        state: WriterState::Idle,
        errors: Vec::new(),
    };

    let mut ticker = time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    tracing::debug!(worker_id, batch_size = config.batch_size, "Writer started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id, pending = writer.batch.len(), "Writer cancelled");
                break;
            }
            _ = ticker.tick() => {
                if !writer.batch.is_empty() {
                    writer.flush().await;
                }
            }
            game = recv_shared(&input) => match game {
                Some(game) => {
                    writer.batch.push(game);
                    writer.set_state(WriterState::Accumulating);
                    if writer.batch.len() >= config.batch_size {
                        writer.flush().await;
                        ticker.reset();
                    }
                }
                None => break,
            },
        }
    }

    writer.set_state(WriterState::Draining);
    if !writer.batch.is_empty() {
        writer.flush().await;
    }
    writer.set_state(WriterState::Done);
    writer.errors
}

struct Writer {
    worker_id: usize,
    pool: SqlitePool,
    progress: ProgressReporter,
    batch: Vec<NewGame>,
    state: WriterState,
    errors: Vec<String>,
}

impl Writer {
    fn set_state(&mut self, state: WriterState) {
        if self.state != state {
            tracing::debug!(worker_id = self.worker_id, from = ?self.state, to = ?state, "Writer state");
            self.state = state;
        }
    }

    /// Write the batch and update the counters once the outcome is known.
    async fn flush(&mut self) {
        let draining = self.state == WriterState::Draining;
        self.set_state(WriterState::Flushing);

        let batch = std::mem::take(&mut self.batch);
        let batch_len = batch.len() as u64;
        let label = batch.last().map(|g| g.metadata.label()).unwrap_or_default();

        match write_batch(self.worker_id, &self.pool, &batch).await {
            Ok(BatchOutcome { written, rolled_back }) => {
                self.progress.counters().add_imported(written);
                self.progress.counters().add_failed(rolled_back);
                tracing::info!(worker_id = self.worker_id, batch_len, written, rolled_back, "Batch committed");
            }
            Err(e) => {
                self.progress.counters().add_failed(batch_len);
                tracing::error!(worker_id = self.worker_id, batch_len, error = %e, "Batch failed");
                self.errors.push(e.to_string());
            }
        }
        self.progress.report(&label);

        self.set_state(if draining {
            WriterState::Draining
        } else {
            WriterState::Idle
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchOutcome {
    written: u64,
    rolled_back: u64,
}

/// One transaction per batch, one savepoint per game.
async fn write_batch(worker_id: usize, pool: &SqlitePool, games: &[NewGame]) -> Result<BatchOutcome> {
    let mut tx = pool.begin().await.map_err(Error::TransactionFailure)?;
    let mut outcome = BatchOutcome {
        written: 0,
        rolled_back: 0,
    };

    for game in games {
        match insert_game(&mut tx, game).await {
            Ok(game_id) => {
                tracing::trace!(worker_id, game_id, positions = game.positions.len(), "Game written");
                outcome.written += 1;
            }
            Err(e) => {
                tracing::warn!(worker_id, game = %game.metadata.label(), error = %e, "Game rolled back");
                outcome.rolled_back += 1;
            }
        }
    }

    tx.commit().await.map_err(Error::TransactionFailure)?;
    Ok(outcome)
}
