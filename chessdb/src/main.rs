//! `chessdb` command-line entry point.
//!
//! Wires the library to a handful of subcommands: PGN import through the
//! ingestion pipeline, position search, index maintenance and store
//! statistics. Results are printed to stdout as JSON; logs go to stderr.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chess::{PgnReader, PieceColor, StandardReplayer};
use chessdb::config::{self, ImportConfig};
use chessdb::{
    coverage_report, fix_missing_index, load_or_create_keys, rebuild_index, search, CancelSignal,
    Database, GameFilter, GameRepository, ImportPipeline, ImportProgress, ImportStatus, RawGame,
    SearchMode, SearchRequest,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;

/// Index chess games by position and search them by board pattern.
#[derive(Parser)]
#[command(name = "chessdb", version, about)]
struct Cli {
    /// Database file. Defaults to `chessdb.sqlite` inside the data directory
    /// (`CHESSDB_DATA_DIR`, else `~/.config/chessdb/data`).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every game of a PGN file.
    ///
    /// Press Ctrl-C to stop early; batches already committed are kept.
    Import {
        /// PGN file to read.
        file: PathBuf,
        /// Tasks replaying games (`CHESSDB_DECODE_WORKERS`).
        #[arg(long)]
        decode_workers: Option<usize>,
        /// Tasks writing batches (`CHESSDB_WRITER_WORKERS`).
        #[arg(long)]
        writer_workers: Option<usize>,
        /// Games per transaction (`CHESSDB_BATCH_SIZE`).
        #[arg(long)]
        batch_size: Option<usize>,
        /// Flush partial batches after this many milliseconds
        /// (`CHESSDB_FLUSH_INTERVAL_MS`).
        #[arg(long)]
        flush_interval_ms: Option<u64>,
    },
    /// Search stored positions and print the matching games.
    Search {
        /// exact: a full FEN. material: piece counts of a placement.
        /// pattern: a placement where a square may be a group like `[P|N]`.
        /// metadata: no position query, only the header filters below.
        #[arg(long, default_value_t = SearchMode::Pattern)]
        mode: SearchMode,
        #[arg(default_value = "")]
        pattern: String,
        /// Pattern mode: only positions with this side to move (w or b).
        #[arg(long, value_parser = parse_side)]
        side_to_move: Option<PieceColor>,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
    /// Rebuild the position index from stored positions.
    Reindex {
        /// Only index games that have positions without index rows.
        #[arg(long)]
        missing_only: bool,
    },
    /// Report index coverage and inconsistent positions.
    Report,
    /// Delete a game together with its positions.
    Delete { game_id: i64 },
    /// Print store statistics.
    Stats,
}

/// Header filters shared by every search mode.
#[derive(Args)]
struct FilterArgs {
    /// White player name contains this text.
    #[arg(long)]
    white: Option<String>,
    /// Black player name contains this text.
    #[arg(long)]
    black: Option<String>,
    /// Either player name contains this text.
    #[arg(long)]
    player: Option<String>,
    #[arg(long)]
    eco: Option<String>,
    /// Opening name contains this text.
    #[arg(long)]
    opening: Option<String>,
    /// 1-0, 0-1, 1/2-1/2 or *.
    #[arg(long)]
    result: Option<String>,
    /// Earliest PGN date, e.g. 2020.01.01.
    #[arg(long)]
    date_from: Option<String>,
    #[arg(long)]
    date_to: Option<String>,
    /// At least one player rated this or higher.
    #[arg(long)]
    min_elo: Option<u32>,
    /// Both players rated this or lower.
    #[arg(long)]
    max_elo: Option<u32>,
}

impl From<FilterArgs> for GameFilter {
    fn from(args: FilterArgs) -> Self {
        GameFilter {
            white: args.white,
            black: args.black,
            player: args.player,
            eco: args.eco,
            opening: args.opening,
            result: args.result,
            date_from: args.date_from,
            date_to: args.date_to,
            min_elo: args.min_elo,
            max_elo: args.max_elo,
        }
    }
}

fn parse_side(s: &str) -> Result<PieceColor, String> {
    match s.to_ascii_lowercase().as_str() {
        "w" | "white" => Ok(PieceColor::White),
        "b" | "black" => Ok(PieceColor::Black),
        other => Err(format!("unknown side '{other}' (expected w or b)")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.database.unwrap_or_else(config::get_database_path);
    tracing::info!("Using database: {}", path.display());

    let db = Database::open(&path)
        .await
        .with_context(|| format!("cannot open database {}", path.display()))?;
    let result = run(&db, cli.command).await;
    db.close().await;
    result
}

async fn run(db: &Database, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Import {
            file,
            decode_workers,
            writer_workers,
            batch_size,
            flush_interval_ms,
        } => {
            let mut config = ImportConfig::from_env();
            if let Some(n) = decode_workers {
                config.decode_workers = n;
            }
            if let Some(n) = writer_workers {
                config.writer_workers = n;
            }
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            if let Some(ms) = flush_interval_ms {
                config.flush_interval = Duration::from_millis(ms);
            }
            import(db, &file, config).await
        }
        Commands::Search {
            mode,
            pattern,
            side_to_move,
            filter,
            page,
            page_size,
        } => {
            let keys = load_or_create_keys(db.pool()).await?;
            let request = SearchRequest {
                mode,
                pattern,
                side_to_move,
                filter: filter.into(),
                page,
                page_size,
            };
            print_json(&search(db, &keys, &request).await?)
        }
        Commands::Reindex { missing_only } => {
            let report = if missing_only {
                fix_missing_index(db).await?
            } else {
                rebuild_index(db).await?
            };
            print_json(&report)
        }
        Commands::Report => print_json(&coverage_report(db).await?),
        Commands::Delete { game_id } => {
            if !GameRepository::new(db.pool().clone())
                .delete_game(game_id)
                .await?
            {
                bail!("game {game_id} not found");
            }
            Ok(())
        }
        Commands::Stats => print_json(&GameRepository::new(db.pool().clone()).stats().await?),
    }
}

async fn import(db: &Database, file: &Path, config: ImportConfig) -> anyhow::Result<()> {
    let reader = File::open(file).with_context(|| format!("cannot open {}", file.display()))?;
    let keys = Arc::new(load_or_create_keys(db.pool()).await?);
    let config = config.normalized();
    let cancel = CancelSignal::new();

    let (game_tx, game_rx) = mpsc::channel(config.queue_capacity);
    let reader_task = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || read_games(BufReader::new(reader), game_tx, cancel)
    });

    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling import");
                cancel.cancel();
            }
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::channel::<ImportProgress>(config.progress_capacity);
    let printer = tokio::spawn(async move {
        while let Some(p) = progress_rx.recv().await {
            tracing::info!(
                processed = p.total_processed,
                imported = p.imported,
                failed = p.failed,
                game = %p.current_game,
                "Import progress"
            );
        }
    });

    let pipeline = ImportPipeline::new(db.clone(), keys, StandardReplayer)
        .with_config(config)
        .with_progress(progress_tx);
    let summary = pipeline.run(game_rx, cancel).await;
    drop(pipeline);
    interrupt.abort();

    let unreadable = reader_task.await?;
    printer.await?;
    if unreadable > 0 {
        tracing::warn!(unreadable, "Some PGN records could not be parsed and were skipped");
    }

    print_json(&summary)?;
    if let ImportStatus::Failed { error } = summary.status {
        bail!("import failed: {error}");
    }
    Ok(())
}

/// Feed parsed games into the pipeline until the file ends, the pipeline
/// stops receiving, or the import is cancelled. Returns the number of
/// records that could not be parsed.
fn read_games(
    reader: BufReader<File>,
    tx: mpsc::Sender<RawGame>,
    cancel: CancelSignal,
) -> u64 {
    let mut unreadable = 0;
    for (index, game) in PgnReader::new(reader).enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        match game {
            Ok(game) => {
                if tx.blocking_send(RawGame::from(game)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(record = index + 1, error = %e, "Skipping unreadable PGN record");
                unreadable += 1;
            }
        }
    }
    unreadable
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
