//! Minimal PGN reading: tag pairs, main-line SAN tokens and a streaming
//! multi-game reader.

pub mod parser;
pub mod san;

pub use parser::{parse_pgn, GameResult, PgnError, PgnGame, PgnReader};
pub use san::{parse_san, SanError};
