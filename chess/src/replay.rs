//! Move replay: turn a move list into the sequence of positions it reaches.

use cozy_chess::Board;

use crate::fen::{format_fen, parse_board, FenError};
use crate::pgn::san::{parse_san, SanError};
use crate::uci::parse_uci_move;

/// One position reached while replaying a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedPosition {
    /// 0 for the starting position, then the ply that produced it.
    pub move_number: u32,
    /// The move that produced this position; `None` for move 0.
    pub san: Option<String>,
    /// Full FEN of the position.
    pub fen: String,
}

/// Produces the position sequence of a game from its move list.
///
/// Implementations must be pure: the ingestion pipeline calls them from
/// several blocking threads at once.
pub trait MoveReplayer: Send + Sync + 'static {
    fn replay(
        &self,
        start_fen: Option<&str>,
        moves: &[String],
    ) -> Result<Vec<ReplayedPosition>, ReplayError>;
}

/// Replays SAN moves (UCI accepted as a fallback) with cozy-chess, rejecting
/// the whole game at the first illegal or unreadable move.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardReplayer;

impl MoveReplayer for StandardReplayer {
    fn replay(
        &self,
        start_fen: Option<&str>,
        moves: &[String],
    ) -> Result<Vec<ReplayedPosition>, ReplayError> {
        let mut board = match start_fen {
            Some(fen) => parse_board(fen).map_err(|e| ReplayError::InvalidStartFen {
                fen: fen.to_string(),
                source: e,
            })?,
            None => Board::default(),
        };

        let mut positions = Vec::with_capacity(moves.len() + 1);
        positions.push(ReplayedPosition {
            move_number: 0,
            san: None,
            fen: format_fen(&board),
        });

        for (i, token) in moves.iter().enumerate() {
            let mv = match parse_san(&board, token) {
                Ok(mv) => mv,
                Err(source) => parse_uci_move(&board, token).ok_or(ReplayError::IllegalMove {
                    ply: i + 1,
                    token: token.clone(),
                    source,
                })?,
            };
            board.try_play(mv).map_err(|_| ReplayError::IllegalMove {
                ply: i + 1,
                token: token.clone(),
                source: SanError::NoLegalMove(token.clone()),
            })?;
            positions.push(ReplayedPosition {
                move_number: (i + 1) as u32,
                san: Some(token.clone()),
                fen: format_fen(&board),
            });
        }

        Ok(positions)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Invalid start position {fen}: {source}")]
    InvalidStartFen {
        fen: String,
        #[source]
        source: FenError,
    },
    #[error("Cannot play move {ply} ({token}): {source}")]
    IllegalMove {
        ply: usize,
        token: String,
        #[source]
        source: SanError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::STARTING_FEN;

    fn moves(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replay_from_start() {
        let positions = StandardReplayer
            .replay(None, &moves(&["e4", "e5", "Nf3"]))
            .unwrap();
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0].fen, STARTING_FEN);
        assert_eq!(positions[0].san, None);
        assert_eq!(positions[3].move_number, 3);
        assert_eq!(positions[3].san.as_deref(), Some("Nf3"));
        assert!(positions[3].fen.starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b"));
    }

    #[test]
    fn test_replay_accepts_uci_fallback() {
        let positions = StandardReplayer
            .replay(None, &moves(&["e2e4", "e7e5"]))
            .unwrap();
        assert_eq!(positions.len(), 3);
    }

    #[test]
    fn test_replay_from_custom_fen() {
        let positions = StandardReplayer
            .replay(Some("4k3/8/8/8/8/8/8/4K2R w K - 0 1"), &moves(&["O-O"]))
            .unwrap();
        assert!(positions[1].fen.starts_with("4k3/8/8/8/8/8/8/5RK1 b"));
    }

    #[test]
    fn test_illegal_move_rejects_game() {
        let err = StandardReplayer
            .replay(None, &moves(&["e4", "e4"]))
            .unwrap_err();
        assert!(matches!(err, ReplayError::IllegalMove { ply: 2, .. }));
    }

    #[test]
    fn test_bad_start_fen() {
        let err = StandardReplayer.replay(Some("not a fen"), &[]).unwrap_err();
        assert!(matches!(err, ReplayError::InvalidStartFen { .. }));
    }
}
