use cozy_chess::Board;

use crate::board::{decode_occupied_squares, DecodeError};
use crate::types::PieceColor;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Castling availability flags in FEN order (`KQkq`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub const NONE: CastlingRights = CastlingRights {
        white_kingside: false,
        white_queenside: false,
        black_kingside: false,
        black_queenside: false,
    };

    /// Parse the castling field of a FEN (`KQkq`, `Kq`, `-`).
    pub fn parse(field: &str) -> Result<Self, DecodeError> {
        let mut rights = Self::NONE;
        if field == "-" {
            return Ok(rights);
        }
        for c in field.chars() {
            let flag = match c {
                'K' => &mut rights.white_kingside,
                'Q' => &mut rights.white_queenside,
                'k' => &mut rights.black_kingside,
                'q' => &mut rights.black_queenside,
                _ => return Err(DecodeError::InvalidCastling(field.to_string())),
            };
            *flag = true;
        }
        Ok(rights)
    }

    /// Flags in `KQkq` order.
    pub fn flags(self) -> [bool; 4] {
        [
            self.white_kingside,
            self.white_queenside,
            self.black_kingside,
            self.black_queenside,
        ]
    }
}

impl std::fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut any = false;
        for (present, c) in self.flags().into_iter().zip(['K', 'Q', 'k', 'q']) {
            if present {
                write!(f, "{c}")?;
                any = true;
            }
        }
        if !any {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// The parts of a FEN that identify a position for indexing: placement,
/// side to move and castling rights. Clocks and en passant are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenPosition {
    pub placement: String,
    pub side_to_move: PieceColor,
    pub castling: CastlingRights,
}

impl FenPosition {
    /// Parse a FEN. Missing side-to-move and castling fields default to
    /// white and no rights; the placement is validated.
    pub fn parse(fen: &str) -> Result<Self, DecodeError> {
        let mut parts = fen.split_whitespace();
        let placement = parts.next().ok_or(DecodeError::Empty)?;
        decode_occupied_squares(placement)?;

        let side_to_move = match parts.next() {
            None | Some("w") => PieceColor::White,
            Some("b") => PieceColor::Black,
            Some(other) => return Err(DecodeError::InvalidSideToMove(other.to_string())),
        };
        let castling = match parts.next() {
            None => CastlingRights::NONE,
            Some(field) => CastlingRights::parse(field)?,
        };

        Ok(Self {
            placement: placement.to_string(),
            side_to_move,
            castling,
        })
    }
}

/// Parse a FEN string into a cozy-chess board for move replay.
pub fn parse_board(fen: &str) -> Result<Board, FenError> {
    if fen.split_whitespace().next().is_none() {
        return Err(FenError::InvalidFormat);
    }
    fen.parse().map_err(|_| FenError::InvalidFormat)
}

/// Format a board as a FEN string.
pub fn format_fen(board: &Board) -> String {
    board.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_starting_fen() {
        let pos = FenPosition::parse(STARTING_FEN).unwrap();
        assert_eq!(pos.placement, "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR");
        assert_eq!(pos.side_to_move, PieceColor::White);
        assert_eq!(pos.castling.flags(), [true; 4]);
    }

    #[test]
    fn test_parse_placement_only_defaults() {
        let pos = FenPosition::parse("8/8/8/8/8/8/8/K6k").unwrap();
        assert_eq!(pos.side_to_move, PieceColor::White);
        assert_eq!(pos.castling, CastlingRights::NONE);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            FenPosition::parse("8/8/8/8/8/8/8/K6k x"),
            Err(DecodeError::InvalidSideToMove(_))
        ));
        assert!(matches!(
            FenPosition::parse("8/8/8/8/8/8/8/K6k w KX"),
            Err(DecodeError::InvalidCastling(_))
        ));
        assert!(FenPosition::parse("8/8 w - - 0 1").is_err());
    }

    #[test]
    fn test_castling_display() {
        assert_eq!(CastlingRights::parse("Kq").unwrap().to_string(), "Kq");
        assert_eq!(CastlingRights::NONE.to_string(), "-");
    }

    #[test]
    fn test_board_roundtrip_through_cozy() {
        let board = parse_board(STARTING_FEN).unwrap();
        assert_eq!(format_fen(&board), STARTING_FEN);
        assert!(parse_board("").is_err());
    }
}
