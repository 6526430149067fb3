//! Board-encoding codec: the placement field of a FEN string to and from
//! the set of occupied squares.

use crate::types::{Piece, Square};

/// Decode a board encoding into its occupied `(square, piece)` pairs.
///
/// Ranks are read as written, so the first rank in the string maps to the
/// highest squares (56..=63). Accepts a bare placement field or a full FEN;
/// everything after the first whitespace is ignored. Pairs are returned in
/// encoding order.
pub fn decode_occupied_squares(board: &str) -> Result<Vec<(Square, Piece)>, DecodeError> {
    let placement = board.split_whitespace().next().ok_or(DecodeError::Empty)?;

    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(DecodeError::RankCount(ranks.len()));
    }

    let mut occupied = Vec::with_capacity(32);
    for (rank_index, rank_str) in ranks.iter().enumerate() {
        let mut file_index = 0u8;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                if skip == 0 || skip > 8 {
                    return Err(DecodeError::InvalidSkip { rank: rank_index + 1, digit: c });
                }
                file_index += skip as u8;
            } else {
                let piece = Piece::from_symbol(c).ok_or(DecodeError::InvalidPiece(c))?;
                if file_index > 7 {
                    return Err(DecodeError::RankOverflow(rank_index + 1));
                }
                let square = Square::from_coords(file_index, 7 - rank_index as u8)
                    .ok_or(DecodeError::RankOverflow(rank_index + 1))?;
                occupied.push((square, piece));
                file_index += 1;
            }
            if file_index > 8 {
                return Err(DecodeError::RankOverflow(rank_index + 1));
            }
        }
        if file_index != 8 {
            return Err(DecodeError::RankUnderflow(rank_index + 1));
        }
    }

    Ok(occupied)
}

/// Encode an occupied-square set as a canonical placement string.
///
/// Squares not listed are empty. When a square appears more than once the
/// last entry wins.
pub fn encode_board(occupied: &[(Square, Piece)]) -> String {
    let mut squares: [Option<Piece>; 64] = [None; 64];
    for (square, piece) in occupied {
        squares[square.index() as usize] = Some(*piece);
    }

    let mut out = String::with_capacity(72);
    for rank in (0..8u8).rev() {
        let mut empty = 0;
        for file in 0..8u8 {
            match squares[(rank * 8 + file) as usize] {
                Some(piece) => {
                    if empty > 0 {
                        out.push(char::from(b'0' + empty));
                        empty = 0;
                    }
                    out.push(piece.symbol());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            out.push(char::from(b'0' + empty));
        }
        if rank > 0 {
            out.push('/');
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty board encoding")]
    Empty,
    #[error("Expected 8 ranks, found {0}")]
    RankCount(usize),
    #[error("Rank {0} spans more than 8 files")]
    RankOverflow(usize),
    #[error("Rank {0} spans fewer than 8 files")]
    RankUnderflow(usize),
    #[error("Invalid skip digit '{digit}' in rank {rank}")]
    InvalidSkip { rank: usize, digit: char },
    #[error("Invalid piece character: {0}")]
    InvalidPiece(char),
    #[error("Invalid side to move: {0}")]
    InvalidSideToMove(String),
    #[error("Invalid castling field: {0}")]
    InvalidCastling(String),
}
