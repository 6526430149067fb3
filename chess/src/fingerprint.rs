//! Zobrist-style content fingerprints.
//!
//! A fingerprint is the XOR of independently drawn 64-bit keys: one per
//! occupied (square, piece), one when black is to move, and one per castling
//! flag. The key table must stay fixed for as long as fingerprints computed
//! with it are stored anywhere; callers persist it with [`FingerprintKeys::to_words`]
//! and restore it with [`FingerprintKeys::from_words`].

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::board::{decode_occupied_squares, DecodeError};
use crate::fen::{CastlingRights, FenPosition};
use crate::types::{Piece, PieceColor, Square};

const PIECE_SQUARE_KEYS: usize = Piece::COUNT * Square::COUNT;
const SIDE_KEY: usize = PIECE_SQUARE_KEYS;
const CASTLING_KEYS: usize = SIDE_KEY + 1;

/// Fixed key table for fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintKeys {
    keys: Vec<u64>,
}

impl FingerprintKeys {
    /// Total number of keys in a table: 768 piece-square, 1 side, 4 castling.
    pub const LEN: usize = CASTLING_KEYS + 4;

    /// Draw a fresh table from `rng`.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let keys = (0..Self::LEN).map(|_| rng.gen::<u64>()).collect();
        Self { keys }
    }

    /// Deterministic table derived from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::generate(&mut StdRng::seed_from_u64(seed))
    }

    /// Restore a persisted table. Returns `None` if the length is wrong.
    pub fn from_words(words: &[u64]) -> Option<Self> {
        (words.len() == Self::LEN).then(|| Self {
            keys: words.to_vec(),
        })
    }

    pub fn to_words(&self) -> &[u64] {
        &self.keys
    }

    fn piece_square(&self, square: Square, piece: Piece) -> u64 {
        self.keys[piece.index() * Square::COUNT + square.index() as usize]
    }

    /// Fingerprint a placement together with side to move and castling rights.
    pub fn fingerprint(
        &self,
        board: &str,
        side_to_move: PieceColor,
        castling: CastlingRights,
    ) -> Result<u64, DecodeError> {
        let occupied = decode_occupied_squares(board)?;
        let mut hash = occupied
            .iter()
            .fold(0u64, |acc, (square, piece)| acc ^ self.piece_square(*square, *piece));

        if side_to_move == PieceColor::Black {
            hash ^= self.keys[SIDE_KEY];
        }
        for (i, present) in castling.flags().into_iter().enumerate() {
            if present {
                hash ^= self.keys[CASTLING_KEYS + i];
            }
        }
        Ok(hash)
    }

    /// Fingerprint a full FEN string.
    pub fn fingerprint_fen(&self, fen: &str) -> Result<u64, DecodeError> {
        let pos = FenPosition::parse(fen)?;
        self.fingerprint(&pos.placement, pos.side_to_move, pos.castling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::STARTING_FEN;

    #[test]
    fn test_seeded_tables_are_deterministic() {
        assert_eq!(FingerprintKeys::from_seed(7), FingerprintKeys::from_seed(7));
        assert_ne!(FingerprintKeys::from_seed(7), FingerprintKeys::from_seed(8));
    }

    #[test]
    fn test_words_roundtrip() {
        let keys = FingerprintKeys::from_seed(1);
        let restored = FingerprintKeys::from_words(keys.to_words()).unwrap();
        assert_eq!(
            keys.fingerprint_fen(STARTING_FEN).unwrap(),
            restored.fingerprint_fen(STARTING_FEN).unwrap()
        );
        assert!(FingerprintKeys::from_words(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_side_and_castling_change_fingerprint() {
        let keys = FingerprintKeys::from_seed(42);
        let board = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";
        let all = CastlingRights::parse("KQkq").unwrap();
        let white = keys.fingerprint(board, PieceColor::White, all).unwrap();
        let black = keys.fingerprint(board, PieceColor::Black, all).unwrap();
        let no_castle = keys
            .fingerprint(board, PieceColor::White, CastlingRights::NONE)
            .unwrap();
        assert_ne!(white, black);
        assert_ne!(white, no_castle);
        assert_eq!(white, keys.fingerprint_fen(STARTING_FEN).unwrap());
    }

    #[test]
    fn test_ignores_clocks_and_en_passant() {
        let keys = FingerprintKeys::from_seed(3);
        let a = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let b = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 4 9";
        assert_eq!(keys.fingerprint_fen(a).unwrap(), keys.fingerprint_fen(b).unwrap());
    }

    #[test]
    fn test_empty_board_white_no_rights_is_zero() {
        let keys = FingerprintKeys::from_seed(5);
        assert_eq!(keys.fingerprint_fen("8/8/8/8/8/8/8/8 w - - 0 1").unwrap(), 0);
    }
}
