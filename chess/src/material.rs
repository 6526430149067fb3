//! Material signatures: per-piece counts for both sides, ignoring placement.

use std::fmt;

use crate::board::{decode_occupied_squares, DecodeError};
use crate::types::{Piece, PieceColor, PieceKind};

/// Per-piece counts of a board.
///
/// Renders as `PP.NN.BB.RR.QQ.KK/pp.nn.bb.rr.qq.kk`: white counts before the
/// slash, black after, every field two digits wide. A board has 64 squares,
/// so no count can exceed the field width and distinct count vectors always
/// render to distinct strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialSignature {
    counts: [u8; Piece::COUNT],
}

impl MaterialSignature {
    pub fn of(board: &str) -> Result<Self, DecodeError> {
        let mut counts = [0u8; Piece::COUNT];
        for (_, piece) in decode_occupied_squares(board)? {
            counts[piece.index()] += 1;
        }
        Ok(Self { counts })
    }

    pub fn count(&self, piece: Piece) -> u8 {
        self.counts[piece.index()]
    }

    fn write_side(&self, f: &mut fmt::Formatter<'_>, color: PieceColor) -> fmt::Result {
        for (i, kind) in PieceKind::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{:02}", self.count(Piece::new(color, *kind)))?;
        }
        Ok(())
    }
}

impl fmt::Display for MaterialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_side(f, PieceColor::White)?;
        f.write_str("/")?;
        self.write_side(f, PieceColor::Black)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_signature() {
        let sig = MaterialSignature::of("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR").unwrap();
        assert_eq!(sig.to_string(), "08.02.02.02.01.01/08.02.02.02.01.01");
    }

    #[test]
    fn test_placement_is_ignored() {
        let a = MaterialSignature::of("4k3/8/8/8/3P4/8/8/4K3").unwrap();
        let b = MaterialSignature::of("4k3/8/8/8/8/8/P7/4K3").unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_no_collision_between_multi_digit_counts() {
        // 1 pawn + 11 knights against 11 pawns + 1 knight: naive digit
        // concatenation renders both as "111".
        let a = MaterialSignature::of("NNNNNNNN/NNNP4/8/8/8/8/8/8").unwrap();
        let b = MaterialSignature::of("PPPPPPPP/PPPN4/8/8/8/8/8/8").unwrap();
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "01.11.00.00.00.00/00.00.00.00.00.00");
    }

    #[test]
    fn test_colors_are_separated() {
        let white = MaterialSignature::of("8/8/8/8/8/8/8/Q7").unwrap();
        let black = MaterialSignature::of("8/8/8/8/8/8/8/q7").unwrap();
        assert_ne!(white, black);
        assert_eq!(black.to_string(), "00.00.00.00.00.00/00.00.00.00.01.00");
    }
}
