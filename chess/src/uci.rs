//! UCI (Universal Chess Interface) move notation.

use cozy_chess::{Board, File, Move, Rank, Square};

use crate::pgn::san::legal_moves;

/// Convert UCI castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let is_rank_1_or_8 = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);

    if is_rank_1_or_8 && is_e_file && is_g_or_c_file && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };

        if legal_moves.contains(&converted) {
            return converted;
        }
    }

    mv
}

/// Parse a UCI move (`e2e4`, `e7e8q`, `e1g1`) and check it is legal on `board`.
pub fn parse_uci_move(board: &Board, text: &str) -> Option<Move> {
    let mv: Move = text.parse().ok()?;
    let legal = legal_moves(board);
    let mv = convert_uci_castling_to_cozy(mv, &legal);
    legal.contains(&mv).then_some(mv)
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    mv.to_string()
}
