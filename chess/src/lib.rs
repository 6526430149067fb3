pub mod board;
pub mod fen;
pub mod fingerprint;
pub mod material;
pub mod pattern;
pub mod pgn;
pub mod replay;
pub mod types;
pub mod uci;

pub use board::{decode_occupied_squares, encode_board, DecodeError};
pub use fen::{CastlingRights, FenError, FenPosition, STARTING_FEN};
pub use fingerprint::FingerprintKeys;
pub use material::MaterialSignature;
pub use pattern::{
    compile_pattern, CompiledPattern, Constraint, PatternErrorKind, PatternSyntaxError, SquareRule,
};
pub use pgn::{parse_pgn, GameResult, PgnError, PgnGame, PgnReader};
pub use replay::{MoveReplayer, ReplayError, ReplayedPosition, StandardReplayer};
pub use types::{Piece, PieceColor, PieceKind, PieceSet, Square};
pub use uci::{convert_uci_castling_to_cozy, format_uci_move, parse_uci_move};
