use cozy_chess::{Board, File, Move, Piece, Rank, Square};

use crate::types::PieceKind;

/// Resolve a Standard Algebraic Notation move against the legal moves of
/// `board`. Check, mate and annotation suffixes are ignored. Castling is
/// returned in cozy-chess king-takes-rook form.
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    let text = san.trim().trim_end_matches(['+', '#', '!', '?']);
    if text.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    let legal = legal_moves(board);

    if let Some(kingside) = castling_side(text) {
        return find_castle(board, &legal, kingside).ok_or_else(|| SanError::NoLegalMove(san.to_string()));
    }

    let spec = SanSpec::parse(text).ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;

    let mut found = legal.iter().copied().filter(|mv| spec.accepts(board, *mv));
    match (found.next(), found.next()) {
        (Some(mv), None) => Ok(mv),
        (None, _) => Err(SanError::NoLegalMove(san.to_string())),
        (Some(_), Some(_)) => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

/// All legal moves of `board`.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

fn castling_side(text: &str) -> Option<bool> {
    match text {
        "O-O" | "0-0" => Some(true),
        "O-O-O" | "0-0-0" => Some(false),
        _ => None,
    }
}

fn find_castle(board: &Board, legal: &[Move], kingside: bool) -> Option<Move> {
    let color = board.side_to_move();
    legal.iter().copied().find(|mv| {
        board.piece_on(mv.from) == Some(Piece::King)
            && board.piece_on(mv.to) == Some(Piece::Rook)
            && board.color_on(mv.to) == Some(color)
            && (((mv.to.file() as u8) > (mv.from.file() as u8)) == kingside)
    })
}

/// Decomposed non-castling SAN token.
struct SanSpec {
    piece: Piece,
    from_file: Option<File>,
    from_rank: Option<Rank>,
    to: Square,
    promotion: Option<Piece>,
}

impl SanSpec {
    fn parse(text: &str) -> Option<Self> {
        let mut chars: Vec<char> = text.chars().filter(|c| *c != 'x' && *c != '=').collect();

        let piece = match chars.first() {
            Some(c) if c.is_ascii_uppercase() => {
                let kind = PieceKind::from_char(*c)?;
                chars.remove(0);
                Piece::from(kind)
            }
            _ => Piece::Pawn,
        };

        let promotion = match chars.last() {
            Some(c) if c.is_ascii_uppercase() && piece == Piece::Pawn => {
                let kind = PieceKind::from_char(*c)?;
                chars.pop();
                Some(Piece::from(kind))
            }
            _ => None,
        };

        if chars.len() < 2 || chars.len() > 4 {
            return None;
        }
        let rank_char = chars.pop()?;
        let file_char = chars.pop()?;
        let to = Square::new(file_from_char(file_char)?, rank_from_char(rank_char)?);

        let mut from_file = None;
        let mut from_rank = None;
        for c in chars {
            if let Some(file) = file_from_char(c) {
                from_file = Some(file);
            } else if let Some(rank) = rank_from_char(c) {
                from_rank = Some(rank);
            } else {
                return None;
            }
        }

        Some(Self {
            piece,
            from_file,
            from_rank,
            to,
            promotion,
        })
    }

    fn accepts(&self, board: &Board, mv: Move) -> bool {
        // King-takes-own-rook moves are castling and only match "O-O" forms.
        let is_castle = board.piece_on(mv.from) == Some(Piece::King)
            && board.color_on(mv.to) == Some(board.side_to_move());

        !is_castle
            && board.piece_on(mv.from) == Some(self.piece)
            && mv.to == self.to
            && mv.promotion == self.promotion
            && self.from_file.map_or(true, |f| mv.from.file() == f)
            && self.from_rank.map_or(true, |r| mv.from.rank() == r)
    }
}

fn file_from_char(c: char) -> Option<File> {
    ('a'..='h')
        .contains(&c)
        .then(|| File::index(c as usize - 'a' as usize))
}

fn rank_from_char(c: char) -> Option<Rank> {
    ('1'..='8')
        .contains(&c)
        .then(|| Rank::index(c as usize - '1' as usize))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}
