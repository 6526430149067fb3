//! Board-pattern compiler.
//!
//! A pattern uses the FEN placement grammar with one extension: a square may
//! hold a bracket group of alternatives such as `[P|N]` ("white pawn or white
//! knight"). Skip digits leave squares unconstrained; they never mean "must be
//! empty". Ranks may be short and fewer than eight ranks may be given; the
//! remaining squares are wildcards.
//!
//! A pattern without any constraint matches nothing. [`CompiledPattern::matches`]
//! and the index planner both apply this rule.

use std::fmt;

use crate::types::{Piece, PieceSet, Square};

/// Requirement on a single square of a compiled pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SquareRule {
    /// Unconstrained: any piece, or no piece at all.
    #[default]
    Wildcard,
    /// The square must hold one of these pieces.
    AnyOf(PieceSet),
}

/// One compiled requirement: `square` must hold a piece in `allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub square: Square,
    pub allowed: PieceSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    rules: [SquareRule; 64],
    constraints: Vec<Constraint>,
}

impl CompiledPattern {
    /// Constraints in the order they were written (first written rank first).
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn rule(&self, square: Square) -> SquareRule {
        self.rules[square.index() as usize]
    }

    /// True when the pattern has no constraint and therefore matches nothing.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Reference evaluation against a decoded board, without any index.
    pub fn matches(&self, occupied: &[(Square, Piece)]) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut board: [Option<Piece>; 64] = [None; 64];
        for (square, piece) in occupied {
            board[square.index() as usize] = Some(*piece);
        }
        self.constraints.iter().all(|c| {
            board[c.square.index() as usize].is_some_and(|piece| c.allowed.contains(piece))
        })
    }
}

/// Compile a pattern string. A full FEN is accepted; only its placement
/// field is read.
pub fn compile_pattern(pattern: &str) -> Result<CompiledPattern, PatternSyntaxError> {
    let placement = pattern.split_whitespace().next().unwrap_or("");
    let mut rules = [SquareRule::Wildcard; 64];
    let mut constraints = Vec::new();

    for (rank_index, rank_str) in placement.split('/').enumerate() {
        let rank = rank_index + 1;
        if rank > 8 {
            return Err(PatternSyntaxError::new(rank, 1, PatternErrorKind::TooManyRanks));
        }

        let mut file = 0usize;
        let mut chars = rank_str.chars().enumerate().peekable();
        while let Some((i, c)) = chars.next() {
            let column = i + 1;
            let err = |kind| PatternSyntaxError::new(rank, column, kind);

            let allowed = match c {
                '1'..='8' => {
                    file += c as usize - '0' as usize;
                    if file > 8 {
                        return Err(err(PatternErrorKind::RankOverflow));
                    }
                    continue;
                }
                '[' => {
                    let mut set = PieceSet::EMPTY;
                    let mut expecting_piece = true;
                    let mut closed = false;
                    for (j, g) in chars.by_ref() {
                        let inner = |kind| PatternSyntaxError::new(rank, j + 1, kind);
                        match g {
                            ']' if expecting_piece => {
                                return Err(inner(PatternErrorKind::EmptyAlternative))
                            }
                            ']' => {
                                closed = true;
                                break;
                            }
                            '|' if expecting_piece => {
                                return Err(inner(PatternErrorKind::EmptyAlternative))
                            }
                            '|' => expecting_piece = true,
                            _ if !expecting_piece => {
                                return Err(inner(PatternErrorKind::MissingSeparator(g)))
                            }
                            _ => {
                                let piece = Piece::from_symbol(g)
                                    .ok_or_else(|| inner(PatternErrorKind::UnknownPiece(g)))?;
                                set.insert(piece);
                                expecting_piece = false;
                            }
                        }
                    }
                    if !closed {
                        return Err(err(PatternErrorKind::UnterminatedGroup));
                    }
                    set
                }
                ']' | '|' => return Err(err(PatternErrorKind::UnexpectedChar(c))),
                _ => PieceSet::single(
                    Piece::from_symbol(c).ok_or_else(|| err(PatternErrorKind::UnknownPiece(c)))?,
                ),
            };

            if file >= 8 {
                return Err(err(PatternErrorKind::RankOverflow));
            }
            let square = Square::from_coords(file as u8, (8 - rank) as u8)
                .ok_or_else(|| err(PatternErrorKind::RankOverflow))?;
            rules[square.index() as usize] = SquareRule::AnyOf(allowed);
            constraints.push(Constraint { square, allowed });
            file += 1;
        }
    }

    Ok(CompiledPattern { rules, constraints })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternErrorKind {
    UnterminatedGroup,
    EmptyAlternative,
    MissingSeparator(char),
    UnknownPiece(char),
    UnexpectedChar(char),
    RankOverflow,
    TooManyRanks,
}

impl fmt::Display for PatternErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedGroup => write!(f, "unterminated '[' group"),
            Self::EmptyAlternative => write!(f, "empty alternative in group"),
            Self::MissingSeparator(c) => write!(f, "expected '|' or ']' before '{c}'"),
            Self::UnknownPiece(c) => write!(f, "unknown piece symbol '{c}'"),
            Self::UnexpectedChar(c) => write!(f, "unexpected '{c}' outside a group"),
            Self::RankOverflow => write!(f, "rank spans more than 8 squares"),
            Self::TooManyRanks => write!(f, "more than 8 ranks"),
        }
    }
}

/// Malformed pattern, located by 1-based rank (as written) and column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Pattern syntax error at rank {rank}, column {column}: {kind}")]
pub struct PatternSyntaxError {
    pub rank: usize,
    pub column: usize,
    pub kind: PatternErrorKind,
}

impl PatternSyntaxError {
    fn new(rank: usize, column: usize, kind: PatternErrorKind) -> Self {
        Self { rank, column, kind }
    }
}
