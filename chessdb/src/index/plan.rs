//! Typed search plans.
//!
//! A [`QueryPlan`] describes which positions a search selects; a
//! [`GameFilter`] narrows the games they belong to by header fields. Both
//! are rendered to SQL only by the planner.

use chess::{CompiledPattern, MaterialSignature, PieceColor, PieceSet, Square};
use serde::{Deserialize, Serialize};

/// Typed description of a candidate-position query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    /// Matches no position.
    Nothing,
    /// Positions whose `square` holds any piece in `pieces`. One indexed probe.
    Lookup { square: Square, pieces: PieceSet },
    /// Positions with this content fingerprint.
    Fingerprint(u64),
    /// Positions with this material signature.
    Material(String),
    /// Positions with this side to move.
    SideToMove(PieceColor),
    /// Positions satisfying every child.
    Intersect(Vec<PlanNode>),
}

/// A normalized plan: `Nothing` only ever appears at the root, and
/// intersections are flat with at least two children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    root: PlanNode,
}

impl QueryPlan {
    /// One lookup per pattern constraint. A pattern without constraints
    /// matches nothing.
    pub fn for_pattern(pattern: &CompiledPattern) -> Self {
        let lookups = pattern
            .constraints()
            .iter()
            .map(|c| PlanNode::Lookup {
                square: c.square,
                pieces: c.allowed,
            })
            .collect();
        Self::new(PlanNode::Intersect(lookups))
    }

    pub fn for_fingerprint(fingerprint: u64) -> Self {
        Self::new(PlanNode::Fingerprint(fingerprint))
    }

    pub fn for_material(signature: &MaterialSignature) -> Self {
        Self::new(PlanNode::Material(signature.to_string()))
    }

    /// Further restrict the plan to positions with `side` to move.
    pub fn with_side_to_move(self, side: PieceColor) -> Self {
        Self::new(PlanNode::Intersect(vec![self.root, PlanNode::SideToMove(side)]))
    }

    /// Normalize an arbitrary node tree into a plan.
    pub fn new(root: PlanNode) -> Self {
        Self {
            root: normalize(root),
        }
    }

    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub fn is_nothing(&self) -> bool {
        self.root == PlanNode::Nothing
    }
}

fn normalize(node: PlanNode) -> PlanNode {
    match node {
        PlanNode::Lookup { pieces, .. } if pieces.is_empty() => PlanNode::Nothing,
        PlanNode::Intersect(children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match normalize(child) {
                    PlanNode::Nothing => return PlanNode::Nothing,
                    PlanNode::Intersect(grand) => flat.extend(grand),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                // An empty conjunction would match everything; the empty
                // pattern is defined to match nothing instead.
                0 => PlanNode::Nothing,
                1 => flat.remove(0),
                _ => PlanNode::Intersect(flat),
            }
        }
        other => other,
    }
}

/// Header filters on the games a search returns. Player names and the
/// opening match by case-insensitive substring; ECO and result match
/// exactly; dates compare as PGN `YYYY.MM.DD` text. `min_elo` needs either
/// player at or above it, `max_elo` needs both at or below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameFilter {
    pub white: Option<String>,
    pub black: Option<String>,
    /// Either player.
    pub player: Option<String>,
    pub eco: Option<String>,
    pub opening: Option<String>,
    pub result: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub min_elo: Option<u32>,
    pub max_elo: Option<u32>,
}

impl GameFilter {
    pub fn is_empty(&self) -> bool {
        [
            &self.white,
            &self.black,
            &self.player,
            &self.eco,
            &self.opening,
            &self.result,
            &self.date_from,
            &self.date_to,
        ]
        .into_iter()
        .all(|field| non_blank(field).is_none())
            && self.min_elo.is_none()
            && self.max_elo.is_none()
    }
}

/// A text filter counts only when it has something besides whitespace.
pub(crate) fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
