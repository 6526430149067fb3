//! Renders a [`QueryPlan`] to SQLite text with an ordered bind list.
//!
//! All search SQL is produced here. Candidate positions come from
//! `positions p`; every `Lookup` adds one join on `piece_locations`
//! matching `position_id`, and fingerprint, material and side-to-move nodes
//! add `WHERE` predicates on `p`. A non-empty [`GameFilter`] joins
//! `games g` and adds its predicates to the same `WHERE`. Results are
//! paginated by distinct game.

use super::plan::{non_blank, GameFilter, PlanNode, QueryPlan};
use crate::store::helpers::{encode_fingerprint, encode_side};

/// A bind parameter, in the order its `?` appears in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// One page of distinct games, by descending game id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// The two queries a search runs against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSql {
    /// `SELECT DISTINCT game_id` for the requested page.
    pub games: CompiledQuery,
    /// `COUNT(DISTINCT game_id)` over every candidate.
    pub count: CompiledQuery,
}

/// Render the page query and the count query of a plan, restricted to games
/// passing `filter`.
pub fn compile_query(plan: &QueryPlan, filter: &GameFilter, page: Page) -> SearchSql {
    let candidates = render_candidates(plan, filter);
    SearchSql {
        games: page_query(
            format!(
                "SELECT DISTINCT p.game_id {} ORDER BY p.game_id DESC LIMIT ? OFFSET ?",
                candidates.sql
            ),
            candidates.params.clone(),
            page,
        ),
        count: CompiledQuery {
            sql: format!("SELECT COUNT(DISTINCT p.game_id) {}", candidates.sql),
            params: candidates.params,
        },
    }
}

/// Render the page and count queries of a header-only search: games passing
/// `filter`, whatever their positions.
pub fn compile_game_query(filter: &GameFilter, page: Page) -> SearchSql {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    push_filter(filter, &mut clauses, &mut params);
    let from = format!("FROM games g{}", where_clause(&clauses));

    SearchSql {
        games: page_query(
            format!("SELECT g.id {from} ORDER BY g.id DESC LIMIT ? OFFSET ?"),
            params.clone(),
            page,
        ),
        count: CompiledQuery {
            sql: format!("SELECT COUNT(*) {from}"),
            params,
        },
    }
}

/// Render the query returning `(game_id, move_number, move_san)` of every
/// matching position of the given games, ordered by game id descending then
/// move number ascending. The games were already filtered, so no
/// [`GameFilter`] applies here.
pub fn compile_positions_query(plan: &QueryPlan, game_ids: &[i64]) -> CompiledQuery {
    let mut query = render_candidates(plan, &GameFilter::default());
    let placeholders = vec!["?"; game_ids.len()].join(", ");
    query.sql = format!(
        "SELECT p.game_id, p.move_number, p.move_san {} AND p.game_id IN ({placeholders}) \
         ORDER BY p.game_id DESC, p.move_number ASC",
        query.sql
    );
    query
        .params
        .extend(game_ids.iter().map(|id| SqlParam::Int(*id)));
    query
}

fn page_query(sql: String, mut params: Vec<SqlParam>, page: Page) -> CompiledQuery {
    params.push(SqlParam::Int(page.limit as i64));
    params.push(SqlParam::Int(page.offset.min(i64::MAX as u64) as i64));
    CompiledQuery { sql, params }
}

/// `FROM ... WHERE ...` selecting candidate positions as `p`. The `WHERE`
/// clause is always present so callers can append `AND` terms.
fn render_candidates(plan: &QueryPlan, filter: &GameFilter) -> CompiledQuery {
    let mut sql = String::from("FROM positions p");
    let mut params = Vec::new();
    let mut clauses: Vec<String> = Vec::new();
    let mut clause_params = Vec::new();

    let nothing = |mut sql: String| {
        sql.push_str(" WHERE 0");
        CompiledQuery {
            sql,
            params: Vec::new(),
        }
    };

    let nodes = match plan.root() {
        PlanNode::Nothing => return nothing(sql),
        PlanNode::Intersect(children) => children.as_slice(),
        single => std::slice::from_ref(single),
    };

    for (alias, node) in nodes.iter().enumerate() {
        match node {
            PlanNode::Lookup { square, pieces } => {
                let placeholders = vec!["?"; pieces.len()].join(", ");
                sql.push_str(&format!(
                    " JOIN piece_locations l{alias} ON l{alias}.position_id = p.id \
                     AND l{alias}.square = ? AND l{alias}.piece IN ({placeholders})"
                ));
                params.push(SqlParam::Int(square.index() as i64));
                params.extend(pieces.iter().map(|piece| SqlParam::Text(piece.symbol().to_string())));
            }
            PlanNode::Fingerprint(fingerprint) => {
                clauses.push("p.fingerprint = ?".to_string());
                clause_params.push(SqlParam::Int(encode_fingerprint(*fingerprint)));
            }
            PlanNode::Material(signature) => {
                clauses.push("p.material_signature = ?".to_string());
                clause_params.push(SqlParam::Text(signature.clone()));
            }
            PlanNode::SideToMove(side) => {
                clauses.push("p.side_to_move = ?".to_string());
                clause_params.push(SqlParam::Text(encode_side(*side).to_string()));
            }
            // Normalized plans hold neither nested intersections nor
            // `Nothing` below the root.
            PlanNode::Intersect(_) | PlanNode::Nothing => return nothing(sql),
        }
    }

    if !filter.is_empty() {
        sql.push_str(" JOIN games g ON g.id = p.game_id");
        push_filter(filter, &mut clauses, &mut clause_params);
    }

    sql.push_str(&where_clause(&clauses));
    params.extend(clause_params);
    CompiledQuery { sql, params }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        " WHERE 1".to_string()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Append the predicates of `filter` on `games g`.
fn push_filter(filter: &GameFilter, clauses: &mut Vec<String>, params: &mut Vec<SqlParam>) {
    let mut like = |column: &str, term: Option<&str>| {
        if let Some(term) = term {
            clauses.push(format!("g.{column} LIKE ? ESCAPE '\\'"));
            params.push(SqlParam::Text(contains(term)));
        }
    };
    like("white", non_blank(&filter.white));
    like("black", non_blank(&filter.black));
    like("opening", non_blank(&filter.opening));

    if let Some(player) = non_blank(&filter.player) {
        clauses.push("(g.white LIKE ? ESCAPE '\\' OR g.black LIKE ? ESCAPE '\\')".to_string());
        params.push(SqlParam::Text(contains(player)));
        params.push(SqlParam::Text(contains(player)));
    }

    let mut equals = |clause: &str, value: Option<&str>| {
        if let Some(value) = value {
            clauses.push(clause.to_string());
            params.push(SqlParam::Text(value.to_string()));
        }
    };
    equals("g.eco = ?", non_blank(&filter.eco));
    equals("g.result = ?", non_blank(&filter.result));
    equals("g.date >= ?", non_blank(&filter.date_from));
    equals("g.date <= ?", non_blank(&filter.date_to));

    if let Some(min) = filter.min_elo {
        clauses.push("(g.white_elo >= ? OR g.black_elo >= ?)".to_string());
        params.extend([SqlParam::Int(min.into()), SqlParam::Int(min.into())]);
    }
    if let Some(max) = filter.max_elo {
        clauses.push("(g.white_elo <= ? AND g.black_elo <= ?)".to_string());
        params.extend([SqlParam::Int(max.into()), SqlParam::Int(max.into())]);
    }
}

/// `%term%` with LIKE wildcards in `term` escaped.
fn contains(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
