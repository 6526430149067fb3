//! Game search: exact, material and pattern position queries, or header
//! filters alone, paginated by game.

use std::fmt;
use std::str::FromStr;

use chess::{compile_pattern, FenPosition, FingerprintKeys, MaterialSignature, PieceColor};
use serde::{Deserialize, Serialize};
use sqlx::query::QueryAs;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::error::{Error, Result};
use crate::index::{
    compile_game_query, compile_positions_query, compile_query, GameFilter, Page, QueryPlan,
    SqlParam,
};
use crate::store::{fetch_games, Database, GameRecord};

/// Largest page a caller may request; bigger requests are capped.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Same placement, side to move and castling rights, by fingerprint.
    Exact,
    /// Same piece counts anywhere on the board.
    Material,
    /// Board pattern with per-square alternatives.
    #[default]
    Pattern,
    /// No position query: every game passing the header filter.
    Metadata,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "material" => Ok(Self::Material),
            "pattern" => Ok(Self::Pattern),
            "metadata" => Ok(Self::Metadata),
            other => Err(format!(
                "unknown search mode '{other}' (expected exact, material, pattern or metadata)"
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Material => "material",
            Self::Pattern => "pattern",
            Self::Metadata => "metadata",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub mode: SearchMode,
    /// A FEN for `exact` and `material`, a board pattern for `pattern`.
    /// Ignored by `metadata`.
    pub pattern: String,
    /// Pattern mode only: restrict matches to positions with this side to
    /// move.
    pub side_to_move: Option<PieceColor>,
    /// Applied to the games of every mode.
    pub filter: GameFilter,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub games: Vec<GameMatch>,
    pub pagination: Pagination,
}

/// A matching game with every matching position in it. Serialized with the
/// game fields inline next to `positions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMatch {
    #[serde(flatten)]
    pub game: GameRecord,
    pub positions: Vec<MatchedPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPosition {
    pub move_number: u32,
    #[serde(rename = "move")]
    pub move_san: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_games: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Build the position plan for a request, `None` for a header-only search.
/// Malformed input is rejected here, before any SQL runs.
pub fn plan_request(keys: &FingerprintKeys, request: &SearchRequest) -> Result<Option<QueryPlan>> {
    let pattern = request.pattern.as_str();
    let plan = match request.mode {
        SearchMode::Exact => {
            let position = FenPosition::parse(pattern)?;
            let fingerprint =
                keys.fingerprint(&position.placement, position.side_to_move, position.castling)?;
            QueryPlan::for_fingerprint(fingerprint)
        }
        SearchMode::Material => QueryPlan::for_material(&MaterialSignature::of(pattern)?),
        SearchMode::Pattern => {
            let plan = QueryPlan::for_pattern(&compile_pattern(pattern)?);
            match request.side_to_move {
                Some(side) => plan.with_side_to_move(side),
                None => plan,
            }
        }
        SearchMode::Metadata => return Ok(None),
    };
    Ok(Some(plan))
}

/// Run a search. The count and the page are read in one transaction so
/// `total_games` always describes the same snapshot as `games`.
pub async fn search(
    db: &Database,
    keys: &FingerprintKeys,
    request: &SearchRequest,
) -> Result<SearchResults> {
    if request.page == 0 || request.page_size == 0 {
        return Err(Error::InvalidPage {
            page: request.page,
            page_size: request.page_size,
        });
    }
    let page_size = request.page_size.min(MAX_PAGE_SIZE);
    let plan = plan_request(keys, request)?;

    let page = Page {
        limit: page_size,
        offset: (request.page as u64 - 1) * page_size as u64,
    };
    let sql = match &plan {
        Some(plan) => compile_query(plan, &request.filter, page),
        None => compile_game_query(&request.filter, page),
    };

    let mut tx = db.pool().begin().await?;

    let (total,): (i64,) = bind_params(sqlx::query_as(&sql.count.sql), &sql.count.params)
        .fetch_one(&mut *tx)
        .await?;
    let game_ids: Vec<i64> = bind_params(sqlx::query_as::<_, (i64,)>(&sql.games.sql), &sql.games.params)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(id,)| id)
        .collect();

    let mut games = Vec::with_capacity(game_ids.len());
    if !game_ids.is_empty() {
        let rows: Vec<(i64, i64, Option<String>)> = match &plan {
            Some(plan) => {
                let positions_sql = compile_positions_query(plan, &game_ids);
                bind_params(sqlx::query_as(&positions_sql.sql), &positions_sql.params)
                    .fetch_all(&mut *tx)
                    .await?
            }
            None => Vec::new(),
        };
        let mut records = fetch_games(&mut tx, &game_ids).await?;

        for game_id in &game_ids {
            let Some(game) = records.remove(game_id) else {
                continue;
            };
            let positions = rows
                .iter()
                .filter(|(id, _, _)| id == game_id)
                .map(|(_, move_number, san)| MatchedPosition {
                    move_number: *move_number as u32,
                    move_san: san.clone(),
                })
                .collect();
            games.push(GameMatch { game, positions });
        }
    }
    tx.commit().await?;

    let total_games = total as u64;
    let total_pages = total_games.div_ceil(page_size as u64);
    tracing::debug!(
        mode = %request.mode,
        total_games,
        page = request.page,
        returned = games.len(),
        "Search complete"
    );

    Ok(SearchResults {
        games,
        pagination: Pagination {
            page: request.page,
            page_size,
            total_games,
            total_pages,
            has_next: (request.page as u64) < total_pages,
            has_prev: request.page > 1,
        },
    })
}

fn bind_params<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}
