//! Calculation record store and BREAD handlers.
//!
//! Every operation is scoped to the owning account: a calculation owned by
//! someone else behaves exactly like a nonexistent one (`NotFound`), never
//! a distinct "forbidden" signal. The stored result is always recomputed
//! server-side from `(a, b, op)` on create and on update.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::db::now_ms;
use crate::error::AppError;
use crate::operations::{Operation, evaluate};

const LIST_DEFAULT_LIMIT: u32 = 100;
const LIST_LIMIT_MAX: u32 = 100;

/// A stored calculation record.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    /// Stable record identifier.
    pub id: i64,
    /// Owning account; set at creation, immutable thereafter.
    pub user_id: i64,
    pub a: f64,
    pub b: f64,
    pub op: Operation,
    /// Derived server-side, never supplied by the caller.
    pub result: f64,
    /// Creation timestamp in epoch milliseconds.
    pub created_at: i64,
}

/// Request body for create and update. Note there is no `result` field:
/// a client-supplied result is never accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub a: f64,
    pub b: f64,
    #[serde(rename = "type")]
    pub op: Operation,
}

/// Wire form of a calculation record.
#[derive(Debug, Serialize, Deserialize)]
pub struct CalculationResponse {
    pub id: i64,
    pub a: f64,
    pub b: f64,
    #[serde(rename = "type")]
    pub op: Operation,
    pub result: f64,
    pub user_id: i64,
    pub created_at: i64,
}

impl From<&Calculation> for CalculationResponse {
    fn from(calc: &Calculation) -> Self {
        Self {
            id: calc.id,
            a: calc.a,
            b: calc.b,
            op: calc.op,
            result: calc.result,
            user_id: calc.user_id,
            created_at: calc.created_at,
        }
    }
}

/// Pagination query for the browse endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Clamps a requested page size to the allowed maximum.
pub fn normalize_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => LIST_DEFAULT_LIMIT,
        Some(value) if value > LIST_LIMIT_MAX => LIST_LIMIT_MAX,
        Some(value) => value,
    }
}

fn row_to_calculation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Calculation> {
    let op_text: String = row.get("op")?;
    let op = Operation::parse(&op_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown operation `{}` in calculations.op", op_text).into(),
        )
    })?;
    Ok(Calculation {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        a: row.get("a")?,
        b: row.get("b")?,
        op,
        result: row.get("result")?,
        created_at: row.get("created_at")?,
    })
}

const CALC_COLUMNS: &str = "id, user_id, a, b, op, result, created_at";

/// Validates and computes via the evaluator, then persists. An evaluator
/// failure aborts before anything is written.
pub fn create_calculation(
    conn: &Connection,
    owner: i64,
    a: f64,
    b: f64,
    op: Operation,
) -> Result<Calculation, AppError> {
    let result = evaluate(a, b, op)?;

    conn.execute(
        "INSERT INTO calculations (user_id, a, b, op, result, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![owner, a, b, op.as_str(), result, now_ms()],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("calculation created id={} user_id={} op={}", id, owner, op);
    get_calculation(conn, owner, id)?
        .ok_or_else(|| AppError::Internal("created calculation vanished".to_string()))
}

/// Lists the owner's calculations ordered by creation time, oldest first.
pub fn list_calculations(
    conn: &Connection,
    owner: i64,
    skip: u32,
    limit: Option<u32>,
) -> Result<Vec<Calculation>, AppError> {
    let limit = normalize_limit(limit);
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALC_COLUMNS} FROM calculations
         WHERE user_id = ?1
         ORDER BY created_at ASC, id ASC
         LIMIT ?2 OFFSET ?3"
    ))?;

    let mut rows = stmt.query(params![owner, limit, skip])?;
    let mut calculations = Vec::new();
    while let Some(row) = rows.next()? {
        calculations.push(row_to_calculation(row)?);
    }
    Ok(calculations)
}

pub fn get_calculation(
    conn: &Connection,
    owner: i64,
    id: i64,
) -> Result<Option<Calculation>, AppError> {
    let calc = conn
        .query_row(
            &format!("SELECT {CALC_COLUMNS} FROM calculations WHERE id = ?1 AND user_id = ?2"),
            params![id, owner],
            row_to_calculation,
        )
        .optional()?;
    Ok(calc)
}

/// Fully replaces operands and operation, recomputing the result.
pub fn update_calculation(
    conn: &Connection,
    owner: i64,
    id: i64,
    a: f64,
    b: f64,
    op: Operation,
) -> Result<Calculation, AppError> {
    // Recompute before touching the row so an evaluator failure leaves the
    // stored record untouched.
    let result = evaluate(a, b, op)?;

    let changed = conn.execute(
        "UPDATE calculations
         SET a = ?3, b = ?4, op = ?5, result = ?6
         WHERE id = ?1 AND user_id = ?2",
        params![id, owner, a, b, op.as_str(), result],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("Calculation not found".to_string()));
    }

    log::info!("calculation updated id={} user_id={} op={}", id, owner, op);
    get_calculation(conn, owner, id)?
        .ok_or_else(|| AppError::Internal("updated calculation vanished".to_string()))
}

/// Permanent removal. Deleting an already-deleted id is `NotFound`.
pub fn delete_calculation(conn: &Connection, owner: i64, id: i64) -> Result<(), AppError> {
    let changed = conn.execute(
        "DELETE FROM calculations WHERE id = ?1 AND user_id = ?2",
        params![id, owner],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("Calculation not found".to_string()));
    }
    log::info!("calculation deleted id={} user_id={}", id, owner);
    Ok(())
}

// Web handlers below.

/// `GET /calculations` - browse with pagination.
pub async fn handle_browse(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CalculationResponse>>, AppError> {
    let conn = state.db.lock().unwrap();
    let calculations = list_calculations(&conn, user.id, query.skip.unwrap_or(0), query.limit)?;
    Ok(Json(
        calculations.iter().map(CalculationResponse::from).collect(),
    ))
}

/// `GET /calculations/{id}` - read one record.
pub async fn handle_read(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<CalculationResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let calc = get_calculation(&conn, user.id, id)?
        .ok_or_else(|| AppError::NotFound("Calculation not found".to_string()))?;
    Ok(Json(CalculationResponse::from(&calc)))
}

/// `POST /calculations` - add a record; `201` on success.
pub async fn handle_add(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CalculationRequest>,
) -> Result<(StatusCode, Json<CalculationResponse>), AppError> {
    let conn = state.db.lock().unwrap();
    let calc = create_calculation(&conn, user.id, req.a, req.b, req.op)?;
    Ok((StatusCode::CREATED, Json(CalculationResponse::from(&calc))))
}

/// `PUT /calculations/{id}` - full replace with recompute.
pub async fn handle_edit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<CalculationRequest>,
) -> Result<Json<CalculationResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let calc = update_calculation(&conn, user.id, id, req.a, req.b, req.op)?;
    Ok(Json(CalculationResponse::from(&calc)))
}

/// `DELETE /calculations/{id}` - `204` on success.
pub async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let conn = state.db.lock().unwrap();
    delete_calculation(&conn, user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
