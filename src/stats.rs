//! Usage-statistics aggregator for the dashboard.

use axum::{
    Json,
    extract::{Extension, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::operations::Operation;

/// Summary metrics over one account's calculations.
///
/// The breakdown always contains all six operation tags, zero-filled for
/// tags the account has never used, so `sum(breakdown) == total` holds and
/// the dashboard shape is stable.
#[derive(Debug, Serialize, Deserialize)]
pub struct CalculationStats {
    pub total_calculations: i64,
    pub operations_breakdown: BTreeMap<String, i64>,
    /// Ties broken by operation enumeration order; `None` when there are
    /// no calculations at all.
    pub most_used_operation: Option<String>,
    /// Arithmetic mean of stored results; `None` when total is zero.
    pub average_result: Option<f64>,
}

/// Derives the stats for one owner in a single grouped pass.
pub fn stats_for_user(conn: &Connection, owner: i64) -> Result<CalculationStats, AppError> {
    let mut counts: BTreeMap<Operation, i64> = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT op, COUNT(*) AS n
         FROM calculations
         WHERE user_id = ?1
         GROUP BY op",
    )?;
    let mut rows = stmt.query([owner])?;
    while let Some(row) = rows.next()? {
        let op_text: String = row.get("op")?;
        let n: i64 = row.get("n")?;
        if let Some(op) = Operation::parse(&op_text) {
            counts.insert(op, n);
        }
    }

    let total: i64 = counts.values().sum();

    let average_result = if total == 0 {
        None
    } else {
        conn.query_row(
            "SELECT AVG(result) FROM calculations WHERE user_id = ?1",
            [owner],
            |row| row.get::<_, Option<f64>>(0),
        )?
    };

    // First tag in enumeration order wins a tie.
    let mut most_used: Option<(Operation, i64)> = None;
    for op in Operation::ALL {
        let n = counts.get(&op).copied().unwrap_or(0);
        if n > 0 && most_used.map_or(true, |(_, best)| n > best) {
            most_used = Some((op, n));
        }
    }

    let mut operations_breakdown = BTreeMap::new();
    for op in Operation::ALL {
        operations_breakdown.insert(
            op.as_str().to_string(),
            counts.get(&op).copied().unwrap_or(0),
        );
    }

    Ok(CalculationStats {
        total_calculations: total,
        operations_breakdown,
        most_used_operation: most_used.map(|(op, _)| op.as_str().to_string()),
        average_result,
    })
}

/// `GET /dashboard/stats`
pub async fn handle_dashboard_stats(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<CalculationStats>, AppError> {
    let conn = state.db.lock().unwrap();
    let stats = stats_for_user(&conn, user.id)?;
    Ok(Json(stats))
}
