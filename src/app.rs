use axum::{
    Json, Router, middleware,
    extract::{Query, Request},
    http::{Method, header},
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::calculations;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::operations::{Operation, evaluate};
use crate::stats;
use crate::users;

/// Shared application state: one SQLite connection behind a mutex plus the
/// loaded configuration. Each request is a short-lived unit of work; all
/// cross-request consistency is delegated to SQLite.
pub struct AppState {
    pub db: Mutex<Connection>,
    pub config: Config,
}

impl AppState {
    /// Opens the configured database file and wraps it in shared state.
    pub fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let conn = db::open_db(&config.database_path)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Wraps an already-open connection; tests use this with an in-memory
    /// database.
    pub fn with_connection(conn: Connection, config: Config) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(conn),
            config,
        })
    }
}

#[derive(Deserialize)]
struct CalcQuery {
    op: String,
    a: f64,
    b: f64,
}

/// Builds the full router: public auth/quick-calc routes plus the
/// bearer-gated resource routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let protected = Router::new()
        .route(
            "/calculations",
            get(calculations::handle_browse).post(calculations::handle_add),
        )
        .route(
            "/calculations/:id",
            get(calculations::handle_read)
                .put(calculations::handle_edit)
                .delete(calculations::handle_delete),
        )
        .route(
            "/profile/me",
            get(users::handle_get_profile).put(users::handle_update_profile),
        )
        .route(
            "/profile/change-password",
            post(users::handle_change_password),
        )
        .route("/dashboard/stats", get(stats::handle_dashboard_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/calc", get(quick_calc))
        .route("/users/register", post(users::handle_register))
        .route("/users/login", post(users::handle_login))
        .merge(protected)
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

/// Starts the server with configuration from the environment.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Unauthenticated one-shot calculation, e.g. `/calc?op=div&a=10&b=4`.
/// Exercises the evaluator without an account or persistence.
async fn quick_calc(Query(query): Query<CalcQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let op = Operation::parse(&query.op)
        .ok_or_else(|| AppError::BusinessRule("Unsupported operation".to_string()))?;
    let result = evaluate(query.a, query.b, op)?;
    Ok(Json(serde_json::json!({
        "op": op.as_str(),
        "result": result,
    })))
}

/// Logs every request with its status and elapsed time.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} -> {} in {:.2} ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    response
}
