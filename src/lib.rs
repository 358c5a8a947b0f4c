/*!
# calcboard

A JWT-gated calculator REST service built in Rust.

## Overview

calcboard is a small CRUD web application: users register and log in,
create arithmetic calculations over an authenticated REST API, manage
their profile and password, and read a usage-statistics dashboard. Every
calculation is owned by exactly one account and is invisible to everyone
else.

## Architecture

The application follows a request-per-call model over a shared SQLite
database:

### HTTP Layer
- **Technologies**: axum, tokio, tower-http
- **Key Components**:
  - Router - Public auth routes plus bearer-gated resource routes
  - Auth middleware - Validates bearer tokens and resolves the account
  - Request logger - Method/path/status/elapsed for every request

### Domain Layer
- **Core Components**:
  - Operation Evaluator - Pure arithmetic over six operation tags
  - Account Store - Registration, lookup, profile and password updates
  - Calculation Record Store - Owner-scoped BREAD over calculation rows
  - Statistics Aggregator - Per-account totals, breakdown, mean result

### Persistence Layer
- SQLite through rusqlite with explicit SQL and prepared statements
- Foreign keys on; ownership enforced by `WHERE user_id = ?` on every
  calculation query
- In-memory databases back the test suites

## Key Invariants

- A calculation's result is always recomputed server-side from
  `(a, b, operation)`; a client-supplied result is never stored
- A record owned by another account is indistinguishable from a
  nonexistent one (404, never 403)
- Passwords are stored only as Argon2 hashes
- Token validation fails closed; expired or malformed tokens are rejected
  uniformly with 401

## Modules

- **operations**: the operation enum and the pure evaluator
- **users**: account store, password hashing, auth/profile handlers
- **auth**: token issue/validation and the bearer middleware
- **calculations**: owner-scoped record store and BREAD handlers
- **stats**: dashboard statistics aggregation
- **db**: SQLite bootstrap and schema
- **config**: environment-driven configuration
- **error**: the error taxonomy and its HTTP mapping
- **app**: state, routing and server startup

## REST API Endpoints

- `POST /users/register`, `POST /users/login`
- `GET|POST /calculations`, `GET|PUT|DELETE /calculations/{id}`
- `GET|PUT /profile/me`, `POST /profile/change-password`
- `GET /dashboard/stats`
- `GET /health`, `GET /calc` (unauthenticated quick calculation)
*/

pub mod app;
pub mod auth;
pub mod calculations;
pub mod config;
pub mod db;
pub mod error;
pub mod operations;
pub mod stats;
pub mod users;

pub use error::AppError;
pub use operations::{EvalError, Operation, evaluate};
