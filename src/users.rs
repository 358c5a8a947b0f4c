use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::{self, CurrentUser};
use crate::db::now_ms;
use crate::error::AppError;

/// A registered account row.
///
/// The password is stored only as an Argon2 hash; plaintext is discarded
/// immediately after hashing and never leaves the register/login/change
/// handlers.
#[derive(Debug, Clone)]
pub struct User {
    /// Stable account identifier.
    pub id: i64,

    /// Email address (unique).
    pub email: String,

    /// Username (unique).
    pub username: String,

    /// Argon2 hash of the user's password.
    pub password_hash: String,

    /// Inactive accounts cannot log in or use tokens.
    pub is_active: bool,

    /// Creation timestamp in epoch milliseconds.
    pub created_at: i64,
}

/// Public view of an account, safe for client responses (no hash).
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_active: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            is_active: user.is_active,
        }
    }
}

/// Registration form data.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    /// Password in plaintext (only transmitted, never stored).
    pub password: String,
}

/// Login form data. The identifier may be an email or a username.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Profile update form data; at least one field must be provided.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Password change form data for an authenticated user.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Successful login payload: the signed bearer token plus the account.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

impl RegisterRequest {
    /// Shape validation, run before any business logic.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.email.is_empty() || self.username.is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(
                "Username, email and password cannot be empty".to_string(),
            ));
        }
        if !EMAIL_REGEX.is_match(&self.email) {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }
        Ok(())
    }
}

impl ProfileUpdateRequest {
    /// Requires at least one field; provided fields must be well-formed.
    pub fn validate(&self) -> Result<(), AppError> {
        let email_given = self.email.as_deref().is_some_and(|e| !e.is_empty());
        let username_given = self.username.as_deref().is_some_and(|u| !u.is_empty());
        if !email_given && !username_given {
            return Err(AppError::BusinessRule(
                "At least one field (email or username) must be provided".to_string(),
            ));
        }
        if let Some(email) = self.email.as_deref() {
            if !email.is_empty() && !EMAIL_REGEX.is_match(email) {
                return Err(AppError::Validation("Invalid email address".to_string()));
            }
        }
        Ok(())
    }
}

impl PasswordChangeRequest {
    /// New-password rules: at least 6 characters and different from the
    /// current one. The current password itself is verified against the
    /// stored hash in the handler.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.new_password.len() < 6 {
            return Err(AppError::BusinessRule(
                "New password must be at least 6 characters long".to_string(),
            ));
        }
        if self.new_password == self.current_password {
            return Err(AppError::BusinessRule(
                "New password must be different from current password".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hash a password using Argon2
///
/// Creates a cryptographically secure hash of a password using Argon2id.
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String, AppError>` - The password hash or an error
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(AppError::Internal("Password hashing failed".to_string())),
    }
}

/// Verify a password against a stored hash
///
/// Checks if a plaintext password matches a stored Argon2 hash.
///
/// # Arguments
/// * `password` - The plaintext password to verify
/// * `hash` - The stored password hash to check against
///
/// # Returns
/// * `Result<bool, AppError>` - True if the password matches, false if not,
///   or an error if the hash is in an invalid format
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => {
            return Err(AppError::Internal(
                "Invalid password hash format".to_string(),
            ));
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
    })
}

const USER_COLUMNS: &str = "id, email, username, password_hash, is_active, created_at";

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Look up an account by email or username. Email is tried first, then
/// username, matching the login contract.
pub fn find_by_identifier(conn: &Connection, identifier: &str) -> Result<Option<User>, AppError> {
    if let Some(user) = find_by_email(conn, identifier)? {
        return Ok(Some(user));
    }
    find_by_username(conn, identifier)
}

/// Register a new user
///
/// Creates a new account with the provided email, username, and password.
/// The password is hashed before storage.
///
/// # Errors
/// * `BusinessRule` if the email or username is already in use
pub fn create_user(
    conn: &Connection,
    email: &str,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    if find_by_email(conn, email)?.is_some() {
        return Err(AppError::BusinessRule(
            "Email already registered".to_string(),
        ));
    }
    if find_by_username(conn, username)?.is_some() {
        return Err(AppError::BusinessRule("Username already taken".to_string()));
    }

    let password_hash = hash_password(password)?;
    conn.execute(
        "INSERT INTO users (email, username, password_hash, is_active, created_at)
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![email, username, password_hash, now_ms()],
    )?;

    let id = conn.last_insert_rowid();
    log::info!("registered user id={} username={}", id, username);
    find_by_id(conn, id)?
        .ok_or_else(|| AppError::Internal("registered user vanished".to_string()))
}

/// Update username and/or email for an account.
///
/// Each provided field is independently checked for uniqueness against all
/// *other* accounts; setting a field to its current value is allowed.
pub fn update_profile(
    conn: &Connection,
    user_id: i64,
    update: &ProfileUpdateRequest,
) -> Result<User, AppError> {
    let new_email = update.email.as_deref().filter(|e| !e.is_empty());
    let new_username = update.username.as_deref().filter(|u| !u.is_empty());

    if let Some(email) = new_email {
        if let Some(existing) = find_by_email(conn, email)? {
            if existing.id != user_id {
                log::warn!("profile update failed: email {} already exists", email);
                return Err(AppError::BusinessRule(
                    "Email already registered".to_string(),
                ));
            }
        }
    }
    if let Some(username) = new_username {
        if let Some(existing) = find_by_username(conn, username)? {
            if existing.id != user_id {
                log::warn!("profile update failed: username {} already exists", username);
                return Err(AppError::BusinessRule("Username already taken".to_string()));
            }
        }
    }

    let changed = conn.execute(
        "UPDATE users
         SET email = COALESCE(?2, email),
             username = COALESCE(?3, username)
         WHERE id = ?1",
        params![user_id, new_email, new_username],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    log::info!("profile updated for user_id={}", user_id);
    find_by_id(conn, user_id)?
        .ok_or_else(|| AppError::Internal("updated user vanished".to_string()))
}

/// Replace an account's password hash.
pub fn update_password(conn: &Connection, user_id: i64, new_hash: &str) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![user_id, new_hash],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    log::info!("password changed for user_id={}", user_id);
    Ok(())
}

// Web handlers below.

/// Handle user registration
///
/// # Returns
/// * `201` with the created account, or `400`/`422` on duplicate or
///   malformed input
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    req.validate()?;
    let conn = state.db.lock().unwrap();
    let user = create_user(&conn, &req.email, &req.username, &req.password)?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Handle user login
///
/// Verifies credentials against either email or username and issues a
/// signed bearer token carrying the account id and a 30-minute expiry.
///
/// # Returns
/// * `200` with the token, or `401` on invalid credentials (the response
///   never distinguishes unknown identifier from wrong password)
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let user = find_by_identifier(&conn, &req.username_or_email)?;

    let user = match user {
        Some(user) if user.is_active && verify_password(&req.password, &user.password_hash)? => {
            user
        }
        _ => {
            log::warn!("failed login for identifier={}", req.username_or_email);
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }
    };

    let access_token = auth::issue_token(
        &state.config.jwt_secret,
        state.config.token_ttl_minutes,
        user.id,
    )?;
    log::info!("login ok for user_id={}", user.id);

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: UserResponse::from(&user),
    }))
}

/// `GET /profile/me` - the authenticated account's profile.
pub async fn handle_get_profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// `PUT /profile/me` - update username and/or email.
pub async fn handle_update_profile(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<UserResponse>, AppError> {
    req.validate()?;
    let conn = state.db.lock().unwrap();
    let updated = update_profile(&conn, user.id, &req)?;
    Ok(Json(UserResponse::from(&updated)))
}

/// `POST /profile/change-password`
///
/// Requires re-verification of the current password. Outstanding tokens
/// are not revoked; they stay valid until their natural expiry and the
/// client is expected to discard its token and log in again.
pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    req.validate()?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        log::warn!(
            "password change failed: incorrect current password for user_id={}",
            user.id
        );
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&req.new_password)?;
    let conn = state.db.lock().unwrap();
    update_password(&conn, user.id, &new_hash)?;

    Ok(Json(serde_json::json!({
        "message": "Password changed successfully. Please login again with your new password."
    })))
}
