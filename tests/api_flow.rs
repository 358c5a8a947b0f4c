use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use calcboard::app::{AppState, router};
use calcboard::auth;
use calcboard::config::Config;
use calcboard::db::open_db_in_memory;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn test_app() -> Router {
    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        database_path: ":memory:".to_string(),
        jwt_secret: SECRET.to_string(),
        token_ttl_minutes: 30,
    };
    let conn = open_db_in_memory().unwrap();
    router(AppState::with_connection(conn, config))
}

fn request(method: &str, path: &str, token: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn register(app: &Router, email: &str, username: &str, password: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/users/register",
            None,
            Some(&json!({ "email": email, "username": username, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body
}

async fn login(app: &Router, identifier: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/users/login",
            None,
            Some(&json!({ "username_or_email": identifier, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn quick_calc_is_public() {
    let app = test_app();

    let (status, body) = send(&app, request("GET", "/calc?op=div&a=10&b=4", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 2.5);
    assert_eq!(body["op"], "Divide");

    let (status, _) = send(&app, request("GET", "/calc?op=div&a=10&b=0", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request("GET", "/calc?op=sqrt&a=1&b=1", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_login_modulus_scenario() {
    let app = test_app();

    let account = register(&app, "a@x.com", "a", "secret123").await;
    assert_eq!(account["username"], "a");
    assert_eq!(account["email"], "a@x.com");
    assert!(account.get("password_hash").is_none());

    // Login works by username.
    let token = login(&app, "a", "secret123").await;

    let (status, created) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token),
            Some(&json!({ "a": 17, "b": 5, "type": "Modulus" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["result"], 2.0);

    let id = created["id"].as_i64().unwrap();
    let (status, fetched) = send(
        &app,
        request("GET", &format!("/calculations/{}", id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["a"], 17.0);
    assert_eq!(fetched["b"], 5.0);
    assert_eq!(fetched["type"], "Modulus");
    assert_eq!(fetched["result"], 2.0);
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_shapes() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/users/register",
            None,
            Some(&json!({ "email": "a@x.com", "username": "b", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Email already registered");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/users/register",
            None,
            Some(&json!({ "email": "b@x.com", "username": "a", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Username already taken");

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/users/register",
            None,
            Some(&json!({ "email": "not-an-email", "username": "c", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn login_fails_uniformly_on_bad_credentials() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/users/login",
            None,
            Some(&json!({ "username_or_email": "a", "password": "wrong" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/users/login",
            None,
            Some(&json!({ "username_or_email": "ghost", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Login also works by email.
    login(&app, "a@x.com", "secret123").await;
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = test_app();

    for (method, path) in [
        ("GET", "/calculations"),
        ("POST", "/calculations"),
        ("GET", "/profile/me"),
        ("GET", "/dashboard/stats"),
    ] {
        let (status, _) = send(&app, request(method, path, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, path);

        let (status, _) = send(&app, request(method, path, Some("garbage"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, path);
    }
}

#[tokio::test]
async fn expired_token_is_rejected_even_with_valid_signature() {
    let app = test_app();
    let account = register(&app, "a@x.com", "a", "secret123").await;
    let user_id = account["id"].as_i64().unwrap();

    let expired = auth::issue_token(SECRET, -1, user_id).unwrap();
    let (status, _) = send(&app, request("GET", "/profile/me", Some(&expired), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_resolves_only_to_its_own_account() {
    let app = test_app();
    register(&app, "x@x.com", "xavier", "secret123").await;
    register(&app, "y@x.com", "yvonne", "secret123").await;
    let token_x = login(&app, "xavier", "secret123").await;
    let token_y = login(&app, "yvonne", "secret123").await;

    let (_, me_x) = send(&app, request("GET", "/profile/me", Some(&token_x), None)).await;
    let (_, me_y) = send(&app, request("GET", "/profile/me", Some(&token_y), None)).await;
    assert_eq!(me_x["username"], "xavier");
    assert_eq!(me_y["username"], "yvonne");

    // X's record is invisible to Y, indistinguishable from nonexistent.
    let (_, created) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token_x),
            Some(&json!({ "a": 1, "b": 2, "type": "Add" })),
        ),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    for method in ["GET", "PUT", "DELETE"] {
        let body = (method == "PUT").then(|| json!({ "a": 0, "b": 0, "type": "Add" }));
        let (status, _) = send(
            &app,
            request(
                method,
                &format!("/calculations/{}", id),
                Some(&token_y),
                body.as_ref(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", method);
    }
}

#[tokio::test]
async fn divide_by_zero_returns_400_and_persists_nothing() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token),
            Some(&json!({ "a": 10, "b": 0, "type": "Divide" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Division by zero is not allowed");

    let (status, list) = send(&app, request("GET", "/calculations", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_operation_tag_is_a_schema_error() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token),
            Some(&json!({ "a": 1, "b": 2, "type": "SquareRoot" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn edit_recomputes_and_never_trusts_a_sent_result() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    let (_, created) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token),
            Some(&json!({ "a": 2, "b": 3, "type": "Add", "result": 999 })),
        ),
    )
    .await;
    // A smuggled result field is ignored, not stored.
    assert_eq!(created["result"], 5.0);

    let id = created["id"].as_i64().unwrap();
    let (status, updated) = send(
        &app,
        request(
            "PUT",
            &format!("/calculations/{}", id),
            Some(&token),
            Some(&json!({ "a": 9, "b": 3, "type": "Divide", "result": 999 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["result"], 3.0);
    assert_eq!(updated["type"], "Divide");
}

#[tokio::test]
async fn delete_returns_204_then_404() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    let (_, created) = send(
        &app,
        request(
            "POST",
            "/calculations",
            Some(&token),
            Some(&json!({ "a": 1, "b": 2, "type": "Add" })),
        ),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let path = format!("/calculations/{}", id);
    let (status, _) = send(&app, request("DELETE", &path, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("DELETE", &path, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_update_flow() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    register(&app, "b@x.com", "b", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    let (status, updated) = send(
        &app,
        request(
            "PUT",
            "/profile/me",
            Some(&token),
            Some(&json!({ "username": "renamed" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["username"], "renamed");
    assert_eq!(updated["email"], "a@x.com");

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/profile/me",
            Some(&token),
            Some(&json!({ "email": "b@x.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request("PUT", "/profile/me", Some(&token), Some(&json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn change_password_flow() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    // Wrong current password: 401, password unchanged, old token unaffected.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/change-password",
            Some(&token),
            Some(&json!({ "current_password": "wrong", "new_password": "fresh-pass" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login(&app, "a", "secret123").await;
    let (status, _) = send(&app, request("GET", "/profile/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    // Rule violations: too short, or unchanged.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/change-password",
            Some(&token),
            Some(&json!({ "current_password": "secret123", "new_password": "abc" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/change-password",
            Some(&token),
            Some(&json!({ "current_password": "secret123", "new_password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A valid change succeeds; old password stops working, new one works,
    // and the old token stays valid until its natural expiry.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/change-password",
            Some(&token),
            Some(&json!({ "current_password": "secret123", "new_password": "fresh-pass" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/users/login",
            None,
            Some(&json!({ "username_or_email": "a", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login(&app, "a", "fresh-pass").await;

    let (status, _) = send(&app, request("GET", "/profile/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn dashboard_stats_reflect_usage() {
    let app = test_app();
    register(&app, "a@x.com", "a", "secret123").await;
    let token = login(&app, "a", "secret123").await;

    // Empty account: zero-filled breakdown, no most-used, no average.
    let (status, empty) = send(&app, request("GET", "/dashboard/stats", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["total_calculations"], 0);
    assert!(empty["most_used_operation"].is_null());
    assert!(empty["average_result"].is_null());
    assert_eq!(empty["operations_breakdown"].as_object().unwrap().len(), 6);

    // Results 10, 20, 30 across two Adds and a Sub.
    for (a, b, op) in [(5, 5, "Add"), (15, 5, "Add"), (25, 5, "Sub")] {
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/calculations",
                Some(&token),
                Some(&json!({ "a": a, "b": b, "type": op })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, stats) = send(&app, request("GET", "/dashboard/stats", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_calculations"], 3);
    assert_eq!(stats["most_used_operation"], "Add");
    assert_eq!(stats["average_result"], 20.0);

    let breakdown = stats["operations_breakdown"].as_object().unwrap();
    assert_eq!(breakdown.len(), 6);
    assert_eq!(breakdown["Add"], 2);
    assert_eq!(breakdown["Sub"], 1);
    assert_eq!(breakdown["Divide"], 0);
    let sum: i64 = breakdown.values().map(|v| v.as_i64().unwrap()).sum();
    assert_eq!(sum, 3);
}
