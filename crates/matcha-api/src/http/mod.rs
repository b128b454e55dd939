//! axum routes for the REST surface. Everything under `/api/v1` except the
//! credential endpoints requires a bearer access token.

pub mod auth;
pub mod chats;
pub mod notifications;
pub mod users;

use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify/{token}", get(auth::verify_email).post(auth::verify_email))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(auth::confirm_password_reset))
        .route("/auth/oauth/{provider}", post(auth::oauth_login));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/{user_id}/like", post(users::like).delete(users::unlike))
        .route("/users/{user_id}/block", post(users::block).delete(users::unblock))
        .route("/users/{user_id}/report", post(users::report))
        .route("/users/{user_id}/status", get(users::status))
        .route("/users/{user_id}/profile", get(users::profile))
        .route("/me/pictures/{picture_id}/profile", put(users::set_profile_picture))
        .route("/me/chats", get(chats::list_chats))
        .route("/chats/{user_id}/messages", get(chats::list_messages))
        .route("/me/notifications", get(notifications::list))
        .route("/me/notifications/read", post(notifications::mark_all_read))
        .route("/me/notifications/{id}/read", put(notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;
    use uuid::Uuid;

    use matcha_bus::channels;

    use super::*;
    use crate::test_support::{self, TestContext};

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app(ctx: &TestContext) -> Router {
        router(ctx.state.clone())
    }

    #[tokio::test]
    async fn health_is_public() {
        let ctx = test_support::context();
        let (status, body) = call(&app(&ctx), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_bearer() {
        let ctx = test_support::context();
        let app = app(&ctx);

        let (status, body) = call(&app, Method::GET, "/api/v1/me/chats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));

        let (status, _) =
            call(&app, Method::GET, "/api/v1/me/chats", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn credential_lifecycle_over_http() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let creds = json!({ "email": "h@example.com", "password": "hunter2hunter2" });

        let (status, _) = call(&app, Method::POST, "/api/v1/auth/signup", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": "not-an-email", "password": "hunter2hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let link = ctx.mailer.sent()[0].body.clone();
        let token = link.rsplit('/').next().unwrap();
        let (status, _) =
            call(&app, Method::POST, &format!("/api/v1/auth/verify/{token}"), None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "hunter2hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "h@example.com", "password": "not-the-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, login) = call(&app, Method::POST, "/api/v1/auth/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["is_verified"], true);
        assert_eq!(login["auth_method"], "local");
        let access = login["access_token"].as_str().unwrap().to_string();
        let refresh = json!({ "refresh_token": login["refresh_token"] });

        let (status, refreshed) =
            call(&app, Method::POST, "/api/v1/auth/refresh", None, Some(refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let claims = ctx
            .state
            .tokens
            .verify(refreshed["access_token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.sub.to_string(), login["user_id"].as_str().unwrap());

        let (status, _) =
            call(&app, Method::POST, "/api/v1/auth/logout", Some(&access), Some(refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, Method::POST, "/api/v1/auth/refresh", None, Some(refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oauth_provider_errors_map_to_status_codes() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let body = json!({ "code": "abc", "code_verifier": "xyz" });

        let (status, _) =
            call(&app, Method::POST, "/api/v1/auth/oauth/myspace", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::POST, "/api/v1/auth/oauth/google", None, Some(body)).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn mutual_likes_report_a_match() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");

        let (status, first) = call(
            &app,
            Method::POST,
            &format!("/api/v1/users/{b}/like"),
            Some(&test_support::access_token(&ctx, a)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["message"], "User liked successfully");
        assert!(first.get("connection").is_none());

        let (_, second) = call(
            &app,
            Method::POST,
            &format!("/api/v1/users/{a}/like"),
            Some(&test_support::access_token(&ctx, b)),
            None,
        )
        .await;
        assert_eq!(second["message"], "It's a match!");
        let (lo, hi) = matcha_db::models::ordered_pair(a, b);
        assert_eq!(second["connection"]["user1_id"], lo.to_string());
        assert_eq!(second["connection"]["user2_id"], hi.to_string());

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/users/{}/like", Uuid::new_v4()),
            Some(&test_support::access_token(&ctx, a)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_reflects_the_gateway_key() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");
        ctx.bus.set_key(&channels::status_key(b), "online").await.unwrap();
        let token = test_support::access_token(&ctx, a);

        let (_, online) =
            call(&app, Method::GET, &format!("/api/v1/users/{b}/status"), Some(&token), None).await;
        assert_eq!(online["online"], true);

        ctx.bus.del_key(&channels::status_key(b)).await.unwrap();
        let (_, offline) =
            call(&app, Method::GET, &format!("/api/v1/users/{b}/status"), Some(&token), None).await;
        assert_eq!(offline["online"], false);
    }

    #[tokio::test]
    async fn notifications_are_listed_and_marked_by_recipient() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");
        ctx.state.users.like(a, b).await.unwrap();
        let (a_token, b_token) = (
            test_support::access_token(&ctx, a),
            test_support::access_token(&ctx, b),
        );

        let (status, listed) =
            call(&app, Method::GET, "/api/v1/me/notifications", Some(&b_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["type"], "like");
        let id = listed[0]["id"].as_i64().unwrap();

        let uri = format!("/api/v1/me/notifications/{id}/read");
        let (status, _) = call(&app, Method::PUT, &uri, Some(&a_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, Method::PUT, &uri, Some(&b_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, all) =
            call(&app, Method::POST, "/api/v1/me/notifications/read", Some(&b_token), None).await;
        assert_eq!(all["updated"], 0);

        let (status, body) =
            call(&app, Method::PUT, "/api/v1/me/notifications/4242/read", Some(&b_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn message_history_is_paged() {
        let ctx = test_support::context();
        let app = app(&ctx);
        let a = test_support::user(&ctx, "a");
        let b = test_support::user(&ctx, "b");
        ctx.db
            .unit_of_work(|repos| {
                repos.connections().create(a, b)?;
                repos.messages().create(a, b, "one", chrono::Utc::now())?;
                repos.messages().create(b, a, "two", chrono::Utc::now())
            })
            .unwrap();
        let token = test_support::access_token(&ctx, a);

        let (status, page) = call(
            &app,
            Method::GET,
            &format!("/api/v1/chats/{b}/messages?limit=1"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.as_array().unwrap().len(), 1);

        let (_, chats) = call(&app, Method::GET, "/api/v1/me/chats", Some(&token), None).await;
        assert_eq!(chats[0]["peer"]["username"], "b");
    }
}
