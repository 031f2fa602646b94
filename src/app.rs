use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, config::AppConfig, referral, state::AppState, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(referral::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let (state, _) = AppState::in_memory(AppConfig::for_tests());
        build_app(state)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register_and_login(app: &Router, username: &str) -> (String, String, String) {
        let (status, json) = call(
            app,
            Method::POST,
            "/api/register",
            None,
            Some(json!({
                "username": username,
                "password": "cakeer2sdk",
                "fullName": "Some Full Name",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            app,
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": username, "password": "cakeer2sdk" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        (
            id,
            json["data"]["accessToken"].as_str().unwrap().to_string(),
            json["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn referral_flow_credits_referee() {
        let app = app();
        let (referrer_id, referrer_token, _) = register_and_login(&app, "referrer").await;
        let (_, referee_token, _) = register_and_login(&app, "referee1").await;

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/referral/generate",
            Some(&referrer_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        let link = json["data"].as_str().unwrap();
        let prefix = format!("https://credi.test/referral/{referrer_id}/");
        assert!(link.starts_with(&prefix), "{link}");
        let code = link.trim_start_matches(&prefix).to_string();

        let (_, json) = call(&app, Method::GET, "/api/me", Some(&referrer_token), None).await;
        assert_eq!(json["data"]["activeReferrals"], 1);

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/referral/verify",
            Some(&referee_token),
            Some(json!({ "code": code, "referrerUserId": referrer_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["data"]["usageCount"], 1);

        let (status, json) =
            call(&app, Method::GET, "/api/balance", Some(&referee_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], 5000);

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/referral/verify",
            Some(&referee_token),
            Some(json!({ "code": code, "referrerUserId": referrer_id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "already-referred");
    }

    #[tokio::test]
    async fn verifying_own_code_is_rejected() {
        let app = app();
        let (id, token, _) = register_and_login(&app, "selfish").await;
        let (status, json) = call(
            &app,
            Method::POST,
            "/api/referral/verify",
            Some(&token),
            Some(json!({ "code": "abc1234", "referrerUserId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "cannot-refer-self");
    }

    #[tokio::test]
    async fn expire_unknown_code_is_not_found_then_known_code_expires() {
        let app = app();
        let (_, token, _) = register_and_login(&app, "expirer").await;

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/referral/expire",
            Some(&token),
            Some(json!({ "code": "abc1234" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errorCode"], "referral-not-found");

        let (_, json) = call(&app, Method::POST, "/api/referral/generate", Some(&token), None).await;
        let link = json["data"].as_str().unwrap();
        let code = link.rsplit('/').next().unwrap();

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/referral/expire",
            Some(&token),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = call(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(json["data"]["activeReferrals"], 0);
    }

    #[tokio::test]
    async fn token_kinds_are_enforced_per_route() {
        let app = app();
        let (_, access, refresh) = register_and_login(&app, "kindcheck").await;

        let (status, _) = call(&app, Method::GET, "/api/balance", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::GET, "/api/auth/refresh", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) =
            call(&app, Method::GET, "/api/auth/refresh", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::OK);
        let fresh = json["data"]["accessToken"].as_str().unwrap().to_string();

        let (status, _) = call(&app, Method::GET, "/api/balance", Some(&fresh), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        let app = app();
        let (status, json) = call(&app, Method::GET, "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["errorCode"], "unauthorized");

        let req = Request::get("/api/me")
            .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let app = app();
        register_and_login(&app, "realuser").await;

        let (s1, wrong) = call(
            &app,
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "realuser", "password": "nope" })),
        )
        .await;
        let (s2, unknown) = call(
            &app,
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "username": "ghostuser", "password": "nope" })),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(wrong, unknown);
        assert!(wrong["data"].is_null());
    }

    #[tokio::test]
    async fn duplicate_and_invalid_registration() {
        let app = app();
        register_and_login(&app, "takenname").await;

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/register",
            None,
            Some(json!({
                "username": "takenname",
                "password": "another",
                "fullName": "Another Person",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "username-already-exists");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "username": "ab", "password": "", "fullName": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "bad-request");
        assert_eq!(json["errors"].as_array().unwrap().len(), 3);
    }
}
