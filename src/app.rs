use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, blood, views};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(blood::router())
                .route("/health", get(|| async { "ok" })),
        )
        .merge(views::router())
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
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::claims::Role;

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(t) = token {
            req = req.header(header::COOKIE, format!("token={t}"));
        }
        req.body(Body::empty()).unwrap()
    }

    fn json_with_token(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("token={token}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn token_from(res: &Response) -> String {
        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie")
            .to_str()
            .unwrap();
        assert!(cookie.contains("HttpOnly"));
        cookie
            .split(';')
            .next()
            .and_then(|kv| kv.strip_prefix("token="))
            .unwrap()
            .to_string()
    }

    fn alice() -> Value {
        json!({
            "email": "alice@x.com",
            "password": "pw123456",
            "name": "Alice",
            "role": "donor",
            "username": "alice",
        })
    }

    fn hospital() -> Value {
        json!({
            "email": "admin@city.org",
            "password": "pw123456",
            "name": "City Hospital",
            "role": "hospital",
            "username": "cityhospital",
        })
    }

    async fn register_token(app: &Router, body: Value) -> String {
        let res = send(app, post_json("/api/auth/register", body)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        token_from(&res)
    }

    #[tokio::test]
    async fn health() {
        let app = build_app(AppState::fake());
        let res = send(&app, get_with_token("/api/health", None)).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn donor_register_login_scenario() {
        let state = AppState::fake();
        let keys = state.keys.clone();
        let app = build_app(state);

        let res = send(&app, post_json("/api/auth/register", alice())).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let token = token_from(&res);
        let body = body_json(res).await;
        assert_eq!(body["user"]["role"], "donor");
        assert!(body["user"].get("passwordHash").is_none());

        let res = send(
            &app,
            post_json("/api/auth/login", json!({"identifier": "alice@x.com", "password": "pw123456"})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let token2 = token_from(&res);
        assert_eq!(keys.verify(&token2).unwrap().role, Role::Donor);
        assert_eq!(keys.verify(&token).unwrap().sub, keys.verify(&token2).unwrap().sub);

        let res = send(
            &app,
            post_json("/api/auth/login", json!({"identifier": "alice@x.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn duplicate_register_is_bad_request() {
        let app = build_app(AppState::fake());
        let res = send(&app, post_json("/api/auth/register", alice())).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = send(&app, post_json("/api/auth/register", alice())).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn invalid_registration_lists_fields() {
        let app = build_app(AppState::fake());
        let res = send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "bad", "password": "1", "name": "", "username": "x"}),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["status"], 400);
        for key in ["email", "password", "username", "name", "role"] {
            assert!(body["fields"][key].is_string(), "missing {key}");
        }
        assert_eq!(body["fields"]["role"], "Role is required");
    }

    #[tokio::test]
    async fn unknown_role_is_a_field_error() {
        let app = build_app(AppState::fake());
        let mut body = alice();
        body["role"] = json!("admin");
        let res = send(&app, post_json("/api/auth/register", body)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(res).await;
        assert_eq!(body["error"], "Invalid input");
        assert_eq!(body["fields"]["role"], "Role must be donor or hospital");
    }

    #[tokio::test]
    async fn malformed_bodies_use_the_error_envelope() {
        let app = build_app(AppState::fake());

        let res = send(
            &app,
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["fields"]["body"], "Request body is not valid JSON");

        let res = send(
            &app,
            Request::post("/api/auth/login")
                .body(Body::from(r#"{"identifier":"a","password":"b"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["fields"]["body"].is_string());

        let res = send(&app, post_json("/api/auth/register", json!({"email": 42}))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["fields"]["body"].is_string());
    }

    #[tokio::test]
    async fn login_accepts_both_identifier_keys() {
        let app = build_app(AppState::fake());
        register_token(&app, alice()).await;
        let res = send(
            &app,
            post_json(
                "/api/auth/login",
                json!({"identifier": "alice", "email": "alice@x.com", "password": "pw123456"}),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn check_requires_a_valid_cookie() {
        let app = build_app(AppState::fake());
        let res = send(&app, post_json("/api/auth/register", alice())).await;
        let token = token_from(&res);

        let res = send(&app, get_with_token("/api/auth/check", Some(&token))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["isAuthenticated"], true);
        assert_eq!(body["user"]["username"], "alice");

        let missing = send(&app, get_with_token("/api/auth/check", None)).await;
        let forged = send(&app, get_with_token("/api/auth/check", Some("a.b.c"))).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(missing).await, body_json(forged).await);
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = build_app(AppState::fake());
        let res = send(&app, post_json("/api/auth/logout", json!({}))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn profile_update_refreshes_cookie() {
        let state = AppState::fake();
        let keys = state.keys.clone();
        let app = build_app(state);
        let token = token_from(&send(&app, post_json("/api/auth/register", alice())).await);

        let req = Request::patch("/api/auth/profile")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("token={token}"))
            .body(Body::from(
                json!({"name": "Alice B", "profile": {"bloodGroup": "O-"}}).to_string(),
            ))
            .unwrap();
        let res = send(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let fresh = token_from(&res);
        assert_eq!(keys.verify(&fresh).unwrap().name, "Alice B");
        let body = body_json(res).await;
        assert_eq!(body["user"]["profile"]["bloodGroup"], "O-");
    }

    #[tokio::test]
    async fn profile_update_cannot_self_verify() {
        let app = build_app(AppState::fake());
        let token = register_token(&app, alice()).await;

        let res = send(
            &app,
            json_with_token(
                "PATCH",
                "/api/auth/profile",
                &token,
                json!({"name": "Alice", "isVerified": true}),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["user"]["isVerified"], false);

        let res = send(&app, get_with_token("/api/auth/check", Some(&token))).await;
        assert_eq!(body_json(res).await["user"]["isVerified"], false);
    }

    #[tokio::test]
    async fn blood_request_flow() {
        let app = build_app(AppState::fake());
        let city = register_token(&app, hospital()).await;
        let donor = register_token(&app, alice()).await;

        let request = json!({
            "patientName": "R. Sharma",
            "bloodGroup": "O-",
            "requiredUnits": 3,
            "urgency": "High",
        });
        let create = |token: &str, body: Value| {
            json_with_token("POST", "/api/blood-requests", token, body)
        };
        let res = send(&app, create(&donor, request.clone())).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, create(&city, request)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let location = res.headers()[header::LOCATION].to_str().unwrap().to_string();
        let created = body_json(res).await;
        assert_eq!(created["status"], "pending");
        assert_eq!(created["urgency"], "high");
        assert_eq!(created["hospitalName"], "City Hospital");
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(location, format!("/api/blood-requests/{id}"));

        let res = send(
            &app,
            get_with_token("/api/blood-requests?bloodGroup=O-", Some(&donor)),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);

        let status_uri = format!("/api/blood-requests/{id}/status");
        let res = send(
            &app,
            json_with_token("PUT", &status_uri, &city, json!({"status": "fulfilled"})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let approve = json!({"status": "approved", "notes": "2 units crossmatched"});
        let res = send(&app, json_with_token("PUT", &status_uri, &city, approve)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["status"], "approved");
        assert_eq!(body["notes"], "2 units crossmatched");

        let res = send(&app, get_with_token("/api/blood-requests", None)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn inventory_and_donor_lookup() {
        let state = AppState::fake();
        let keys = state.keys.clone();
        let app = build_app(state);
        let city = register_token(&app, hospital()).await;
        let donor = register_token(&app, alice()).await;
        let city_id = keys.verify(&city).unwrap().sub;
        let donor_id = keys.verify(&donor).unwrap().sub;

        let inventory_uri = format!("/api/hospitals/{city_id}/blood-inventory");
        let stock = json!({"bloodGroup": "B+", "units": 8});
        let res = send(&app, json_with_token("PUT", &inventory_uri, &city, stock)).await;
        assert_eq!(res.status(), StatusCode::OK);

        let stock = json!({"bloodGroup": "B+", "units": 0});
        let res = send(&app, json_with_token("PUT", &inventory_uri, &donor, stock)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, get_with_token(&inventory_uri, Some(&donor))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["inventory"][2], json!({"name": "B+", "units": 8}));
        assert_eq!(body["totalUnits"], 8);

        let res = send(
            &app,
            get_with_token(&format!("/api/hospitals/{donor_id}/blood-inventory"), Some(&city)),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let profile = json!({"profile": {"bloodGroup": "b+"}});
        let res = send(&app, json_with_token("PATCH", "/api/auth/profile", &donor, profile)).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app, get_with_token("/api/donors/bloodgroup/B+", Some(&city))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let donors = body_json(res).await;
        assert_eq!(donors[0]["username"], "alice");
        assert_eq!(donors[0]["profile"]["bloodGroup"], "B+");
        assert!(donors[0].get("passwordHash").is_none());

        let res = send(&app, get_with_token("/api/donors/bloodgroup/B+", Some(&donor))).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn guarded_views() {
        let app = build_app(AppState::fake());
        let token = token_from(&send(&app, post_json("/api/auth/register", alice())).await);

        let res = send(&app, get_with_token("/hospital/dashboard", Some(&token))).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/donor/dashboard");

        let res = send(&app, get_with_token("/donor/dashboard", Some(&token))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["view"], "donor/dashboard");
        assert_eq!(body["user"]["role"], "donor");

        let res = send(&app, get_with_token("/donor/alert-settings", None)).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login?from=/donor/alert-settings");

        let res = send(&app, get_with_token("/donor/unknown", Some(&token))).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
