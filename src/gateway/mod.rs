pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

/// Build the complete router
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Public Routes (no auth required)
    // ==========================================================================
    let public_routes = Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .route(
            "/api/v1/user",
            get(handlers::list_users).post(handlers::register_user),
        )
        .route("/api/v1/user/stream", get(handlers::stream_users))
        .route("/api/v1/user/{user_id}", get(handlers::get_user));

    // ==========================================================================
    // Authenticated Routes (any valid token)
    // ==========================================================================
    let authed_routes = Router::new()
        .route("/api/v1/user/transfer", post(handlers::transfer))
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    // ==========================================================================
    // Admin Routes (admin token); jwt layer is outermost so it runs first
    // ==========================================================================
    let admin_routes = Router::new()
        .route("/api/v1/user/{user_id}", delete(handlers::delete_user))
        .route("/api/v1/user/{user_id}/credit", post(handlers::credit))
        .layer(from_fn(auth::require_admin))
        .layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .merge(admin_routes)
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Gateway listening on http://{}", addr);
    info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::auth::{ADMIN_ROLE, issue_token};
    use crate::gateway::types::ApiResponse;
    use crate::wallet::{InMemoryWalletStore, RetryPolicy, UserWallet, Wallet, WalletService};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";
    const ALICE: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
    const BOB: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";

    fn setup() -> (Router, InMemoryWalletStore) {
        let store = InMemoryWalletStore::new();
        for (id, wallet_id, hard, soft) in [(ALICE, "wa", 2000, 100), (BOB, "wb", 2400, 200)] {
            store.insert(UserWallet {
                user_id: id.to_string(),
                firstname: "F".to_string(),
                lastname: "L".to_string(),
                wallet: Some(Wallet::new(wallet_id, hard, soft)),
            });
        }
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 3,
        };
        let service = Arc::new(WalletService::new(Arc::new(store.clone()), policy, false));
        let state = Arc::new(AppState::new(service, SECRET));
        (build_router(state), store)
    }

    fn bearer(role: &str) -> String {
        format!("Bearer {}", issue_token(SECRET, "tester", role, 300).unwrap())
    }

    fn json_request(method: &str, uri: &str, auth: Option<String>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read<T: DeserializeOwned>(response: axum::response::Response) -> ApiResponse<T> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup();
        let response = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = read(response).await;
        assert_eq!(body.code, 0);
        assert_eq!(body.data.unwrap()["store"], "memory");
    }

    #[tokio::test]
    async fn test_list_and_get_user() {
        let (app, _) = setup();
        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/user").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: ApiResponse<Vec<UserWallet>> = read(response).await;
        assert_eq!(body.data.unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/v1/user/{}", ALICE))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<UserWallet> = read(response).await;
        assert_eq!(body.data.unwrap().wallet.unwrap().hard_currency, 2000);

        let response = app
            .oneshot(Request::get("/api/v1/user/short").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream_users_ndjson() {
        let (app, store) = setup();
        let response = app
            .oneshot(Request::get("/api/v1/user/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            handlers::NDJSON
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        let users: Vec<UserWallet> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let ids: Vec<_> = users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec![ALICE, BOB]);
        assert!(text.ends_with('\n'));
        assert_eq!(store.stats().begins, 0);
    }

    #[tokio::test]
    async fn test_stream_users_store_failure_aborts_body() {
        let (app, store) = setup();
        store.fail_lookups(true);
        let response = app
            .oneshot(Request::get("/api/v1/user/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_register_user() {
        let (app, store) = setup();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/user",
                None,
                r#"{"firstname":"Ada","lastname":"Lovelace"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(store.user_count(), 3);

        let response = app
            .oneshot(json_request("POST", "/api/v1/user", None, r#"{"firstname":"Ada"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transfer_requires_token() {
        let (app, store) = setup();
        let payload = format!(
            r#"{{"senderId":"{}","receiverId":"{}","amount":7,"currency":"hardCurrency"}}"#,
            ALICE, BOB
        );
        let response = app
            .oneshot(json_request("POST", "/api/v1/user/transfer", None, &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.stats().lookups, 0);
    }

    #[tokio::test]
    async fn test_transfer() {
        let (app, store) = setup();
        let payload = format!(
            r#"{{"senderId":"{}","receiverId":"{}","amount":7,"currency":"hardCurrency"}}"#,
            ALICE, BOB
        );
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/user/transfer",
                Some(bearer("user")),
                &payload,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse<bool> = read(response).await;
        assert_eq!(body.data, Some(true));
        assert_eq!(store.wallet("wa").unwrap().hard_currency, 1993);
        assert_eq!(store.wallet("wb").unwrap().hard_currency, 2407);
    }

    #[tokio::test]
    async fn test_transfer_rejections() {
        let (app, _) = setup();
        let cases = [
            (
                format!(r#"{{"senderId":"{}","receiverId":"{}","amount":7}}"#, ALICE, BOB),
                StatusCode::BAD_REQUEST,
            ),
            (
                format!(
                    r#"{{"senderId":"{}","receiverId":"{}","amount":7,"currency":"hardCurrency"}}"#,
                    ALICE, ALICE
                ),
                StatusCode::BAD_REQUEST,
            ),
            (
                format!(
                    r#"{{"senderId":"{}","receiverId":"{}","amount":0,"currency":"hardCurrency"}}"#,
                    ALICE, BOB
                ),
                StatusCode::BAD_REQUEST,
            ),
            (
                format!(
                    r#"{{"senderId":"{}","receiverId":"bob","amount":1,"currency":"hardCurrency"}}"#,
                    ALICE
                ),
                StatusCode::BAD_REQUEST,
            ),
            (
                format!(
                    r#"{{"senderId":"{}","receiverId":"{}","amount":200,"currency":"softCurrency"}}"#,
                    ALICE, BOB
                ),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (payload, expected) in cases {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/v1/user/transfer",
                    Some(bearer("user")),
                    &payload,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "payload: {}", payload);
        }
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let (app, store) = setup();
        let uri = format!("/api/v1/user/{}", BOB);

        let response = app
            .clone()
            .oneshot(json_request("DELETE", &uri, Some(bearer("user")), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(store.user_count(), 2);

        let response = app
            .oneshot(json_request("DELETE", &uri, Some(bearer(ADMIN_ROLE)), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.wallet_count(), 1);
    }

    #[tokio::test]
    async fn test_credit() {
        let (app, store) = setup();
        let uri = format!("/api/v1/user/{}/credit", ALICE);
        let response = app
            .oneshot(json_request(
                "POST",
                &uri,
                Some(bearer(ADMIN_ROLE)),
                r#"{"amount":50,"currency":"softCurrency"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.wallet("wa").unwrap().soft_currency, 150);
    }
}
