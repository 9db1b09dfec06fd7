//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Gateway callbacks
        .merge(api::webhook::router())
        // Service API (signed bodies)
        .merge(api::service::router())
        // Admin API
        .nest("/admin", api::admin::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SharedConfig;
    use crate::state::Components;
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use telebirr_core::gateway::transport::testing::ScriptedTransport;
    use telebirr_core::store::memory::MemoryStore;
    use telebirr_core::store::{LedgerStore, RetryStore};
    use telebirr_core::utils::clock::ManualClock;
    use telebirr_sdk::config::{AdminConfig, C2bConfig, RetryConfig, ServiceConfig, TelebirrConfig};
    use telebirr_sdk::objects::callback::CallbackParams;
    use telebirr_sdk::objects::service::{CreatePaymentRequest, PaymentStatusRequest, RefundRequest};
    use telebirr_sdk::signing::service::{ADMIN_AUTH_HEADER, SERVICE_SIGNATURE_HEADER, Signature, SignedObject};
    use telebirr_sdk::signing::{GatewaySigner, test_keys};
    use tower::ServiceExt;
    use url::Url;

    const SERVICE_SECRET: &[u8] = b"service-secret";
    const ADMIN_SECRET: &str = "operator-secret";

    struct TestApp {
        router: Router,
        store: MemoryStore,
        transport: Arc<ScriptedTransport>,
        gateway_key: GatewaySigner,
    }

    fn app() -> TestApp {
        let clock = Arc::new(ManualClock::new(time::OffsetDateTime::now_utc()));
        let store = MemoryStore::new(clock.clone());
        let transport = Arc::new(ScriptedTransport::new());

        let mut telebirr = TelebirrConfig::new("app-1");
        telebirr.c2b = Some(C2bConfig {
            unified_order_url: Url::parse("https://gw.test/h5/order").unwrap(),
            notify_url: Url::parse("https://pos.test/telebirr/c2b/notify").unwrap(),
            return_url: None,
        });

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(ADMIN_SECRET.as_bytes(), &salt)
            .unwrap()
            .to_string();

        let state = AppState::new(
            Components {
                ledger: Arc::new(store.clone()),
                retries: Arc::new(store.clone()),
                transport: transport.clone(),
                clock,
                signer: Arc::new(test_keys::merchant_signer().unwrap()),
            },
            &telebirr,
            RetryConfig::default(),
            SharedConfig::new(AdminConfig::new(hash), ServiceConfig::new(SERVICE_SECRET.to_vec())),
        );

        TestApp {
            router: build_router(state),
            store,
            transport,
            gateway_key: test_keys::gateway_signer().unwrap(),
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, String) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn signed_request<T: Signature>(uri: &str, body: T) -> Request<Body> {
        let signed = SignedObject::new(body, SERVICE_SECRET).unwrap();
        Request::post(uri)
            .header("content-type", "application/json")
            .header(SERVICE_SIGNATURE_HEADER, signed.to_header())
            .body(Body::from(signed.json))
            .unwrap()
    }

    fn form_request(uri: &str, params: &CallbackParams) -> Request<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.as_map())
            .finish();
        Request::post(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn signed_callback(app: &TestApp, pairs: &[(&str, &str)]) -> CallbackParams {
        let mut params = CallbackParams::from_pairs(pairs.iter().copied());
        let sig = app.gateway_key.sign(params.as_map()).unwrap();
        params.insert("sign", sig);
        params.insert("sign_type", "RSA2");
        params
    }

    /// Create a C2B payment through the service API, returning its correlation id.
    async fn create_c2b(app: &TestApp) -> String {
        app.store
            .seed_business_order("42", "awaiting_payment", Some(Decimal::new(10050, 2)))
            .await;
        app.transport
            .push_json(
                200,
                json!({"code": "10000", "msg": "Success", "h5_pay_url": "https://h5.gw.test/pay?t=1", "trade_no": "T-9"}),
            )
            .await;
        let (status, body) = send(
            app,
            signed_request(
                "/payments/c2b",
                CreatePaymentRequest {
                    order_id: "42".into(),
                    amount: Decimal::new(10050, 2),
                    subject: "Table 4".into(),
                    body: "2x injera".into(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["checkout_url"], "https://h5.gw.test/pay?t=1");
        assert_eq!(json["status"], "pending");
        json["correlation_id"].as_str().unwrap().to_string()
    }

    fn success_callback(app: &TestApp, out_trade_no: &str) -> CallbackParams {
        signed_callback(
            app,
            &[
                ("out_trade_no", out_trade_no),
                ("trade_no", "T-9"),
                ("trade_status", "TRADE_SUCCESS"),
                ("total_amount", "100.50"),
                ("passback_params", "order_id=42"),
            ],
        )
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));
    }

    #[tokio::test]
    async fn test_c2b_payment_round_trip() {
        let app = app();
        let correlation_id = create_c2b(&app).await;

        let callback = success_callback(&app, &correlation_id);
        let (status, body) = send(&app, form_request("/telebirr/c2b/notify", &callback)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success");
        assert_eq!(app.store.business_order("42").await.unwrap().status, "paid");

        let (status, body) = send(
            &app,
            signed_request("/payments/status", PaymentStatusRequest { correlation_id: correlation_id.clone() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["trade_no"], "T-9");

        let (status, body) = send(
            &app,
            signed_request(
                "/payments/refund",
                RefundRequest {
                    correlation_id,
                    refund_amount: Decimal::new(10050, 2),
                    refund_reason: "wrong table".into(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "refunded");
        assert_eq!(app.store.business_order("42").await.unwrap().status, "refunded");
    }

    #[tokio::test]
    async fn test_create_for_unknown_order_is_404() {
        let app = app();
        let (status, body) = send(
            &app,
            signed_request(
                "/payments/c2b",
                CreatePaymentRequest {
                    order_id: "missing".into(),
                    amount: Decimal::new(100, 0),
                    subject: "Lunch".into(),
                    body: String::new(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("order_not_found"));
        assert!(app.transport.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_flow_is_404() {
        let app = app();
        app.store.seed_business_order("42", "awaiting_payment", None).await;
        let (status, body) = send(
            &app,
            signed_request(
                "/payments/b2b",
                CreatePaymentRequest {
                    order_id: "42".into(),
                    amount: Decimal::new(100, 0),
                    subject: "Lunch".into(),
                    body: String::new(),
                },
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("flow_not_configured"));
    }

    #[tokio::test]
    async fn test_service_api_rejects_bad_signature() {
        let app = app();
        let signed = SignedObject::new(
            PaymentStatusRequest {
                correlation_id: "x".into(),
            },
            b"wrong-secret",
        )
        .unwrap();
        let request = Request::post("/payments/status")
            .header(SERVICE_SIGNATURE_HEADER, signed.to_header())
            .body(Body::from(signed.json))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::post("/payments/status")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_service_api_rejects_stale_timestamp() {
        let app = app();
        let stale = time::OffsetDateTime::now_utc().unix_timestamp() - 3600;
        let signed = SignedObject::new_at(
            PaymentStatusRequest {
                correlation_id: "x".into(),
            },
            SERVICE_SECRET,
            stale,
        )
        .unwrap();
        let request = Request::post("/payments/status")
            .header(SERVICE_SIGNATURE_HEADER, signed.to_header())
            .body(Body::from(signed.json))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tampered_callback_is_400() {
        let app = app();
        let correlation_id = create_c2b(&app).await;
        let mut callback = success_callback(&app, &correlation_id);
        callback.insert("total_amount", "1.00");

        let (status, body) = send(&app, form_request("/telebirr/c2b/notify", &callback)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"error":"authentication_error"}"#);
        assert_eq!(
            app.store.business_order("42").await.unwrap().status,
            "awaiting_payment"
        );
        assert!(app.store.all_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_callback_is_404() {
        let app = app();
        let callback = success_callback(&app, "REST_C2B_0_0");
        let (status, body) = send(&app, form_request("/telebirr/c2b/notify", &callback)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"error":"not_found"}"#);
    }

    #[tokio::test]
    async fn test_deferred_callback_still_acknowledged() {
        let app = app();
        let correlation_id = create_c2b(&app).await;
        app.store.faults().fail_next_business_updates(1);

        let callback = success_callback(&app, &correlation_id);
        let (status, body) = send(&app, form_request("/telebirr/c2b/notify", &callback)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success");
        assert_eq!(app.store.retry_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unrecordable_callback_is_500() {
        let app = app();
        let correlation_id = create_c2b(&app).await;
        app.store.faults().fail_next_business_updates(1);
        app.store.faults().fail_next_notification_inserts(1);

        let callback = success_callback(&app, &correlation_id);
        let (status, _) = send(&app, form_request("/telebirr/c2b/notify", &callback)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(app.store.retry_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_admin_requires_secret() {
        let app = app();
        let (status, _) = send(&app, Request::get("/admin/retry-tasks").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get("/admin/retry-tasks")
            .header(ADMIN_AUTH_HEADER, "guess")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_lists_and_requeues_dead_letters() {
        let app = app();
        let correlation_id = create_c2b(&app).await;
        app.store.faults().fail_next_business_updates(1);
        send(
            &app,
            form_request("/telebirr/c2b/notify", &success_callback(&app, &correlation_id)),
        )
        .await;
        let task = app.store.retry_tasks().await.remove(0);

        let requeue = |id: uuid::Uuid| {
            Request::post(format!("/admin/retry-tasks/{id}/requeue"))
                .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
                .body(Body::empty())
                .unwrap()
        };

        // Only dead letters can be requeued.
        let (status, _) = send(&app, requeue(task.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.store.dead_letter(task.id, 8, "gave up").await.unwrap();
        let request = Request::get("/admin/retry-tasks?status=dead_letter")
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["attempt_count"], 8);

        let (status, body) = send(&app, requeue(task.id)).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["attempt_count"], 0);

        let request = Request::get(format!("/admin/payments/{correlation_id}/notifications"))
            .header(ADMIN_AUTH_HEADER, ADMIN_SECRET)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json[0]["processed"], false);
        assert_eq!(app.store.notifications_for(&correlation_id).await.unwrap().len(), 1);
    }
}
