//! Router-level tests: status codes, redirects and JSON bodies.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use boxoffice_server::config::Config;
use boxoffice_server::payment::MockPaymentProcessor;
use boxoffice_server::routes::create_routes;
use boxoffice_server::state::AppState;
use boxoffice_server::store::MemoryTicketStore;

struct TestApp {
    router: Router,
    processor: Arc<MockPaymentProcessor>,
}

impl TestApp {
    fn new() -> Self {
        let config = Config::from_lookup(|name| match name {
            "WEBSITE_URL" => Some("http://localhost:3000".to_string()),
            "PAYMENT_PROCESSOR" => Some("mock".to_string()),
            _ => None,
        })
        .unwrap();
        let processor = MockPaymentProcessor::shared();
        let state = AppState::new(
            Arc::new(MemoryTicketStore::new()),
            processor.clone(),
            &config,
        );

        Self {
            router: create_routes(state, &config),
            processor,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        caller: Option<Uuid>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            request = request.header("x-user-id", caller.to_string());
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, name: &str) -> Uuid {
        let response = self
            .send(
                "POST",
                "/users",
                None,
                Some(json!({ "name": name, "email": format!("{}@example.com", name.to_lowercase()) })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Creates an event with one tier and returns `(event_id, tier_id)`.
    async fn create_event(&self, organizer: Uuid, capacity: Option<i32>) -> (Uuid, Uuid) {
        let response = self
            .send(
                "POST",
                "/events",
                Some(organizer),
                Some(json!({
                    "title": "Jazz Night",
                    "location": "Blue Room",
                    "start_time": "2030-06-01T19:00:00Z",
                    "tiers": [{ "name": "General", "price": 3000, "capacity": capacity }]
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let event_id = body["data"]["id"].as_str().unwrap().parse().unwrap();
        let tier_id = body["data"]["tiers"][0]["id"].as_str().unwrap().parse().unwrap();
        (event_id, tier_id)
    }

    async fn checkout(&self, buyer: Uuid, event_id: Uuid, tier_id: Uuid, quantity: u32) -> Response<Body> {
        self.send(
            "POST",
            &format!("/events/{event_id}/checkout"),
            Some(buyer),
            Some(json!([{ "id": tier_id, "quantity": quantity }])),
        )
        .await
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_check_sets_security_headers() {
    let app = TestApp::new();
    let response = app.send("GET", "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_event_page_includes_initial_cart() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let (event_id, tier_id) = app.create_event(organizer, Some(40)).await;

    let response = app
        .send("GET", &format!("/events/{event_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let line = &body["data"]["cart"]["lines"][0];
    assert_eq!(line["id"], tier_id.to_string());
    assert_eq!(line["remaining"], 40);
    assert_eq!(line["quantity"], 0);
    assert_eq!(body["data"]["event"]["title"], "Jazz Night");
}

#[tokio::test]
async fn test_checkout_requires_caller() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let (event_id, tier_id) = app.create_event(organizer, Some(5)).await;

    let response = app
        .send(
            "POST",
            &format!("/events/{event_id}/checkout"),
            None,
            Some(json!([{ "id": tier_id, "quantity": 1 }])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_checkout_redirects_then_reports_capacity() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, tier_id) = app.create_event(organizer, Some(3)).await;

    let response = app.checkout(buyer, event_id, tier_id, 2).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://checkout.mock.local/pay/"));

    let response = app.checkout(buyer, event_id, tier_id, 2).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INSUFFICIENT_CAPACITY");
    assert_eq!(body["details"]["remaining"], 1);
    assert!(body["message"].as_str().unwrap().contains("only 1 are available"));
}

#[tokio::test]
async fn test_malformed_checkout_body_is_bad_request() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, _) = app.create_event(organizer, Some(3)).await;

    let response = app
        .send(
            "POST",
            &format!("/events/{event_id}/checkout"),
            Some(buyer),
            Some(json!({ "tickets": "two" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");

    let response = app
        .send(
            "POST",
            &format!("/events/{event_id}/checkout"),
            Some(buyer),
            Some(json!([])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_paid_callback_redirects_to_receipt() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let stranger = app.register("Sam").await;
    let (event_id, tier_id) = app.create_event(organizer, None).await;

    let response = app.checkout(buyer, event_id, tier_id, 2).await;
    let payment_url = location(&response);
    let session_id = payment_url.rsplit('/').next().unwrap().to_string();

    let response = app
        .send("GET", &format!("/checkout/callback/{session_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "PAYMENT_NOT_CONFIRMED");

    app.processor.complete_payment(&session_id).await.unwrap();
    let response = app
        .send("GET", &format!("/checkout/callback/{session_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let receipt_path = location(&response);
    assert!(receipt_path.starts_with("/transactions/"));

    let response = app.send("GET", &receipt_path, Some(buyer), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["tickets"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["transaction"]["amount"], 6000);
    let ticket_id = body["data"]["tickets"][0]["id"].as_str().unwrap().to_string();

    let response = app.send("GET", &receipt_path, Some(stranger), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let ticket_path = format!("/tickets/{ticket_id}");
    assert_eq!(
        app.send("GET", &ticket_path, Some(organizer), None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.send("GET", &ticket_path, Some(stranger), None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_expired_session_releases_capacity() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, tier_id) = app.create_event(organizer, Some(1)).await;

    let response = app.checkout(buyer, event_id, tier_id, 1).await;
    let session_id = location(&response).rsplit('/').next().unwrap().to_string();
    assert_eq!(
        app.checkout(buyer, event_id, tier_id, 1).await.status(),
        StatusCode::CONFLICT
    );

    app.processor.expire_session(&session_id).await.unwrap();
    let response = app
        .send("POST", &format!("/checkout/expired/{session_id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "Checkout hold released");

    assert_eq!(
        app.checkout(buyer, event_id, tier_id, 1).await.status(),
        StatusCode::SEE_OTHER
    );
}

#[tokio::test]
async fn test_only_organizer_adds_tiers() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let other = app.register("Sam").await;
    let (event_id, _) = app.create_event(organizer, Some(10)).await;
    let tier = json!({ "name": "Balcony", "price": 1500, "capacity": 20 });

    let response = app
        .send("POST", &format!("/events/{event_id}/tiers"), Some(other), Some(tier.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send("POST", &format!("/events/{event_id}/tiers"), Some(organizer), Some(tier))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["data"]["name"], "Balcony");
}

#[tokio::test]
async fn test_scan_admits_once() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, tier_id) = app.create_event(organizer, None).await;

    let response = app.checkout(buyer, event_id, tier_id, 1).await;
    let session_id = location(&response).rsplit('/').next().unwrap().to_string();
    app.processor.complete_payment(&session_id).await.unwrap();
    let response = app
        .send("GET", &format!("/checkout/callback/{session_id}"), None, None)
        .await;
    let receipt = json_body(app.send("GET", &location(&response), Some(buyer), None).await).await;
    let ticket_id = receipt["data"]["tickets"][0]["id"].clone();

    let scan_path = format!("/events/{event_id}/scan");
    let scan = json!({ "ticket_id": ticket_id });

    let response = app
        .send("POST", &scan_path, Some(buyer), Some(scan.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send("POST", &scan_path, Some(organizer), Some(scan.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["valid"], true);

    let response = app
        .send("POST", &scan_path, Some(organizer), Some(scan))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "already_used");
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new();
    app.register("Olive").await;

    let response = app
        .send(
            "POST",
            "/users",
            None,
            Some(json!({ "name": "Olive Again", "email": " OLIVE@example.com " })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn test_dashboard_lists_callers_tickets_and_events() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, tier_id) = app.create_event(organizer, Some(5)).await;

    let response = app.checkout(buyer, event_id, tier_id, 2).await;
    let session_id = location(&response).rsplit('/').next().unwrap().to_string();
    app.processor.complete_payment(&session_id).await.unwrap();
    app.send("GET", &format!("/checkout/callback/{session_id}"), None, None)
        .await;

    let response = app.send("GET", "/users/me/tickets", Some(buyer), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tickets = json_body(response).await["data"].clone();
    assert_eq!(tickets.as_array().unwrap().len(), 2);
    assert_eq!(tickets[0]["event_title"], "Jazz Night");
    assert_eq!(tickets[0]["tier_name"], "General");
    assert_eq!(tickets[0]["event_id"], event_id.to_string());

    let response = app.send("GET", "/users/me/events", Some(organizer), None).await;
    let events = json_body(response).await["data"].clone();
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["id"], event_id.to_string());

    let response = app.send("GET", "/users/me/events", Some(buyer), None).await;
    assert!(json_body(response).await["data"].as_array().unwrap().is_empty());

    let response = app.send("GET", "/users/me/tickets", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_order_is_bad_request() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let buyer = app.register("Bruno").await;
    let (event_id, tier_id) = app.create_event(organizer, None).await;

    let response = app.checkout(buyer, event_id, tier_id, i32::MAX as u32).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_QUANTITY");
    assert_eq!(body["details"]["max"], 50);

    assert_eq!(
        app.checkout(buyer, event_id, tier_id, 1).await.status(),
        StatusCode::SEE_OTHER
    );
}

#[tokio::test]
async fn test_tier_price_above_processor_limit_is_rejected() {
    let app = TestApp::new();
    let organizer = app.register("Olive").await;
    let (event_id, _) = app.create_event(organizer, None).await;

    let response = app
        .send(
            "POST",
            &format!("/events/{event_id}/tiers"),
            Some(organizer),
            Some(json!({ "name": "Patron", "price": i64::MAX / 2, "capacity": 3 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
