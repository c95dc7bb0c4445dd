#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use broadside_api::{AppState, AudienceError, AudienceKind, AudienceSource, MemoryAudience, router};
use broadside_dispatch::{
    Campaign, DispatchConfig, EmailAddress, Payload, Recipient, Transport, TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Accepts everything except `bounce@example.com`, and remembers what it sent.
#[derive(Debug, Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, Payload)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, recipient: &EmailAddress, payload: &Payload) -> Result<(), TransportError> {
        if recipient.as_str() == "bounce@example.com" {
            return Err(TransportError::Rejected("550 invalid address".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.clone()));
        Ok(())
    }
}

struct Offline;

#[async_trait]
impl AudienceSource for Offline {
    async fn recipients(&self, _kind: AudienceKind) -> Result<Vec<Recipient>, AudienceError> {
        Err(AudienceError::Unavailable("database offline".to_string()))
    }
}

fn contact(id: i64, name: &str, email: &str) -> Recipient {
    Recipient {
        id,
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        ..Default::default()
    }
}

fn audience() -> MemoryAudience {
    let mut jane = contact(1, "Jane", "jane@example.com");
    jane.business_name = Some("Jane's Bakery".to_string());
    jane.interest = Some("seo".to_string());
    jane.status = Some("new".to_string());

    let mut joe = contact(2, "Joe", "joe@example.com");
    joe.company = Some("Pipes Inc".to_string());
    joe.industry = Some("Plumbing".to_string());

    let broken = contact(3, "Nobody", "nobody");

    let mut bounce = contact(4, "Bounce", "bounce@example.com");
    bounce.status = Some("stale".to_string());

    let acme = contact(10, "Acme", "ops@acme.test");

    let mut beta = contact(11, "Beta", "hello@beta.test");
    beta.interest = Some("seo".to_string());

    MemoryAudience::new(vec![jane, joe, broken, bounce], vec![acme, beta])
}

fn app_with(audience: Arc<dyn AudienceSource>) -> (Router, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let config = DispatchConfig {
        throughput_per_second: 1000.0,
        ..Default::default()
    };
    let campaign = Campaign::new(config, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

    (router(AppState::new(campaign, audience)), transport)
}

fn app() -> (Router, Arc<RecordingTransport>) {
    app_with(Arc::new(audience()))
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_list_is_empty() {
    for uri in ["/api/campaigns", "/api/campaigns/list"] {
        let (status, body) = call(app().0, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "data": [] }));
    }
}

#[tokio::test]
async fn test_audience_defaults_to_leads_with_valid_addresses() {
    let (status, body) = call(app().0, get("/api/campaigns/audience")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "count": 3,
            "recipients": [
                { "id": 1, "name": "Jane", "email": "jane@example.com" },
                { "id": 2, "name": "Joe", "email": "joe@example.com" },
                { "id": 4, "name": "Bounce", "email": "bounce@example.com" },
            ],
        })
    );
}

#[tokio::test]
async fn test_audience_filters() {
    let (_, body) = call(app().0, get("/api/campaigns/audience?q=PLUMB")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["recipients"][0]["id"], 2);

    let (_, body) = call(app().0, get("/api/campaigns/audience?status=new&interest=seo")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["recipients"][0]["id"], 1);

    let (_, body) = call(app().0, get("/api/campaigns/audience?type=clients&interest=seo")).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["recipients"][0]["email"], "ops@acme.test");
}

#[tokio::test]
async fn test_audience_source_failure_is_internal() {
    let (status, body) = call(app_with(Arc::new(Offline)).0, get("/api/campaigns/audience")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Audience source unavailable: database offline");
}

#[tokio::test(start_paused = true)]
async fn test_send_reports_outcome() {
    let (app, transport) = app();
    let request = json!({
        "subject": "Hi {{name}}",
        "htmlContent": "<p>News for {{company}}</p>",
    });

    let (status, body) = call(app, post("/api/campaigns/send", &request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "sent": 2,
            "failed": 1,
            "total": 3,
            "errors": [{ "email": "bounce@example.com", "error": "550 invalid address" }],
        })
    );

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    let (to, payload) = &sent[0];
    assert_eq!(to, "jane@example.com");
    assert_eq!(payload.subject, "Hi Jane");
    assert_eq!(payload.html, "<p>News for Jane's Bakery</p>");
    assert_eq!(payload.text, "News for Jane's Bakery");
}

#[tokio::test(start_paused = true)]
async fn test_send_honours_audience_filters() {
    let (app, transport) = app();
    let request = json!({
        "subject": "Hello",
        "htmlContent": "<p>Hello</p>",
        "textContent": "Hello {{name}}",
        "audienceType": "leads",
        "audienceFilters": { "q": "pipes" },
    });

    let (status, body) = call(app, post("/api/campaigns/send", &request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent[0].1.text, "Hello Joe");
}

#[tokio::test(start_paused = true)]
async fn test_send_to_clients_filters_by_interest() {
    let (app, transport) = app();
    let request = json!({
        "subject": "SEO for {{company}}",
        "htmlContent": "<p>Hi {{name}}</p>",
        "audienceType": "clients",
        "audienceFilters": { "interest": "seo" },
    });

    let (status, body) = call(app, post("/api/campaigns/send", &request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["sent"], 1);

    let sent = transport.sent.lock().unwrap().clone();
    let recipients: Vec<&str> = sent.iter().map(|(to, _)| to.as_str()).collect();
    assert_eq!(recipients, vec!["hello@beta.test"]);
}

#[tokio::test]
async fn test_send_requires_content() {
    let (app, transport) = app();

    let (status, body) = call(app, post("/api/campaigns/send", &json!({ "subject": "Hi" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "success": false, "error": "Subject and HTML content required" })
    );
    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_without_recipients() {
    let request = json!({
        "subject": "Hi",
        "htmlContent": "<p>Hi</p>",
        "audienceFilters": { "status": "archived" },
    });

    let (status, body) = call(app().0, post("/api/campaigns/send", &request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No valid recipients found");
}

#[tokio::test]
async fn test_send_rejects_malformed_json() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/campaigns/send")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();

    let (status, body) = call(app().0, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_routes_and_methods() {
    let (status, body) = call(app().0, get("/api/campaigns/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "error": "Endpoint not found" }));

    let (status, _) = call(app().0, get("/api/campaigns/send")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/campaigns/list")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app().0, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "success": false, "error": "Method not allowed" }));
}

#[tokio::test]
async fn test_cors_headers() {
    let request = Request::builder()
        .uri("/api/campaigns")
        .header(header::ORIGIN, "https://crm.example.com")
        .body(Body::empty())
        .unwrap();

    let response = app().0.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
