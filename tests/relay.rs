use assist_stream::client::HttpTransport;
use assist_stream::config::{AssistConfig, UpstreamConfig};
use assist_stream::relay::{RelayState, router};
use axum::{Router, body::Bytes, extract::State, http::header, response::IntoResponse, routing::post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

const UPSTREAM_BODY: &str = concat!(
    "data: {\"event_name\":\"EventName.START\",\"content\":\"booting\"}\n\n",
    "data: {\"id\":\"a\",\"event_name\":\"EventName.FINAL_RESPONSE\",\"content_type\":\"chunked\",\"content\":\"héllo\"}\n\n",
    "data: [DONE]\n\n",
);

type Received = Arc<Mutex<Vec<Bytes>>>;

async fn upstream_handler(State(received): State<Received>, body: Bytes) -> impl IntoResponse {
    received.lock().push(body);
    ([(header::CONTENT_TYPE, "text/event-stream")], UPSTREAM_BODY)
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_upstream() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/assist", post(upstream_handler))
        .with_state(received.clone());
    (format!("{}/assist", spawn(app).await), received)
}

async fn spawn_relay(endpoint: String) -> String {
    let mut config = AssistConfig::default();
    config.upstream = UpstreamConfig {
        endpoint,
        connect_timeout_secs: 2,
    };

    let transport = HttpTransport::new(config.upstream.clone()).unwrap();
    let state = Arc::new(RelayState {
        transport: Arc::new(transport),
        config,
    });
    spawn(router(state)).await
}

#[tokio::test]
async fn test_relay_streams_upstream_body_unchanged() {
    let (endpoint, received) = spawn_upstream().await;
    let relay = spawn_relay(endpoint).await;

    let request = json!({
        "query": {"id": "01J0000000000000000000000", "prompt": "hello"},
        "session": {"processor_id": "p", "activity_id": "a", "request_id": "r", "interactions": []}
    });

    let response = reqwest::Client::new()
        .post(format!("{}/api/assist", relay))
        .header(header::CONTENT_TYPE.as_str(), "application/json")
        .body(request.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE.as_str()], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL.as_str()], "no-cache, no-transform");

    let body = response.text().await.unwrap();
    assert_eq!(body, UPSTREAM_BODY);

    let forwarded: Value = serde_json::from_slice(&received.lock()[0]).unwrap();
    assert_eq!(forwarded, request);
}

#[tokio::test]
async fn test_relay_forwards_invalid_json_as_empty_object() {
    let (endpoint, received) = spawn_upstream().await;
    let relay = spawn_relay(endpoint).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/assist", relay))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.text().await.unwrap();

    assert_eq!(&received.lock()[0][..], b"{}");
}

#[tokio::test]
async fn test_relay_unreachable_upstream_is_bad_gateway() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = spawn_relay(format!("http://{}/assist", addr)).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/assist", relay))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_liveness_endpoints() {
    let relay = spawn_relay("http://127.0.0.1:9/assist".to_string()).await;
    let client = reqwest::Client::new();

    for path in ["/health", "/api/assist"] {
        let body = client
            .get(format!("{}{}", relay, path))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"ok": true}));
    }
}
