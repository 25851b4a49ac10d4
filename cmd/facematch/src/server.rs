//! HTTP server wiring.
//!
//! API endpoints:
//! - POST   /api/similarity_query_api   - classify a query vector
//! - POST   /api/upload_to_unMatched    - register in Unmatched
//! - POST   /api/upload_to_Matched      - promote to Matched
//! - POST   /api/delete_from_unmatched  - discard from Unmatched
//! - POST   /api/delete_from_matched    - delete all copies from Matched
//! - GET    /api/fetch_all_unMatched    - list Unmatched (?page=N)
//! - GET    /api/fetch_all_Matched      - list Matched (?page=N)
//! - POST   /api/uploadChartData        - append a chart point
//! - GET    /api/fetchChartData         - all chart points
//! - DELETE /api/deleteChartData        - clear chart points
//! - GET    /ws                         - WebSocket broadcast relay

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::ws::Message;
use axum::routing::{delete, get, post};
use facematch_fingerprint::{
    ChartLog, Classifier, FingerprintStore, MemoryChartLog, MemoryStore, StateMachine,
};
use facematch_relay::Relay;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::{Config, parse_addr};
use crate::{handlers, ws};

/// Everything a request handler may touch. Created at server start and
/// dropped when the server stops.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub machine: Arc<StateMachine>,
    pub store: Arc<dyn FingerprintStore>,
    pub chart: Arc<dyn ChartLog>,
    pub relay: Arc<Relay<Message>>,
    pub page_size: usize,
}

impl AppState {
    pub fn new(cfg: &Config) -> Result<Self> {
        let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new(cfg.store_config())?);
        Ok(Self {
            classifier: Arc::new(Classifier::new(Arc::clone(&store), cfg.classifier.clone())),
            machine: Arc::new(StateMachine::new(Arc::clone(&store))),
            store,
            chart: Arc::new(MemoryChartLog::new()),
            relay: Arc::new(Relay::new(cfg.relay.buffer)),
            page_size: cfg.page_size,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/similarity_query_api", post(handlers::classify))
        .route("/api/upload_to_unMatched", post(handlers::upload_unmatched))
        .route("/api/upload_to_Matched", post(handlers::upload_matched))
        .route("/api/delete_from_unmatched", post(handlers::delete_unmatched))
        .route("/api/delete_from_matched", post(handlers::delete_matched))
        .route("/api/fetch_all_unMatched", get(handlers::list_unmatched))
        .route("/api/fetch_all_Matched", get(handlers::list_matched))
        .route("/api/uploadChartData", post(handlers::upload_chart))
        .route("/api/fetchChartData", get(handlers::fetch_chart))
        .route("/api/deleteChartData", delete(handlers::clear_chart))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(cfg: Config) -> Result<()> {
    let state = AppState::new(&cfg)?;
    let addr = parse_addr(&cfg.addr)?;
    let listener = TcpListener::bind(addr).await?;
    let classifier = state.classifier.config();
    info!(
        %addr,
        dim = cfg.dim,
        index = ?cfg.index,
        threshold = classifier.threshold,
        num_candidates = classifier.num_candidates,
        "facematch listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("facematch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use facematch_fingerprint::IndexKind;
    use futures::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt; // for `oneshot`

    use super::*;

    fn test_config() -> Config {
        Config {
            dim: 3,
            index: IndexKind::Flat,
            page_size: 2,
            ..Config::default()
        }
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app() -> Router {
        router(AppState::new(&test_config()).unwrap())
    }

    #[tokio::test]
    async fn test_classify_empty_matched() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/similarity_query_api",
            Some(json!({"embedding": [1.0, 0.0, 0.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"isMatched": false, "score": 0.0}));
    }

    #[tokio::test]
    async fn test_register_promote_classify_delete() {
        let app = app();
        let pair = json!({"file": "frame_7.jpg", "embedding": [0.6, 0.8, 0.0]});

        let (status, body) = call(&app, Method::POST, "/api/upload_to_unMatched", Some(pair.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));

        let (_, body) = call(&app, Method::POST, "/api/upload_to_unMatched", Some(pair.clone())).await;
        assert_eq!(body["created"], json!(false));
        assert_eq!(
            body["message"],
            json!("Entry already exists in the unmatched collection!")
        );

        let (status, body) = call(&app, Method::POST, "/api/upload_to_Matched", Some(pair.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));

        let (_, unmatched) = call(&app, Method::GET, "/api/fetch_all_unMatched", None).await;
        assert_eq!(unmatched["totalEntries"], json!(0));
        let (_, matched) = call(&app, Method::GET, "/api/fetch_all_Matched", None).await;
        assert_eq!(matched["totalEntries"], json!(1));
        assert_eq!(matched["data"][0]["file"], json!("frame_7.jpg"));
        assert_eq!(matched["data"][0]["embeddings"].as_array().unwrap().len(), 3);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/similarity_query_api",
            Some(json!({"embedding": [0.6, 0.8, 0.0]})),
        )
        .await;
        assert_eq!(body["isMatched"], json!(true));
        assert!(body["score"].as_f64().unwrap() > 0.97);

        let (status, body) = call(&app, Method::POST, "/api/delete_from_matched", Some(pair.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], json!(1));

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/similarity_query_api",
            Some(json!({"embedding": [0.6, 0.8, 0.0]})),
        )
        .await;
        assert_eq!(body, json!({"isMatched": false, "score": 0.0}));
    }

    #[tokio::test]
    async fn test_delete_missing_unmatched_is_ok() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/delete_from_unmatched",
            Some(json!({"file": "ghost.jpg", "embedding": [1.0, 0.0, 0.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Data deleted from unmatched"));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/upload_to_unMatched",
            Some(json!({"embedding": [1.0, 0.0, 0.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("file"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/similarity_query_api",
            Some(json!({"embedding": [1.0, 0.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/api/similarity_query_api", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/upload_to_unMatched",
            Some(json!({"file": "a.jpg", "embedding": [1.0, "x", 0.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("embedding"));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/uploadChartData",
            Some(json!({"frame_no": "one"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        // Not JSON at all, and no content type.
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/similarity_query_api")
            .body(Body::from("embedding=1,0,0"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["message"].is_string());

        let (_, listed) = call(&app, Method::GET, "/api/fetch_all_unMatched", None).await;
        assert_eq!(listed["totalEntries"], json!(0));
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let app = app();
        for i in 0..3 {
            call(
                &app,
                Method::POST,
                "/api/upload_to_unMatched",
                Some(json!({"file": format!("f{i}.jpg"), "embedding": [1.0, i as f32, 0.0]})),
            )
            .await;
        }

        let (_, first) = call(&app, Method::GET, "/api/fetch_all_unMatched?page=abc", None).await;
        assert_eq!(first["currentPage"], json!(1));
        assert_eq!(first["totalPages"], json!(2));
        assert_eq!(first["totalEntries"], json!(3));
        assert_eq!(first["data"][0]["file"], json!("f2.jpg"));

        let (_, second) = call(&app, Method::GET, "/api/fetch_all_unMatched?page=2", None).await;
        assert_eq!(second["data"].as_array().unwrap().len(), 1);
        assert_eq!(second["data"][0]["file"], json!("f0.jpg"));
    }

    #[tokio::test]
    async fn test_chart_data() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/uploadChartData",
            Some(json!({"frame_no": 1, "count": 4, "known_headcount": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("uploaded"));

        let (_, points) = call(&app, Method::GET, "/api/fetchChartData", None).await;
        assert_eq!(
            points,
            json!([{"frame_no": 1, "count": 4, "known_headcount": 2}])
        );

        let (status, _) = call(&app, Method::DELETE, "/api/deleteChartData", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, points) = call(&app, Method::GET, "/api/fetchChartData", None).await;
        assert_eq!(points, json!([]));
    }

    async fn wait_for_connections(relay: &Relay<Message>, n: usize) {
        timeout(Duration::from_secs(5), async {
            while relay.len() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_ws_relay_fanout() {
        let state = AppState::new(&test_config()).unwrap();
        let relay = Arc::clone(&state.relay);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let url = format!("ws://{addr}/ws");
        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();
        let (mut c, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&relay, 3).await;

        a.send(WsMessage::text("record changed")).await.unwrap();
        for peer in [&mut b, &mut c] {
            let msg = timeout(Duration::from_secs(2), peer.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(msg.to_text().unwrap(), "record changed");
        }
        assert!(
            timeout(Duration::from_millis(200), a.next()).await.is_err(),
            "sender must not receive its own message"
        );

        b.close(None).await.unwrap();
        wait_for_connections(&relay, 2).await;

        a.send(WsMessage::text("second")).await.unwrap();
        let msg = timeout(Duration::from_secs(2), c.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(msg.to_text().unwrap(), "second");
    }
}
