//! Mock Kvasir 서버
//!
//! 통합 테스트를 위한 경량 axum 서버.
//! 제출된 관측을 일정 지연 후 변경 알림으로 되돌려준다 (SSE 방송 + 폴링 조회).

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Mock 서버 상태
pub struct KvasirState {
    /// 수신한 제출 수
    pub submitted: AtomicU64,
    /// 폴링으로 아직 전달되지 않은 변경
    pub changes: Mutex<Vec<Value>>,
    events: broadcast::Sender<String>,
    echo_delay: Duration,
}

/// Mock 서버 핸들
pub struct MockKvasir {
    pub addr: String,
    pub state: Arc<KvasirState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockKvasir {
    /// 알림 반향 지연을 지정해 시작 (자동 포트 할당)
    pub async fn start(echo_delay: Duration) -> Self {
        let (events, _) = broadcast::channel(1024);
        let state = Arc::new(KvasirState {
            submitted: AtomicU64::new(0),
            changes: Mutex::new(Vec::new()),
            events,
            echo_delay,
        });
        let app = Router::new()
            .route("/alice/observations", post(handle_insert))
            .route("/alice/changes", get(handle_poll))
            .route("/alice/changes/stream", get(handle_stream))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("포트 바인딩 실패");
        let port = listener.local_addr().unwrap().port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("서버 실행 실패");
        });

        Self {
            addr: format!("http://127.0.0.1:{port}"),
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> &str {
        &self.addr
    }

    pub fn submitted(&self) -> u64 {
        self.state.submitted.load(Ordering::Relaxed)
    }
}

impl Drop for MockKvasir {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// `urn:uuid:abc` → `abc`
fn last_segment(iri: &str) -> &str {
    iri.rsplit(':').next().unwrap_or(iri)
}

/// JSON-LD 삽입 → 평면 변경 알림
fn to_change(observation: &Value) -> Option<(String, Value)> {
    let id = last_segment(observation.get("@id")?.as_str()?).to_string();
    let sensor = observation["sosa:madeBySensor"]["@id"].as_str().map(last_segment);
    let time = observation["sosa:resultTime"]["@value"].as_str();
    let change = json!({
        "id": id,
        "sensorId": sensor,
        "timestamp": time,
        "value": observation["sosa:hasSimpleResult"],
    });
    Some((id, change))
}

/// 관측 삽입 핸들러
async fn handle_insert(State(state): State<Arc<KvasirState>>, body: String) -> impl IntoResponse {
    state.submitted.fetch_add(1, Ordering::Relaxed);

    let Ok(payload) = serde_json::from_str::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid body"})));
    };
    let Some((id, change)) = payload["insert"].get(0).and_then(to_change) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing insert"})));
    };

    let echo = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(echo.echo_delay).await;
        let data = json!({"insert": [change.clone()]}).to_string();
        echo.changes.lock().push(change);
        let _ = echo.events.send(data);
    });

    (StatusCode::CREATED, Json(json!({"id": id})))
}

/// 변경 조회 핸들러 (미전달분 반환)
async fn handle_poll(State(state): State<Arc<KvasirState>>) -> impl IntoResponse {
    let changes: Vec<Value> = std::mem::take(&mut *state.changes.lock());
    Json(Value::Array(changes))
}

/// 변경 스트림 핸들러
async fn handle_stream(State(state): State<Arc<KvasirState>>) -> impl IntoResponse {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|msg| {
        msg.ok()
            .map(|data| Ok::<Event, Infallible>(Event::default().event("change").data(data)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
