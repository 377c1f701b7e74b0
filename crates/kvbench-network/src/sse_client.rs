//! SSE(Server-Sent Events) 변경 스트림 구독.
//!
//! `Subscriber` 포트 구현. 최초 연결은 `subscribe` 안에서 수립하고,
//! 이후 끊기면 exponential backoff로 자동 재연결한다.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;
use kvbench_core::config::ServerConfig;
use kvbench_core::error::CoreError;
use kvbench_core::models::notification::StreamEvent;
use kvbench_core::ports::subscriber::{Subscriber, SubscriptionHandle, TaskSubscription};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::http_client::{build_client, check_response};
use crate::notification;

/// SSE 연결 정보 (재연결 태스크로 이동 가능)
#[derive(Clone)]
struct SseConnector {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl SseConnector {
    async fn connect(&self) -> Result<reqwest::Response, CoreError> {
        let mut req = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("SSE 연결 실패: {e}")))?;
        check_response(resp).await
    }
}

/// SSE 이벤트 하나를 스트림 이벤트로 변환
fn parse_event(event_type: &str, data: &str) -> Vec<StreamEvent> {
    match event_type {
        "error" => vec![StreamEvent::Error(data.to_string())],
        "heartbeat" | "ping" | "keepalive" => Vec::new(),
        // 기본 "message" 및 Kvasir 변경 이벤트 ("change", "insert" 등)
        _ => match notification::parse_text(data) {
            Ok(list) => list.into_iter().map(StreamEvent::Notification).collect(),
            Err(e) => {
                debug!("SSE 데이터 파싱 실패 ({event_type}): {e}");
                Vec::new()
            }
        },
    }
}

/// SSE 구독자 (`Subscriber` 포트 구현)
pub struct SseSubscriber {
    connector: SseConnector,
    max_retry_secs: u64,
}

impl SseSubscriber {
    /// 서버 설정으로 생성
    pub fn new(config: &ServerConfig) -> Result<Self, CoreError> {
        Ok(Self {
            connector: SseConnector {
                // 장기 스트림이므로 전체 요청 타임아웃은 두지 않는다
                client: build_client(None)?,
                url: format!(
                    "{}{}",
                    config.base_url.trim_end_matches('/'),
                    config.stream_path
                ),
                token: config.token.clone(),
            },
            max_retry_secs: config.sse_max_retry_secs.max(1),
        })
    }

    /// 스트림 수신 + 재연결 루프
    async fn stream_loop(
        connector: SseConnector,
        first: reqwest::Response,
        tx: mpsc::Sender<StreamEvent>,
        max_retry_secs: u64,
    ) {
        let mut response = Some(first);
        let mut retry_delay = 1u64;
        let mut attempt = 0u32;

        loop {
            if let Some(resp) = response.take() {
                let mut events = resp.bytes_stream().eventsource();
                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            let event_type = if event.event.is_empty() {
                                "message"
                            } else {
                                event.event.as_str()
                            };
                            for stream_event in parse_event(event_type, &event.data) {
                                if tx.send(stream_event).await.is_err() {
                                    info!("SSE 이벤트 채널 닫힘, 연결 종료");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("SSE 스트림 에러: {e}");
                            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
                if tx.send(StreamEvent::Disconnected).await.is_err() {
                    return;
                }
            }

            // 채널이 닫혔으면 종료
            if tx.is_closed() {
                return;
            }

            attempt += 1;
            warn!("SSE 재연결 대기: {retry_delay}초 (시도 {attempt})");
            let reconnecting = StreamEvent::Reconnecting {
                attempt,
                delay_ms: retry_delay * 1000,
            };
            if tx.send(reconnecting).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(retry_delay)).await;
            retry_delay = (retry_delay * 2).min(max_retry_secs);

            match connector.connect().await {
                Ok(resp) => {
                    info!("SSE 재연결 성공");
                    retry_delay = 1;
                    attempt = 0;
                    if tx.send(StreamEvent::Connected).await.is_err() {
                        return;
                    }
                    response = Some(resp);
                }
                Err(e) => warn!("SSE 재연결 실패: {e}"),
            }
        }
    }
}

#[async_trait]
impl Subscriber for SseSubscriber {
    async fn subscribe(
        &self,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SubscriptionHandle>, CoreError> {
        info!("SSE 연결 시작: {}", self.connector.url);
        let first = self
            .connector
            .connect()
            .await
            .map_err(|e| CoreError::Subscription(format!("SSE 최초 연결 실패: {e}")))?;

        let _ = tx.send(StreamEvent::Connected).await;
        let task = tokio::spawn(Self::stream_loop(
            self.connector.clone(),
            first,
            tx,
            self.max_retry_secs,
        ));
        Ok(Box::new(TaskSubscription::new("sse", task)))
    }

    fn endpoint(&self) -> &str {
        "sse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ServerConfig {
        ServerConfig {
            base_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn parse_message_event() {
        let events = parse_event("message", r#"{"id": "e1", "sensorId": "S1"}"#);
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Notification(n)] if n.id.as_deref() == Some("e1")
        ));
    }

    #[test]
    fn parse_insert_batch_event() {
        let events = parse_event("change", r#"{"insert": [{"id": "a"}, {"id": "b"}]}"#);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn parse_error_and_heartbeat() {
        assert!(matches!(
            parse_event("error", "boom").as_slice(),
            [StreamEvent::Error(msg)] if msg == "boom"
        ));
        assert!(parse_event("heartbeat", "{}").is_empty());
        assert!(parse_event("message", "plain text").is_empty());
    }

    #[tokio::test]
    async fn initial_failure_is_subscription_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alice/changes/stream")
            .with_status(503)
            .create_async()
            .await;

        let subscriber = SseSubscriber::new(&config(&server.url())).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let result = subscriber.subscribe(tx).await;
        assert!(matches!(result, Err(CoreError::Subscription(_))));
    }

    #[tokio::test]
    async fn streams_notifications() {
        let mut server = mockito::Server::new_async().await;
        let body = "event: change\ndata: {\"id\": \"e1\", \"sensorId\": \"S1\"}\n\n\
                    data: {\"insert\": [{\"id\": \"e2\"}]}\n\n";
        let mock = server
            .mock("GET", "/alice/changes/stream")
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let subscriber = SseSubscriber::new(&config(&server.url())).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = subscriber.subscribe(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(StreamEvent::Connected));
        let mut ids = Vec::new();
        while ids.len() < 2 {
            match rx.recv().await {
                Some(StreamEvent::Notification(n)) => ids.extend(n.id),
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(ids, vec!["e1", "e2"]);

        // 본문이 끝나면 연결 끊김 → 재연결 대기
        assert_eq!(rx.recv().await, Some(StreamEvent::Disconnected));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Reconnecting { attempt: 1, delay_ms: 1000 })
        ));

        handle.unsubscribe();
        assert!(!handle.is_active());
        mock.assert_async().await;
    }
}
