//! 주기적 REST 조회 구독.
//!
//! `Subscriber` 포트 구현. `GET {poll_path}?since=<ts>`를 일정 주기로 호출해
//! 이전 조회 이후의 변경을 알림으로 전달한다. 조회 실패는 스트림 에러로 보고하고 계속한다.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kvbench_core::config::ServerConfig;
use kvbench_core::error::CoreError;
use kvbench_core::models::notification::{Notification, StreamEvent};
use kvbench_core::ports::subscriber::{Subscriber, SubscriptionHandle, TaskSubscription};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::http_client::{build_client, check_response};
use crate::notification;

#[derive(Clone)]
struct Poller {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl Poller {
    /// `since` 이후 변경 조회
    async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<Notification>, CoreError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut req = self.client.get(&self.url).query(&[("since", since.as_str())]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("변경 조회 실패: {e}")))?;
        let resp = check_response(resp).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("변경 조회 본문 읽기 실패: {e}")))?;
        notification::parse_text(&text)
    }
}

/// 폴링 구독자 (`Subscriber` 포트 구현)
pub struct PollingSubscriber {
    poller: Poller,
    interval: Duration,
}

impl PollingSubscriber {
    /// 서버 설정으로 생성
    pub fn new(config: &ServerConfig) -> Result<Self, CoreError> {
        Ok(Self {
            poller: Poller {
                client: build_client(Some(config.request_timeout()))?,
                url: format!(
                    "{}{}",
                    config.base_url.trim_end_matches('/'),
                    config.poll_path
                ),
                token: config.token.clone(),
            },
            interval: config.poll_interval().max(Duration::from_millis(1)),
        })
    }

    async fn poll_loop(
        poller: Poller,
        interval: Duration,
        mut since: DateTime<Utc>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 첫 틱은 즉시 발생하므로 소비 (최초 조회는 subscribe에서 수행)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let requested_at = Utc::now();
            match poller.fetch(since).await {
                Ok(list) => {
                    debug!("변경 조회: {}건", list.len());
                    since = requested_at;
                    for n in list {
                        if tx.send(StreamEvent::Notification(n)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("변경 조회 실패: {e}");
                    if tx.send(StreamEvent::Error(e.to_string())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Subscriber for PollingSubscriber {
    async fn subscribe(
        &self,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SubscriptionHandle>, CoreError> {
        info!(
            "폴링 구독 시작: {} (주기 {}ms)",
            self.poller.url,
            self.interval.as_millis()
        );

        // 최초 조회로 엔드포인트 확인. 이 시점 이전 변경은 백로그이므로 버린다.
        let since = Utc::now();
        let backlog = self
            .poller
            .fetch(since)
            .await
            .map_err(|e| CoreError::Subscription(format!("폴링 최초 조회 실패: {e}")))?;
        if !backlog.is_empty() {
            debug!("최초 조회 {}건 무시", backlog.len());
        }

        let _ = tx.send(StreamEvent::Connected).await;
        let task = tokio::spawn(Self::poll_loop(
            self.poller.clone(),
            self.interval,
            since,
            tx,
        ));
        Ok(Box::new(TaskSubscription::new("poll", task)))
    }

    fn endpoint(&self) -> &str {
        "poll"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, interval_ms: u64) -> ServerConfig {
        ServerConfig {
            base_url: url.to_string(),
            poll_interval_ms: interval_ms,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn initial_failure_is_subscription_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alice/changes")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let subscriber = PollingSubscriber::new(&config(&server.url(), 50)).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            subscriber.subscribe(tx).await,
            Err(CoreError::Subscription(_))
        ));
    }

    #[tokio::test]
    async fn polls_with_since_and_forwards() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/alice/changes")
            .match_query(mockito::Matcher::Regex("since=".to_string()))
            .with_status(200)
            .with_body(r#"[{"id": "p1", "sensorId": "S1"}]"#)
            .expect_at_least(2)
            .create_async()
            .await;

        let subscriber = PollingSubscriber::new(&config(&server.url(), 30)).unwrap();
        assert_eq!(subscriber.endpoint(), "poll");
        let (tx, mut rx) = mpsc::channel(16);
        let handle = subscriber.subscribe(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(StreamEvent::Connected));
        match rx.recv().await {
            Some(StreamEvent::Notification(n)) => assert_eq!(n.id.as_deref(), Some("p1")),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.unsubscribe();
        mock.assert_async().await;
    }
}
