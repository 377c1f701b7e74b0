//! 알림 구독 포트.
//!
//! 구현: `kvbench-network` crate (SSE, 폴링, GraphQL 구독)

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::CoreError;
use crate::models::notification::StreamEvent;

/// 구독 해제 핸들
pub trait SubscriptionHandle: Send + Sync {
    /// 이후 콜백을 멈추고 연결을 해제한다. 여러 번 호출해도 안전하다.
    fn unsubscribe(&self);

    /// 아직 구독 중인지
    fn is_active(&self) -> bool;
}

/// 장기 알림 스트림 협력자
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// 스트림 수립 및 이벤트 수신.
    ///
    /// 최초 연결이 성립한 뒤에 반환하며, 이후 이벤트는 `tx`로 전달된다.
    /// 최초 연결 실패는 `CoreError::Subscription`으로 보고한다.
    async fn subscribe(
        &self,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn SubscriptionHandle>, CoreError>;

    /// 차원 태깅에 쓰이는 엔드포인트 이름 (예: "sse")
    fn endpoint(&self) -> &str;
}

/// 백그라운드 태스크 기반 구독 핸들.
///
/// 해제 시 수신 태스크를 중단하여 송신 채널과 연결을 함께 정리한다.
pub struct TaskSubscription {
    name: String,
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSubscription {
    /// 수신 태스크로 핸들 생성
    pub fn new(name: &str, task: JoinHandle<()>) -> Self {
        Self {
            name: name.to_string(),
            cancelled: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        }
    }
}

impl SubscriptionHandle for TaskSubscription {
    fn unsubscribe(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!("구독 해제: {}", self.name);
    }

    fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
            && self
                .task
                .lock()
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_closes_channel() {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(4);
        let task = tokio::spawn(async move {
            let _ = tx.send(StreamEvent::Connected).await;
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
        let handle = TaskSubscription::new("test", task);
        assert_eq!(rx.recv().await, Some(StreamEvent::Connected));
        assert!(handle.is_active());

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());

        // 태스크 중단으로 송신측이 드롭되어 채널이 닫힌다
        assert_eq!(rx.recv().await, None);
    }
}
