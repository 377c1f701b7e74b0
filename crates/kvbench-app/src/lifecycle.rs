//! 라이프사이클 관리.
//!
//! OS 시그널을 받아 실행 중인 벤치마크를 중지한다.

use kvbench_latency::BenchmarkControl;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    /// 새 라이프사이클 관리자 생성
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        self.shutdown_tx.send_replace(true);
    }

    /// OS 시그널 대기 (SIGINT, SIGTERM)
    ///
    /// 핸들러 등록에 실패하면 경고만 남기고 신호 없이 계속 대기한다.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let (mut sigint, mut sigterm) = match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("시그널 핸들러 등록 실패: {e}");
                    return std::future::pending().await;
                }
            };

            tokio::select! {
                _ = sigint.recv() => info!("SIGINT 수신"),
                _ = sigterm.recv() => info!("SIGTERM 수신"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C 핸들러 등록 실패: {e}");
                return std::future::pending().await;
            }
            info!("Ctrl+C 수신");
        }

        self.shutdown();
    }

    /// 종료 신호를 받으면 벤치마크를 즉시 중지하는 감시 태스크
    pub fn watch_benchmark(&self, control: BenchmarkControl) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
            warn!("중지 요청, 드레인 없이 보고서 생성");
            control.stop();
        })
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lifecycle_creation() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        assert!(!*rx.borrow());
    }

    #[test]
    fn shutdown_signal() {
        let lm = LifecycleManager::new();
        let rx = lm.subscribe();
        lm.shutdown();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_stops_benchmark() {
        let lm = LifecycleManager::new();
        let control = BenchmarkControl::default();
        let watcher = lm.watch_benchmark(control.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!control.is_stopped());

        lm.shutdown();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(control.is_stopped());
    }
}
