//! 도착 상관기.
//!
//! 구독 스트림의 알림을 도착 순서대로 처리한다:
//! 백로그 거부 → 상관 키 계산 → 대기 테이블에서 원자적 회수 →
//! 지연 계산/보강 → 샘플 저장소 추가 → 상한 도달 시 조기 종료 신호.

use chrono::{DateTime, Utc};
use kvbench_core::models::notification::{Notification, StreamEvent};
use kvbench_core::models::report::CorrelationCounters;
use kvbench_core::models::sample::LatencySample;
use kvbench_core::ports::clock::Clock;
use kvbench_core::ports::enricher::SampleEnricher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::pending::PendingTable;
use crate::store::{AppendOutcome, SampleStore};

/// 알림 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// 샘플 저장됨
    Matched { latency_ms: u64, count: usize },
    /// 대기 항목 없음 (중복, 타 프로세스 이벤트, 이미 만료)
    Miss,
    /// 실행 시작 이전 타임스탬프
    Backlog,
    /// 상관 키를 만들 수 없음
    Malformed,
    /// 매칭됐지만 저장소가 거부 (가득 참 또는 봉인)
    Rejected,
}

#[derive(Default)]
struct Counters {
    matched: AtomicU64,
    misses: AtomicU64,
    backlog_rejected: AtomicU64,
    malformed: AtomicU64,
    clock_skewed: AtomicU64,
    rejected_full: AtomicU64,
}

/// 도착 상관기
pub struct Correlator {
    table: Arc<PendingTable>,
    store: Arc<SampleStore>,
    enricher: Arc<dyn SampleEnricher>,
    clock: Arc<dyn Clock>,
    run_started_at: DateTime<Utc>,
    full_tx: watch::Sender<bool>,
    counters: Counters,
}

impl Correlator {
    pub fn new(
        table: Arc<PendingTable>,
        store: Arc<SampleStore>,
        enricher: Arc<dyn SampleEnricher>,
        clock: Arc<dyn Clock>,
        run_started_at: DateTime<Utc>,
    ) -> Self {
        let (full_tx, _) = watch::channel(false);
        Self {
            table,
            store,
            enricher,
            clock,
            run_started_at,
            full_tx,
            counters: Counters::default(),
        }
    }

    /// 저장소 상한 도달 신호 수신기
    pub fn subscribe_full(&self) -> watch::Receiver<bool> {
        self.full_tx.subscribe()
    }

    /// 현재 카운터 스냅샷
    pub fn counters(&self) -> CorrelationCounters {
        CorrelationCounters {
            matched: self.counters.matched.load(Ordering::SeqCst),
            misses: self.counters.misses.load(Ordering::SeqCst),
            backlog_rejected: self.counters.backlog_rejected.load(Ordering::SeqCst),
            malformed: self.counters.malformed.load(Ordering::SeqCst),
            clock_skewed: self.counters.clock_skewed.load(Ordering::SeqCst),
            rejected_full: self.counters.rejected_full.load(Ordering::SeqCst),
        }
    }

    /// 스트림 소비 루프. 송신측이 모두 닫히면 종료한다.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<StreamEvent>) {
        debug!("도착 상관 시작");
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Notification(notification) => {
                    self.handle(&notification);
                }
                StreamEvent::Connected => info!("구독 연결됨"),
                StreamEvent::Reconnecting { attempt, delay_ms } => {
                    warn!("구독 재연결 대기 (시도 {attempt}, {delay_ms}ms)");
                }
                StreamEvent::Disconnected => warn!("구독 연결 끊김"),
                StreamEvent::Error(msg) => warn!("구독 스트림 에러: {msg}"),
            }
        }
        debug!("도착 상관 종료");
    }

    /// 알림 하나 처리
    pub fn handle(&self, notification: &Notification) -> CorrelationOutcome {
        // 밀리초 단위로 비교 (전송 형식의 정밀도)
        if let Some(ts) = notification.timestamp {
            if ts.timestamp_millis() < self.run_started_at.timestamp_millis() {
                self.counters.backlog_rejected.fetch_add(1, Ordering::SeqCst);
                debug!("백로그 알림 무시: {ts}");
                return CorrelationOutcome::Backlog;
            }
        }

        let Some(key) = notification.correlation_key() else {
            self.counters.malformed.fetch_add(1, Ordering::SeqCst);
            warn!("상관 키 없는 알림 폐기: {:?}", notification);
            return CorrelationOutcome::Malformed;
        };

        let Some(pending) = self.table.take(&key) else {
            self.counters.misses.fetch_add(1, Ordering::SeqCst);
            debug!("대기 항목 없음: {key}");
            return CorrelationOutcome::Miss;
        };

        let received_at = self.clock.now();
        let mut sample = LatencySample::new(
            &pending.correlation_key,
            &pending.sensor_id,
            pending.generated_at,
            received_at,
        );
        if sample.clock_skew {
            self.counters.clock_skewed.fetch_add(1, Ordering::SeqCst);
            warn!(
                "음수 지연 {}ms 보정 (시계 차이 의심): {}",
                sample.raw_latency_ms, pending.correlation_key
            );
        }
        self.enricher.enrich(&pending, notification, &mut sample);
        let latency_ms = sample.latency_ms;

        match self.store.append(sample) {
            AppendOutcome::Appended { count } => {
                self.counters.matched.fetch_add(1, Ordering::SeqCst);
                debug!("샘플 #{count}: {} {latency_ms}ms", pending.sensor_id);
                if count >= self.store.max_samples() {
                    info!("샘플 상한 {count} 도달");
                    self.full_tx.send_replace(true);
                }
                CorrelationOutcome::Matched { latency_ms, count }
            }
            AppendOutcome::Full => {
                self.counters.rejected_full.fetch_add(1, Ordering::SeqCst);
                self.full_tx.send_replace(true);
                CorrelationOutcome::Rejected
            }
            AppendOutcome::Sealed => {
                self.counters.rejected_full.fetch_add(1, Ordering::SeqCst);
                CorrelationOutcome::Rejected
            }
        }
    }
}
