//! 벤치마크 실행 조율.
//!
//! `NotStarted → Running → Draining → Complete` (최초 구독 실패 시 `Aborted`).
//!
//! - Running: 구독을 먼저 수립한 뒤 상관기/생성기 태스크를 시작하고,
//!   측정 시간이 끝나거나 조기 종료(샘플 상한, `finish_early`)될 때까지 유지
//! - Draining: 생성을 즉시 멈추고, 대기 테이블이 빌 때까지 제한 시간 동안 확인
//! - Complete: 구독 해제, 저장소 봉인, 테이블 닫기, 잔여 항목 폐기, 통계 계산

use kvbench_core::config::BenchmarkConfig;
use kvbench_core::error::CoreError;
use kvbench_core::models::notification::StreamEvent;
use kvbench_core::models::report::BenchmarkReport;
use kvbench_core::ports::clock::{Clock, SystemClock};
use kvbench_core::ports::enricher::SampleEnricher;
use kvbench_core::ports::submitter::Submitter;
use kvbench_core::ports::subscriber::{Subscriber, SubscriptionHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::correlator::Correlator;
use crate::enrichment::DimensionEnricher;
use crate::generator::EventGenerator;
use crate::pending::PendingTable;
use crate::slo;
use crate::stats::{self, LatencyStats};
use crate::store::SampleStore;

/// 구독 스트림 버퍼 크기
const STREAM_BUFFER: usize = 1024;

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Draining,
    Complete,
    Aborted,
}

/// 실행 중 자원. 중지 시 한 번에 정리한다
struct Teardown {
    generator: Arc<EventGenerator>,
    store: Arc<SampleStore>,
    table: Arc<PendingTable>,
    subscription: Box<dyn SubscriptionHandle>,
}

impl Teardown {
    fn release(&self) {
        self.generator.stop();
        self.subscription.unsubscribe();
        self.store.seal();
        self.table.close();
    }
}

struct ControlInner {
    state: Mutex<RunState>,
    finish_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

/// 실행 중인 벤치마크 제어 핸들 (복제 가능)
#[derive(Clone)]
pub struct BenchmarkControl {
    inner: Arc<ControlInner>,
}

impl BenchmarkControl {
    fn new() -> Self {
        let (finish_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                state: Mutex::new(RunState::NotStarted),
                finish_tx,
                stopped: AtomicBool::new(false),
                teardown: Mutex::new(None),
            }),
        }
    }

    /// 현재 상태
    pub fn state(&self) -> RunState {
        *self.inner.state.lock()
    }

    fn set_state(&self, state: RunState) {
        let mut current = self.inner.state.lock();
        debug!("실행 상태 전이: {:?} → {:?}", *current, state);
        *current = state;
    }

    /// 측정을 끝내고 즉시 드레인 단계로 이동
    pub fn finish_early(&self) {
        info!("조기 종료 요청");
        self.inner.finish_tx.send_replace(true);
    }

    /// 강제 중지 (멱등).
    ///
    /// 생성 중단, 구독 해제, 저장소 봉인, 테이블 닫기. 첫 호출이 반환된 뒤로는
    /// 어떤 샘플도 추가되지 않는다. 드레인은 건너뛰고 보고서는 그대로 만들어진다.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("벤치마크 중지");
        self.inner.finish_tx.send_replace(true);
        if let Some(teardown) = self.inner.teardown.lock().as_ref() {
            teardown.release();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// 지금까지 저장된 샘플 수
    pub fn samples_collected(&self) -> usize {
        self.inner
            .teardown
            .lock()
            .as_ref()
            .map_or(0, |t| t.store.count())
    }

    /// 대기 중인 이벤트 수
    pub fn pending(&self) -> usize {
        self.inner
            .teardown
            .lock()
            .as_ref()
            .map_or(0, |t| t.table.len())
    }

    fn finish_rx(&self) -> watch::Receiver<bool> {
        self.inner.finish_tx.subscribe()
    }

    /// 실행 자원 등록. 이미 중지된 경우 즉시 정리하고 `false`.
    fn install(&self, teardown: Teardown) -> bool {
        let mut slot = self.inner.teardown.lock();
        let stopped = self.is_stopped();
        if stopped {
            teardown.release();
        }
        *slot = Some(teardown);
        !stopped
    }

    fn release(&self) {
        if let Some(teardown) = self.inner.teardown.lock().as_ref() {
            teardown.release();
        }
    }
}

impl Default for BenchmarkControl {
    fn default() -> Self {
        Self::new()
    }
}

/// 신호가 `true`가 될 때까지 대기. 송신측이 사라지면 영원히 대기한다.
async fn wait_until_set(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 벤치마크 실행기
pub struct Benchmark {
    config: BenchmarkConfig,
    submitter: Arc<dyn Submitter>,
    subscriber: Arc<dyn Subscriber>,
    enricher: Option<Arc<dyn SampleEnricher>>,
    clock: Arc<dyn Clock>,
    control: BenchmarkControl,
}

impl Benchmark {
    pub fn new(
        config: BenchmarkConfig,
        submitter: Arc<dyn Submitter>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        Self {
            config,
            submitter,
            subscriber,
            enricher: None,
            clock: Arc::new(SystemClock),
            control: BenchmarkControl::new(),
        }
    }

    /// 샘플 보강기 교체 (기본: 설정 기반 `DimensionEnricher`)
    pub fn with_enricher(mut self, enricher: Arc<dyn SampleEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 제어 핸들
    pub fn control(&self) -> BenchmarkControl {
        self.control.clone()
    }

    /// 실행. 한 인스턴스는 한 번만 실행할 수 있다.
    pub async fn run(&self) -> Result<BenchmarkReport, CoreError> {
        self.config.validate()?;
        {
            let state = self.control.state();
            if state != RunState::NotStarted {
                return Err(CoreError::Internal(format!(
                    "이미 실행된 벤치마크 (상태: {state:?})"
                )));
            }
        }

        let config = &self.config;
        let table = Arc::new(PendingTable::new());
        let store = Arc::new(SampleStore::new(config.max_samples));
        let started_at = self.clock.now();

        // 1. 구독 수립 (실패는 치명적)
        let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_BUFFER);
        let subscription = match self.subscriber.subscribe(tx).await {
            Ok(handle) => handle,
            Err(e) => {
                self.control.set_state(RunState::Aborted);
                error!("구독 수립 실패 ({}): {e}", self.subscriber.endpoint());
                return Err(match e {
                    CoreError::Subscription(msg) => CoreError::Subscription(msg),
                    other => CoreError::Subscription(other.to_string()),
                });
            }
        };

        // 2. 상관기 / 생성기
        let enricher = self.enricher.clone().unwrap_or_else(|| {
            Arc::new(
                DimensionEnricher::new(self.subscriber.endpoint())
                    .with_region(config.region.clone())
                    .with_cold_start_samples(config.cold_start_samples),
            )
        });
        let correlator = Arc::new(Correlator::new(
            table.clone(),
            store.clone(),
            enricher,
            self.clock.clone(),
            started_at,
        ));
        let mut full_rx = correlator.subscribe_full();
        let correlator_task = tokio::spawn(correlator.clone().run(rx));

        let generator = Arc::new(EventGenerator::new(
            config.sensors.clone(),
            config.interval(),
            self.submitter.clone(),
            table.clone(),
            self.clock.clone(),
        ));

        let mut finish_rx = self.control.finish_rx();
        let running = self.control.install(Teardown {
            generator: generator.clone(),
            store: store.clone(),
            table: table.clone(),
            subscription,
        });

        self.control.set_state(RunState::Running);
        info!(
            "벤치마크 시작: 센서 {}개, {}초, 주기 {}ms, 상한 {}",
            config.sensors.len(),
            config.duration_secs,
            config.interval_ms,
            config.max_samples
        );

        let generator_task = if running { generator.start() } else { None };
        let reporter_task = self.spawn_reporter(&store, &table);

        // 3. 측정 유지
        let early_stop = if running {
            tokio::select! {
                _ = tokio::time::sleep(config.duration()) => false,
                _ = wait_until_set(&mut full_rx) => {
                    info!("샘플 상한 도달, 조기 종료");
                    true
                }
                _ = wait_until_set(&mut finish_rx) => true,
            }
        } else {
            true
        };

        // 4. 드레인
        self.control.set_state(RunState::Draining);
        generator.stop();
        if let Some(mut task) = generator_task {
            match tokio::time::timeout(config.drain_timeout(), &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("생성기 태스크 비정상 종료: {e}"),
                Err(_) => {
                    warn!("생성기 종료 대기 시간 초과, 태스크 중단");
                    task.abort();
                }
            }
        }
        let drain_timed_out = if self.control.is_stopped() {
            false
        } else {
            self.drain(&table, &store).await
        };

        // 5. 정리 및 보고
        self.control.release();
        if let Some(task) = reporter_task {
            task.abort();
        }
        correlator_task.abort();
        let _ = correlator_task.await;

        let unmatched_discarded = table.expire_all();
        if unmatched_discarded > 0 {
            warn!("미매칭 이벤트 {unmatched_discarded}개 폐기");
        }

        let samples = store.all();
        let min_samples = config.min_samples_for_percentiles;
        let summary = stats::summarize(&samples, min_samples);
        let breakdowns = stats::breakdowns(&samples, min_samples);
        let slo = config
            .slo
            .as_ref()
            .map(|slo_config| slo::evaluate(&samples, slo_config, min_samples));

        let report = BenchmarkReport {
            started_at,
            finished_at: self.clock.now(),
            summary,
            generation: generator.counters(),
            correlation: correlator.counters(),
            unmatched_discarded,
            early_stop,
            drain_timed_out,
            breakdowns,
            slo,
        };

        self.control.set_state(RunState::Complete);
        info!(
            "벤치마크 완료: 샘플 {}, 평균 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms",
            report.summary.total_samples,
            report.summary.average_latency,
            report.summary.p95_latency,
            report.summary.p99_latency
        );
        Ok(report)
    }

    /// 대기 테이블이 빌 때까지 확인. 타임아웃 도달 여부 반환.
    async fn drain(&self, table: &PendingTable, store: &SampleStore) -> bool {
        let deadline = Instant::now() + self.config.drain_timeout();
        let poll = self.config.drain_poll();
        info!("드레인 시작: 대기 {}개", table.len());

        loop {
            if table.is_empty() || store.is_full() || self.control.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("드레인 타임아웃: 대기 {}개 남음", table.len());
                return true;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// 주기적 중간 통계 로그 태스크
    fn spawn_reporter(
        &self,
        store: &Arc<SampleStore>,
        table: &Arc<PendingTable>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.report_interval_secs == 0 {
            return None;
        }
        let period = Duration::from_secs(self.config.report_interval_secs);
        let min_samples = self.config.min_samples_for_percentiles;
        let store = store.clone();
        let table = table.clone();
        let clock = self.clock.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("{}", interim_line(clock.as_ref(), &store, &table, min_samples));
            }
        }))
    }
}

/// 중간 통계 한 줄 (시각은 주입된 시계 기준)
fn interim_line(
    clock: &dyn Clock,
    store: &SampleStore,
    table: &PendingTable,
    min_samples: usize,
) -> String {
    let stats = LatencyStats::compute(&store.latencies(), min_samples);
    format!(
        "중간 통계 ({}): 샘플 {}, 평균 {:.1}ms, p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms, 대기 {}",
        clock.now().format("%H:%M:%S"),
        stats.count,
        stats.mean,
        stats.p50,
        stats.p95,
        stats.p99,
        table.len()
    )
}
