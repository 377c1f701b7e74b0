//! 이벤트 생성기.
//!
//! 고정 주기마다 센서별 측정값을 하나씩 합성해 Submit하고,
//! 성공하면 대기 이벤트 테이블에 등록한다. 재시도는 하지 않는다.
//!
//! 상태: `Idle → Running → Stopping → Stopped`.
//! 주기 타이머는 생성기 태스크가 소유하며, `Stopped`는 태스크가 루프를 빠져나온 뒤에만
//! 기록되므로 그 이후에는 등록이 일어나지 않는다.

use futures::future::join_all;
use kvbench_core::config::SensorProfile;
use kvbench_core::models::event::{GenerationContext, PendingEvent};
use kvbench_core::models::measurement::Measurement;
use kvbench_core::models::report::GenerationCounters;
use kvbench_core::ports::clock::Clock;
use kvbench_core::ports::submitter::Submitter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::pending::PendingTable;

/// 생성기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Default)]
struct Counters {
    generated: AtomicU64,
    submitted: AtomicU64,
    failed: AtomicU64,
    dropped_after_stop: AtomicU64,
    /// 제출 응답을 기다리는 측정값 수
    in_flight: AtomicU64,
}

/// 이벤트 생성기
pub struct EventGenerator {
    sensors: Vec<SensorProfile>,
    interval: Duration,
    submitter: Arc<dyn Submitter>,
    table: Arc<PendingTable>,
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
    sequence: AtomicU64,
    counters: Counters,
    stop_tx: watch::Sender<bool>,
}

impl EventGenerator {
    pub fn new(
        sensors: Vec<SensorProfile>,
        interval: Duration,
        submitter: Arc<dyn Submitter>,
        table: Arc<PendingTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            sensors,
            interval,
            submitter,
            table,
            clock,
            state: Mutex::new(GeneratorState::Idle),
            sequence: AtomicU64::new(0),
            counters: Counters::default(),
            stop_tx,
        }
    }

    pub fn state(&self) -> GeneratorState {
        *self.state.lock()
    }

    /// 현재 카운터 스냅샷
    pub fn counters(&self) -> GenerationCounters {
        GenerationCounters {
            generated: self.counters.generated.load(Ordering::SeqCst),
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            dropped_after_stop: self.counters.dropped_after_stop.load(Ordering::SeqCst),
        }
    }

    /// 생성 태스크 시작. `Idle`이 아니면 `None`.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        {
            let mut state = self.state.lock();
            if *state != GeneratorState::Idle {
                warn!("생성기 재시작 거부 (상태: {:?})", *state);
                return None;
            }
            *state = GeneratorState::Running;
        }

        let generator = Arc::clone(self);
        let stop_rx = self.stop_tx.subscribe();
        Some(tokio::spawn(async move { generator.run(stop_rx).await }))
    }

    /// 생성 중지 요청. 진행 중인 제출은 기다리지 않고 버리며 중지 후 폐기로 센다.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                GeneratorState::Running => *state = GeneratorState::Stopping,
                GeneratorState::Idle => *state = GeneratorState::Stopped,
                GeneratorState::Stopping | GeneratorState::Stopped => return,
            }
        }
        debug!("생성기 중지 요청");
        self.stop_tx.send_replace(true);
    }

    fn is_stopping(&self) -> bool {
        matches!(
            self.state(),
            GeneratorState::Stopping | GeneratorState::Stopped
        )
    }

    async fn run(&self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "이벤트 생성 시작: 센서 {}개, 주기 {}ms",
            self.sensors.len(),
            self.interval.as_millis()
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    break;
                }
                _ = interval.tick() => {
                    if self.is_stopping() {
                        break;
                    }
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => {
                            self.abandon_in_flight();
                            break;
                        }
                        _ = self.emit_tick() => {}
                    }
                }
            }
        }

        *self.state.lock() = GeneratorState::Stopped;
        let counters = self.counters();
        info!(
            "이벤트 생성 종료: 생성 {}, 등록 {}, 실패 {}, 중지 후 폐기 {}",
            counters.generated, counters.submitted, counters.failed, counters.dropped_after_stop
        );
    }

    /// 중지로 취소된 제출을 폐기 카운터로 옮긴다
    fn abandon_in_flight(&self) {
        let abandoned = self.counters.in_flight.swap(0, Ordering::SeqCst);
        if abandoned > 0 {
            self.counters
                .dropped_after_stop
                .fetch_add(abandoned, Ordering::SeqCst);
            debug!("중지로 진행 중 제출 {abandoned}건 폐기");
        }
    }

    /// 한 주기: 센서별 측정값을 동시에 제출
    async fn emit_tick(&self) {
        let submissions = self.sensors.iter().map(|sensor| self.emit_one(sensor));
        join_all(submissions).await;
    }

    async fn emit_one(&self, sensor: &SensorProfile) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let generated_at = self.clock.now();
        let measurement = Measurement::new(
            &sensor.id,
            generated_at,
            sensor.value_at(sequence),
            &sensor.unit,
        );
        self.counters.generated.fetch_add(1, Ordering::SeqCst);

        let started = Instant::now();
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.submitter.submit(&measurement).await;
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!("측정값 제출 실패 ({}): {e}", sensor.id);
                return;
            }
        };
        let submit_ms = started.elapsed().as_millis() as u64;

        if self.is_stopping() {
            self.counters.dropped_after_stop.fetch_add(1, Ordering::SeqCst);
            debug!("중지 이후 완료된 제출 폐기: {}", receipt.identifier);
            return;
        }

        let context = GenerationContext {
            sequence,
            submit_ms: Some(submit_ms),
            payload_bytes: self.submitter.payload_size(&measurement),
            in_flight: self.table.len(),
        };
        let event = PendingEvent::new(&receipt.identifier, &sensor.id, generated_at)
            .with_context(context);

        if self.table.register(event) {
            self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        } else if self.table.is_closed() {
            self.counters.dropped_after_stop.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!("중복 식별자로 등록 실패: {}", receipt.identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kvbench_core::error::CoreError;
    use kvbench_core::models::measurement::SubmitReceipt;
    use kvbench_core::ports::clock::SystemClock;
    use std::sync::atomic::AtomicBool;

    /// 측정값 ID를 그대로 돌려주는 제출기
    #[derive(Default)]
    struct EchoSubmitter {
        fail: AtomicBool,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Submitter for EchoSubmitter {
        async fn submit(&self, measurement: &Measurement) -> Result<SubmitReceipt, CoreError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::Network("connection refused".to_string()));
            }
            self.seen.lock().push(measurement.id.clone());
            Ok(SubmitReceipt {
                identifier: measurement.id.clone(),
            })
        }

        fn payload_size(&self, _measurement: &Measurement) -> usize {
            256
        }
    }

    fn generator(submitter: EchoSubmitter, sensors: &[&str]) -> (Arc<EventGenerator>, Arc<PendingTable>) {
        let table = Arc::new(PendingTable::new());
        let generator = Arc::new(EventGenerator::new(
            sensors.iter().map(|s| SensorProfile::named(s)).collect(),
            Duration::from_millis(20),
            Arc::new(submitter),
            table.clone(),
            Arc::new(SystemClock),
        ));
        (generator, table)
    }

    #[tokio::test]
    async fn registers_one_event_per_sensor_per_tick() {
        let (generator, table) = generator(EchoSubmitter::default(), &["S1", "S2"]);
        assert_eq!(generator.state(), GeneratorState::Idle);

        let handle = generator.start().unwrap();
        assert_eq!(generator.state(), GeneratorState::Running);
        tokio::time::sleep(Duration::from_millis(50)).await;
        generator.stop();
        handle.await.unwrap();

        assert_eq!(generator.state(), GeneratorState::Stopped);
        let counters = generator.counters();
        assert!(counters.generated >= 2);
        assert_eq!(counters.generated % 2, 0);
        assert_eq!(counters.submitted as usize, table.len());
        assert_eq!(counters.failed, 0);
        assert!(generator.start().is_none());
    }

    #[tokio::test]
    async fn failures_are_counted_not_registered() {
        let submitter = EchoSubmitter::default();
        submitter.fail.store(true, Ordering::SeqCst);
        let (generator, table) = generator(submitter, &["S1"]);

        let handle = generator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        generator.stop();
        handle.await.unwrap();

        let counters = generator.counters();
        assert!(counters.failed >= 1);
        assert_eq!(counters.submitted, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn submit_completing_after_stop_is_dropped() {
        let submitter = EchoSubmitter {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let (generator, table) = generator(submitter, &["S1"]);

        let handle = generator.start().unwrap();
        // 첫 틱은 즉시 발생하고 제출은 100ms 동안 진행 중
        tokio::time::sleep(Duration::from_millis(30)).await;
        generator.stop();
        assert_eq!(generator.state(), GeneratorState::Stopping);
        handle.await.unwrap();

        let counters = generator.counters();
        assert_eq!(counters.generated, 1);
        assert_eq!(counters.dropped_after_stop, 1);
        assert_eq!(counters.submitted, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn registration_carries_generation_context() {
        let submitter = Arc::new(EchoSubmitter::default());
        let table = Arc::new(PendingTable::new());
        let generator = Arc::new(EventGenerator::new(
            vec![SensorProfile::named("S1")],
            Duration::from_secs(60),
            submitter.clone(),
            table.clone(),
            Arc::new(SystemClock),
        ));
        let handle = generator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        generator.stop();
        handle.await.unwrap();

        let id = submitter.seen.lock()[0].clone();
        let event = table.take(&id).unwrap();
        assert_eq!(event.sensor_id, "S1");
        assert_eq!(event.context.sequence, 0);
        assert_eq!(event.context.payload_bytes, 256);
        assert_eq!(event.context.in_flight, 0);
        assert!(event.context.submit_ms.is_some());
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_slow_submit() {
        let submitter = EchoSubmitter {
            delay: Some(Duration::from_secs(6)),
            ..Default::default()
        };
        let (generator, table) = generator(submitter, &["S1", "S2"]);

        let handle = generator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped_at = Instant::now();
        generator.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stop must not wait for the submit")
            .unwrap();

        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert_eq!(generator.state(), GeneratorState::Stopped);
        let counters = generator.counters();
        assert_eq!(counters.generated, 2);
        assert_eq!(counters.dropped_after_stop, 2);
        assert_eq!(counters.submitted, 0);
        assert!(table.is_empty());
    }

    #[test]
    fn stop_before_start_goes_straight_to_stopped() {
        let (generator, _) = generator(EchoSubmitter::default(), &["S1"]);
        generator.stop();
        assert_eq!(generator.state(), GeneratorState::Stopped);
        generator.stop();
        assert_eq!(generator.state(), GeneratorState::Stopped);
    }
}
