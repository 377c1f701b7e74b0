//! 지연 샘플 저장소.
//!
//! 상한이 있는 추가 전용 시퀀스. 상한에 도달하면 교체 없이 추가를 거부하고,
//! 봉인 이후에는 어떤 샘플도 들어오지 않는다.

use kvbench_core::models::sample::LatencySample;
use parking_lot::Mutex;

/// 추가 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// 추가됨 (추가 후 전체 개수)
    Appended { count: usize },
    /// 상한 도달로 거부
    Full,
    /// 봉인되어 거부
    Sealed,
}

struct Inner {
    samples: Vec<LatencySample>,
    sealed: bool,
}

/// 샘플 저장소 (단일 소유자)
pub struct SampleStore {
    max_samples: usize,
    inner: Mutex<Inner>,
}

impl SampleStore {
    /// 상한을 지정해 생성
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples,
            inner: Mutex::new(Inner {
                samples: Vec::with_capacity(max_samples.min(4096)),
                sealed: false,
            }),
        }
    }

    /// 샘플 추가
    pub fn append(&self, sample: LatencySample) -> AppendOutcome {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return AppendOutcome::Sealed;
        }
        if inner.samples.len() >= self.max_samples {
            return AppendOutcome::Full;
        }
        inner.samples.push(sample);
        AppendOutcome::Appended {
            count: inner.samples.len(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.max_samples
    }

    /// 이후 모든 추가를 거부. 반환 시점부터 저장소 내용은 고정된다.
    pub fn seal(&self) {
        self.inner.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// 전체 샘플 (삽입 순서)
    pub fn all(&self) -> Vec<LatencySample> {
        self.inner.lock().samples.clone()
    }

    /// 보고용 지연값 목록 (밀리초, 삽입 순서)
    pub fn latencies(&self) -> Vec<f64> {
        self.inner
            .lock()
            .samples
            .iter()
            .map(|s| s.latency_ms as f64)
            .collect()
    }
}
