//! 통계 엔진.
//!
//! 백분위(선형 보간), 평균/최소/최대, 꼬리 비율, 차원별 그룹 분석.

use kvbench_core::models::report::{BenchmarkSummary, GroupBreakdown, GroupStats};
use kvbench_core::models::sample::LatencySample;
use std::collections::BTreeMap;

/// 정렬된 값에서 백분위 계산 (`p`는 0~100).
///
/// `index = p/100 * (n-1)`, `floor(index)`와 `ceil(index)` 사이 선형 보간.
/// 빈 입력은 0. 최소 샘플 수 기준은 여기서 적용하지 않는다.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let index = p.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let weight = index - lower as f64;
                sorted[lower] + (sorted[upper] - sorted[lower]) * weight
            }
        }
    }
}

/// 지연 통계 (밀리초)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    /// p99 / p50 (p50이 0이면 0)
    pub tail_ratio: f64,
}

impl LatencyStats {
    /// 값 목록에서 통계 계산.
    ///
    /// 값이 `min_samples`보다 적으면 백분위와 꼬리 비율은 0이고
    /// 평균/최소/최대만 계산한다. 값이 없으면 모두 0.
    pub fn compute(values: &[f64], min_samples: usize) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let min = sorted[0];
        let max = sorted[count - 1];

        if count < min_samples {
            return Self {
                count,
                mean,
                min,
                max,
                ..Default::default()
            };
        }

        let p50 = percentile(&sorted, 50.0);
        let p95 = percentile(&sorted, 95.0);
        let p99 = percentile(&sorted, 99.0);
        let tail_ratio = if p50 > 0.0 { p99 / p50 } else { 0.0 };

        Self {
            count,
            mean,
            min,
            max,
            p50,
            p95,
            p99,
            tail_ratio,
        }
    }

    /// 샘플 목록에서 계산
    pub fn from_samples(samples: &[LatencySample], min_samples: usize) -> Self {
        let values: Vec<f64> = samples.iter().map(|s| s.latency_ms as f64).collect();
        Self::compute(&values, min_samples)
    }

    /// 보고서 요약으로 변환
    pub fn to_summary(&self) -> BenchmarkSummary {
        BenchmarkSummary {
            total_samples: self.count,
            average_latency: self.mean,
            min_latency: self.min,
            max_latency: self.max,
            p50_latency: self.p50,
            p95_latency: self.p95,
            p99_latency: self.p99,
            tail_ratio: self.tail_ratio,
        }
    }
}

/// 샘플 목록 요약
pub fn summarize(samples: &[LatencySample], min_samples: usize) -> BenchmarkSummary {
    LatencyStats::from_samples(samples, min_samples).to_summary()
}

// ============================================================
// 그룹 분석
// ============================================================

/// 그룹 기준 차원
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Endpoint,
    PayloadBucket,
    ConcurrencyBucket,
    Region,
    ColdStart,
    Sensor,
}

impl GroupBy {
    /// 보고서에 포함하는 전체 차원
    pub const ALL: [GroupBy; 6] = [
        GroupBy::Endpoint,
        GroupBy::PayloadBucket,
        GroupBy::ConcurrencyBucket,
        GroupBy::Region,
        GroupBy::ColdStart,
        GroupBy::Sensor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::PayloadBucket => "payload_bucket",
            Self::ConcurrencyBucket => "concurrency_bucket",
            Self::Region => "region",
            Self::ColdStart => "cold_start",
            Self::Sensor => "sensor",
        }
    }

    fn key_of(&self, sample: &LatencySample) -> String {
        let dims = &sample.dimensions;
        match self {
            Self::Endpoint => dims.endpoint.clone(),
            Self::PayloadBucket => dims.payload_bucket.to_string(),
            Self::ConcurrencyBucket => dims.concurrency_bucket.to_string(),
            Self::Region => dims.region.clone().unwrap_or_else(|| "unknown".to_string()),
            Self::ColdStart => {
                if dims.cold_start {
                    "cold".to_string()
                } else {
                    "warm".to_string()
                }
            }
            Self::Sensor => sample.sensor_id.clone(),
        }
    }
}

/// 한 차원으로 그룹별 count/mean/p95/p99 계산 (키 사전순)
pub fn group_by(samples: &[LatencySample], dimension: GroupBy, min_samples: usize) -> GroupBreakdown {
    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        buckets
            .entry(dimension.key_of(sample))
            .or_default()
            .push(sample.latency_ms as f64);
    }

    let groups = buckets
        .into_iter()
        .map(|(key, values)| {
            let stats = LatencyStats::compute(&values, min_samples);
            GroupStats {
                key,
                count: stats.count,
                mean: stats.mean,
                p95: stats.p95,
                p99: stats.p99,
            }
        })
        .collect();

    GroupBreakdown {
        dimension: dimension.name().to_string(),
        groups,
    }
}

/// 전체 차원 그룹 분석. 샘플이 없으면 빈 목록.
pub fn breakdowns(samples: &[LatencySample], min_samples: usize) -> Vec<GroupBreakdown> {
    if samples.is_empty() {
        return Vec::new();
    }
    GroupBy::ALL
        .iter()
        .map(|dim| group_by(samples, *dim, min_samples))
        .collect()
}
