//! SLO 준수 평가.
//!
//! 관측 p95/p99를 목표와 비교하고 소진율(관측/목표, 두 백분위 중 큰 값)을 계산한다.
//! 샘플을 도착 시각 기준의 연속 윈도우로 나눠 윈도우마다 소진율을 구하고
//! 가장 나쁜 윈도우를 함께 보고한다.

use chrono::Duration;
use kvbench_core::config::SloConfig;
use kvbench_core::models::report::{SloVerdict, WindowBurn};
use kvbench_core::models::sample::LatencySample;
use std::collections::BTreeMap;
use tracing::warn;

use crate::stats::LatencyStats;

/// 관측 백분위의 소진율 (목표 대비 배수 중 큰 값)
pub fn burn_rate(p95: f64, p99: f64, slo: &SloConfig) -> f64 {
    let p95_burn = if slo.p95_target_ms > 0.0 {
        p95 / slo.p95_target_ms
    } else {
        0.0
    };
    let p99_burn = if slo.p99_target_ms > 0.0 {
        p99 / slo.p99_target_ms
    } else {
        0.0
    };
    p95_burn.max(p99_burn)
}

/// 윈도우별 소진율 (도착 시각 순)
pub fn window_burns(samples: &[LatencySample], slo: &SloConfig, min_samples: usize) -> Vec<WindowBurn> {
    let Some(origin) = samples.iter().map(|s| s.received_at).min() else {
        return Vec::new();
    };
    let window_ms = (slo.rolling_window_secs.max(1) * 1000) as i64;

    let mut windows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        let offset = (sample.received_at - origin).num_milliseconds();
        windows
            .entry(offset / window_ms)
            .or_default()
            .push(sample.latency_ms as f64);
    }

    windows
        .into_iter()
        .map(|(index, values)| {
            let stats = LatencyStats::compute(&values, min_samples);
            WindowBurn {
                window_start: origin + Duration::milliseconds(index * window_ms),
                count: stats.count,
                p95: stats.p95,
                p99: stats.p99,
                burn_rate: burn_rate(stats.p95, stats.p99, slo),
            }
        })
        .collect()
}

/// 전체 실행에 대한 SLO 판정
pub fn evaluate(samples: &[LatencySample], slo: &SloConfig, min_samples: usize) -> SloVerdict {
    let overall = LatencyStats::from_samples(samples, min_samples);
    let overall_burn = burn_rate(overall.p95, overall.p99, slo);
    let windows = window_burns(samples, slo, min_samples);
    let max_window_burn_rate = windows.iter().map(|w| w.burn_rate).fold(0.0, f64::max);

    let burning =
        overall_burn > slo.burn_rate_threshold || max_window_burn_rate > slo.burn_rate_threshold;
    if burning {
        warn!(
            "SLO 소진율 초과: 전체 {:.2}, 최악 윈도우 {:.2} (임계 {:.2})",
            overall_burn, max_window_burn_rate, slo.burn_rate_threshold
        );
    }

    SloVerdict {
        p95_target_ms: slo.p95_target_ms,
        p99_target_ms: slo.p99_target_ms,
        p95_observed_ms: overall.p95,
        p99_observed_ms: overall.p99,
        p95_ok: overall.p95 <= slo.p95_target_ms,
        p99_ok: overall.p99 <= slo.p99_target_ms,
        burn_rate: overall_burn,
        burn_rate_threshold: slo.burn_rate_threshold,
        burning,
        max_window_burn_rate,
        windows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn slo() -> SloConfig {
        SloConfig {
            p95_target_ms: 100.0,
            p99_target_ms: 200.0,
            burn_rate_threshold: 2.0,
            rolling_window_secs: 10,
        }
    }

    /// `received_ms` 시각에 도착한 지연 `latency` 샘플
    fn sample(received_ms: i64, latency: i64) -> LatencySample {
        let r = Utc.timestamp_millis_opt(received_ms).unwrap();
        let g = r - Duration::milliseconds(latency);
        LatencySample::new(&format!("k{received_ms}"), "S1", g, r)
    }

    #[test]
    fn burn_rate_takes_worse_percentile() {
        assert_eq!(burn_rate(150.0, 100.0, &slo()), 1.5);
        assert_eq!(burn_rate(50.0, 600.0, &slo()), 3.0);
    }

    #[test]
    fn compliant_run() {
        let samples: Vec<_> = (0..20).map(|i| sample(i * 100, 40)).collect();
        let verdict = evaluate(&samples, &slo(), 10);
        assert!(verdict.p95_ok && verdict.p99_ok);
        assert!((verdict.burn_rate - 0.4).abs() < 1e-9);
        assert!(!verdict.burning);
        assert!(verdict.compliant());
        assert_eq!(verdict.windows.len(), 1);
    }

    #[test]
    fn single_bad_window_burns() {
        // 첫 윈도우 정상, 두 번째 윈도우(10초 이후) 지연 폭증
        let mut samples: Vec<_> = (0..30).map(|i| sample(i * 100, 50)).collect();
        samples.extend((0..10).map(|i| sample(10_000 + i * 100, 500)));

        let verdict = evaluate(&samples, &slo(), 5);
        assert_eq!(verdict.windows.len(), 2);
        assert_eq!(verdict.windows[0].count, 30);
        assert_eq!(
            verdict.windows[1].window_start,
            Utc.timestamp_millis_opt(10_000).unwrap()
        );
        assert!((verdict.windows[1].burn_rate - 5.0).abs() < 1e-9);
        assert!((verdict.max_window_burn_rate - 5.0).abs() < 1e-9);
        assert!(verdict.burning);
        assert!(!verdict.compliant());
    }

    #[test]
    fn empty_samples() {
        let verdict = evaluate(&[], &slo(), 10);
        assert_eq!(verdict.burn_rate, 0.0);
        assert!(verdict.windows.is_empty());
        assert!(verdict.compliant());
    }
}
