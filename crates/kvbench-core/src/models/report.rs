//! 벤치마크 결과 보고서 모델.
//!
//! 출력 형식(JSON, 텍스트)은 앱 레이어의 관심사이며 여기서는 구조만 정의한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 요약 통계 (밀리초)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSummary {
    pub total_samples: usize,
    pub average_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub p50_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    /// p99 / p50
    pub tail_ratio: f64,
}

/// 생성기 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCounters {
    /// 합성한 측정값 수
    pub generated: u64,
    /// 제출 성공 후 등록된 수
    pub submitted: u64,
    /// 제출 실패 수
    pub failed: u64,
    /// 중지 이후 완료되어 등록하지 않은 제출 수
    pub dropped_after_stop: u64,
}

/// 상관기 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationCounters {
    /// 샘플이 된 알림 수
    pub matched: u64,
    /// 대기 항목이 없어 버린 알림 수 (중복 포함)
    pub misses: u64,
    /// 실행 시작 이전 타임스탬프(백로그)로 버린 알림 수
    pub backlog_rejected: u64,
    /// 상관 키를 만들 수 없어 버린 알림 수
    pub malformed: u64,
    /// 음수 지연이 보정된 샘플 수
    pub clock_skewed: u64,
    /// 저장소가 가득 차거나 봉인되어 버린 샘플 수
    pub rejected_full: u64,
}

/// 그룹 하나의 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// 그룹 키 값 (예: "sse", "small")
    pub key: String,
    pub count: usize,
    pub mean: f64,
    pub p95: f64,
    pub p99: f64,
}

/// 차원별 그룹 분석
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    /// 그룹 기준 차원 이름
    pub dimension: String,
    pub groups: Vec<GroupStats>,
}

/// 롤링 윈도우 하나의 소진율
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowBurn {
    /// 윈도우 시작 시각
    pub window_start: DateTime<Utc>,
    pub count: usize,
    pub p95: f64,
    pub p99: f64,
    pub burn_rate: f64,
}

/// SLO 준수 판정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SloVerdict {
    pub p95_target_ms: f64,
    pub p99_target_ms: f64,
    pub p95_observed_ms: f64,
    pub p99_observed_ms: f64,
    pub p95_ok: bool,
    pub p99_ok: bool,
    /// 전체 실행 기준 소진율 (관측값 / 목표값, 두 백분위 중 큰 값)
    pub burn_rate: f64,
    pub burn_rate_threshold: f64,
    /// 전체 또는 어느 윈도우든 임계 소진율 초과 시 true
    pub burning: bool,
    /// 가장 나쁜 윈도우의 소진율
    pub max_window_burn_rate: f64,
    pub windows: Vec<WindowBurn>,
}

impl SloVerdict {
    /// p95/p99 목표를 모두 만족하고 소진 중이 아님
    pub fn compliant(&self) -> bool {
        self.p95_ok && self.p99_ok && !self.burning
    }
}

/// 벤치마크 최종 보고서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BenchmarkSummary,
    pub generation: GenerationCounters,
    pub correlation: CorrelationCounters,
    /// 드레인 이후에도 매칭되지 않아 폐기된 대기 항목 수
    pub unmatched_discarded: usize,
    /// 샘플 상한 도달 또는 요청으로 조기 종료했는지
    pub early_stop: bool,
    /// 드레인 타임아웃에 도달했는지
    pub drain_timed_out: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakdowns: Vec<GroupBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo: Option<SloVerdict>,
}
