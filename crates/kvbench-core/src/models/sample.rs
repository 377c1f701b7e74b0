//! 지연 샘플 모델.
//!
//! 상관이 완료된 이벤트 하나의 지연 측정값과, 확장 분석용 스팬/차원 태그.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 페이로드 크기 구간
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadBucket {
    /// 1 KiB 미만
    #[default]
    Small,
    /// 1 KiB 이상 16 KiB 미만
    Medium,
    /// 16 KiB 이상
    Large,
}

impl PayloadBucket {
    /// 바이트 수로 구간 분류
    pub fn classify(bytes: usize) -> Self {
        if bytes < 1024 {
            Self::Small
        } else if bytes < 16 * 1024 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

impl fmt::Display for PayloadBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => f.write_str("small"),
            Self::Medium => f.write_str("medium"),
            Self::Large => f.write_str("large"),
        }
    }
}

/// 동시성(대기 중 이벤트 수) 구간
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyBucket {
    /// 대기 10개 미만
    #[default]
    Low,
    /// 대기 10개 이상 100개 미만
    Medium,
    /// 대기 100개 이상
    High,
}

impl ConcurrencyBucket {
    /// 대기 이벤트 수로 구간 분류
    pub fn classify(in_flight: usize) -> Self {
        if in_flight < 10 {
            Self::Low
        } else if in_flight < 100 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for ConcurrencyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// 명명된 하위 구간 (밀리초).
///
/// 실제로 측정된 값만 채운다. 측정 수단이 없으면 `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spans {
    /// Submit 호출 왕복 시간
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_ms: Option<u64>,
    /// 제출 완료 이후 알림 도착까지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_ms: Option<u64>,
    /// 플러그인 계측 훅이 추가한 구간
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, u64>,
}

/// 범주형 차원 태그
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// 구독 엔드포인트 (예: "sse", "poll", "graphql")
    pub endpoint: String,
    /// 페이로드 크기 구간
    pub payload_bucket: PayloadBucket,
    /// 동시성 구간
    pub concurrency_bucket: ConcurrencyBucket,
    /// 리전 태그
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// 콜드 스타트 구간 샘플 여부
    pub cold_start: bool,
    /// 캐시 적중 여부 (알 수 있는 경우만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
}

/// 지연 샘플
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    /// 상관 키
    pub correlation_key: String,
    /// 센서 식별자
    pub sensor_id: String,
    /// 생성 시각
    pub generated_at: DateTime<Utc>,
    /// 도착 시각
    pub received_at: DateTime<Utc>,
    /// 보고용 지연 (밀리초, 0 이상으로 보정됨)
    pub latency_ms: u64,
    /// 보정 전 원시 지연 (음수면 시계 차이)
    pub raw_latency_ms: i64,
    /// 원시 지연이 음수였는지 (시계 차이 의심)
    pub clock_skew: bool,
    /// 하위 구간
    #[serde(default)]
    pub spans: Spans,
    /// 차원 태그
    #[serde(default)]
    pub dimensions: Dimensions,
}

impl LatencySample {
    /// 생성/도착 시각으로 샘플 생성.
    ///
    /// 음수 지연은 0으로 보정하고 `clock_skew`를 표시한다.
    pub fn new(
        correlation_key: &str,
        sensor_id: &str,
        generated_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let raw_latency_ms = (received_at - generated_at).num_milliseconds();
        let clock_skew = raw_latency_ms < 0;
        Self {
            correlation_key: correlation_key.to_string(),
            sensor_id: sensor_id.to_string(),
            generated_at,
            received_at,
            latency_ms: raw_latency_ms.max(0) as u64,
            raw_latency_ms,
            clock_skew,
            spans: Spans::default(),
            dimensions: Dimensions::default(),
        }
    }
}
