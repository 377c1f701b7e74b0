//! 애플리케이션 설정 구조체.
//!
//! 서버 연결(REST/SSE/GraphQL 경로), 벤치마크 실행 파라미터, SLO 목표를 정의한다.
//! `config` crate를 통해 파일/환경변수에서 로드 (`config_manager` 참조).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 벤치마크 실행 설정
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

// ============================================================
// 서버 연결 설정
// ============================================================

/// 도착 알림 수신 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Server-Sent Events 스트림
    #[default]
    Sse,
    /// 주기적 REST 조회
    Poll,
    /// GraphQL 구독 (graphql-transport-ws)
    Graphql,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sse => f.write_str("sse"),
            Self::Poll => f.write_str("poll"),
            Self::Graphql => f.write_str("graphql"),
        }
    }
}

impl FromStr for Transport {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "poll" | "polling" => Ok(Self::Poll),
            "graphql" | "gql" => Ok(Self::Graphql),
            other => Err(CoreError::Validation {
                field: "transport".to_string(),
                message: format!("알 수 없는 전송 방식: {other}"),
            }),
        }
    }
}

/// 서버 연결 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Kvasir 기본 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer 토큰 (선택)
    #[serde(default)]
    pub token: Option<String>,
    /// 알림 수신 방식
    #[serde(default)]
    pub transport: Transport,
    /// 측정값 제출 경로 (POST)
    #[serde(default = "default_submit_path")]
    pub submit_path: String,
    /// SSE 변경 스트림 경로
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// 폴링 조회 경로
    #[serde(default = "default_poll_path")]
    pub poll_path: String,
    /// GraphQL 엔드포인트 경로
    #[serde(default = "default_graphql_path")]
    pub graphql_path: String,
    /// GraphQL 구독 쿼리
    #[serde(default = "default_graphql_query")]
    pub graphql_query: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 제출 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// SSE 재연결 최대 대기 (초)
    #[serde(default = "default_sse_max_retry_secs")]
    pub sse_max_retry_secs: u64,
    /// 폴링 주기 (밀리초)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            transport: Transport::default(),
            submit_path: default_submit_path(),
            stream_path: default_stream_path(),
            poll_path: default_poll_path(),
            graphql_path: default_graphql_path(),
            graphql_query: default_graphql_query(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            sse_max_retry_secs: default_sse_max_retry_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ServerConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 폴링 주기를 Duration으로 반환
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================
// 벤치마크 설정
// ============================================================

/// 합성 센서 프로필
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    /// 센서 식별자
    pub id: String,
    /// 기준값
    #[serde(default = "default_base_value")]
    pub base_value: f64,
    /// 진폭
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    /// 단위
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl SensorProfile {
    /// 기본 파형으로 센서 생성
    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            base_value: default_base_value(),
            amplitude: default_amplitude(),
            unit: default_unit(),
        }
    }

    /// 순번에 대한 결정적 합성값
    pub fn value_at(&self, sequence: u64) -> f64 {
        self.base_value + self.amplitude * (sequence as f64 / 10.0).sin()
    }
}

/// SLO 목표
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloConfig {
    /// p95 목표 (밀리초)
    pub p95_target_ms: f64,
    /// p99 목표 (밀리초)
    pub p99_target_ms: f64,
    /// 소진율 경보 임계값 (관측/목표 배수)
    #[serde(default = "default_burn_rate_threshold")]
    pub burn_rate_threshold: f64,
    /// 롤링 윈도우 (초)
    #[serde(default = "default_rolling_window_secs")]
    pub rolling_window_secs: u64,
}

impl SloConfig {
    /// 목표 지연만 지정하고 나머지는 기본값
    pub fn with_targets(p95_target_ms: f64, p99_target_ms: f64) -> Self {
        Self {
            p95_target_ms,
            p99_target_ms,
            burn_rate_threshold: default_burn_rate_threshold(),
            rolling_window_secs: default_rolling_window_secs(),
        }
    }
}

/// 벤치마크 실행 설정 (실행마다 불변 스냅샷)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// 센서 목록
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorProfile>,
    /// 측정 시간 (초)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// 이벤트 생성 주기 (밀리초)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 최대 샘플 수 (도달 시 조기 종료)
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// 드레인 최대 대기 (초)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// 드레인 중 대기 테이블 확인 주기 (밀리초)
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,
    /// 백분위 계산 최소 샘플 수 (미만이면 0)
    #[serde(default = "default_min_samples_for_percentiles")]
    pub min_samples_for_percentiles: usize,
    /// 중간 통계 로그 주기 (초, 0이면 비활성)
    #[serde(default)]
    pub report_interval_secs: u64,
    /// 콜드 스타트로 태깅할 초기 샘플 수
    #[serde(default = "default_cold_start_samples")]
    pub cold_start_samples: usize,
    /// 리전 태그
    #[serde(default)]
    pub region: Option<String>,
    /// SLO 목표 (선택)
    #[serde(default)]
    pub slo: Option<SloConfig>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            sensors: default_sensors(),
            duration_secs: default_duration_secs(),
            interval_ms: default_interval_ms(),
            max_samples: default_max_samples(),
            drain_timeout_secs: default_drain_timeout_secs(),
            drain_poll_ms: default_drain_poll_ms(),
            min_samples_for_percentiles: default_min_samples_for_percentiles(),
            report_interval_secs: 0,
            cold_start_samples: default_cold_start_samples(),
            region: None,
            slo: None,
        }
    }
}

impl BenchmarkConfig {
    /// 측정 시간을 Duration으로 반환
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// 생성 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// 드레인 타임아웃을 Duration으로 반환
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// 드레인 확인 주기를 Duration으로 반환
    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms.max(1))
    }

    /// 실행 전 설정 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sensors.is_empty() {
            return Err(invalid("sensors", "센서가 하나 이상 필요합니다"));
        }
        if let Some(sensor) = self.sensors.iter().find(|s| s.id.trim().is_empty()) {
            return Err(invalid(
                "sensors",
                &format!("빈 센서 ID (unit={})", sensor.unit),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(sensor) = self.sensors.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(invalid("sensors", &format!("중복 센서 ID: {}", sensor.id)));
        }
        if self.interval_ms == 0 {
            return Err(invalid("interval_ms", "0보다 커야 합니다"));
        }
        if self.max_samples == 0 {
            return Err(invalid("max_samples", "0보다 커야 합니다"));
        }
        if let Some(slo) = &self.slo {
            if slo.p95_target_ms <= 0.0 || slo.p99_target_ms <= 0.0 {
                return Err(invalid("slo", "목표 지연은 0보다 커야 합니다"));
            }
            if slo.burn_rate_threshold <= 0.0 {
                return Err(invalid("slo.burn_rate_threshold", "0보다 커야 합니다"));
            }
            if slo.rolling_window_secs == 0 {
                return Err(invalid("slo.rolling_window_secs", "0보다 커야 합니다"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self::default()
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_submit_path() -> String {
    "/alice/changes".to_string()
}
fn default_stream_path() -> String {
    "/alice/changes/stream".to_string()
}
fn default_poll_path() -> String {
    "/alice/changes".to_string()
}
fn default_graphql_path() -> String {
    "/alice/query".to_string()
}
fn default_graphql_query() -> String {
    "subscription { observations { id sensorId timestamp value } }".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    0
}
fn default_sse_max_retry_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_base_value() -> f64 {
    20.0
}
fn default_amplitude() -> f64 {
    5.0
}
fn default_unit() -> String {
    "Cel".to_string()
}
fn default_burn_rate_threshold() -> f64 {
    2.0
}
fn default_rolling_window_secs() -> u64 {
    60
}
fn default_sensors() -> Vec<SensorProfile> {
    vec![SensorProfile::named("sensor-1")]
}
fn default_duration_secs() -> u64 {
    60
}
fn default_interval_ms() -> u64 {
    1_000
}
fn default_max_samples() -> usize {
    10_000
}
fn default_drain_timeout_secs() -> u64 {
    15
}
fn default_drain_poll_ms() -> u64 {
    100
}
fn default_min_samples_for_percentiles() -> usize {
    10
}
fn default_cold_start_samples() -> usize {
    10
}
