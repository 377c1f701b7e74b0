//! 대기 이벤트 모델.
//!
//! 제출되었지만 아직 구독 스트림으로 돌아오지 않은 이벤트 (상관 원장 항목).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 센서 ID와 생성 시각에서 파생한 상관 키.
///
/// 알림에 명시적 식별자가 없을 때 사용한다. 밀리초 단위 epoch 기준.
pub fn derived_key(sensor_id: &str, generated_at: DateTime<Utc>) -> String {
    format!("{sensor_id}@{}", generated_at.timestamp_millis())
}

/// 생성 시점에 채워지는 부분 측정 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// 실행 내 발행 순번
    pub sequence: u64,
    /// Submit 호출 소요 시간 (밀리초, 측정된 경우만)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_ms: Option<u64>,
    /// 제출 페이로드 크기 (바이트)
    pub payload_bytes: usize,
    /// 등록 시점의 대기 테이블 크기 (동시성 스냅샷)
    pub in_flight: usize,
}

/// 대기 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    /// 명시적 상관 키 (Submit이 돌려준 식별자)
    pub correlation_key: String,
    /// 센서 식별자
    pub sensor_id: String,
    /// 생성 시각
    pub generated_at: DateTime<Utc>,
    /// 생성 시점 컨텍스트
    #[serde(default)]
    pub context: GenerationContext,
}

impl PendingEvent {
    /// 새 대기 이벤트 생성
    pub fn new(correlation_key: &str, sensor_id: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            correlation_key: correlation_key.to_string(),
            sensor_id: sensor_id.to_string(),
            generated_at,
            context: GenerationContext::default(),
        }
    }

    /// 생성 컨텍스트 설정
    pub fn with_context(mut self, context: GenerationContext) -> Self {
        self.context = context;
        self
    }

    /// (센서, 생성 시각) 파생 키
    pub fn derived_key(&self) -> String {
        derived_key(&self.sensor_id, self.generated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn derived_key_uses_epoch_millis() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(derived_key("S1", ts), "S1@1700000000123");
    }

    #[test]
    fn pending_event_derived_key_matches_free_function() {
        let ts = Utc.timestamp_millis_opt(42).unwrap();
        let event = PendingEvent::new("k1", "S2", ts);
        assert_eq!(event.derived_key(), derived_key("S2", ts));
        assert_eq!(event.context, GenerationContext::default());
    }
}
