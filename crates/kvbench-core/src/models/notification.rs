//! 도착 알림 모델.
//!
//! 구독 스트림(SSE, 폴링, GraphQL)에서 비동기로 들어오는 이벤트 알림과
//! 구독 라이프사이클 이벤트.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::derived_key;

/// 단일 도착 알림
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 명시적 이벤트 식별자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 센서 식별자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    /// 알림에 포함된 생성 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// 측정값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Notification {
    /// 상관 키 계산.
    ///
    /// 명시적 식별자를 우선하고, 없으면 (센서, 시각)에서 파생한다.
    /// 둘 다 없으면 `None` (상관 불가).
    pub fn correlation_key(&self) -> Option<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        match (&self.sensor_id, self.timestamp) {
            (Some(sensor), Some(ts)) if !sensor.is_empty() => Some(derived_key(sensor, ts)),
            _ => None,
        }
    }
}

/// 구독 스트림 이벤트 (알림 + 라이프사이클 지점)
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 연결 수립
    Connected,
    /// 이벤트 알림 수신
    Notification(Notification),
    /// 재연결 대기 중
    Reconnecting {
        /// 재시도 횟수 (1부터)
        attempt: u32,
        /// 대기 시간 (밀리초)
        delay_ms: u64,
    },
    /// 연결 끊김
    Disconnected,
    /// 스트림 에러 (치명적이지 않음)
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_id_wins() {
        let n = Notification {
            id: Some("evt-1".to_string()),
            sensor_id: Some("S1".to_string()),
            timestamp: Some(Utc.timestamp_millis_opt(5).unwrap()),
            value: None,
        };
        assert_eq!(n.correlation_key().as_deref(), Some("evt-1"));
    }

    #[test]
    fn falls_back_to_derived_key() {
        let n = Notification {
            id: Some(String::new()),
            sensor_id: Some("S1".to_string()),
            timestamp: Some(Utc.timestamp_millis_opt(5).unwrap()),
            value: Some(1.0),
        };
        assert_eq!(n.correlation_key().as_deref(), Some("S1@5"));
    }

    #[test]
    fn no_key_without_id_or_sensor_timestamp() {
        let n = Notification {
            sensor_id: Some("S1".to_string()),
            ..Default::default()
        };
        assert!(n.correlation_key().is_none());
        assert!(Notification::default().correlation_key().is_none());
    }
}
