//! 측정값 모델.
//!
//! 생성기가 합성하여 외부 저장소로 제출하는 센서 측정값.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 센서 측정값. Submit 포트에 전달되는 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// 이벤트 식별자 (상관 키로 사용)
    pub id: String,
    /// 센서 식별자
    pub sensor_id: String,
    /// 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 측정값
    pub value: f64,
    /// 단위 (예: "Cel", "%")
    pub unit: String,
}

impl Measurement {
    /// 새 UUID 식별자로 측정값 생성
    pub fn new(sensor_id: &str, timestamp: DateTime<Utc>, value: f64, unit: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sensor_id: sensor_id.to_string(),
            timestamp,
            value,
            unit: unit.to_string(),
        }
    }
}

/// 제출 성공 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// 상관에 사용할 불투명 식별자
    pub identifier: String,
}
