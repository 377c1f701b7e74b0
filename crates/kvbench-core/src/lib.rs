//! # kvbench-core
//!
//! Kvasir 지연 벤치마크의 도메인 모델, 포트(trait) 정의, 에러 타입, 설정.
//! 모든 크레이트가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 측정값, 대기 이벤트, 알림, 샘플, 보고서 (serde)
//! - [`ports`]: Submit/Subscribe 협력자, 샘플 보강 훅, 시계 (async_trait)
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 서버/벤치마크/SLO 설정 구조체
//! - [`config_manager`]: 설정 파일 + 환경변수 로드/저장

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;

#[cfg(test)]
mod tests {
    use crate::models::measurement::Measurement;
    use crate::models::notification::Notification;

    #[test]
    fn measurement_serde_roundtrip() {
        let m = Measurement::new("S1", chrono::Utc::now(), 21.5, "Cel");
        let json = serde_json::to_string(&m).unwrap();
        let back: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.id.len(), 36);
    }

    #[test]
    fn notification_missing_fields_deserialize() {
        let n: Notification = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(n.id.as_deref(), Some("abc"));
        assert!(n.timestamp.is_none());
    }
}
