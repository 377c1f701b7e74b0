//! 벤치마크 도메인 모델.
//!
//! 생성 → 제출 → 도착 → 샘플 → 보고서로 이어지는 데이터 구조체를 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현한다 (`StreamEvent` 제외).

pub mod event;
pub mod measurement;
pub mod notification;
pub mod report;
pub mod sample;
