//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `kvbench-network`가 Submit/Subscribe 포트를 구현하며,
//! `kvbench-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! async trait은 `async_trait` 매크로를 사용하여 object safety를 보장한다.

pub mod clock;
pub mod enricher;
pub mod submitter;
pub mod subscriber;
