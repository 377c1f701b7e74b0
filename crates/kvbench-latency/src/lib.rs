//! # kvbench-latency
//!
//! 지연 측정 파이프라인.
//! 자체 생성한 이벤트를 제출하고, 구독 스트림으로 돌아오는 알림과 상관시켜
//! 지연 샘플을 모으고, 백분위/꼬리 비율/그룹/SLO 통계를 계산한다.
//!
//! 데이터 흐름: 생성기 → Submit → 외부 저장소 → Subscribe → 상관기 → 샘플 저장소 → 통계

pub mod correlator;
pub mod enrichment;
pub mod generator;
pub mod orchestrator;
pub mod pending;
pub mod slo;
pub mod stats;
pub mod store;

pub use orchestrator::{Benchmark, BenchmarkControl, RunState};
