//! 측정값 제출 포트.
//!
//! 구현: `kvbench-network` crate (reqwest REST 클라이언트)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::measurement::{Measurement, SubmitReceipt};

/// 외부 저장소에 측정값을 영속화하는 협력자
#[async_trait]
pub trait Submitter: Send + Sync {
    /// 측정값 제출.
    ///
    /// 성공하면 상관에 사용할 식별자를 돌려준다. 재시도는 구현체의 책임이다.
    async fn submit(&self, measurement: &Measurement) -> Result<SubmitReceipt, CoreError>;

    /// 제출 페이로드 크기 추정 (바이트). 차원 태깅에 사용.
    fn payload_size(&self, _measurement: &Measurement) -> usize {
        0
    }
}
