//! # kvbench-network
//!
//! Kvasir 전송 어댑터.
//! 측정값 제출(REST)과 도착 알림 구독(SSE, 폴링, GraphQL)을 담당하며
//! `kvbench-core`의 `Submitter`/`Subscriber` 포트를 구현한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use kvbench_network::http_client::KvasirRestClient;
//! use kvbench_network::build_subscriber;
//!
//! let submitter = KvasirRestClient::new(&config.server)?;
//! let subscriber = build_subscriber(&config.server)?;
//! ```

pub mod graphql_client;
pub mod http_client;
pub mod notification;
pub mod polling_client;
pub mod sse_client;

use kvbench_core::config::{ServerConfig, Transport};
use kvbench_core::error::CoreError;
use kvbench_core::ports::subscriber::Subscriber;
use std::sync::Arc;

/// 설정된 전송 방식에 맞는 구독자 생성
pub fn build_subscriber(config: &ServerConfig) -> Result<Arc<dyn Subscriber>, CoreError> {
    let subscriber: Arc<dyn Subscriber> = match config.transport {
        Transport::Sse => Arc::new(sse_client::SseSubscriber::new(config)?),
        Transport::Poll => Arc::new(polling_client::PollingSubscriber::new(config)?),
        Transport::Graphql => Arc::new(graphql_client::GraphQlSubscriber::new(config)?),
    };
    Ok(subscriber)
}
