//! Kvasir REST 클라이언트.
//!
//! `Submitter` 포트 구현. 측정값을 JSON-LD 삽입 본문으로 POST하고,
//! 재시도 가능한 에러(네트워크, 429, 503)는 exponential backoff로 재시도한다.

use async_trait::async_trait;
use kvbench_core::config::ServerConfig;
use kvbench_core::error::CoreError;
use kvbench_core::models::measurement::{Measurement, SubmitReceipt};
use kvbench_core::ports::submitter::Submitter;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry-After 헤더가 없을 때 기본 대기 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 최대 backoff 간격
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 재시도 가능한 에러인지 판별
pub(crate) fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// 응답 상태 코드 확인 및 에러 매핑
///
/// 401 → Auth, 404 → NotFound, 429 → RateLimit, 503 → ServiceUnavailable
pub(crate) async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let url = resp.url().path().to_string();
    let text = resp.text().await.unwrap_or_else(|e| {
        warn!("응답 본문 읽기 실패: {e}");
        String::new()
    });

    match status.as_u16() {
        401 => Err(CoreError::Auth(format!("인증 실패: {text}"))),
        404 => Err(CoreError::NotFound {
            resource_type: "API".to_string(),
            id: url,
        }),
        429 => Err(CoreError::RateLimit {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        }),
        503 => Err(CoreError::ServiceUnavailable(text)),
        _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
    }
}

/// 공통 HTTP 클라이언트 빌드
pub(crate) fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, CoreError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))
}

/// 측정값 → JSON-LD 삽입 본문
pub fn measurement_body(m: &Measurement) -> Value {
    json!({
        "@context": {
            "sosa": "http://www.w3.org/ns/sosa/",
            "xsd": "http://www.w3.org/2001/XMLSchema#",
            "kvb": "urn:kvbench:"
        },
        "insert": [{
            "@id": format!("urn:uuid:{}", m.id),
            "@type": "sosa:Observation",
            "sosa:madeBySensor": {"@id": format!("urn:kvbench:sensor:{}", m.sensor_id)},
            "sosa:resultTime": {
                "@value": m.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "@type": "xsd:dateTime"
            },
            "sosa:hasSimpleResult": m.value,
            "kvb:unit": m.unit
        }]
    })
}

/// Kvasir REST 클라이언트 (`Submitter` 포트 구현)
pub struct KvasirRestClient {
    client: reqwest::Client,
    base_url: String,
    submit_path: String,
    token: Option<String>,
    max_retries: u32,
}

impl KvasirRestClient {
    /// 서버 설정으로 생성
    pub fn new(config: &ServerConfig) -> Result<Self, CoreError> {
        Ok(Self {
            client: build_client(Some(config.request_timeout()))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            submit_path: config.submit_path.clone(),
            token: config.token.clone(),
            max_retries: config.max_retries,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.client.request(method, &url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s (최대 30s)
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;

                    // RateLimit의 경우 서버 지정 대기 시간 사용
                    let wait = match &e {
                        CoreError::RateLimit { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs).min(MAX_BACKOFF)
                        }
                        _ => delay,
                    };
                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {wait:?} 후 재시도",
                        attempt,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(wait).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

#[async_trait]
impl Submitter for KvasirRestClient {
    async fn submit(&self, measurement: &Measurement) -> Result<SubmitReceipt, CoreError> {
        let body = measurement_body(measurement);

        self.execute_with_retry(|| async {
            let resp = self
                .request(reqwest::Method::POST, &self.submit_path)
                .header(reqwest::header::CONTENT_TYPE, "application/ld+json")
                .body(body.to_string())
                .send()
                .await
                .map_err(|e| CoreError::Network(format!("측정값 제출 실패: {e}")))?;

            let resp = check_response(resp).await?;
            let text = resp.text().await.unwrap_or_default();

            // 서버가 식별자를 돌려주면 그것을, 아니면 측정값 ID를 상관 키로 사용
            let identifier = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| measurement.id.clone());

            debug!("측정값 제출: {} → {identifier}", measurement.sensor_id);
            Ok(SubmitReceipt { identifier })
        })
        .await
    }

    fn payload_size(&self, measurement: &Measurement) -> usize {
        measurement_body(measurement).to_string().len()
    }
}
