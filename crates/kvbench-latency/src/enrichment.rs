//! 샘플 차원/스팬 보강기.
//!
//! 생성 컨텍스트(페이로드 크기, 동시성, Submit 소요 시간)와 실행 설정(엔드포인트, 리전,
//! 콜드 스타트 구간)으로 샘플을 태깅한다. 실제로 측정되지 않은 구간은 채우지 않는다.

use kvbench_core::models::event::PendingEvent;
use kvbench_core::models::notification::Notification;
use kvbench_core::models::sample::{ConcurrencyBucket, LatencySample, PayloadBucket};
use kvbench_core::ports::enricher::SampleEnricher;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 사용자 계측 훅. (구간 이름, 밀리초)를 돌려주면 `spans.custom`에 기록된다
pub type SpanHook = Box<dyn Fn(&PendingEvent, &Notification) -> Option<(String, u64)> + Send + Sync>;

/// 차원 보강기
pub struct DimensionEnricher {
    endpoint: String,
    region: Option<String>,
    cold_start_samples: usize,
    enriched: AtomicUsize,
    hooks: Vec<SpanHook>,
}

impl DimensionEnricher {
    /// 엔드포인트 이름으로 생성
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            region: None,
            cold_start_samples: 0,
            enriched: AtomicUsize::new(0),
            hooks: Vec::new(),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// 처음 `n`개 샘플을 콜드 스타트로 태깅
    pub fn with_cold_start_samples(mut self, n: usize) -> Self {
        self.cold_start_samples = n;
        self
    }

    /// 계측 훅 추가
    pub fn with_hook(mut self, hook: SpanHook) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl SampleEnricher for DimensionEnricher {
    fn enrich(&self, pending: &PendingEvent, notification: &Notification, sample: &mut LatencySample) {
        let ordinal = self.enriched.fetch_add(1, Ordering::Relaxed);
        let context = &pending.context;

        let dims = &mut sample.dimensions;
        dims.endpoint = self.endpoint.clone();
        dims.payload_bucket = PayloadBucket::classify(context.payload_bytes);
        dims.concurrency_bucket = ConcurrencyBucket::classify(context.in_flight);
        dims.region = self.region.clone();
        dims.cold_start = ordinal < self.cold_start_samples;

        let spans = &mut sample.spans;
        spans.submit_ms = context.submit_ms;
        // 시계 차이가 있는 샘플은 전달 구간을 신뢰할 수 없음
        if let (Some(submit_ms), false) = (context.submit_ms, sample.clock_skew) {
            spans.delivery_ms = Some(sample.latency_ms.saturating_sub(submit_ms));
        }
        for hook in &self.hooks {
            if let Some((name, ms)) = hook(pending, notification) {
                spans.custom.insert(name, ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kvbench_core::models::event::GenerationContext;

    fn pair(latency: i64, context: GenerationContext) -> (PendingEvent, LatencySample) {
        let g = Utc.timestamp_millis_opt(1_000).unwrap();
        let r = Utc.timestamp_millis_opt(1_000 + latency).unwrap();
        let pending = PendingEvent::new("k", "S1", g).with_context(context);
        let sample = LatencySample::new("k", "S1", g, r);
        (pending, sample)
    }

    #[test]
    fn tags_dimensions_and_measured_spans() {
        let enricher = DimensionEnricher::new("sse")
            .with_region(Some("eu-west".to_string()))
            .with_cold_start_samples(1);
        let (pending, mut sample) = pair(
            120,
            GenerationContext {
                sequence: 0,
                submit_ms: Some(30),
                payload_bytes: 2048,
                in_flight: 12,
            },
        );
        enricher.enrich(&pending, &Notification::default(), &mut sample);

        assert_eq!(sample.dimensions.endpoint, "sse");
        assert_eq!(sample.dimensions.payload_bucket, PayloadBucket::Medium);
        assert_eq!(sample.dimensions.concurrency_bucket, ConcurrencyBucket::Medium);
        assert_eq!(sample.dimensions.region.as_deref(), Some("eu-west"));
        assert!(sample.dimensions.cold_start);
        assert_eq!(sample.dimensions.cache_hit, None);
        assert_eq!(sample.spans.submit_ms, Some(30));
        assert_eq!(sample.spans.delivery_ms, Some(90));

        let (pending, mut second) = pair(50, GenerationContext::default());
        enricher.enrich(&pending, &Notification::default(), &mut second);
        assert!(!second.dimensions.cold_start);
    }

    #[test]
    fn unmeasured_spans_stay_empty() {
        let enricher = DimensionEnricher::new("poll");
        let (pending, mut sample) = pair(80, GenerationContext::default());
        enricher.enrich(&pending, &Notification::default(), &mut sample);
        assert_eq!(sample.spans.submit_ms, None);
        assert_eq!(sample.spans.delivery_ms, None);
        assert!(sample.spans.custom.is_empty());
    }

    #[test]
    fn custom_hooks_record_spans() {
        let enricher = DimensionEnricher::new("sse").with_hook(Box::new(|_, n| {
            n.value.map(|v| ("server_ms".to_string(), v as u64))
        }));
        let (pending, mut sample) = pair(80, GenerationContext::default());
        let notification = Notification {
            value: Some(7.0),
            ..Default::default()
        };
        enricher.enrich(&pending, &notification, &mut sample);
        assert_eq!(sample.spans.custom.get("server_ms"), Some(&7));
    }
}
