//! 샘플 보강(스팬/차원) 확장 지점.

use crate::models::event::PendingEvent;
use crate::models::notification::Notification;
use crate::models::sample::LatencySample;

/// 상관 완료 시점에 샘플의 스팬과 차원 태그를 채우는 훅.
///
/// 실제 측정값이 있을 때만 채우고, 없으면 필드를 비워 둔다.
pub trait SampleEnricher: Send + Sync {
    /// 샘플 보강
    fn enrich(&self, pending: &PendingEvent, notification: &Notification, sample: &mut LatencySample);
}

/// 아무것도 하지 않는 보강기
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEnricher;

impl SampleEnricher for NoOpEnricher {
    fn enrich(&self, _: &PendingEvent, _: &Notification, _: &mut LatencySample) {}
}
