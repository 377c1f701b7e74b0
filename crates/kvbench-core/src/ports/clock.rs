//! 시각 공급 포트.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// 현재 시각 공급자
pub trait Clock: Send + Sync {
    /// 현재 시각
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 벽시계
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 수동으로 진행시키는 시계 (테스트/재생용)
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 지정 시각에서 시작
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 밀리초 단위로 진행
    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock();
        *now += Duration::milliseconds(ms);
    }

    /// 시각 지정
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.timestamp_millis_opt(0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance_ms(150);
        assert_eq!(clock.now().timestamp_millis(), 150);
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
