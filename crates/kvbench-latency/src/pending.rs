//! 대기 이벤트 테이블 (상관 원장).
//!
//! 상관 키 → 대기 이벤트. 명시적 키와 (센서, 생성 시각) 파생 키 양쪽으로 조회할 수 있다.
//! 등록/회수는 하나의 `parking_lot::Mutex` 아래에서 원자적으로 수행되므로
//! 같은 키에 대한 `register`와 `take`가 뒤섞이지 않는다.

use kvbench_core::models::event::PendingEvent;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Default)]
struct Inner {
    /// 명시적 키 → 이벤트
    entries: HashMap<String, PendingEvent>,
    /// 파생 키 → 명시적 키
    aliases: HashMap<String, String>,
    /// 회수(매칭/만료)된 명시적 키
    retired: HashSet<String>,
    closed: bool,
}

/// 대기 이벤트 테이블
#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트 등록.
    ///
    /// 이미 대기 중이거나 회수된 키, 또는 닫힌 테이블이면 `false`.
    pub fn register(&self, event: PendingEvent) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!("닫힌 테이블에 등록 거부: {}", event.correlation_key);
            return false;
        }
        let key = event.correlation_key.clone();
        if inner.entries.contains_key(&key) || inner.retired.contains(&key) {
            debug!("중복 상관 키 등록 거부: {key}");
            return false;
        }

        // 파생 키가 다른 대기 이벤트와 겹치면 먼저 등록된 쪽을 유지
        let alias = event.derived_key();
        inner.aliases.entry(alias).or_insert_with(|| key.clone());
        inner.entries.insert(key, event);
        true
    }

    /// 키로 조회하고 즉시 제거 (원자적).
    ///
    /// 명시적 키를 먼저 보고, 없으면 파생 키로 찾는다. 모르는 키는 `None`.
    pub fn take(&self, key: &str) -> Option<PendingEvent> {
        let mut inner = self.inner.lock();
        let primary = if inner.entries.contains_key(key) {
            key.to_string()
        } else {
            inner.aliases.get(key)?.clone()
        };

        let event = inner.entries.remove(&primary)?;
        let alias = event.derived_key();
        if inner.aliases.get(&alias) == Some(&primary) {
            inner.aliases.remove(&alias);
        }
        inner.retired.insert(primary);
        Some(event)
    }

    /// 대기 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// 이후 모든 등록을 거부
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// 남은 대기 항목을 모두 폐기하고 키를 회수 (드레인 정리). 폐기 수 반환.
    pub fn expire_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner.entries.drain().map(|(key, _)| key).collect();
        inner.aliases.clear();
        let expired = keys.len();
        inner.retired.extend(keys);
        if expired > 0 {
            debug!("미매칭 대기 항목 {expired}개 폐기");
        }
        expired
    }

    /// 회수된 키 수
    pub fn retired_count(&self) -> usize {
        self.inner.lock().retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn event(key: &str, sensor: &str, ms: i64) -> PendingEvent {
        PendingEvent::new(key, sensor, Utc.timestamp_millis_opt(ms).unwrap())
    }

    #[test]
    fn take_is_at_most_once() {
        let table = PendingTable::new();
        assert!(table.register(event("k1", "S1", 0)));
        assert_eq!(table.len(), 1);

        let taken = table.take("k1").unwrap();
        assert_eq!(taken.sensor_id, "S1");
        assert!(table.take("k1").is_none());
        assert!(table.is_empty());
        assert_eq!(table.retired_count(), 1);
    }

    #[test]
    fn unknown_key_is_none() {
        let table = PendingTable::new();
        assert!(table.take("nope").is_none());
    }

    #[test]
    fn take_by_derived_key_retires_both() {
        let table = PendingTable::new();
        table.register(event("k1", "S1", 1_700));

        let taken = table.take("S1@1700").unwrap();
        assert_eq!(taken.correlation_key, "k1");
        assert!(table.take("k1").is_none());
        assert!(table.take("S1@1700").is_none());
    }

    #[test]
    fn take_by_explicit_key_removes_alias() {
        let table = PendingTable::new();
        table.register(event("k1", "S1", 5));
        assert!(table.take("k1").is_some());
        assert!(table.take("S1@5").is_none());
    }

    #[test]
    fn retired_and_duplicate_keys_refused() {
        let table = PendingTable::new();
        assert!(table.register(event("k1", "S1", 0)));
        assert!(!table.register(event("k1", "S1", 10)));
        table.take("k1");
        assert!(!table.register(event("k1", "S1", 20)));
    }

    #[test]
    fn closed_table_refuses_registration() {
        let table = PendingTable::new();
        table.close();
        assert!(table.is_closed());
        assert!(!table.register(event("k1", "S1", 0)));
        assert!(table.is_empty());
    }

    #[test]
    fn expire_all_discards_and_retires() {
        let table = PendingTable::new();
        table.register(event("a", "S1", 0));
        table.register(event("b", "S2", 0));
        assert_eq!(table.expire_all(), 2);
        assert!(table.is_empty());
        assert!(table.take("a").is_none());
        assert!(table.take("S2@0").is_none());
        assert!(!table.register(event("b", "S2", 0)));
    }

    #[test]
    fn concurrent_take_yields_single_winner() {
        let table = Arc::new(PendingTable::new());
        table.register(event("k", "S1", 0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || table.take("k").is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
