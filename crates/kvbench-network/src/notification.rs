//! 도착 알림 페이로드 파서.
//!
//! 다음 형태를 모두 `Notification` 목록으로 변환한다:
//! - 평면 JSON: `{"id"|"eventId", "sensorId", "timestamp", "value"}`
//! - JSON-LD 관측: `{"@id", "sosa:madeBySensor", "sosa:resultTime", "sosa:hasSimpleResult"}`
//!   (접두사 또는 전체 IRI 키)
//! - 변경 봉투: `{"insert": [...]}`, `{"changes": [...]}`, `{"@graph": [...]}`, 최상위 배열
//! - GraphQL 응답: `{"data": {...}}`

use chrono::{DateTime, TimeZone, Utc};
use kvbench_core::error::CoreError;
use kvbench_core::models::notification::Notification;
use serde_json::{Map, Value};

/// 전송 계층에서 받은 텍스트 파싱. 빈 본문은 빈 목록.
pub fn parse_text(data: &str) -> Result<Vec<Notification>, CoreError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed)?;
    Ok(parse_value(&value))
}

/// JSON 값에서 알림 추출
pub fn parse_value(value: &Value) -> Vec<Notification> {
    let mut out = Vec::new();
    collect(value, &mut out);
    out
}

/// 봉투 키 (값이 관측 목록을 감싸는 키)
const ENVELOPE_KEYS: [&str; 6] = ["insert", "inserts", "changes", "@graph", "data", "observations"];

fn collect(value: &Value, out: &mut Vec<Notification>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        Value::Object(map) => {
            if let Some(notification) = parse_object(map) {
                out.push(notification);
                return;
            }
            let mut enveloped = false;
            for key in ENVELOPE_KEYS {
                if let Some(inner) = map.get(key) {
                    enveloped = true;
                    collect(inner, out);
                }
            }
            // GraphQL: {"data": {"<필드명>": {...}}}
            if !enveloped && map.len() == 1 {
                if let Some(inner) = map.values().next().filter(|v| v.is_object() || v.is_array()) {
                    collect(inner, out);
                }
            }
        }
        _ => {}
    }
}

/// 관측 객체 하나 파싱. 식별 필드가 하나도 없으면 `None` (봉투로 간주).
fn parse_object(map: &Map<String, Value>) -> Option<Notification> {
    let id = find(map, &["id", "eventId", "event_id", "@id"]).and_then(as_identifier);
    let sensor_id = find(map, &["sensorId", "sensor_id", "sensor", "madeBySensor"]).and_then(as_identifier);
    let timestamp = find(map, &["timestamp", "time", "resultTime", "observedAt", "phenomenonTime"])
        .and_then(as_timestamp);
    let value = find(map, &["value", "hasSimpleResult", "hasResult", "numericValue"]).and_then(as_number);

    if id.is_none() && sensor_id.is_none() && timestamp.is_none() {
        return None;
    }
    Some(Notification {
        id,
        sensor_id,
        timestamp,
        value,
    })
}

/// 키 조회. 정확히 일치하는 키 → `prefix:name` / IRI `.../name`, `...#name` 순.
fn find<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    for name in names {
        if let Some(v) = map.get(*name) {
            return Some(v);
        }
    }
    map.iter()
        .find(|(key, _)| {
            let local = local_name(key);
            local != key.as_str() && names.contains(&local)
        })
        .map(|(_, v)| v)
}

/// `sosa:resultTime`, `http://www.w3.org/ns/sosa/resultTime` → `resultTime`
fn local_name(key: &str) -> &str {
    key.rsplit(['/', '#', ':']).next().unwrap_or(key)
}

/// 문자열, 숫자, `{"@id": ...}`, `{"@value": ...}`에서 식별자 추출.
/// IRI 형태면 마지막 세그먼트만 쓴다 (`urn:uuid:abc` → `abc`).
fn as_identifier(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => return map.get("@id").or_else(|| map.get("@value")).and_then(as_identifier),
        _ => return None,
    };
    let id = if raw.contains(':') || raw.starts_with('/') {
        local_name(&raw).to_string()
    } else {
        raw
    };
    (!id.is_empty()).then_some(id)
}

/// RFC 3339 문자열, epoch 밀리초 숫자, `{"@value": ...}`
fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => map.get("@value").and_then(as_timestamp),
        _ => None,
    }
}

/// 숫자, 숫자로 시작하는 문자열("21.5 Cel"), `{"@value": ...}`, `{"numericValue": ...}`
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.split_whitespace().next()?.parse().ok(),
        Value::Object(map) => find(map, &["@value", "numericValue", "value"]).and_then(as_number),
        _ => None,
    }
}
