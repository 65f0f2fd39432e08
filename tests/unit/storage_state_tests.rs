//! Unit tests for storage-state snapshots: field-preserving round trips.

use browser_warden::models::storage::{Cookie, LocalStorageEntry, OriginState, StorageState};

fn sample_state() -> StorageState {
    StorageState {
        cookies: vec![
            Cookie {
                name: "sid".into(),
                value: "abc123".into(),
                domain: "example.com".into(),
                path: "/".into(),
                expires: 1_900_000_000.0,
                http_only: true,
                secure: true,
                same_site: Some("Lax".into()),
            },
            Cookie {
                name: "theme".into(),
                value: "dark".into(),
                domain: "example.com".into(),
                path: "/settings".into(),
                expires: -1.0,
                http_only: false,
                secure: false,
                same_site: None,
            },
        ],
        origins: vec![OriginState {
            origin: "https://example.com".into(),
            local_storage: vec![
                LocalStorageEntry {
                    name: "token".into(),
                    value: "t-1".into(),
                },
                LocalStorageEntry {
                    name: "flag".into(),
                    value: "on".into(),
                },
            ],
        }],
    }
}

#[test]
fn round_trip_preserves_cookie_fields() {
    let state = sample_state();
    let json = serde_json::to_string(&state).expect("serialize");
    let parsed: StorageState = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, state, "no loss or reordering of cookie fields");
}

#[test]
fn round_trip_preserves_origin_entry_order() {
    let state = sample_state();
    let json = serde_json::to_string(&state).expect("serialize");
    let parsed: StorageState = serde_json::from_str(&json).expect("deserialize");
    let entries = &parsed.origins[0].local_storage;
    assert_eq!(entries[0].name, "token");
    assert_eq!(entries[1].name, "flag");
}

#[test]
fn cookies_serialize_camel_case() {
    let state = sample_state();
    let value = serde_json::to_value(&state).expect("serialize");
    let cookie = &value["cookies"][0];
    assert!(cookie.get("httpOnly").is_some());
    assert!(cookie.get("sameSite").is_some());
    assert!(cookie.get("http_only").is_none());
}

#[test]
fn missing_optional_cookie_fields_get_defaults() {
    let raw = r#"{"cookies":[{"name":"a","value":"b","domain":"x.io","path":"/"}],"origins":[]}"#;
    let parsed: StorageState = serde_json::from_str(raw).expect("deserialize");
    let cookie = &parsed.cookies[0];
    assert!((cookie.expires - -1.0).abs() < f64::EPSILON);
    assert!(!cookie.http_only);
    assert!(!cookie.secure);
    assert!(cookie.same_site.is_none());
}

#[test]
fn empty_snapshot_reports_empty() {
    assert!(StorageState::default().is_empty());
    assert!(!sample_state().is_empty());
}

#[test]
fn empty_json_object_deserializes_to_empty_snapshot() {
    let parsed: StorageState = serde_json::from_str("{}").expect("deserialize");
    assert!(parsed.is_empty());
}
