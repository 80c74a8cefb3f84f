use adrate_common::ads::AD_DETECTED_EVENT;
use adrate_common::protocol::parse_timestamp;
use adrate_common::{
    AdElement, AdKind, AdPosition, AdReport, BackendError, Event, EventKind, Rating, RatingError,
    Scalar,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

#[test]
fn test_event_serialization_shape() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut event = Event::scroll("down", 300);
    event.timestamp = ts;

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "scroll");
    assert_eq!(value["params"]["direction"], "down");
    assert_eq!(value["params"]["amount"], 300.0);
    assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
}

#[test]
fn test_event_accepts_naive_timestamps() {
    let raw = json!({
        "timestamp": "2024-05-01T12:00:03.250000",
        "type": "click",
        "params": {"x": 120, "y": 240}
    });

    let event: Event = serde_json::from_value(raw).unwrap();
    assert_eq!(event.kind, EventKind::Click);
    assert_eq!(event.number("x"), Some(120.0));
    assert_eq!(
        event.timestamp,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 3).unwrap() + chrono::Duration::milliseconds(250)
    );
}

#[test]
fn test_timestamp_with_offset_is_normalized() {
    let ts = parse_timestamp("2024-05-01T14:00:00+02:00").unwrap();
    assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    assert!(parse_timestamp("yesterday").is_err());
}

#[test]
fn test_event_without_params_defaults_empty() {
    let raw = json!({"timestamp": "2024-05-01T12:00:00Z", "type": "navigate"});
    let event: Event = serde_json::from_value(raw).unwrap();
    assert!(event.params.is_empty());
}

#[test]
fn test_unknown_event_kind_round_trips() {
    let raw = json!({"timestamp": "2024-05-01T12:00:00Z", "type": "hover", "params": {}});
    let event: Event = serde_json::from_value(raw).unwrap();
    assert_eq!(event.kind, EventKind::Other("hover".into()));

    let back = serde_json::to_value(&event).unwrap();
    assert_eq!(back["type"], "hover");
}

#[test]
fn test_scalar_numeric_views() {
    assert_eq!(Scalar::from(3.5).as_f64(), Some(3.5));
    assert_eq!(Scalar::from(true).as_f64(), Some(1.0));
    assert_eq!(Scalar::from(" 42 ").as_f64(), Some(42.0));
    assert_eq!(Scalar::from("down").as_f64(), None);
    assert_eq!(Scalar::from("down").as_str(), Some("down"));
}

#[test]
fn test_rating_bounds() {
    assert!(Rating::new(0.0).is_ok());
    assert!(Rating::new(1.0).is_ok());
    assert_eq!(Rating::new(0.8).unwrap().value(), 0.8);
    assert!(matches!(Rating::new(1.5), Err(RatingError::OutOfRange(v)) if v == 1.5));
    assert!(Rating::new(-0.1).is_err());
    assert!(Rating::new(f64::NAN).is_err());
}

#[test]
fn test_rating_deserialization_is_validated() {
    let ok: Rating = serde_json::from_value(json!(0.25)).unwrap();
    assert_eq!(ok.value(), 0.25);
    assert!(serde_json::from_value::<Rating>(json!(2.0)).is_err());
}

#[test]
fn test_ad_report_metadata() {
    let report = AdReport {
        ads: vec![
            AdElement {
                position: AdPosition { x: 10.0, y: 640.0 },
                kind: AdKind::Text,
                text_length: 30,
            },
            AdElement {
                position: AdPosition { x: 0.0, y: 1200.0 },
                kind: AdKind::Video,
                text_length: 12,
            },
        ],
    };

    let meta = report.metadata().expect("ads present");
    assert_eq!(meta.ad_position, 640.0);
    assert_eq!(meta.image_present, 0.0);
    assert_eq!(meta.video_present, 1.0);
    assert_eq!(meta.text_length, 42.0);

    let event = meta.to_event();
    assert_eq!(event.kind, EventKind::Other(AD_DETECTED_EVENT.into()));
    assert_eq!(event.number("video_present"), Some(1.0));
}

#[test]
fn test_empty_ad_report_has_no_metadata() {
    let report = AdReport::default();
    assert!(report.is_empty());
    assert!(report.metadata().is_none());
}

#[test]
fn test_backend_error_codes() {
    assert_eq!(BackendError::NotReady.code(), "NOT_READY");
    assert_eq!(
        BackendError::AdDetection("boom".into()).code(),
        "AD_DETECTION_FAILED"
    );
    assert!(BackendError::ConnectionLost.is_retryable());
    assert!(!BackendError::Script("x".into()).is_retryable());
}

proptest! {
    #[test]
    fn prop_rating_accepts_exactly_unit_interval(value in -2.0f64..2.0) {
        prop_assert_eq!(Rating::new(value).is_ok(), (0.0..=1.0).contains(&value));
    }
}
