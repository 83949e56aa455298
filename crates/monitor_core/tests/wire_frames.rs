use std::sync::Once;

use monitor_core::{Event, FrameError, LogLevel, Phase};
use pretty_assertions::assert_eq;
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

#[test]
fn parses_log_frame_with_level() {
    init_logging();
    let event = Event::parse_frame(
        r#"{"type":"log","level":"warning","message":"slow page","timestamp":"2024-05-01T10:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(
        event,
        Event::Log {
            level: Some(LogLevel::Warning),
            message: Some("slow page".to_string()),
            timestamp: Some("2024-05-01T10:00:00Z".to_string()),
        }
    );
    assert_eq!(event.timestamp(), Some("2024-05-01T10:00:00Z"));
}

#[test]
fn legacy_frame_names_map_to_current_kinds() {
    init_logging();
    let cases = [
        (
            r#"{"type":"analysis_started","process_type":"scraping","message":"Starting scraping process..."}"#,
            "phase_change",
        ),
        (r#"{"type":"analysis_finished"}"#, "finished"),
        (r#"{"type":"progress_apps_total","value":12}"#, "progress_total"),
        (r#"{"type":"progress_apps_current","value":3}"#, "progress_current"),
        (r#"{"type":"progress_reviews_total","value":500}"#, "progress_total"),
    ];
    for (frame, kind) in cases {
        let event = Event::parse_frame(frame).unwrap();
        assert_eq!(event.kind(), kind, "{frame}");
    }
}

#[test]
fn unknown_types_keep_their_payload() {
    init_logging();
    let event = Event::parse_frame(
        r#"{"type":"missing_raw_reviews","message":"No raw reviews for App 42","timestamp":"2024-05-01T10:15:30Z","missing_apps":[1,2],"suggestion":"switch_to_scraping"}"#,
    )
    .unwrap();

    let mut fields = serde_json::Map::new();
    fields.insert("missing_apps".to_string(), json!([1, 2]));
    fields.insert("suggestion".to_string(), json!("switch_to_scraping"));
    assert_eq!(
        event,
        Event::Unknown {
            kind: "missing_raw_reviews".to_string(),
            message: Some("No raw reviews for App 42".to_string()),
            timestamp: Some("2024-05-01T10:15:30Z".to_string()),
            fields,
        }
    );
    assert_eq!(event.kind(), "missing_raw_reviews");
    assert_eq!(event.timestamp(), Some("2024-05-01T10:15:30Z"));
}

#[test]
fn unknown_frame_survives_save_and_reload() {
    init_logging();
    let frame = json!({
        "type": "scraping_progress",
        "message": "Scraped 120 reviews",
        "timestamp": "2024-05-01T10:15:30Z",
        "app_id": 42,
        "reviews_scraped": 120,
        "elapsed_time": 3.5,
        "phase": "scraping",
        "app": "Hades",
    });
    let event = Event::parse_frame(&frame.to_string()).unwrap();

    let saved = serde_json::to_string(&vec![event.clone()]).unwrap();
    let reloaded: Vec<Event> = serde_json::from_str(&saved).unwrap();
    assert_eq!(reloaded, vec![event]);

    let written: Vec<serde_json::Value> = serde_json::from_str(&saved).unwrap();
    assert_eq!(written, vec![frame]);
}

#[test]
fn status_update_carries_app_and_model() {
    init_logging();
    let event =
        Event::parse_frame(r#"{"type":"status_update","process_type":"analysis","app":"Hades","model":"gpt-4o"}"#)
            .unwrap();
    assert_eq!(
        event,
        Event::StatusUpdate {
            current_item: None,
            app: Some("Hades".to_string()),
            model: Some("gpt-4o".to_string()),
            timestamp: None,
        }
    );
}

#[test]
fn rejects_malformed_frames() {
    init_logging();
    assert!(matches!(
        Event::parse_frame("{not json"),
        Err(FrameError::Malformed(_))
    ));
    assert!(matches!(
        Event::parse_frame(r#"["log"]"#),
        Err(FrameError::Malformed(_))
    ));
    assert!(matches!(
        Event::parse_frame(r#"{"message":"no type"}"#),
        Err(FrameError::Malformed(_))
    ));
    assert_eq!(
        Event::parse_frame(r#"{"type":"progress_current"}"#),
        Err(FrameError::MissingField {
            kind: "progress_current".to_string(),
            field: "value",
        })
    );
    assert_eq!(
        Event::parse_frame(r#"{"type":"phase_change","phase":"compiling"}"#),
        Err(FrameError::UnknownPhase("compiling".to_string()))
    );
}

#[test]
fn phase_end_phase_is_optional() {
    init_logging();
    assert_eq!(
        Event::parse_frame(r#"{"type":"phase_end"}"#).unwrap(),
        Event::PhaseEnd {
            phase: None,
            message: None,
            timestamp: None,
        }
    );
    assert_eq!(
        Event::parse_frame(r#"{"type":"phase_end","phase":"batch_analysis"}"#).unwrap(),
        Event::PhaseEnd {
            phase: Some(Phase::BatchAnalysis),
            message: None,
            timestamp: None,
        }
    );
}

#[test]
fn persisted_shape_matches_wire_shape() {
    init_logging();
    let event = Event::PhaseChange {
        phase: Phase::BatchAnalysis,
        message: None,
        timestamp: Some("2024-05-01T10:00:00Z".to_string()),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "type": "phase_change",
            "phase": "batch_analysis",
            "timestamp": "2024-05-01T10:00:00Z",
        })
    );

    let history = vec![
        event,
        Event::unknown("missing_raw_reviews"),
        Event::Ping,
    ];
    let text = serde_json::to_string(&history).unwrap();
    let restored: Vec<Event> = serde_json::from_str(&text).unwrap();
    assert_eq!(restored, history);
}
