use chrono::{DateTime, Utc};
use serde_json::json;
use vitals_core::{
    suggest_next_time, ClearAllRequest, Episode, FixedClock, SeriesStore, TimeParser, VitalField,
    VitalSignForm, VitalsError,
};

fn utc(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .expect("valid test instant")
        .with_timezone(&Utc)
}

#[test]
fn manual_entries_flow_through_validation_store_and_anchor() {
    let parser = TimeParser::with_clock(FixedClock(utc("2024-01-01T10:00:00Z")));
    let episode = Episode::from_json_str(
        r#"{ "declaredStart": "2024-01-01T08:00:00Z", "records": [] }"#,
    )
    .expect("episode");

    let anchor = episode.anchor(&parser);
    assert_eq!(anchor, utc("2024-01-01T08:00:00Z"));

    let store = SeriesStore::new(parser).with_reference(anchor);
    let mut state = store.load(episode.records.clone());

    for (time, heart_rate) in [("08:15", 80), ("08:05", 76), ("08:10", 78)] {
        let form = VitalSignForm::from_json(&json!({
            "timestamp": time,
            "ritmo": "Sinusal",
            "fc": heart_rate,
            "pasSistolica": "118",
            "pasDiastolica": 76,
            "spo2": 99
        }))
        .expect("form");
        let record = form.to_record().expect("valid entry");
        state = store.insert(&state, record);
    }

    let times: Vec<_> = state.iter().filter_map(|record| record.instant).collect();
    assert_eq!(
        times,
        vec![
            utc("2024-01-01T08:05:00Z"),
            utc("2024-01-01T08:10:00Z"),
            utc("2024-01-01T08:15:00Z"),
        ]
    );
    assert!(state
        .iter()
        .all(|record| record.vitals.mean_arterial_pressure == Some(90.0)));

    assert_eq!(
        suggest_next_time(anchor, state.records()),
        utc("2024-01-01T08:20:00Z")
    );

    let target = state.records()[1].id.clone();
    let patch = VitalSignForm::new()
        .blank(VitalField::Temperature)
        .with(VitalField::HeartRate, 95.0)
        .to_patch()
        .expect("patch");
    state = store.update(&state, &target, patch).expect("update");
    assert_eq!(state.get(&target).and_then(|r| r.vitals.heart_rate), Some(95.0));

    let episode = episode.with_state(state.clone());
    let document = serde_json::to_value(&episode).expect("serialize episode");
    assert_eq!(document["declaredStart"], "2024-01-01T08:00:00Z");
    assert_eq!(document["records"].as_array().map(Vec::len), Some(3));
    assert_eq!(document["records"][0]["pam"], 90.0);

    let cleared = store.clear_all(&state, ClearAllRequest::confirmed());
    assert!(cleared.is_empty());
}

#[test]
fn invalid_entries_never_reach_the_store() {
    let form = VitalSignForm::from_json(&json!({
        "fc": "",
        "pasSistolica": 120,
        "pasDiastolica": 150,
        "spo2": 98,
        "ritmo": "Sinusal"
    }))
    .expect("form");

    match form.to_record() {
        Err(VitalsError::Validation(report)) => {
            assert!(!report.valid);
            assert!(report.errors.contains_key(&VitalField::HeartRate));
            assert!(report.errors.contains_key(&VitalField::Systolic));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn stored_documents_without_anchor_use_latest_record() {
    let parser = TimeParser::with_clock(FixedClock(utc("2024-01-01T23:00:00Z")));
    let episode = Episode::from_json_str(
        r#"{
            "records": [
                {"id": "x", "timestamp": {"seconds": 1704096300}, "fc": 70},
                {"id": "y", "timestamp": 1704097200000, "fc": 72},
                {"id": "z", "timestamp": {"weird": true}, "fc": 74}
            ]
        }"#,
    )
    .expect("episode");

    assert_eq!(episode.anchor(&parser), utc("2024-01-01T08:20:00Z"));

    let state = SeriesStore::new(parser).load(episode.records);
    let ids: Vec<_> = state.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["x", "y", "z"]);
}

#[test]
fn edits_touching_one_pressure_keep_the_pair_ordered() {
    let parser = TimeParser::with_clock(FixedClock(utc("2024-01-01T10:00:00Z")));
    let store = SeriesStore::new(parser).with_reference(utc("2024-01-01T08:00:00Z"));
    let record = VitalSignForm::new()
        .with(VitalField::Rhythm, "Sinusal")
        .with(VitalField::HeartRate, 70.0)
        .with(VitalField::Systolic, 120.0)
        .with(VitalField::Diastolic, 80.0)
        .with(VitalField::Spo2, 98.0)
        .to_record()
        .expect("valid entry");
    let state = store.insert(&Default::default(), record);
    let id = state.records()[0].id.clone();

    let lowered = VitalSignForm::new()
        .with(VitalField::Systolic, 70.0)
        .to_patch()
        .expect("systolic alone passes the form check");
    match store.update(&state, &id, lowered) {
        Err(VitalsError::Validation(report)) => assert_eq!(
            report.error(VitalField::Systolic),
            Some("PAS deve ser maior que a PAD")
        ),
        other => panic!("expected validation failure, got {other:?}"),
    }

    let raised = VitalSignForm::new()
        .with(VitalField::Diastolic, 125.0)
        .to_patch()
        .expect("diastolic alone passes the form check");
    assert!(matches!(
        store.update(&state, &id, raised),
        Err(VitalsError::Validation(_))
    ));

    let fine = VitalSignForm::new()
        .with(VitalField::Systolic, 110.0)
        .to_patch()
        .expect("patch");
    let state = store.update(&state, &id, fine).expect("still above diastolic");
    let vitals = &state.records()[0].vitals;
    assert_eq!(vitals.systolic, Some(110.0));
    assert_eq!(vitals.mean_arterial_pressure, Some(90.0));
}

#[test]
fn mixed_quality_documents_still_open() {
    let parser = TimeParser::with_clock(FixedClock(utc("2024-01-01T23:00:00Z")));
    let episode = Episode::from_json_str(
        r#"{
            "declaredStart": "2024-01-01T08:00:00Z",
            "records": [
                {"id": "a", "timestamp": "08:05", "ritmo": "", "fc": "72", "pasSistolica": 120, "pasDiastolica": "80"},
                {"id": "b", "timestamp": "08:10", "ritmo": "galope", "pupilas": 3, "fc": "rápida", "spo2": "97,5"},
                {"id": "c", "timestamp": "08:15", "ritmo": "Sinusal", "fc": 75}
            ]
        }"#,
    )
    .expect("episode with malformed values");

    let anchor = episode.anchor(&parser);
    let state = SeriesStore::new(parser)
        .with_reference(anchor)
        .load(episode.records);

    let a = &state.records()[0].vitals;
    assert_eq!(a.rhythm, None);
    assert_eq!(a.heart_rate, Some(72.0));
    assert_eq!(a.mean_arterial_pressure, Some(93.0));

    let b = &state.records()[1].vitals;
    assert_eq!(b.rhythm, None);
    assert_eq!(b.pupils, None);
    assert_eq!(b.heart_rate, None);
    assert_eq!(b.spo2, Some(97.5));

    assert_eq!(state.records()[2].vitals.heart_rate, Some(75.0));
    assert_eq!(
        suggest_next_time(anchor, state.records()),
        utc("2024-01-01T08:20:00Z")
    );
}
