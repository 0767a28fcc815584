use fixc_scale::{verify, AccuracyRegressionError, CacheRecord, ProfileLog, ResultCache, Verdict};

const RECORD: CacheRecord = CacheRecord {
    accuracy: 91.2,
    sf: 9,
};

#[test]
fn matching_replay_passes() {
    let measured = CacheRecord {
        accuracy: 91.2,
        sf: 9,
    };
    assert_eq!(verify(Some(&RECORD), &measured), Verdict::Pass);
    assert_eq!(verify(Some(&RECORD), &measured).to_string(), "PASS");
}

#[test]
fn lower_accuracy_fails_with_expected_figure() {
    let measured = CacheRecord {
        accuracy: 90.5,
        sf: 9,
    };
    let verdict = verify(Some(&RECORD), &measured);
    assert!(verdict.is_failure());
    assert_eq!(verdict.to_string(), "FAIL: Expected accuracy 91.200000%");
    assert_eq!(
        verdict,
        Verdict::Fail(AccuracyRegressionError::Accuracy {
            expected: 91.2,
            measured: 90.5
        })
    );
}

#[test]
fn different_scale_fails_after_accuracy_agrees() {
    let measured = CacheRecord {
        accuracy: 91.2 + 1e-9,
        sf: 10,
    };
    assert_eq!(
        verify(Some(&RECORD), &measured).to_string(),
        "FAIL: Expected best scale 9"
    );
}

#[test]
fn unrecorded_configuration_is_new() {
    let verdict = verify(None, &RECORD);
    assert!(!verdict.is_failure());
    assert_eq!(verdict.to_string(), "NEW: accuracy 91.200000%, scale 9");
}

#[test]
fn cache_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    assert_eq!(ResultCache::load(&path).unwrap(), ResultCache::new());

    let mut cache = ResultCache::new();
    cache.record("protonn", "int16", "usps-2", RECORD);
    cache.save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"sf\": 9"));

    let loaded = ResultCache::load(&path).unwrap();
    assert_eq!(loaded.get("protonn", "int16", "usps-2"), Some(&RECORD));
    assert_eq!(loaded.get("protonn", "int8", "usps-2"), None);
}

#[test]
fn malformed_cache_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(ResultCache::load(&path).is_err());
}

#[test]
fn profile_log_skips_comments_and_widens_repeats() {
    let log = ProfileLog::parse("# header\n\nx -1.5 2\nx -3 1 # again\ny inf -inf\n", "p").unwrap();
    assert_eq!(log.range("x"), Some((-3.0, 2.0)));
    assert_eq!(log.observed_max("x"), Some(3.0));
    assert_eq!(log.observed_max("y"), Some(f64::INFINITY));
    assert_eq!(log.len(), 2);
}

#[test]
fn profile_log_reports_bad_lines() {
    let err = ProfileLog::parse("x 1 2\ny 1\n", "run.txt").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.to_string().starts_with("run.txt, line 2"));
}

#[test]
fn cache_is_keyed_by_value_kind() {
    let text = r#"{
  "protonn": {
    "float32": { "usps-2": { "accuracy": 93.5, "sf": 0 } },
    "int16": { "usps-2": { "accuracy": 93.0, "sf": 9 } }
  }
}"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    std::fs::write(&path, text).unwrap();

    let cache = ResultCache::load(&path).unwrap();
    assert_eq!(cache.get("protonn", "float32", "usps-2").map(|r| r.sf), Some(0));
    assert_eq!(cache.get("protonn", "int16", "usps-2").map(|r| r.sf), Some(9));
    assert_eq!(cache.get("protonn", "desktop-16", "usps-2"), None);
}
