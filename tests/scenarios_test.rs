mod helpers;

use faceprint::embedding::DetectedFace;
use faceprint::engine::EngineSettings;
use faceprint::error::EngineError;
use faceprint::index::SearchStrategy;
use faceprint::recognition::Rejection;
use helpers::*;

#[test]
fn empty_catalogue_recognizes_nobody() {
    let t = test_engine();
    let d = t
        .engine
        .recognize(&DetectedFace::from_embedding(spike_embedding(3)))
        .unwrap();
    assert!(!d.recognized);
    assert!(!d.match_exists);
    assert_eq!(d.rejection, Some(Rejection::EmptyCatalogue));
}

#[test]
fn enrolled_cluster_recognizes_its_centre() {
    let t = test_engine();
    let u = spike_embedding(5);
    let out = t
        .engine
        .enroll(&request("alice", "E1", "Alice"), &samples_around(&u, 12))
        .unwrap();
    assert_eq!(out.samples_used, 12);
    assert!(!out.low_sample_count);

    let d = t.engine.recognize(&DetectedFace::from_embedding(u)).unwrap();
    assert!(d.recognized);
    assert_eq!(d.identity_key.as_deref(), Some("alice"));
    assert_eq!(d.display_name.as_deref(), Some("Alice"));
    assert!(d.match_confidence > 0.99, "score {}", d.match_confidence);
}

#[test]
fn candidates_just_under_threshold_are_rejected() {
    for strategy in [SearchStrategy::Index, SearchStrategy::Linear] {
        let t = test_engine_with(EngineSettings {
            strategy,
            ..Default::default()
        });
        t.engine.upsert("a", &at_cosine(0.59, 1), meta("E1", "A")).unwrap();
        t.engine.upsert("b", &at_cosine(0.59, 2), meta("E2", "B")).unwrap();

        let d = t
            .engine
            .recognize(&DetectedFace::from_embedding(spike_embedding(0)))
            .unwrap();
        assert!(!d.recognized, "{strategy}");
        assert!(d.match_exists);
        assert_eq!(d.rejection, Some(Rejection::BelowThreshold));
        assert!(d.identity_key.is_none());
    }
}

#[test]
fn deleted_identity_is_never_returned() {
    let t = test_engine();
    t.engine
        .enroll(&request("alice", "E1", "Alice"), &samples_around(&spike_embedding(1), 10))
        .unwrap();
    t.engine.upsert("bob", &spike_embedding(2), meta("E2", "Bob")).unwrap();
    let alice = t.engine.get("alice").unwrap().vector;

    assert!(t.engine.delete("alice").unwrap());
    assert!(!t.engine.delete("alice").unwrap());

    let d = t.engine.recognize(&DetectedFace::from_embedding(alice.clone())).unwrap();
    assert!(!d.recognized);
    assert_ne!(d.identity_key.as_deref(), Some("alice"));

    // Still gone after a restart.
    let reopened = t.reopen();
    let d = reopened.decide(&DetectedFace::from_embedding(alice)).unwrap();
    assert!(!d.recognized);
    assert_eq!(reopened.list(), vec!["bob".to_string()]);
}

#[test]
fn too_few_samples_leave_catalogue_unchanged() {
    let t = test_engine();
    t.engine.upsert("bob", &spike_embedding(2), meta("E2", "Bob")).unwrap();
    let before = t.engine.snapshot();
    let bytes_before = std::fs::read(t.catalogue_path()).unwrap();

    let err = t
        .engine
        .enroll(&request("alice", "E1", "Alice"), &samples_around(&spike_embedding(1), 3))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientSamples { required: 5, got: 3 }
    ));

    let after = t.engine.snapshot();
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.catalogue, before.catalogue);
    assert_eq!(std::fs::read(t.catalogue_path()).unwrap(), bytes_before);
}

#[test]
fn self_match_scores_one() {
    let t = test_engine();
    for i in 0..8 {
        t.engine
            .upsert(&format!("id{i}"), &noisy_sample(&spike_embedding(i * 3), i), meta("E", "x"))
            .unwrap();
    }
    for record in t.engine.snapshot().catalogue.iter() {
        let d = t
            .engine
            .decide(&DetectedFace::from_embedding(record.vector.clone()))
            .unwrap();
        assert_eq!(d.identity_key.as_deref(), Some(record.identity_key.as_str()));
        assert!((d.match_confidence - 1.0).abs() < 1e-5);
    }
}

#[test]
fn equal_scores_resolve_to_first_enrolled() {
    let t = test_engine();
    let v = spike_embedding(4);
    t.engine.upsert("first", &v, meta("E1", "First")).unwrap();
    t.engine.upsert("second", &v, meta("E2", "Second")).unwrap();

    let d = t.engine.decide(&DetectedFace::from_embedding(v.clone())).unwrap();
    assert_eq!(d.identity_key.as_deref(), Some("first"));

    // Re-enrolling keeps the original position, so the tie-break holds.
    t.engine.upsert("first", &v, meta("E1", "First again")).unwrap();
    let d = t.engine.decide(&DetectedFace::from_embedding(v)).unwrap();
    assert_eq!(d.identity_key.as_deref(), Some("first"));
    assert_eq!(d.display_name.as_deref(), Some("First again"));
    assert_eq!(t.engine.list(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn wrong_dimension_write_is_rejected() {
    let t = test_engine();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();

    let err = t.engine.upsert("bob", &[1.0, 0.0], meta("E2", "Bob")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::DimensionMismatch { expected: helpers::DIM, actual: 2 }
    ));
    let err = t
        .engine
        .upsert("zero", &vec![0.0; helpers::DIM], meta("E3", "Zero"))
        .unwrap_err();
    assert!(matches!(err, EngineError::DegenerateVector));
    assert_eq!(t.engine.list(), vec!["alice".to_string()]);
}

#[test]
fn recognition_reports_directory_metadata() {
    let t = test_engine();
    t.directory.upsert_person(&person("E1", "Alice", "Liddell")).unwrap();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();
    t.engine.upsert("ghost", &spike_embedding(2), meta("E404", "Ghost")).unwrap();

    let d = t.engine.recognize(&DetectedFace::from_embedding(spike_embedding(1))).unwrap();
    assert_eq!(d.person.unwrap().full_name(), "Alice Liddell");

    // A match whose owner is missing from the directory is still a match.
    let d = t.engine.recognize(&DetectedFace::from_embedding(spike_embedding(2))).unwrap();
    assert!(d.recognized);
    assert!(d.person.is_none());
}
