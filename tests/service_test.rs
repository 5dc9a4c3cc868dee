mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use faceprint::cache::{IdentitySource, MetadataCache, NoopCache};
use faceprint::catalogue::store::EmbeddingStore;
use faceprint::db::{Person, SqliteDirectory};
use faceprint::embedding::{BoundingBox, DetectedFace, Detector};
use faceprint::engine::{EngineSettings, RecognitionEngine};
use faceprint::error::EngineError;
use faceprint::recognition::Rejection;
use faceprint::service::{FaceOutcome, FaceService, ServiceSettings};
use helpers::*;

/// Detector that answers from the first byte of the image: each byte value maps to
/// a canned list of faces.
struct ScriptedDetector {
    frames: Vec<Vec<DetectedFace>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn new(frames: Vec<Vec<DetectedFace>>) -> Self {
        Self {
            frames,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, image: &[u8]) -> anyhow::Result<Vec<DetectedFace>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let idx = *image.first().ok_or_else(|| anyhow::anyhow!("empty image"))? as usize;
        Ok(self.frames.get(idx).cloned().unwrap_or_default())
    }
}

/// Directory that answers correctly, but only after `delay`.
struct SlowDirectory {
    inner: Arc<SqliteDirectory>,
    delay: Duration,
}

impl IdentitySource for SlowDirectory {
    fn get_by_id(&self, owner_id: &str) -> anyhow::Result<Option<Person>> {
        std::thread::sleep(self.delay);
        self.inner.get_by_id(owner_id)
    }
}

/// A second engine over `t`'s catalogue whose directory lookups take `delay`.
fn engine_with_slow_directory(t: &TestEngine, delay: Duration) -> Arc<RecognitionEngine> {
    let cache = MetadataCache::new(
        Arc::new(NoopCache),
        Arc::new(SlowDirectory {
            inner: t.directory.clone(),
            delay,
        }),
        Duration::from_secs(300),
    );
    Arc::new(
        RecognitionEngine::with_parts(
            EmbeddingStore::new(t.catalogue_path()),
            cache,
            EngineSettings::default(),
        )
        .unwrap(),
    )
}

fn face(embedding: Vec<f32>, confidence: f32) -> DetectedFace {
    DetectedFace {
        bbox: Some(BoundingBox {
            x1: 10,
            y1: 20,
            x2: 110,
            y2: 140,
        }),
        confidence,
        embedding,
    }
}

fn service(t: &TestEngine, detector: ScriptedDetector) -> FaceService {
    FaceService::new(t.engine.clone(), ServiceSettings::default()).with_detector(Arc::new(detector))
}

#[tokio::test]
async fn embedding_recognition_attaches_person() {
    let t = test_engine();
    t.directory.upsert_person(&person("E1", "Alice", "Liddell")).unwrap();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();
    let svc = FaceService::new(t.engine.clone(), ServiceSettings::default());

    let d = svc
        .recognize_embedding(DetectedFace::from_embedding(spike_embedding(1)))
        .await
        .unwrap();
    assert!(d.recognized);
    assert_eq!(d.person.unwrap().last_name, "Liddell");
}

#[tokio::test]
async fn image_frames_filter_and_cap_faces() {
    let t = test_engine();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();
    let detector = ScriptedDetector::new(vec![vec![
        face(spike_embedding(7), 0.40),
        face(noisy_sample(&spike_embedding(1), 2), 0.97),
        face(spike_embedding(2), 0.90),
    ]]);
    let svc = service(&t, detector);

    let frame = svc.recognize_image(vec![0]).await.unwrap();
    assert_eq!(frame.detected, 3);
    assert_eq!(frame.skipped, 2);
    assert_eq!(frame.faces.len(), 1);
    let d = frame.faces[0].decision().unwrap();
    assert!(d.recognized);
    assert_eq!(d.identity_key.as_deref(), Some("alice"));
    assert_eq!(d.detection_confidence, 0.97);
    assert_eq!(d.bbox.unwrap().x2, 110);
}

#[tokio::test]
async fn per_face_errors_do_not_fail_the_frame() {
    let t = test_engine();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();
    let detector = ScriptedDetector::new(vec![vec![
        face(vec![1.0, 0.0], 0.9),
        face(vec![0.0; helpers::DIM], 0.9),
        face(spike_embedding(1), 0.9),
    ]]);
    let svc = FaceService::new(
        t.engine.clone(),
        ServiceSettings {
            max_faces_per_frame: 3,
            ..Default::default()
        },
    )
    .with_detector(Arc::new(detector));

    let frame = svc.recognize_image(vec![0]).await.unwrap();
    assert!(matches!(frame.faces[0], FaceOutcome::Failed { .. }));
    assert_eq!(
        frame.faces[1].decision().unwrap().rejection,
        Some(Rejection::NoEmbedding)
    );
    assert!(frame.faces[2].decision().unwrap().recognized);
}

#[tokio::test]
async fn slow_detector_times_out() {
    let t = test_engine();
    let mut detector = ScriptedDetector::new(vec![vec![face(spike_embedding(1), 0.9)]]);
    detector.delay = Duration::from_millis(300);
    let svc = FaceService::new(
        t.engine.clone(),
        ServiceSettings {
            detector_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    )
    .with_detector(Arc::new(detector));

    let err = svc.recognize_image(vec![0]).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Timeout {
            operation: "face detection",
            after_ms: 20
        }
    ));
}

#[tokio::test]
async fn slow_metadata_lookup_leaves_person_unset() {
    let t = test_engine();
    t.directory.upsert_person(&person("E1", "Alice", "Liddell")).unwrap();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();

    let engine = engine_with_slow_directory(&t, Duration::from_millis(500));
    let svc = FaceService::new(
        engine,
        ServiceSettings {
            fetch_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    );

    let started = std::time::Instant::now();
    let d = svc
        .recognize_embedding(DetectedFace::from_embedding(spike_embedding(1)))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(d.recognized);
    assert_eq!(d.identity_key.as_deref(), Some("alice"));
    assert!(d.person.is_none());
}

#[tokio::test]
async fn metadata_within_timeout_is_attached() {
    let t = test_engine();
    t.directory.upsert_person(&person("E1", "Alice", "Liddell")).unwrap();
    t.engine.upsert("alice", &spike_embedding(1), meta("E1", "Alice")).unwrap();

    let engine = engine_with_slow_directory(&t, Duration::from_millis(10));
    let svc = FaceService::new(engine, ServiceSettings::default());

    let d = svc
        .recognize_embedding(DetectedFace::from_embedding(spike_embedding(1)))
        .await
        .unwrap();
    assert_eq!(d.person.unwrap().first_name, "Alice");
}

#[tokio::test]
async fn refresh_task_picks_up_writes_from_another_handle() {
    let t = test_engine();
    let other = t.reopen();
    let handle = faceprint::server::start_refresh_task(t.engine.clone(), Duration::from_millis(10));

    other.upsert("bob", &spike_embedding(2), meta("E2", "Bob")).unwrap();

    let mut seen = false;
    for _ in 0..100 {
        if t.engine.list() == vec!["bob".to_string()] {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();
    assert!(seen, "refresh never published the other handle's write");
}

#[tokio::test]
async fn missing_detector_is_an_error() {
    let t = test_engine();
    let svc = FaceService::new(t.engine.clone(), ServiceSettings::default());
    assert!(matches!(
        svc.recognize_image(vec![0]).await,
        Err(EngineError::Detector(_))
    ));
}

#[tokio::test]
async fn enroll_frames_uses_first_face_per_frame() {
    let t = test_engine();
    let base = spike_embedding(3);
    let mut frames: Vec<Vec<DetectedFace>> = (0..6)
        .map(|n| {
            vec![
                face(noisy_sample(&base, n), 0.95),
                face(spike_embedding(60), 0.99),
            ]
        })
        .collect();
    // A frame with no face and one with only a low-confidence face.
    frames.push(vec![]);
    frames.push(vec![face(spike_embedding(60), 0.1)]);
    let images: Vec<Vec<u8>> = (0..frames.len() as u8).map(|i| vec![i]).collect();
    let detector = Arc::new(ScriptedDetector::new(frames));
    let svc = FaceService::new(t.engine.clone(), ServiceSettings::default())
        .with_detector(detector.clone());

    let out = svc
        .enroll_frames(request("carol", "E3", "Carol"), images)
        .await
        .unwrap();
    assert_eq!(out.samples_used, 6);
    assert!(out.low_sample_count);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 8);

    let d = t.engine.decide(&DetectedFace::from_embedding(base)).unwrap();
    assert_eq!(d.identity_key.as_deref(), Some("carol"));
}

#[tokio::test]
async fn enroll_frames_without_enough_faces_fails() {
    let t = test_engine();
    let detector = ScriptedDetector::new(vec![vec![face(spike_embedding(3), 0.9)], vec![]]);
    let svc = service(&t, detector);

    let err = svc
        .enroll_frames(request("dave", "E4", "Dave"), vec![vec![0], vec![1], vec![]])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientSamples { required: 5, got: 1 }
    ));
    assert!(t.engine.list().is_empty());
}
