//! Async facade over [`RecognitionEngine`] for request handlers.
//!
//! The detector and the directory are external collaborators with unbounded latency,
//! so both run on blocking workers under timeouts. A detector timeout fails that
//! frame; a metadata timeout only leaves `person` unset on the decision.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::FaceprintConfig;
use crate::embedding::{DetectedFace, Detector};
use crate::engine::{EnrollOutcome, RecognitionEngine};
use crate::enrollment::EnrollmentRequest;
use crate::error::{EngineError, EngineResult};
use crate::recognition::Decision;

/// Frame-level knobs.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub min_detection_confidence: f32,
    pub max_faces_per_frame: usize,
    pub detector_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.65,
            max_faces_per_frame: 1,
            detector_timeout: Duration::from_millis(5000),
            fetch_timeout: Duration::from_millis(2000),
        }
    }
}

impl From<&FaceprintConfig> for ServiceSettings {
    fn from(config: &FaceprintConfig) -> Self {
        Self {
            min_detection_confidence: config.recognition.min_detection_confidence,
            max_faces_per_frame: config.recognition.max_faces_per_frame,
            detector_timeout: Duration::from_millis(config.recognition.detector_timeout_ms),
            fetch_timeout: Duration::from_millis(config.cache.fetch_timeout_ms),
        }
    }
}

/// Per-face result within a frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceOutcome {
    Decided(Decision),
    Failed { error: String },
}

impl FaceOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Self::Decided(d) => Some(d),
            Self::Failed { .. } => None,
        }
    }
}

/// Everything decided about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecognition {
    /// Faces reported by the detector.
    pub detected: usize,
    /// Faces dropped for low detection confidence or the per-frame cap.
    pub skipped: usize,
    pub faces: Vec<FaceOutcome>,
}

#[derive(Clone)]
pub struct FaceService {
    engine: Arc<RecognitionEngine>,
    detector: Option<Arc<dyn Detector>>,
    settings: ServiceSettings,
}

impl FaceService {
    pub fn new(engine: Arc<RecognitionEngine>, settings: ServiceSettings) -> Self {
        Self {
            engine,
            detector: None,
            settings,
        }
    }

    /// Attach a detector so image frames can be processed.
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn engine(&self) -> &Arc<RecognitionEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Recognize a single client-supplied embedding.
    pub async fn recognize_embedding(&self, face: DetectedFace) -> EngineResult<Decision> {
        let mut decision = self.engine.decide(&face)?;
        self.attach_person(&mut decision).await;
        Ok(decision)
    }

    /// Detect faces in an encoded image and recognize each kept face.
    pub async fn recognize_image(&self, image: Vec<u8>) -> EngineResult<FrameRecognition> {
        let detected = self.detect(image).await?;
        let total = detected.len();
        let faces = self.select_faces(detected);
        let skipped = total - faces.len();

        let mut outcomes = Vec::with_capacity(faces.len());
        for result in self.engine.decide_batch(&faces) {
            match result {
                Ok(mut decision) => {
                    self.attach_person(&mut decision).await;
                    outcomes.push(FaceOutcome::Decided(decision));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "face could not be decided");
                    outcomes.push(FaceOutcome::Failed {
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(detected = total, skipped, "frame processed");
        Ok(FrameRecognition {
            detected: total,
            skipped,
            faces: outcomes,
        })
    }

    /// Enroll from raw per-frame embeddings.
    pub async fn enroll_embeddings(
        &self,
        request: EnrollmentRequest,
        samples: Vec<Vec<f32>>,
    ) -> EngineResult<EnrollOutcome> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.enroll(&request, &samples))
            .await
            .map_err(std::io::Error::from)?
    }

    /// Enroll from encoded frames, taking the first kept face of each frame as that
    /// frame's sample. Frames that yield no face, or whose detection fails, are
    /// skipped.
    pub async fn enroll_frames(
        &self,
        request: EnrollmentRequest,
        frames: Vec<Vec<u8>>,
    ) -> EngineResult<EnrollOutcome> {
        let mut samples = Vec::with_capacity(frames.len());
        for (i, frame) in frames.into_iter().enumerate() {
            match self.detect(frame).await {
                Ok(faces) => {
                    if let Some(face) = self.select_faces(faces).into_iter().next() {
                        samples.push(face.embedding);
                    }
                }
                Err(e) => tracing::warn!(frame = i, error = %e, "skipping enrollment frame"),
            }
        }
        self.enroll_embeddings(request, samples).await
    }

    async fn detect(&self, image: Vec<u8>) -> EngineResult<Vec<DetectedFace>> {
        let detector = self
            .detector
            .clone()
            .ok_or_else(|| EngineError::Detector("no face detector configured".into()))?;
        let timeout = self.settings.detector_timeout;
        let task = tokio::task::spawn_blocking(move || detector.detect(&image));

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(EngineError::Timeout {
                operation: "face detection",
                after_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(EngineError::Detector(format!("detector task failed: {e}"))),
            Ok(Ok(Err(e))) => Err(EngineError::Detector(format!("{e:#}"))),
            Ok(Ok(Ok(faces))) => Ok(faces),
        }
    }

    /// Keep confident faces in detector order, up to the per-frame cap.
    fn select_faces(&self, faces: Vec<DetectedFace>) -> Vec<DetectedFace> {
        faces
            .into_iter()
            .filter(|f| f.confidence >= self.settings.min_detection_confidence)
            .take(self.settings.max_faces_per_frame)
            .collect()
    }

    async fn attach_person(&self, decision: &mut Decision) {
        let owner_id = match (decision.recognized, &decision.owner_id) {
            (true, Some(id)) => id.clone(),
            _ => return,
        };
        let engine = Arc::clone(&self.engine);
        let lookup_id = owner_id.clone();
        let lookup = tokio::task::spawn_blocking(move || engine.person(&lookup_id));

        match tokio::time::timeout(self.settings.fetch_timeout, lookup).await {
            Ok(Ok(person)) => decision.person = person,
            Ok(Err(e)) => tracing::warn!(owner_id = %owner_id, error = %e, "metadata task failed"),
            Err(_) => tracing::warn!(
                owner_id = %owner_id,
                timeout_ms = self.settings.fetch_timeout.as_millis() as u64,
                "metadata lookup timed out"
            ),
        }
    }
}
