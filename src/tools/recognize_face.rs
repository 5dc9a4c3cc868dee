use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecognizeFaceParams {
    #[schemars(description = "Raw face embedding from the same model used at enrollment")]
    pub embedding: Vec<f32>,

    #[schemars(description = "Detector confidence for this face, 0.0-1.0. Defaults to 1.0.")]
    pub detection_confidence: Option<f32>,
}
