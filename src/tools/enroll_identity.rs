//! MCP `enroll_identity` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `enroll_identity` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnrollIdentityParams {
    #[schemars(description = "Unique key for this enrolled face, e.g. 'emp001_front'")]
    pub identity_key: String,

    #[schemars(description = "ID of the person in the identity directory, e.g. an employee ID")]
    pub owner_id: String,

    #[schemars(description = "Name to report when this face is recognized")]
    pub display_name: String,

    #[schemars(
        description = "Per-frame face embeddings captured during enrollment. At least 5 valid samples are required; 10 or more is recommended."
    )]
    pub samples: Vec<Vec<f32>>,
}
