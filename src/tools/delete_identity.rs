//! MCP `delete_identity` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `delete_identity` MCP tool. Exactly one of the two fields
/// must be set.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteIdentityParams {
    #[schemars(description = "Delete the single enrolled face with this key")]
    pub identity_key: Option<String>,

    #[schemars(description = "Delete every enrolled face belonging to this owner ID")]
    pub owner_id: Option<String>,
}
