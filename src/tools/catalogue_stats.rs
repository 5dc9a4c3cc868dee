//! MCP `catalogue_stats` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `catalogue_stats` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CatalogueStatsParams {
    /// Include the metadata cache counters.
    #[schemars(description = "Include metadata cache hit/miss counters. Defaults to true.")]
    pub include_cache: Option<bool>,
}
