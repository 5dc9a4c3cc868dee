use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListIdentitiesParams {
    #[schemars(description = "Only list faces enrolled for this owner ID")]
    pub owner_id: Option<String>,
}
