pub mod catalogue_stats;
pub mod delete_identity;
pub mod enroll_identity;
pub mod list_identities;
pub mod recognize_face;

use catalogue_stats::CatalogueStatsParams;
use delete_identity::DeleteIdentityParams;
use enroll_identity::EnrollIdentityParams;
use list_identities::ListIdentitiesParams;
use recognize_face::RecognizeFaceParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::sync::Arc;

use crate::embedding::DetectedFace;
use crate::enrollment::EnrollmentRequest;
use crate::service::FaceService;

/// The faceprint MCP tool handler. Holds the shared [`FaceService`] and exposes the
/// catalogue operations via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct FaceprintTools {
    tool_router: ToolRouter<Self>,
    service: FaceService,
}

#[tool_router]
impl FaceprintTools {
    pub fn new(service: FaceService) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    /// Enroll a face from a batch of per-frame embeddings.
    #[tool(description = "Enroll (or re-enroll) a face. Averages the per-frame embeddings into one representative vector and stores it under identity_key.")]
    async fn enroll_identity(
        &self,
        Parameters(params): Parameters<EnrollIdentityParams>,
    ) -> Result<String, String> {
        if params.identity_key.is_empty() {
            return Err("identity_key must not be empty".into());
        }
        if params.owner_id.is_empty() {
            return Err("owner_id must not be empty".into());
        }

        tracing::info!(
            identity_key = %params.identity_key,
            owner_id = %params.owner_id,
            samples = params.samples.len(),
            "enroll_identity called"
        );

        let request = EnrollmentRequest {
            identity_key: params.identity_key,
            owner_id: params.owner_id,
            display_name: params.display_name,
        };
        let outcome = self
            .service
            .enroll_embeddings(request, params.samples)
            .await
            .map_err(|e| format!("enrollment failed: {e}"))?;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Recognize a face embedding against the catalogue.
    #[tool(description = "Recognize a face embedding. Returns the best enrolled identity if its similarity meets the match threshold, plus directory metadata for the owner.")]
    async fn recognize_face(
        &self,
        Parameters(params): Parameters<RecognizeFaceParams>,
    ) -> Result<String, String> {
        let confidence = params.detection_confidence.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err("detection_confidence must be between 0.0 and 1.0".into());
        }

        let face = DetectedFace {
            bbox: None,
            confidence,
            embedding: params.embedding,
        };
        let decision = self
            .service
            .recognize_embedding(face)
            .await
            .map_err(|e| format!("recognition failed: {e}"))?;

        tracing::info!(
            recognized = decision.recognized,
            identity_key = decision.identity_key.as_deref().unwrap_or(""),
            confidence = decision.match_confidence,
            "recognize_face completed"
        );

        serde_json::to_string(&decision).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Delete an enrolled face, or every face of one owner.
    #[tool(description = "Delete enrolled faces, either one identity_key or every face belonging to owner_id.")]
    async fn delete_identity(
        &self,
        Parameters(params): Parameters<DeleteIdentityParams>,
    ) -> Result<String, String> {
        let engine = Arc::clone(self.service.engine());
        let response = match (params.identity_key, params.owner_id) {
            (Some(key), None) => {
                let deleted = tokio::task::spawn_blocking(move || engine.delete(&key))
                    .await
                    .map_err(|e| format!("delete task failed: {e}"))?
                    .map_err(|e| format!("delete failed: {e}"))?;
                serde_json::json!({ "deleted": usize::from(deleted) })
            }
            (None, Some(owner)) => {
                let deleted = tokio::task::spawn_blocking(move || engine.delete_owner(&owner))
                    .await
                    .map_err(|e| format!("delete task failed: {e}"))?
                    .map_err(|e| format!("delete failed: {e}"))?;
                serde_json::json!({ "deleted": deleted })
            }
            _ => return Err("provide exactly one of identity_key or owner_id".into()),
        };

        Ok(response.to_string())
    }

    /// List enrolled faces.
    #[tool(description = "List enrolled faces with owner ID, display name, and enrollment time.")]
    async fn list_identities(
        &self,
        Parameters(params): Parameters<ListIdentitiesParams>,
    ) -> Result<String, String> {
        let records: Vec<_> = self
            .service
            .engine()
            .records()
            .into_iter()
            .filter(|r| params.owner_id.as_deref().map_or(true, |o| r.owner_id == o))
            .collect();

        serde_json::to_string(&serde_json::json!({
            "total": records.len(),
            "identities": records,
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Report catalogue statistics.
    #[tool(description = "Get catalogue statistics: enrolled faces, vector dimension, search mode, storage size.")]
    async fn catalogue_stats(
        &self,
        Parameters(params): Parameters<CatalogueStatsParams>,
    ) -> Result<String, String> {
        let stats = self.service.engine().stats();
        let mut value =
            serde_json::to_value(&stats).map_err(|e| format!("serialization failed: {e}"))?;
        if !params.include_cache.unwrap_or(true) {
            if let Some(obj) = value.as_object_mut() {
                obj.remove("cache");
            }
        }
        Ok(value.to_string())
    }
}

#[tool_handler]
impl ServerHandler for FaceprintTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "faceprint is a face recognition catalogue. Use enroll_identity to add a face, \
                 recognize_face to identify an embedding, and list_identities to see who is enrolled."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
