use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Installed storage backend, absent while degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl HealthResponse {
    pub fn ok(storage: &str) -> Self {
        Self {
            status: "ok".to_string(),
            storage: Some(storage.to_string()),
        }
    }

    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            storage: None,
        }
    }
}
