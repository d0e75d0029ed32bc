use serde::Serialize;
use utoipa::ToSchema;

/// Payload of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while room storage is unreachable.
    pub status: String,
    /// Whether room commands are currently refused.
    pub degraded: bool,
}

impl HealthResponse {
    /// Storage is reachable.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            degraded: false,
        }
    }

    /// Storage is unreachable.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            degraded: true,
        }
    }
}
