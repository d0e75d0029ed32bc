//! Swagger UI and the raw OpenAPI document of the room API.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path of the Swagger UI.
pub const DOCS_PATH: &str = "/docs";
/// Path of the OpenAPI document read by the UI.
pub const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI at [`DOCS_PATH`], backed by the document served at [`OPENAPI_PATH`].
pub fn router() -> Router<SharedState> {
    SwaggerUi::new(DOCS_PATH)
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn serves_the_room_api_document() {
        let state =
            AppState::with_store(AppConfig::default(), Arc::new(MemoryRoomStore::new())).await;
        let response = router()
            .with_state(state)
            .oneshot(Request::get(OPENAPI_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(document["paths"]["/rooms/{id}/guesses"].is_object());
        assert!(document["paths"]["/rooms/{id}/events"].is_object());
    }
}
