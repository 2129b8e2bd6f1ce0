use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path the interactive API explorer is mounted at.
const UI_PATH: &str = "/docs";
/// Path serving the raw OpenAPI document.
const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Mount the Swagger UI together with the generated OpenAPI document.
pub fn router(state: SharedState) -> Router<SharedState> {
    let ui: Router<SharedState> = SwaggerUi::new(UI_PATH)
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into();

    ui.with_state(state)
}
