use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Decision Drill Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::team_status,
        crate::routes::decision::submit_decision,
        crate::routes::admin::get_session,
        crate::routes::admin::start_session,
        crate::routes::admin::advance_session,
        crate::routes::admin::end_session,
        crate::routes::admin::reset_session,
        crate::routes::admin::set_position,
        crate::routes::admin::list_teams,
        crate::routes::admin::kick_team,
        crate::routes::websocket::ws_handler,
        crate::routes::websocket::admin_ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::PhaseDto,
            crate::dto::common::SessionSnapshot,
            crate::dto::session::TeamStatusResponse,
            crate::dto::decision::SubmitDecisionRequest,
            crate::dto::decision::SubmitDecisionResponse,
            crate::dto::admin::PositionUpdateRequest,
            crate::dto::admin::ActionResponse,
            crate::dto::admin::AdminSessionResponse,
            crate::dto::admin::TeamSummary,
            crate::dto::ws::TeamInboundMessage,
            crate::dto::ws::AdminInboundMessage,
            crate::dto::events::StateUpdateEvent,
            crate::dto::events::TeamConnectedEvent,
            crate::dto::events::TeamDisconnectedEvent,
            crate::dto::events::TeamKickedEvent,
            crate::dto::events::ProgressUpdateEvent,
            crate::dto::events::DecisionSubmittedEvent,
            crate::dto::events::ErrorEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Team-facing session status"),
        (name = "decisions", description = "Decision submission"),
        (name = "admin", description = "Session lifecycle control"),
        (name = "broker", description = "WebSocket operations"),
    )
)]
pub struct ApiDoc;
