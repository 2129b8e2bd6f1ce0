/// Real-time event construction and fan-out helpers.
pub mod broker_events;
/// Debounced cache snapshot writer.
pub mod cache_persistence;
/// Decision submission pipeline.
pub mod decision_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session lifecycle and status reads.
pub mod session_service;
/// WebSocket connection and message handling service.
pub mod ws_service;
