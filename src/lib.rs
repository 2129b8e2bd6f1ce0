//! Library crate for decision-drill-back, exposing modules for binaries and integration tests.

/// Browser-resident client state machine (pure, transport-agnostic).
pub mod client;
/// Configuration loading and the baked-in scenario set.
pub mod config;
/// Durable store layer.
pub mod dao;
/// Wire-level request, response, and event types.
pub mod dto;
/// Service and application error types.
pub mod error;
/// HTTP and WebSocket route trees.
pub mod routes;
/// Scoring engine.
pub mod scoring;
/// Business services.
pub mod services;
/// Shared application state.
pub mod state;
