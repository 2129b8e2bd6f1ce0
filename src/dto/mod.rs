//! Request, response, and event payload types for the HTTP and WebSocket surfaces.

/// Admin management payloads.
pub mod admin;
/// Shared wire types (phase, session snapshot).
pub mod common;
/// Decision submission payloads.
pub mod decision;
/// Real-time event payloads.
pub mod events;
/// Health check payloads.
pub mod health;
/// Team session status payloads.
pub mod session;
/// Validation helpers for DTOs.
pub mod validation;
/// WebSocket message envelopes.
pub mod ws;
