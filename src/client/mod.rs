//! Browser-resident client state, expressed as a pure state machine.
//!
//! Nothing here performs I/O or owns a transport: the embedding shell feeds
//! it authoritative status fetches, broker events, storage notifications,
//! and clock readings, and acts on the decisions it returns. Everything in
//! this module is advisory from the server's point of view; the durable
//! store never trusts a client snapshot for scoring.

/// Screen reconciliation against authoritative status and remote snapshots.
pub mod reconciler;
/// Locally persisted snapshot and its storage abstraction.
pub mod snapshot;
/// Countdown timer with reload-surviving state and a fire-once guard.
pub mod timer;
