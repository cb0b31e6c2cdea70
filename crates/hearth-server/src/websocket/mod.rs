//! WebSocket gateway: handshake, per-connection state, heartbeat and the
//! session loop.

pub mod connection;
pub mod handshake;
pub mod heartbeat;
pub mod session;
