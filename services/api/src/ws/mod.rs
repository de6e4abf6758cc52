//! WebSocket Gateway
//!
//! Realtime access to voiceboard sessions. It is structured into submodules:
//!
//! - `protocol`: Defines the JSON event format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from upgrade to cleanup.
//! - `cycle`: Turns one client event into registry calls and server events.

mod cycle;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
