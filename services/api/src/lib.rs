//! Voiceboard API Library Crate
//!
//! This library contains the web layer of the Voiceboard service: configuration,
//! application state, REST handlers, the WebSocket gateway and routing. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
#[cfg(test)]
mod test_support;
pub mod ws;
