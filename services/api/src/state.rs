//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the clonable
//! resources every handler and WebSocket connection needs.

use crate::config::Config;
use std::sync::Arc;
use voiceboard_core::SessionRegistry;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }
}
