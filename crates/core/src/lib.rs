//! Core logic for Voiceboard persona chat: research workflow, response
//! generation and the session registry. The server crate is a thin transport
//! layer on top of this library.

pub mod cache;
pub mod evaluator;
pub mod fetcher;
pub mod generator;
pub mod llm_client;
pub mod session;
pub mod snippet;
pub mod state;
pub mod workflow;

pub use session::{ChatOutcome, RegistryError, SessionRegistry, SessionSnapshot};
pub use workflow::WorkflowCoordinator;
