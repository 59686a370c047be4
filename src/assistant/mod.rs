//! Assistant backend integration.
//!
//! `backend` defines the contract the relay depends on (thread creation,
//! message append, run start/status, message listing), `openai` implements
//! it against the OpenAI Assistants API, and `coordinator` drives one
//! exchange through the submit+poll state machine.

pub mod backend;
pub mod coordinator;
pub mod openai;

pub use backend::{AssistantBackend, BackendError, MessageRole, RunState, RunStatus, ThreadMessage};
pub use coordinator::{CoordinatorConfig, CoordinatorError, ResponseCoordinator};
pub use openai::OpenAiAssistantClient;
