//! PromptLens core: image ingestion, the retrying analysis pipeline and the dashboard
//! state machine. Nothing here depends on the HTTP surface except `router`.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logger;
pub mod models;
pub mod retry;
pub mod router;
pub mod session;
pub mod transport;
