pub mod agent;
pub mod config;
pub mod history;
pub mod http_client;
pub mod identity;
pub mod llm_client;
pub mod pipeline;
pub mod profile;
pub mod prompt;
pub mod runtime;
pub mod server;
pub mod store;
pub mod task;
