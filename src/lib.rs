pub mod analyzer;
pub mod cloud;
pub mod config;
pub mod dependency_scan;
pub mod error;
pub mod file_discovery;
pub mod findings;
pub mod llm;
pub mod migration;
pub mod packager;
pub mod reporter;
pub mod security;
pub mod simple_parser;

pub use analyzer::{Analyzer, RunOptions};
pub use cloud::CloudProvider;
pub use config::Config;
pub use error::AuditError;
pub use file_discovery::FileDiscovery;
pub use llm::{CompletionClient, OpenAiClient};
pub use simple_parser::SimpleParser;

pub type Result<T> = anyhow::Result<T>;
