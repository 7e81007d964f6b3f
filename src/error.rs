use std::path::PathBuf;
use thiserror::Error;

/// Conditions that abort a command before any analysis runs.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("target path does not exist: {0}")]
    PathNotFound(PathBuf),
    #[error("target path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("no LLM API key configured; set CODEWARDEN_API_KEY or OPENAI_API_KEY, add `api_key` to the [llm] config section, or pass --skip-llm")]
    MissingApiKey,
}
