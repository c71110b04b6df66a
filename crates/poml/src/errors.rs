use std::path::PathBuf;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PomlError {
    #[error("Unrecognized content part: {0}")]
    UnrecognizedContentPart(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Misplaced tool call: {0}")]
    MisplacedToolCall(String),

    #[error("Unknown speaker: {0}")]
    UnknownSpeaker(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("POML command failed with return code {code}. See the log for details.")]
    RendererFailed { code: i32 },

    #[error("{sink} tracing requires local tracing to be enabled.")]
    TracingRequired { sink: String },

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PomlResult<T> = Result<T, PomlError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a settings field path such as `renderer.node` to the environment
/// variable that sets it.
pub fn to_env_var(field: &str) -> String {
    format!("POML_{}", field.to_uppercase().replace('.', "__"))
}
