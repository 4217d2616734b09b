use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration has no [{section}] section, required by `{command}`")]
    MissingSection {
        section: &'static str,
        command: &'static str,
    },

    #[error("Cannot read configuration {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: glacierprep::Error,
    },

    #[error(transparent)]
    Workflow(#[from] glacierprep::Error),
}
