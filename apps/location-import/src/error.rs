use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no {0} column found in header")]
    MissingColumn(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unexpected import status '{0}'")]
    UnknownStatus(String),
}
