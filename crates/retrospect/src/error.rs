use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetroError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RetroError>;
