use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpiError` and maps other errors to it so that `?` works across
/// I/O, JSON, CSV and configuration failures.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    IllegalGlobalPropertyValue(String),
    NoGlobalProperty(String),
    ReportError(String),
    EpiError(String),
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CsvError(error)
    }
}

impl From<String> for EpiError {
    fn from(error: String) -> Self {
        EpiError::EpiError(error)
    }
}

impl From<&str> for EpiError {
    fn from(error: &str) -> Self {
        EpiError::EpiError(error.to_string())
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpiError::IoError(error) => write!(f, "I/O error: {error}"),
            EpiError::JsonError(error) => write!(f, "JSON error: {error}"),
            EpiError::CsvError(error) => write!(f, "CSV error: {error}"),
            EpiError::IllegalGlobalPropertyValue(msg) => {
                write!(f, "Illegal global property value: {msg}")
            }
            EpiError::NoGlobalProperty(name) => write!(f, "No global property: {name}"),
            EpiError::ReportError(msg) => write!(f, "Report error: {msg}"),
            EpiError::EpiError(msg) => write!(f, "Error: {msg}"),
        }
    }
}
