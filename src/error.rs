use thiserror::Error;

use crate::common::Year;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("the data source returned no rows")]
    NoRows,
}

#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("no publication records for '{0}'")]
    EmptySeries(String),

    #[error("insufficient data: need at least {required} distinct years, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("target year {target} must be after the last observed year {last}")]
    TargetNotAfterHistory { target: Year, last: Year },

    #[error("numerical error: {0}")]
    Numerical(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("please enter a valid year (e.g. 2026), got {0:?}")]
    NotAYear(String),

    #[error("the year must be after {last}, the last year with data")]
    NotAfterHistory { target: Year, last: Year },

    #[error("the year can be at most {max}")]
    BeyondHorizon { target: Year, max: Year },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not write chart: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode chart: {0}")]
    Image(#[from] image::ImageError),

    #[error("nothing to draw")]
    NoPoints,
}

/// Anything that stops a run before the dialogue starts, or breaks the terminal during it.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not load publication counts: {0}")]
    Source(#[from] SourceError),

    #[error("terminal error: {0}")]
    Io(#[from] std::io::Error),
}
