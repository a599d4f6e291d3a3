//! Error types for the registrar server.

use thiserror::Error;

/// Main error type for registrar operations.
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Upstream fetch failed for {key}: {source}")]
    Upstream {
        /// Cache key (domain plus parameters) the fetch was issued for.
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RegistrarError {
    /// True for errors caused by the caller's input rather than the portal.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

/// Locally detected problems with caller-supplied parameters. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("week number {week} is outside 1..={max}")]
    InvalidWeekNumber { week: i64, max: u32 },

    #[error("week range {start}-{end} is inverted")]
    InvalidRange { start: i64, end: i64 },

    #[error("malformed week token '{0}'")]
    MalformedWeekSpec(String),

    #[error("week selection is empty")]
    EmptyWeekSelection,

    #[error("period range {start}-{end} is inverted")]
    InvertedPeriodRange { start: i64, end: i64 },

    #[error("malformed period range '{0}', expected 'a-b' or 'a'")]
    MalformedPeriodSpec(String),

    #[error("period {0} is not a valid class period")]
    InvalidPeriod(i64),

    #[error("weekday {0} is outside 1..=7")]
    InvalidWeekday(i64),

    #[error("minimum seat count {0} is negative")]
    NegativeSeatCount(i64),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("date {date} is before the term's first day {first_day}")]
    DateBeforeTermStart { date: String, first_day: String },

    #[error("export file name '{0}' must stay inside the export directory")]
    ExportPathOutsideDirectory(String),
}

/// Lookups for keys the portal does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("term {academic_year} #{term} is not among the portal's terms")]
    Term { academic_year: String, term: u8 },

    #[error("building code '{0}' is unknown; resolve it from the building list first")]
    Building(String),

    #[error("no grades recorded for term code '{0}'")]
    GradeTerm(String),
}

/// Failures reported by the fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("portal rejected the session: {0}")]
    Auth(String),

    #[error("portal returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("response is missing field '{0}'")]
    MissingField(String),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Result type alias for registrar operations.
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Result type returned by the fetch collaborator.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
