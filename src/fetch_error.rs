#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Spreadsheet source unavailable: {0}")]
    SourceUnavailable(#[from] reqwest::Error),
    #[error("Spreadsheet source returned HTTP {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("Unexpected sheet structure at line {line}: expected {expected} columns, found {found}")]
    SchemaMismatch {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Failed to read CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to read sheet file: {0}")]
    Io(#[from] std::io::Error),
    #[error("No usable indicator rows in sheet ({rejected} rows rejected)")]
    NoRecords { rejected: usize },
}

impl FetchError {
    /// Transport failures and 5xx responses are worth another attempt;
    /// a malformed sheet will not fix itself.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::SourceUnavailable(_) => true,
            FetchError::UnexpectedStatus(status) => status.is_server_error(),
            _ => false,
        }
    }
}
