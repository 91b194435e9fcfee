use backon::{ExponentialBuilder, Retryable};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::BaseTable;

/// Unit, indicator, description, formula, type, periodicity, annual goal,
/// weighting, then January through December.
pub const SHEET_COLUMNS: usize = 20;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: usize = 3;

/// One data row of the published sheet, cells still as text.
/// Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    pub line: u64,
    pub unit: Option<String>,
    pub indicator: Option<String>,
    pub description: Option<String>,
    pub formula: Option<String>,
    pub indicator_type: Option<String>,
    pub periodicity: Option<String>,
    pub annual_goal: Option<String>,
    pub weighting: Option<String>,
    pub months: [Option<String>; 12],
}

#[derive(Clone)]
pub struct SheetFetcher {
    client: reqwest::Client,
    url: String,
    max_retries: usize,
    min_retry_delay: Duration,
}

impl SheetFetcher {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::SourceUnavailable)?;
        Ok(Self {
            client,
            url: url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            min_retry_delay: Duration::from_secs(1),
        })
    }

    /// Number of extra attempts after a transient failure (0 disables retries).
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_min_retry_delay(mut self, delay: Duration) -> Self {
        self.min_retry_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download the sheet and build the normalized base table.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_table(&self) -> Result<BaseTable, FetchError> {
        let rows = self.fetch_rows().await?;
        let table = BaseTable::from_rows(rows)?;
        info!(
            "Loaded {} indicator records across {} units ({} rows rejected)",
            table.records().len(),
            table.units().len(),
            table.rejected_rows()
        );
        Ok(table)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_rows(&self) -> Result<Vec<SheetRow>, FetchError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_retry_delay)
            .with_max_times(self.max_retries);

        let text = (|| self.fetch_text())
            .retry(backoff)
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, delay: Duration| {
                warn!("Sheet download failed ({}), retrying in {:?}", err, delay);
            })
            .await?;

        parse_csv(&text)
    }

    async fn fetch_text(&self) -> Result<String, FetchError> {
        debug!("Sending HTTP request to spreadsheet source");
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus(status));
        }

        // The published export is UTF-8 regardless of what the headers claim
        let bytes = response.bytes().await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        debug!("Retrieved CSV content, size: {} bytes", text.len());
        Ok(text)
    }
}

/// Parse the CSV export. The first line is a header and is only checked
/// for width; any row narrower than [`SHEET_COLUMNS`] rejects the sheet.
#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_csv(text: &str) -> Result<Vec<SheetRow>, FetchError> {
    parse_csv_reader(text.as_bytes())
}

pub fn parse_csv_reader<R: Read>(reader: R) -> Result<Vec<SheetRow>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header_width = reader.headers()?.len();
    if header_width < SHEET_COLUMNS {
        warn!(
            "Sheet header has {} columns, expected {}",
            header_width, SHEET_COLUMNS
        );
        return Err(FetchError::SchemaMismatch {
            line: 1,
            expected: SHEET_COLUMNS,
            found: header_width,
        });
    }
    if header_width > SHEET_COLUMNS {
        debug!(
            "Ignoring {} trailing columns after the month columns",
            header_width - SHEET_COLUMNS
        );
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() < SHEET_COLUMNS {
            warn!(
                "Row at line {} has {} columns, expected {}",
                line,
                record.len(),
                SHEET_COLUMNS
            );
            return Err(FetchError::SchemaMismatch {
                line,
                expected: SHEET_COLUMNS,
                found: record.len(),
            });
        }

        let cell = |idx: usize| {
            record
                .get(idx)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        };

        rows.push(SheetRow {
            line,
            unit: cell(0),
            indicator: cell(1),
            description: cell(2),
            formula: cell(3),
            indicator_type: cell(4),
            periodicity: cell(5),
            annual_goal: cell(6),
            weighting: cell(7),
            months: std::array::from_fn(|month| cell(8 + month)),
        });
    }

    debug!("Parsed {} sheet rows", rows.len());
    Ok(rows)
}
