use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use sqlx::any::AnyPoolOptions;
use tqdm::Iter;
use tracing::{info, warn};

use crate::common::{get_buf, PublicationRecord, Year};
use crate::config::{Config, SourceConfig};
use crate::error::SourceError;

/// Where the (field, year, count) rows come from. Read once per run.
pub trait DataSource {
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<PublicationRecord>, SourceError>;
}

/// Runs one parameterized query; `$1` and `$2` are bound to the year window.
pub struct SqlSource {
    url: String,
    query: String,
    years: (Year, Year),
}

/// Headers `field,year,count`; `.gz` files are read through a decoder.
pub struct CsvSource {
    path: PathBuf,
    years: (Year, Year),
}

pub fn from_config(config: &Config) -> Box<dyn DataSource> {
    let years = (config.year_min, config.year_max);
    match &config.source {
        SourceConfig::Sql { url, query } => Box::new(SqlSource::new(url, query, years)),
        SourceConfig::Csv { path } => Box::new(CsvSource::new(path, years)),
    }
}

impl SqlSource {
    pub fn new(url: &str, query: &str, years: (Year, Year)) -> Self {
        Self {
            url: url.to_string(),
            query: query.to_string(),
            years,
        }
    }

    async fn fetch_rows(&self) -> Result<Vec<(Option<String>, i64, i64)>, SourceError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&self.url)
            .await?;
        let rows = sqlx::query_as::<_, (Option<String>, i64, i64)>(&self.query)
            .bind(i64::from(self.years.0))
            .bind(i64::from(self.years.1))
            .fetch_all(&pool)
            .await;
        pool.close().await;
        Ok(rows?)
    }
}

impl DataSource for SqlSource {
    fn describe(&self) -> String {
        // credentials stay out of logs
        let scheme = self.url.split(':').next().unwrap_or("sql");
        format!("{scheme} database")
    }

    fn fetch(&self) -> Result<Vec<PublicationRecord>, SourceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let rows = runtime.block_on(self.fetch_rows())?;

        let mut skipped = 0;
        let mut records = Vec::with_capacity(rows.len());
        for (field, year, count) in rows {
            let Some(field) = field else {
                skipped += 1;
                continue;
            };
            records.push(to_record(field, year, count)?);
        }
        if skipped > 0 {
            warn!(skipped, "rows without a field name were ignored");
        }
        finish(records, &self.describe())
    }
}

impl CsvSource {
    pub fn new(path: &Path, years: (Year, Year)) -> Self {
        Self {
            path: path.to_path_buf(),
            years,
        }
    }
}

impl DataSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    fn fetch(&self) -> Result<Vec<PublicationRecord>, SourceError> {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(get_buf(&self.path)?);

        let mut records = Vec::new();
        for line in rdr.deserialize::<PublicationRecord>().tqdm().desc(Some("records")) {
            let rec = line?;
            if (self.years.0..=self.years.1).contains(&rec.year) {
                records.push(rec);
            }
        }
        finish(records, &self.describe())
    }
}

fn to_record(field: String, year: i64, count: i64) -> Result<PublicationRecord, SourceError> {
    let year = Year::try_from(year)
        .map_err(|_| SourceError::InvalidRow(format!("{field}: year {year} out of range")))?;
    let count = u64::try_from(count)
        .map_err(|_| SourceError::InvalidRow(format!("{field}: negative count {count}")))?;
    Ok(PublicationRecord { field, year, count })
}

fn finish(
    records: Vec<PublicationRecord>,
    source: &str,
) -> Result<Vec<PublicationRecord>, SourceError> {
    if records.is_empty() {
        return Err(SourceError::NoRows);
    }
    info!(rows = records.len(), source, "fetched publication counts");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_rows() {
        assert_eq!(
            to_record("Chemistry".to_string(), 2021, 80).unwrap(),
            PublicationRecord::new("Chemistry", 2021, 80)
        );
        assert!(matches!(
            to_record("Chemistry".to_string(), 2021, -1),
            Err(SourceError::InvalidRow(_))
        ));
        assert!(matches!(
            to_record("Chemistry".to_string(), i64::MAX, 1),
            Err(SourceError::InvalidRow(_))
        ));
    }

    #[test]
    fn hides_credentials() {
        let src = SqlSource::new("postgres://u:secret@h/db", "SELECT 1", (2016, 2024));
        assert_eq!(src.describe(), "postgres database");
    }

    #[test]
    fn missing_csv_is_io_error() {
        let src = CsvSource::new(Path::new("/nonexistent/pubcast.csv"), (2016, 2024));
        assert!(matches!(src.fetch(), Err(SourceError::Io(_))));
    }
}
