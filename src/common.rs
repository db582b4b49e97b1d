use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use flate2::read::GzDecoder;
use serde::Deserialize;

pub type Year = i32;
pub type Count = u64;

pub const TARGET_DEFAULT: Year = 2026;
pub const YEAR_MIN: Year = 2016;
pub const YEAR_MAX: Year = 2024;
pub const YEAR_HORIZON: Year = 100;

pub const TOP_FIELDS: usize = 10;
pub const HEATMAP_FIELDS: usize = 20;
pub const TOP_WINDOW: Year = 5;

pub const ALL_FIELDS: &str = "all";
pub const SEPARATOR_WIDTH: usize = 60;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub field: String,
    pub year: Year,
    pub count: Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub year: Year,
    pub count: Count,
}

impl PublicationRecord {
    pub fn new(field: &str, year: Year, count: Count) -> Self {
        Self {
            field: field.to_string(),
            year,
            count,
        }
    }
}

impl SeriesPoint {
    pub fn xy(&self) -> (f64, f64) {
        (f64::from(self.year), self.count as f64)
    }
}

pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// Opens a file for buffered reading, decompressing it when the name ends in `.gz`.
pub fn get_buf(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
