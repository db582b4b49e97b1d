use std::collections::BTreeMap;

use deunicode::deunicode;
use hashbrown::HashMap;
use tracing::info;

use crate::common::{Count, PublicationRecord, SeriesPoint, Year, ALL_FIELDS};
use crate::error::ForecastError;

/// Yearly publication counts per field, built once from the fetched records.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    series: BTreeMap<String, Vec<SeriesPoint>>,
    totals: Vec<SeriesPoint>,
    record_count: usize,
}

/// Outcome of matching user input against the known field names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMatch {
    pub fields: Vec<String>,
    pub unmatched: Vec<String>,
}

impl Snapshot {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PublicationRecord>,
    {
        let mut by_field: HashMap<String, BTreeMap<Year, Count>> = HashMap::new();
        let mut totals: BTreeMap<Year, Count> = BTreeMap::new();
        let mut record_count = 0;

        for rec in records {
            record_count += 1;
            let cell = by_field
                .entry(rec.field)
                .or_default()
                .entry(rec.year)
                .or_insert(0);
            *cell = cell.saturating_add(rec.count);
            let total = totals.entry(rec.year).or_insert(0);
            *total = total.saturating_add(rec.count);
        }

        let series = by_field
            .into_iter()
            .map(|(field, years)| (field, to_points(years)))
            .collect();
        let snapshot = Self {
            series,
            totals: to_points(totals),
            record_count,
        };
        info!(
            records = snapshot.record_count,
            fields = snapshot.series.len(),
            last_year = ?snapshot.last_year(),
            "snapshot built"
        );
        snapshot
    }

    /// `None` is every field summed per year.
    pub fn series(&self, field: Option<&str>) -> Result<&[SeriesPoint], ForecastError> {
        let points = match field {
            None => self.totals.as_slice(),
            Some(f) => self.series.get(f).map(Vec::as_slice).unwrap_or(&[]),
        };
        if points.is_empty() {
            return Err(ForecastError::EmptySeries(
                field.unwrap_or(ALL_FIELDS).to_string(),
            ));
        }
        Ok(points)
    }

    pub fn yearly_totals(&self) -> &[SeriesPoint] {
        &self.totals
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.series.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn last_year(&self) -> Option<Year> {
        self.totals.last().map(|p| p.year)
    }

    /// Fields ranked by mean yearly count over the last `window` years of the data.
    pub fn top_fields(&self, n: usize, window: Year) -> Vec<String> {
        let Some(last) = self.last_year() else {
            return Vec::new();
        };
        let start = last - window + 1;

        let mut means: Vec<(&String, f64)> = self
            .series
            .iter()
            .filter_map(|(field, points)| {
                let recent: Vec<Count> = points
                    .iter()
                    .filter(|p| p.year >= start)
                    .map(|p| p.count)
                    .collect();
                if recent.is_empty() {
                    return None;
                }
                let mean = recent.iter().sum::<Count>() as f64 / recent.len() as f64;
                Some((field, mean))
            })
            .collect();
        means.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        means
            .into_iter()
            .take(n)
            .map(|(field, _)| field.clone())
            .collect()
    }

    /// Fields with the largest count summed over every year, largest first.
    pub fn ranked_by_total(&self, n: usize) -> Vec<(String, Count)> {
        let mut sums: Vec<(&String, Count)> = self
            .series
            .iter()
            .map(|(field, points)| {
                let sum = points.iter().fold(0, |acc: Count, p| acc.saturating_add(p.count));
                (field, sum)
            })
            .collect();
        sums.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sums.into_iter()
            .take(n)
            .map(|(field, sum)| (field.clone(), sum))
            .collect()
    }

    /// Counts of `fields` (rows) over every year in the snapshot (columns),
    /// zero where a field has no record for the year.
    pub fn year_matrix(&self, fields: &[String]) -> (Vec<Year>, Vec<Vec<Count>>) {
        let years: Vec<Year> = self.totals.iter().map(|p| p.year).collect();
        let rows = fields
            .iter()
            .map(|field| {
                let points = self.series.get(field).map(Vec::as_slice).unwrap_or(&[]);
                years
                    .iter()
                    .map(|y| {
                        points
                            .binary_search_by_key(y, |p| p.year)
                            .map(|i| points[i].count)
                            .unwrap_or(0)
                    })
                    .collect()
            })
            .collect();
        (years, rows)
    }

    /// Comma-separated names; an exact (normalized) name wins, otherwise the
    /// first field containing the item.
    pub fn resolve_fields(&self, query: &str) -> FieldMatch {
        let normalized: Vec<(String, &String)> = self
            .series
            .keys()
            .map(|f| (normalize(f), f))
            .collect();

        let mut out = FieldMatch::default();
        for item in query.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let needle = normalize(item);
            let hit = normalized
                .iter()
                .find(|(n, _)| *n == needle)
                .or_else(|| normalized.iter().find(|(n, _)| n.contains(&needle)));
            match hit {
                Some((_, field)) => {
                    if !out.fields.contains(field) {
                        out.fields.push((*field).clone());
                    }
                }
                None => out.unmatched.push(item.to_string()),
            }
        }
        out
    }
}

fn to_points(years: BTreeMap<Year, Count>) -> Vec<SeriesPoint> {
    years
        .into_iter()
        .map(|(year, count)| SeriesPoint { year, count })
        .collect()
}

fn normalize(name: &str) -> String {
    deunicode(name).trim().to_lowercase()
}
