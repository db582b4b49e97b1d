//! Piecewise-linear trend decomposition.
//!
//! The series is modelled additively as `trend + seasonal`. Yearly counts have
//! no sub-yearly season, so only the trend is fitted: a line whose slope may
//! change at a set of candidate changepoints spread over the first part of the
//! history. Slope changes are shrunk towards zero, so a series without breaks
//! comes out as a plain line and a real break bends the trend only as much as
//! the data demands. Forecasts continue the last segment.

use hashbrown::HashSet;

use crate::common::SeriesPoint;
use crate::error::ForecastError;

use super::linear::MIN_YEARS;

const CHANGEPOINT_RANGE: f64 = 0.8;
const MAX_CHANGEPOINTS: usize = 25;
const CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
const MIN_NOISE_VAR: f64 = 1e-4;
const PIVOT_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendFit {
    first_year: f64,
    span: f64,
    scale: f64,
    offset: f64,
    slope: f64,
    changepoints: Vec<f64>,
    deltas: Vec<f64>,
}

impl TrendFit {
    pub fn fit(points: &[SeriesPoint]) -> Result<Self, ForecastError> {
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.year);

        let distinct = sorted.iter().map(|p| p.year).collect::<HashSet<_>>().len();
        if distinct < MIN_YEARS {
            return Err(ForecastError::InsufficientData {
                required: MIN_YEARS,
                actual: distinct,
            });
        }

        let first_year = f64::from(sorted[0].year);
        let span = f64::from(sorted[sorted.len() - 1].year) - first_year;
        let scale = match sorted.iter().map(|p| p.count).max() {
            Some(0) | None => 1.0,
            Some(m) => m as f64,
        };

        let ts: Vec<f64> = sorted
            .iter()
            .map(|p| (f64::from(p.year) - first_year) / span)
            .collect();
        let ys: Vec<f64> = sorted.iter().map(|p| p.count as f64 / scale).collect();

        let changepoints = changepoints(&ts);
        let penalty = noise_var(&ts, &ys).max(MIN_NOISE_VAR)
            / (CHANGEPOINT_PRIOR_SCALE * CHANGEPOINT_PRIOR_SCALE);

        // design row: [1, t, (t - s_1)+, ..., (t - s_c)+]
        let width = 2 + changepoints.len();
        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (t, y) in ts.iter().zip(ys.iter()) {
            let row = design_row(*t, &changepoints);
            for i in 0..width {
                rhs[i] += row[i] * y;
                for j in 0..width {
                    gram[i][j] += row[i] * row[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate().skip(2) {
            row[i] += penalty;
        }

        let theta = solve(gram, rhs)?;
        Ok(Self {
            first_year,
            span,
            scale,
            offset: theta[0],
            slope: theta[1],
            deltas: theta[2..].to_vec(),
            changepoints,
        })
    }

    /// Trend value at `year`, in counts. Not clipped.
    pub fn trend(&self, year: f64) -> f64 {
        let t = (year - self.first_year) / self.span;
        let bends: f64 = self
            .changepoints
            .iter()
            .zip(self.deltas.iter())
            .map(|(s, d)| d * (t - s).max(0.0))
            .sum();
        (self.offset + self.slope * t + bends) * self.scale
    }

    pub fn predict(&self, year: f64) -> f64 {
        self.trend(year).max(0.0)
    }

    /// Years at which the trend is allowed to change slope.
    pub fn changepoint_years(&self) -> Vec<f64> {
        self.changepoints
            .iter()
            .map(|s| self.first_year + s * self.span)
            .collect()
    }

    /// Growth per year of the final segment.
    pub fn final_slope(&self) -> f64 {
        (self.slope + self.deltas.iter().sum::<f64>()) * self.scale / self.span
    }
}

/// Candidates sit on observed points strictly inside the first
/// `CHANGEPOINT_RANGE` share of the history, evenly spaced by index.
fn changepoints(ts: &[f64]) -> Vec<f64> {
    let hist = ((ts.len() as f64) * CHANGEPOINT_RANGE).floor() as usize;
    let count = MAX_CHANGEPOINTS.min(hist.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let mut idxs: Vec<usize> = (1..=count)
        .map(|i| ((i * (hist - 1)) as f64 / count as f64).round() as usize)
        .collect();
    idxs.dedup();
    idxs.into_iter().map(|i| ts[i]).collect()
}

fn design_row(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(1.0);
    row.push(t);
    row.extend(changepoints.iter().map(|s| (t - s).max(0.0)));
    row
}

/// Residual variance of a straight line through the scaled points.
fn noise_var(ts: &[f64], ys: &[f64]) -> f64 {
    let n = ts.len() as f64;
    let mt = ts.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut cov, mut var) = (0.0, 0.0);
    for (t, y) in ts.iter().zip(ys.iter()) {
        cov += (t - mt) * (y - my);
        var += (t - mt) * (t - mt);
    }
    let slope = cov / var;
    ts.iter()
        .zip(ys.iter())
        .map(|(t, y)| {
            let r = y - (my + slope * (t - mt));
            r * r
        })
        .sum::<f64>()
        / n
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ForecastError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPS {
            return Err(ForecastError::Numerical(
                "singular system in trend fit".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
