use hashbrown::HashSet;

use crate::common::SeriesPoint;
use crate::error::ForecastError;

pub const MIN_YEARS: usize = 2;

/// Least-squares line through (year, count): `count = slope * year + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// slope = cov(year, count) / var(year), intercept = mean(count) - slope * mean(year)
    pub fn fit(points: &[SeriesPoint]) -> Result<Self, ForecastError> {
        let distinct = points.iter().map(|p| p.year).collect::<HashSet<_>>().len();
        if distinct < MIN_YEARS {
            return Err(ForecastError::InsufficientData {
                required: MIN_YEARS,
                actual: distinct,
            });
        }

        let n = points.len() as f64;
        let (sum_x, sum_y) = points.iter().map(SeriesPoint::xy).fold((0.0, 0.0), |acc, (x, y)| {
            (acc.0 + x, acc.1 + y)
        });
        let (mean_x, mean_y) = (sum_x / n, sum_y / n);

        let mut cov = 0.0;
        let mut var = 0.0;
        for (x, y) in points.iter().map(SeriesPoint::xy) {
            cov += (x - mean_x) * (y - mean_y);
            var += (x - mean_x) * (x - mean_x);
        }

        let slope = cov / var;
        Ok(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, year: f64) -> f64 {
        self.slope * year + self.intercept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(pairs: &[(i32, u64)]) -> Vec<SeriesPoint> {
        pairs
            .iter()
            .map(|&(year, count)| SeriesPoint { year, count })
            .collect()
    }

    #[test]
    fn chemistry_closed_form() {
        let fit = LinearFit::fit(&points(&[(2021, 80), (2022, 95), (2023, 110)])).unwrap();
        assert_eq!(fit.slope, 15.0);
        assert_eq!(fit.intercept, -30235.0);
        assert_eq!(fit.predict(2026.0), 155.0);
    }

    #[test]
    fn matches_normal_equations() {
        let series = points(&[(2016, 12), (2017, 30), (2018, 22), (2019, 41), (2021, 39)]);
        let fit = LinearFit::fit(&series).unwrap();

        let n = series.len() as f64;
        let sx: f64 = series.iter().map(|p| p.xy().0).sum();
        let sy: f64 = series.iter().map(|p| p.xy().1).sum();
        let sxx: f64 = series.iter().map(|p| p.xy().0 * p.xy().0).sum();
        let sxy: f64 = series.iter().map(|p| p.xy().0 * p.xy().1).sum();
        let slope = (n * sxy - sx * sy) / (n * sxx - sx * sx);
        let intercept = (sy - slope * sx) / n;

        assert!((fit.slope - slope).abs() < 1e-6);
        assert!((fit.predict(2030.0) - (slope * 2030.0 + intercept)).abs() < 1e-3);
    }

    #[test]
    fn repeatable() {
        let series = points(&[(2018, 7), (2019, 3), (2020, 19), (2021, 4)]);
        let a = LinearFit::fit(&series).unwrap().predict(2027.0);
        let b = LinearFit::fit(&series).unwrap().predict(2027.0);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn one_year_is_not_enough() {
        assert_eq!(
            LinearFit::fit(&points(&[(2020, 5)])),
            Err(ForecastError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
        assert_eq!(
            LinearFit::fit(&[]),
            Err(ForecastError::InsufficientData {
                required: 2,
                actual: 0
            })
        );
    }

    #[test]
    fn negative_extrapolation_is_not_clipped() {
        let fit = LinearFit::fit(&points(&[(2020, 30), (2021, 20), (2022, 10)])).unwrap();
        assert_eq!(fit.predict(2025.0), -20.0);
    }
}
