pub mod linear;
pub mod trend;

use std::{fmt, str::FromStr};

use tracing::debug;

use crate::common::{SeriesPoint, Year};
use crate::error::ForecastError;

pub use linear::LinearFit;
pub use trend::TrendFit;

const EMPTY_INPUT: &str = "the requested series";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Trend,
    Linear,
}

/// What the user asked for at the model prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Single(Model),
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fit {
    Trend(TrendFit),
    Linear(LinearFit),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub model: Model,
    pub target_year: Year,
    pub predicted_count: f64,
    pub fit: Fit,
}

impl Model {
    pub fn label(&self) -> &'static str {
        match self {
            Model::Trend => "trend",
            Model::Linear => "linear",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trend" | "t" | "prophet" => Ok(Model::Trend),
            "linear" | "l" | "lm" => Ok(Model::Linear),
            other => Err(format!("unknown model '{other}'")),
        }
    }
}

impl ModelChoice {
    pub fn models(&self) -> Vec<Model> {
        match self {
            ModelChoice::Single(m) => vec![*m],
            ModelChoice::Both => vec![Model::Trend, Model::Linear],
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelChoice::Single(m) => m.fmt(f),
            ModelChoice::Both => f.write_str("both"),
        }
    }
}

impl FromStr for ModelChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" | "b" => Ok(ModelChoice::Both),
            other => other.parse().map(ModelChoice::Single),
        }
    }
}

impl Fit {
    /// Value of the fitted curve at `year`, before any clipping.
    pub fn eval(&self, year: f64) -> f64 {
        match self {
            Fit::Trend(fit) => fit.trend(year),
            Fit::Linear(fit) => fit.predict(year),
        }
    }
}

impl ForecastResult {
    pub fn rounded(&self) -> i64 {
        self.predicted_count.round() as i64
    }

    pub fn line(&self) -> String {
        format!(
            "Predicted Publication Count ({}): {}",
            self.model,
            self.rounded()
        )
    }
}

pub fn forecast(
    series: &[SeriesPoint],
    model: Model,
    target_year: Year,
) -> Result<ForecastResult, ForecastError> {
    let Some(last) = series.iter().map(|p| p.year).max() else {
        return Err(ForecastError::EmptySeries(EMPTY_INPUT.to_string()));
    };
    if target_year <= last {
        return Err(ForecastError::TargetNotAfterHistory {
            target: target_year,
            last,
        });
    }
    let target = f64::from(target_year);

    let (predicted_count, fit) = match model {
        Model::Trend => {
            let fit = TrendFit::fit(series)?;
            debug!(
                changepoints = ?fit.changepoint_years(),
                final_slope = fit.final_slope(),
                "trend fitted"
            );
            (fit.predict(target), Fit::Trend(fit))
        }
        Model::Linear => {
            let fit = LinearFit::fit(series)?;
            (fit.predict(target), Fit::Linear(fit))
        }
    };
    if !predicted_count.is_finite() {
        return Err(ForecastError::Numerical(format!(
            "{model} forecast for {target_year} is not finite"
        )));
    }
    debug!(%model, target_year, predicted_count, points = series.len(), "forecast");

    Ok(ForecastResult {
        model,
        target_year,
        predicted_count,
        fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chemistry() -> Vec<SeriesPoint> {
        vec![
            SeriesPoint { year: 2021, count: 80 },
            SeriesPoint { year: 2022, count: 95 },
            SeriesPoint { year: 2023, count: 110 },
        ]
    }

    #[test]
    fn dispatches_linear() {
        let result = forecast(&chemistry(), Model::Linear, 2026).unwrap();
        assert_eq!(result.predicted_count, 155.0);
        assert_eq!(
            result.line(),
            "Predicted Publication Count (linear): 155"
        );
        assert!(matches!(result.fit, Fit::Linear(_)));
    }

    #[test]
    fn dispatches_trend() {
        let result = forecast(&chemistry(), Model::Trend, 2026).unwrap();
        assert!((result.predicted_count - 155.0).abs() < 1e-6);
        assert_eq!(result.rounded(), 155);
        assert!(matches!(result.fit, Fit::Trend(_)));
    }

    #[test]
    fn rejects_past_target() {
        for target in [2021, 2023] {
            assert_eq!(
                forecast(&chemistry(), Model::Linear, target),
                Err(ForecastError::TargetNotAfterHistory { target, last: 2023 })
            );
        }
    }

    #[test]
    fn empty_series_is_rejected() {
        for model in [Model::Trend, Model::Linear] {
            assert!(matches!(
                forecast(&[], model, 2026),
                Err(ForecastError::EmptySeries(_))
            ));
        }
    }

    #[test]
    fn single_year_is_insufficient() {
        let one = [SeriesPoint { year: 2023, count: 5 }];
        assert_eq!(
            forecast(&one, Model::Linear, 2026),
            Err(ForecastError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn fit_eval_matches_prediction() {
        let result = forecast(&chemistry(), Model::Linear, 2030).unwrap();
        assert_eq!(result.fit.eval(2030.0), result.predicted_count);
    }

    #[test]
    fn parses_choices() {
        assert_eq!("lm".parse::<ModelChoice>(), Ok(ModelChoice::Single(Model::Linear)));
        assert_eq!(" Prophet ".parse::<ModelChoice>(), Ok(ModelChoice::Single(Model::Trend)));
        assert_eq!("BOTH".parse::<ModelChoice>(), Ok(ModelChoice::Both));
        assert!("arima".parse::<ModelChoice>().is_err());
        assert_eq!(ModelChoice::Both.models(), vec![Model::Trend, Model::Linear]);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let mut result = forecast(&chemistry(), Model::Linear, 2026).unwrap();
        result.predicted_count = 12.5;
        assert_eq!(result.rounded(), 13);
        result.predicted_count = 12.49;
        assert_eq!(result.rounded(), 12);
    }
}
