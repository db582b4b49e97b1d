//! Terminal dialogue: pick fields, a target year and a model, print the
//! forecasts, optionally save charts, repeat until the user leaves.
//!
//! Invalid answers never end the session; the same question is asked again.
//! End of input ends it cleanly.

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::aggregate::Snapshot;
use crate::common::{
    separator, SeriesPoint, Year, ALL_FIELDS, TOP_FIELDS, TOP_WINDOW, YEAR_HORIZON,
};
use crate::config::Config;
use crate::error::{InputError, RenderError};
use crate::forecast::{forecast, ForecastResult, Model, ModelChoice};
use crate::render::{chart_path, render, render_overview};

const MENU_OPTIONS: [&str; 3] = ["1", "2", "q"];
const ASK_LIST: &str = "Show the list of all fields first? (yes/no) [ENTER = no]: ";
const ASK_SAVE: &str = "Save the forecast charts? (yes/no) [ENTER = yes]: ";
const ASK_AGAIN: &str = "Forecast another field? (yes/no) [ENTER = no]: ";

pub struct Session<'a, R, W> {
    snapshot: &'a Snapshot,
    config: &'a Config,
    input: R,
    out: W,
}

enum Flow {
    Again,
    Exit,
}

/// One printed forecast, kept until the chart question is answered.
struct Outcome<'a> {
    field: Option<&'a str>,
    history: &'a [SeriesPoint],
    result: ForecastResult,
}

/// Blank input means `default`; the year must lie in `(last, last + YEAR_HORIZON]`.
pub fn validate_year(raw: &str, last: Year, default: Year) -> Result<Year, InputError> {
    let raw = raw.trim();
    let target = if raw.is_empty() {
        default
    } else {
        raw.parse()
            .map_err(|_| InputError::NotAYear(raw.to_string()))?
    };
    let max = last.saturating_add(YEAR_HORIZON);
    if target <= last {
        return Err(InputError::NotAfterHistory { target, last });
    }
    if target > max {
        return Err(InputError::BeyondHorizon { target, max });
    }
    Ok(target)
}

pub fn parse_yes_no(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "y" | "yes" | "e" | "evet" => Some(true),
        "n" | "no" | "h" | "hayir" | "hayır" => Some(false),
        _ => None,
    }
}

fn label(field: Option<&str>) -> &str {
    field.unwrap_or(ALL_FIELDS)
}

impl<'a, R: BufRead, W: Write> Session<'a, R, W> {
    pub fn new(snapshot: &'a Snapshot, config: &'a Config, input: R, out: W) -> Self {
        Self {
            snapshot,
            config,
            input,
            out,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        if self.snapshot.is_empty() {
            writeln!(self.out, "No publication data was loaded.")?;
        } else {
            self.overview()?;
            while let Flow::Again = self.round()? {}
        }
        writeln!(self.out, "Program ended.")?;
        writeln!(self.out, "{}", separator())?;
        Ok(())
    }

    fn overview(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", separator())?;
        writeln!(
            self.out,
            "{} records, {} fields. Publications per year (all fields):",
            self.snapshot.record_count(),
            self.snapshot.field_count()
        )?;
        for p in self.snapshot.yearly_totals() {
            writeln!(self.out, "{:>6} {:>10}", p.year, p.count)?;
        }
        for (path, res) in render_overview(&self.config.plot_dir, self.snapshot) {
            self.report_chart(&path, res)?;
        }
        Ok(())
    }

    fn round(&mut self) -> io::Result<Flow> {
        writeln!(self.out, "{}", separator())?;
        writeln!(self.out, "Choose how to pick the fields to forecast:")?;
        writeln!(
            self.out,
            "1 - the top {TOP_FIELDS} fields by mean yearly count over the last {TOP_WINDOW} years"
        )?;
        writeln!(self.out, "2 - one or more fields by name (blank = all fields combined)")?;
        writeln!(self.out, "q - quit")?;
        writeln!(self.out, "{}", separator())?;

        let Some(pick) = self.ask_choice("Your choice (1/2/q): ", &MENU_OPTIONS)? else {
            return Ok(Flow::Exit);
        };
        let targets: Vec<Option<String>> = match pick.as_str() {
            "1" => {
                let top = self.snapshot.top_fields(TOP_FIELDS, TOP_WINDOW);
                writeln!(self.out, "{}", separator())?;
                writeln!(self.out, "Top {} fields:", top.len())?;
                for (i, field) in top.iter().enumerate() {
                    writeln!(self.out, "{}. {}", i + 1, field)?;
                }
                top.into_iter().map(Some).collect()
            }
            "2" => match self.ask_fields()? {
                Some(targets) => targets,
                None => return Ok(Flow::Exit),
            },
            _ => return Ok(Flow::Exit),
        };
        if targets.is_empty() {
            writeln!(self.out, "No matching field was found. Please try again.")?;
            return Ok(Flow::Again);
        }

        let Some(last) = targets
            .iter()
            .filter_map(|f| self.snapshot.series(f.as_deref()).ok())
            .filter_map(|s| s.last().map(|p| p.year))
            .max()
        else {
            writeln!(self.out, "There is no data for the chosen fields.")?;
            return Ok(Flow::Again);
        };

        writeln!(self.out, "{}", separator())?;
        let Some(year) = self.ask_year(last)? else {
            return Ok(Flow::Exit);
        };
        let Some(choice) = self.ask_model()? else {
            return Ok(Flow::Exit);
        };

        let outcomes = self.execute(&targets, choice, year)?;
        if outcomes.is_empty() {
            writeln!(self.out, "No forecast could be produced for the chosen fields.")?;
        } else {
            match self.ask_yes_no(ASK_SAVE, true)? {
                Some(true) => self.save_charts(&outcomes, choice)?,
                Some(false) => writeln!(self.out, "Charts were not saved.")?,
                None => return Ok(Flow::Exit),
            }
        }
        writeln!(self.out, "Forecast finished.")?;
        writeln!(self.out, "{}", separator())?;

        match self.ask_yes_no(ASK_AGAIN, false)? {
            Some(true) => Ok(Flow::Again),
            _ => Ok(Flow::Exit),
        }
    }

    /// `None` on end of input; an empty list when nothing matched.
    fn ask_fields(&mut self) -> io::Result<Option<Vec<Option<String>>>> {
        match self.ask_yes_no(ASK_LIST, false)? {
            Some(true) => {
                writeln!(self.out, "{}", separator())?;
                let fields: Vec<String> = self.snapshot.fields().map(str::to_string).collect();
                for field in fields {
                    writeln!(self.out, "{field}")?;
                }
                writeln!(self.out, "{}", separator())?;
            }
            Some(false) => {}
            None => return Ok(None),
        }

        let Some(raw) = self.prompt("Field name(s), comma separated (ENTER = all fields): ")? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(Some(vec![None]));
        }

        let found = self.snapshot.resolve_fields(&raw);
        for item in &found.unmatched {
            writeln!(self.out, "No field matches '{item}', skipped.")?;
        }
        Ok(Some(found.fields.into_iter().map(Some).collect()))
    }

    fn ask_year(&mut self, last: Year) -> io::Result<Option<Year>> {
        let prompt = format!(
            "Target year? ({}-{} | ENTER = {}): ",
            last.saturating_add(1),
            last.saturating_add(YEAR_HORIZON),
            self.config.target_default
        );
        loop {
            let Some(raw) = self.prompt(&prompt)? else {
                return Ok(None);
            };
            match validate_year(&raw, last, self.config.target_default) {
                Ok(year) => return Ok(Some(year)),
                Err(e) => writeln!(self.out, "Invalid year: {e}.")?,
            }
        }
    }

    fn ask_model(&mut self) -> io::Result<Option<ModelChoice>> {
        let prompt = format!(
            "Which model? (trend/linear/both) [ENTER = {}]: ",
            self.config.default_model
        );
        loop {
            let Some(raw) = self.prompt(&prompt)? else {
                return Ok(None);
            };
            if raw.is_empty() {
                return Ok(Some(self.config.default_model));
            }
            match raw.parse::<ModelChoice>() {
                Ok(choice) => return Ok(Some(choice)),
                Err(_) => writeln!(self.out, "Invalid choice. Valid options: trend, linear, both")?,
            }
        }
    }

    fn execute<'s>(
        &mut self,
        targets: &'s [Option<String>],
        choice: ModelChoice,
        year: Year,
    ) -> io::Result<Vec<Outcome<'s>>>
    where
        'a: 's,
    {
        let snapshot: &'a Snapshot = self.snapshot;
        let mut outcomes = Vec::new();
        for target in targets {
            let field = target.as_deref();
            writeln!(self.out, "{}", separator())?;
            writeln!(self.out, "{} ({year}):", label(field))?;

            let history = match snapshot.series(field) {
                Ok(h) => h,
                Err(e) => {
                    writeln!(self.out, "Skipped: {e}.")?;
                    continue;
                }
            };
            for model in choice.models() {
                match forecast(history, model, year) {
                    Ok(result) => {
                        let value = result.predicted_count;
                        info!(field = label(field), %model, year, value, "forecast");
                        writeln!(self.out, "{}", result.line())?;
                        outcomes.push(Outcome {
                            field,
                            history,
                            result,
                        });
                    }
                    Err(e) => writeln!(self.out, "Skipped ({model}): {e}.")?,
                }
            }
        }
        Ok(outcomes)
    }

    fn save_charts(&mut self, outcomes: &[Outcome], choice: ModelChoice) -> io::Result<()> {
        for outcome in outcomes {
            let suffix = match (choice, outcome.result.model) {
                (ModelChoice::Both, Model::Linear) => Some(Model::Linear.label()),
                _ => None,
            };
            let path = chart_path(&self.config.plot_dir, outcome.field, suffix);
            let res = render(&path, outcome.history, &outcome.result);
            self.report_chart(&path, res)?;
        }
        Ok(())
    }

    fn report_chart(&mut self, path: &Path, res: Result<(), RenderError>) -> io::Result<()> {
        match res {
            Ok(()) => writeln!(self.out, "{} saved.", path.display()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "chart not written");
                writeln!(self.out, "Could not save {}: {e}", path.display())
            }
        }
    }

    /// Writes `prompt` and reads one trimmed line; `None` at end of input.
    fn prompt(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.out)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask_choice(&mut self, prompt: &str, options: &[&str]) -> io::Result<Option<String>> {
        loop {
            let Some(raw) = self.prompt(prompt)? else {
                return Ok(None);
            };
            let key = raw.to_lowercase();
            if let Some(opt) = options.iter().find(|o| o.to_lowercase() == key) {
                return Ok(Some(opt.to_string()));
            }
            writeln!(self.out, "Invalid choice. Valid options: {}", options.join(", "))?;
        }
    }

    fn ask_yes_no(&mut self, prompt: &str, default: bool) -> io::Result<Option<bool>> {
        loop {
            let Some(raw) = self.prompt(prompt)? else {
                return Ok(None);
            };
            if raw.is_empty() {
                return Ok(Some(default));
            }
            match parse_yes_no(&raw) {
                Some(answer) => return Ok(Some(answer)),
                None => writeln!(self.out, "Please answer yes or no.")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PublicationRecord;
    use crate::config::SourceConfig;
    use std::path::PathBuf;

    #[test]
    fn blank_year_defaults() {
        assert_eq!(validate_year("", 2024, 2026), Ok(2026));
        assert_eq!(validate_year("  2030 ", 2024, 2026), Ok(2030));
    }

    #[test]
    fn year_must_follow_history() {
        for raw in ["2024", "2000", "-5"] {
            assert!(matches!(
                validate_year(raw, 2024, 2026),
                Err(InputError::NotAfterHistory { last: 2024, .. })
            ));
        }
        assert_eq!(
            validate_year("", 2026, 2026),
            Err(InputError::NotAfterHistory {
                target: 2026,
                last: 2026
            })
        );
    }

    #[test]
    fn year_bounds_and_garbage() {
        assert_eq!(validate_year("2124", 2024, 2026), Ok(2124));
        assert_eq!(
            validate_year("2125", 2024, 2026),
            Err(InputError::BeyondHorizon {
                target: 2125,
                max: 2124
            })
        );
        assert_eq!(
            validate_year("", Year::MAX - 1, 2026),
            Err(InputError::NotAfterHistory {
                target: 2026,
                last: Year::MAX - 1
            })
        );
        assert_eq!(validate_year(&Year::MAX.to_string(), Year::MAX - 1, 2026), Ok(Year::MAX));
        assert_eq!(
            validate_year("20x6", 2024, 2026),
            Err(InputError::NotAYear("20x6".to_string()))
        );
    }

    #[test]
    fn yes_no_words() {
        assert_eq!(parse_yes_no(" Yes"), Some(true));
        assert_eq!(parse_yes_no("e"), Some(true));
        assert_eq!(parse_yes_no("HAYIR"), Some(false));
        assert_eq!(parse_yes_no("n"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    #[test]
    fn missing_field_does_not_stop_the_round() {
        let snapshot = Snapshot::from_records(vec![
            PublicationRecord::new("Chemistry", 2021, 80),
            PublicationRecord::new("Chemistry", 2022, 95),
            PublicationRecord::new("Chemistry", 2023, 110),
        ]);
        let config = Config {
            source: SourceConfig::Csv {
                path: PathBuf::from("unused.csv"),
            },
            year_min: 2016,
            year_max: 2024,
            target_default: 2026,
            default_model: ModelChoice::Single(Model::Trend),
            plot_dir: PathBuf::from("."),
        };
        let targets = vec![Some("Alchemy".to_string()), Some("Chemistry".to_string())];
        let mut out = Vec::new();
        let mut session = Session::new(&snapshot, &config, io::empty(), &mut out);
        let outcomes = session
            .execute(&targets, ModelChoice::Single(Model::Linear), 2026)
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].field, Some("Chemistry"));
        assert_eq!(outcomes[0].result.rounded(), 155);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Skipped: no publication records for 'Alchemy'."));
    }
}
