use std::io::{BufRead, Write};

pub mod aggregate;
pub mod common;
pub mod config;
pub mod error;
pub mod forecast;
pub mod render;
pub mod session;
pub mod source;

use aggregate::Snapshot;
use config::Config;
use error::RunError;
use session::Session;
use source::from_config;

/// Loads the counts once, then hands the terminal to the dialogue.
pub fn runner<R: BufRead, W: Write>(config: &Config, input: R, out: W) -> Result<(), RunError> {
    let source = from_config(config);
    tracing::info!(source = %source.describe(), "loading publication counts");
    let snapshot = Snapshot::from_records(source.fetch()?);
    Session::new(&snapshot, config, input, out).run()?;
    Ok(())
}
