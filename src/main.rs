use std::io::{self, Read, Write};
use std::process::ExitCode;

use anyhow::Context;
use langlang::config::PipelineConfig;
use langlang::{wire, ParsedProgram, Pipeline, PipelineError};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read program from stdin")?;

    match evaluate(&input) {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{output}")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            match err.location() {
                Some(location) => eprintln!("{} at {location}: {err}", err.kind()),
                None => eprintln!("{}: {err}", err.kind()),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn evaluate(input: &str) -> Result<String, PipelineError> {
    let config = PipelineConfig::load_from_env()?;
    let program: ParsedProgram = wire::from_str(input)?;
    let value = Pipeline::new(config).run(&program)?;
    let output = serde_json::to_string_pretty(&value).map_err(wire::WireError::from)?;
    Ok(output)
}
