//! Tribunal command-line interface.
//!
//! Exit codes: 0 when the verdict passed, 2 when it failed, 1 on fatal errors.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use tribunal::config::TribunalConfig;
use tribunal::error::{TribunalError, TribunalResult};
use tribunal::logging;
use tribunal::pipeline::PipelineBuilder;
use tribunal::replay::Fixture;
use tribunal::report::render_text;
use tribunal::state::RunInput;

#[derive(Parser, Debug)]
#[command(name = "tribunal", version, about = "Staged evidence pipeline with adjudicated verdicts")]
struct Cli {
    #[arg(long, global = true, help = "TOML configuration file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline over recorded collector and scorer outputs.
    Run {
        #[arg(long, help = "Absolute URL of the repository under audit")]
        subject: String,
        #[arg(long = "doc", help = "Accompanying document (repeatable)")]
        docs: Vec<String>,
        #[arg(long, help = "Replay fixture (JSON)")]
        replay: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, help = "Write the report to this file instead of stdout")]
        out: Option<PathBuf>,
    },
    /// Load, validate and print the effective configuration.
    CheckConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            if err.is_validation() {
                tracing::error!(error = %err, "invalid configuration or input");
            } else {
                tracing::error!(error = %err, "fatal");
            }
            eprintln!("error: {err}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Exit status for an error that escaped a run: 1 when no verdict could be
/// produced, 2 for faults that only degrade a verdict.
fn exit_status(err: &TribunalError) -> u8 {
    if err.is_fatal() {
        1
    } else {
        2
    }
}

fn execute(cli: Cli) -> TribunalResult<ExitCode> {
    let loaded = TribunalConfig::load(cli.config.as_deref())?;
    logging::init(&loaded.config.logging);
    if let Some(source) = &loaded.source {
        tracing::info!(path = %source.display(), "configuration loaded");
    }
    for diagnostic in &loaded.diagnostics {
        tracing::info!("{diagnostic}");
    }
    let config = loaded.config;

    match cli.command {
        Commands::CheckConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            subject,
            docs,
            replay,
            format,
            out,
        } => {
            let fixture = Fixture::load(&replay)?;
            let scale = config.score;
            let pipeline = fixture.register(PipelineBuilder::new().with_config(config)).build()?;

            let mut input = RunInput::new(subject);
            for doc in docs {
                input = input.with_document(doc);
            }
            let outcome = pipeline.run(input);

            let rendered = match format {
                OutputFormat::Text => render_text(&outcome.verdict, scale),
                OutputFormat::Json => serde_json::to_string_pretty(&outcome.verdict)
                    .map_err(|e| TribunalError::internal(format!("verdict serialization failed: {e}")))?,
            };
            emit(&rendered, out.as_deref())?;

            Ok(if outcome.verdict.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

fn emit(text: &str, out: Option<&Path>) -> TribunalResult<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).map_err(|e| TribunalError::io(path.display().to_string(), e))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| TribunalError::io("<stdout>", e))?;
        }
    }
    Ok(())
}
