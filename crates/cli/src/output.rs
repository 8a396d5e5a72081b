//! CLI output formatting

use serde::Serialize;
use skillsmith_core::pipeline::{RunSummary, StageStatus};
use skillsmith_core::Result;
use std::io::{self, Write};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable status lines
    #[default]
    Pretty,
    /// Machine-readable JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Pretty => write!(f, "pretty"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Formatter over a writer, defaulting to stdout
pub struct OutputFormatter {
    format: OutputFormat,
    writer: Box<dyn Write + Send>,
}

impl OutputFormatter {
    /// Create a formatter for the chosen format
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            writer: Box::new(io::stdout()),
        }
    }

    /// Create a formatter with a custom writer
    pub fn with_writer<W: Write + Send + 'static>(format: OutputFormat, writer: W) -> Self {
        Self {
            format,
            writer: Box::new(writer),
        }
    }

    /// Print a pipeline run summary
    pub fn summary(&mut self, summary: &RunSummary) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.json(summary),
            OutputFormat::Pretty => {
                writeln!(self.writer, "run {} ({})", summary.run_id, summary.fingerprint)?;
                for stage in &summary.stages {
                    writeln!(
                        self.writer,
                        "  {:<14} {:<7} {:>7.1}s  {}",
                        stage.stage,
                        status_label(stage.status),
                        stage.duration_seconds,
                        stage.detail
                    )?;
                }
                if let Some(dir) = &summary.output_dir {
                    writeln!(self.writer, "  output: {}", dir.display())?;
                }
                if summary.basic_quality {
                    writeln!(self.writer, "  note: index enhancement skipped (basic quality)")?;
                }
                if let Some(error) = &summary.error {
                    writeln!(self.writer, "  FAILED: {}", error)?;
                }
                Ok(())
            }
        }
    }

    /// Print provider availability rows
    pub fn providers(&mut self, rows: &[ProviderRow]) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.json(&rows),
            OutputFormat::Pretty => {
                for row in rows {
                    let status = if row.available {
                        "available".to_string()
                    } else {
                        format!("unavailable ({})", row.reason)
                    };
                    writeln!(self.writer, "  {:<12} {}", row.name, status)?;
                }
                Ok(())
            }
        }
    }

    /// Print any serializable value as JSON
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }
}

/// One provider availability row
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRow {
    pub name: String,
    pub available: bool,
    pub reason: String,
}

fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Cached => "cached",
        StageStatus::Ran => "ran",
        StageStatus::Failed => "FAILED",
        StageStatus::Skipped => "skipped",
    }
}
