//! Command line interface of the `jinjacraft` binary.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::data::DataFormat;
use crate::emit::ModelFormat;
use crate::error::{Error, Result};
use crate::generate;
use crate::logging::LogFormat;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "jinjacraft",
    version,
    about = "Render Jinja templates from YAML or JSON data, or generate a data model from a template"
)]
pub struct Cli {
    /// Data file path
    #[arg(
        value_name = "DATA_FILE",
        required_unless_present = "generate_model",
        conflicts_with = "generate_model"
    )]
    pub data_file: Option<PathBuf>,

    /// Template file path
    #[arg(
        value_name = "TEMPLATE_FILE",
        required_unless_present = "generate_model",
        conflicts_with = "generate_model"
    )]
    pub template_file: Option<PathBuf>,

    /// Generate a model data file from TEMPLATE instead of rendering
    #[arg(short = 'g', long = "generate-model", value_name = "TEMPLATE")]
    pub generate_model: Option<PathBuf>,

    /// Output file path (rendered output, or the generated model)
    #[arg(short = 'o', long = "output_file", visible_alias = "output-file")]
    pub output_file: Option<PathBuf>,

    /// Overwrite an existing model file
    #[arg(short, long, requires = "generate_model")]
    pub force: bool,

    /// Data file or model format
    #[arg(long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,

    /// Render without checking the data against the template's variables
    #[arg(long)]
    pub skip_validation: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl From<Format> for DataFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Yaml => DataFormat::Yaml,
            Format::Json => DataFormat::Json,
        }
    }
}

impl From<Format> for ModelFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Yaml => ModelFormat::Yaml,
            Format::Json => ModelFormat::Json,
        }
    }
}

impl Cli {
    pub fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// Run the CLI.
///
/// # Errors
///
/// Returns the first error hit while reading inputs, analyzing, validating,
/// rendering, or writing output.
pub fn run(cli: Cli) -> Result<()> {
    if let Some(template) = &cli.generate_model {
        let path = generate::generate_model_file(
            template,
            cli.output_file.as_deref(),
            cli.force,
            cli.format.into(),
        )?;
        println!("Model file generated: {}", path.display());
        return Ok(());
    }

    let (Some(data_file), Some(template_file)) = (&cli.data_file, &cli.template_file) else {
        return Err(Error::TemplateFile(
            "Both DATA_FILE and TEMPLATE_FILE are required".to_string(),
        ));
    };
    let rendered = generate::render_files(
        data_file,
        template_file,
        cli.format.into(),
        !cli.skip_validation,
    )?;
    match &cli.output_file {
        Some(path) => generate::write_output(&rendered, path),
        None => write_stdout(&rendered),
    }
}

fn write_stdout(out: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(out.as_bytes()).and_then(|()| stdout.flush()) {
        // A closed pipe (e.g. `| head`) is not a failure.
        Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => {
            Err(Error::OutputFile(format!("Cannot write to stdout: {err}")))
        }
        _ => Ok(()),
    }
}
