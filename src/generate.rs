//! File-level operations: model generation and template rendering.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::analyze;
use crate::data::{self, DataFormat};
use crate::emit::{self, ModelFormat};
use crate::error::{Error, Result};
use crate::eval;
use crate::validate;

/// Generate the placeholder document for template `source`.
pub fn generate_model(source: &str, format: ModelFormat) -> Result<String> {
    let model = analyze::analyze(source)?;
    debug!(keys = model.len(), ?format, "analyzed template");
    emit::emit(&model, format.emission())
}

/// `template` with its extension replaced by the one of `format`.
pub fn default_model_path(template: &Path, format: ModelFormat) -> PathBuf {
    template.with_extension(format.extension())
}

/// Generate a model file next to `template` (or at `output`) and return its path.
///
/// An existing output file is only replaced when `force` is set.
pub fn generate_model_file(
    template: &Path,
    output: Option<&Path>,
    force: bool,
    format: ModelFormat,
) -> Result<PathBuf> {
    let output = output.map_or_else(|| default_model_path(template, format), Path::to_path_buf);
    if output.exists() && !force {
        return Err(Error::ModelGeneration(format!(
            "Output file already exists: {}. Use --force to overwrite.",
            output.display()
        )));
    }

    let source = std::fs::read_to_string(template).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => {
            Error::ModelGeneration(format!("Template file not found: {}", template.display()))
        }
        std::io::ErrorKind::PermissionDenied => {
            Error::ModelGeneration(format!("Permission denied: {}", template.display()))
        }
        _ => Error::ModelGeneration(format!("Cannot read {}: {err}", template.display())),
    })?;

    let content = generate_model(&source, format)?;
    std::fs::write(&output, content).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => {
            Error::ModelGeneration(format!("Permission denied: {}", output.display()))
        }
        _ => Error::ModelGeneration(format!("Cannot write {}: {err}", output.display())),
    })?;
    info!(path = %output.display(), "model file generated");
    Ok(output)
}

/// Load a template file for rendering.
pub fn load_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => {
            Error::TemplateFile(format!("Template file not found: {}", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => {
            Error::TemplateFile(format!("Permission denied: {}", path.display()))
        }
        _ => Error::TemplateFile(format!("Cannot read template file {}: {err}", path.display())),
    })
}

/// Render `template_file` with the data of `data_file`, optionally checking
/// the data against the template's variables first.
pub fn render_files(
    data_file: &Path,
    template_file: &Path,
    format: DataFormat,
    validate: bool,
) -> Result<String> {
    let data = data::load_data(data_file, format)?;
    let source = load_template(template_file)?;
    if validate {
        let unused = validate::validate(&source, &data)?;
        debug!(unused = unused.len(), "data validated");
    }
    eval::render(&source, &data)
}

/// Write rendered output to `path`.
pub fn write_output(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => {
            Error::OutputFile(format!("Permission denied: {}", path.display()))
        }
        _ => Error::OutputFile(format!("Cannot write output file {}: {err}", path.display())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_swaps_extension() {
        assert_eq!(
            default_model_path(Path::new("templates/page.j2"), ModelFormat::Yaml),
            PathBuf::from("templates/page.yaml")
        );
        assert_eq!(
            default_model_path(Path::new("page.html.j2"), ModelFormat::Json),
            PathBuf::from("page.html.json")
        );
        assert_eq!(
            default_model_path(Path::new("README"), ModelFormat::Json),
            PathBuf::from("README.json")
        );
    }

    #[test]
    fn empty_json_model() {
        assert_eq!(generate_model("plain text", ModelFormat::Json).unwrap(), "{}\n");
    }
}
