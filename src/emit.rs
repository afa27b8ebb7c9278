//! Serialize a shape model into a placeholder document.

use crate::error::{Error, Result};
use crate::shape::{Model, Shape};

const NO_VARIABLES: &str = "# No variables found in template\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Indented YAML with a type comment after every key.
    Annotated,
    /// Pretty-printed JSON, condition markers stripped.
    Plain,
}

/// Encoding of a generated model file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    #[default]
    Yaml,
    Json,
}

impl ModelFormat {
    pub fn emission(self) -> Emission {
        match self {
            ModelFormat::Yaml => Emission::Annotated,
            ModelFormat::Json => Emission::Plain,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Yaml => "yaml",
            ModelFormat::Json => "json",
        }
    }
}

pub fn emit(model: &Model, emission: Emission) -> Result<String> {
    match emission {
        Emission::Plain => {
            let json = serde_json::to_string_pretty(model)
                .map_err(|err| Error::ModelGeneration(format!("Cannot encode model: {err}")))?;
            Ok(json + "\n")
        }
        Emission::Annotated if model.is_empty() => Ok(NO_VARIABLES.to_string()),
        Emission::Annotated => {
            let mut lines = Vec::new();
            annotate_fields(model, 0, &mut lines);
            Ok(lines.join("\n") + "\n")
        }
    }
}

/// Inline value and type comment of a leaf.
fn leaf(shape: &Shape) -> Option<(String, &'static str)> {
    match shape {
        Shape::Placeholder(placeholder) if placeholder.condition => Some((
            quoted(&placeholder.text()),
            "truthy value (boolean, string, number)",
        )),
        Shape::Placeholder(placeholder) => Some((quoted(&placeholder.text()), "string")),
        Shape::Bool(b) => Some((b.to_string(), "boolean")),
        Shape::List(items) if items.is_empty() => Some(("[]".to_string(), "list")),
        Shape::Object(fields) if fields.is_empty() => Some(("{}".to_string(), "object")),
        Shape::List(_) | Shape::Object(_) => None,
    }
}

fn quoted(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn annotate_fields<'a>(
    fields: impl IntoIterator<Item = (&'a String, &'a Shape)>,
    indent: usize,
    lines: &mut Vec<String>,
) {
    let prefix = "  ".repeat(indent);
    for (key, shape) in fields {
        if let Some((value, comment)) = leaf(shape) {
            lines.push(format!("{prefix}{key}: {value}  # {comment}"));
            continue;
        }
        match shape {
            Shape::List(items) => {
                lines.push(format!("{prefix}{key}:  # list"));
                annotate_items(items, indent + 1, lines);
            }
            Shape::Object(nested) => {
                lines.push(format!("{prefix}{key}:  # object"));
                annotate_fields(nested, indent + 1, lines);
            }
            Shape::Placeholder(_) | Shape::Bool(_) => {}
        }
    }
}

fn annotate_items(items: &[Shape], indent: usize, lines: &mut Vec<String>) {
    let prefix = "  ".repeat(indent);
    for item in items {
        // Scalar items carry no comment; the list key already has one.
        if let Some((value, _)) = leaf(item) {
            lines.push(format!("{prefix}- {value}"));
            continue;
        }
        match item {
            Shape::Object(fields) => {
                // Render at column zero, then hang the block off the `- `.
                let mut block = Vec::new();
                annotate_fields(fields, 0, &mut block);
                for (idx, line) in block.iter().enumerate() {
                    if idx == 0 {
                        lines.push(format!("{prefix}- {line}"));
                    } else {
                        lines.push(format!("{prefix}  {line}"));
                    }
                }
            }
            Shape::List(nested) => {
                lines.push(format!("{prefix}-  # list"));
                annotate_items(nested, indent + 1, lines);
            }
            Shape::Placeholder(_) | Shape::Bool(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes() {
        assert_eq!(quoted("<a\"b>"), r#""<a\"b>""#);
    }

    #[test]
    fn nested_lists() {
        let model = Model::from([(
            "grid".to_string(),
            Shape::List(vec![Shape::List(vec![Shape::placeholder("cell")])]),
        )]);
        assert_eq!(
            emit(&model, Emission::Annotated).unwrap(),
            "grid:  # list\n  -  # list\n    - \"<cell>\"\n"
        );
    }

    #[test]
    fn empty_object_is_inline() {
        let model = Model::from([("meta".to_string(), Shape::Object(Default::default()))]);
        assert_eq!(
            emit(&model, Emission::Annotated).unwrap(),
            "meta: {}  # object\n"
        );
    }

    #[test]
    fn format_mapping() {
        assert_eq!(ModelFormat::Yaml.emission(), Emission::Annotated);
        assert_eq!(ModelFormat::Json.emission(), Emission::Plain);
        assert_eq!(ModelFormat::Json.extension(), "json");
    }
}
