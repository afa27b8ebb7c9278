use std::path::Path;

use crate::error::{Error, Result};
use crate::value::Value;

/// Encoding of a data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataFormat {
    #[default]
    Yaml,
    Json,
}

impl DataFormat {
    fn label(self) -> &'static str {
        match self {
            DataFormat::Yaml => "YAML",
            DataFormat::Json => "JSON",
        }
    }
}

/// Read and decode the data file at `path`.
pub fn load_data(path: &Path, format: DataFormat) -> Result<Value> {
    let contents = std::fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => {
            Error::DataFile(format!("Data file not found: {}", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => {
            Error::DataFile(format!("Permission denied: {}", path.display()))
        }
        _ => Error::DataFile(format!("Cannot read data file {}: {err}", path.display())),
    })?;
    parse_data(&contents, format).map_err(|reason| {
        Error::DataFile(format!(
            "Invalid {} in data file {}: {reason}",
            format.label(),
            path.display()
        ))
    })
}

/// Decode a data document. An empty YAML document is `None`.
pub fn parse_data(contents: &str, format: DataFormat) -> std::result::Result<Value, String> {
    match format {
        DataFormat::Yaml if contents.trim().is_empty() => Ok(Value::None),
        DataFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(contents)
            .map(Value::from)
            .map_err(|err| err.to_string()),
        DataFormat::Json => serde_json::from_str::<serde_json::Value>(contents)
            .map(Value::from)
            .map_err(|err| err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_agree() {
        let yaml = parse_data("name: Ada\ntags: [a, b]\n", DataFormat::Yaml).unwrap();
        let json = parse_data(r#"{"name": "Ada", "tags": ["a", "b"]}"#, DataFormat::Json).unwrap();
        assert_eq!(yaml, json);
    }

    #[test]
    fn empty_yaml_is_none() {
        assert_eq!(parse_data("", DataFormat::Yaml).unwrap(), Value::None);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = load_data(&path, DataFormat::Yaml).unwrap_err();
        assert_eq!(err.to_string(), format!("Data file not found: {}", path.display()));
    }

    #[test]
    fn malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = load_data(&path, DataFormat::Json).unwrap_err();
        assert!(matches!(err, Error::DataFile(_)));
        assert!(err.to_string().starts_with("Invalid JSON in data file"));
    }
}
