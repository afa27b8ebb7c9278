use std::path::Path;

use jinjacraft::generate::{default_model_path, load_template, write_output};
use jinjacraft::validate::validate;
use jinjacraft::{generate_model_file, render_files, DataFormat, Error, ModelFormat, Value};

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn model_file_next_to_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(dir.path(), "page.j2", "{{ title }}");

    let path = generate_model_file(&template, None, false, ModelFormat::Yaml).unwrap();
    assert_eq!(path, dir.path().join("page.yaml"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "title: \"<title>\"  # string\n"
    );
}

#[test]
fn existing_model_file_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(dir.path(), "page.j2", "{{ title }}");
    let output = write(dir.path(), "model.json", "keep me");

    let err = generate_model_file(&template, Some(&output), false, ModelFormat::Json).unwrap_err();
    assert!(matches!(err, Error::ModelGeneration(_)));
    assert!(err.to_string().contains("already exists"), "{err}");
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "keep me");

    let path = generate_model_file(&template, Some(&output), true, ModelFormat::Json).unwrap();
    assert_eq!(path, output);
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "{\n  \"title\": \"<title>\"\n}\n"
    );
}

#[test]
fn missing_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("absent.j2");
    let err = generate_model_file(&template, None, false, ModelFormat::Yaml).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Template file not found: {}", template.display())
    );
    assert!(!default_model_path(&template, ModelFormat::Yaml).exists());
}

#[test]
fn invalid_template_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(dir.path(), "broken.j2", "{% for x in xs %}");
    let err = generate_model_file(&template, None, false, ModelFormat::Yaml).unwrap_err();
    assert!(err.to_string().contains("Invalid template syntax"), "{err}");
    assert!(!dir.path().join("broken.yaml").exists());
}

#[test]
fn render_yaml_and_json_data() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(
        dir.path(),
        "greet.j2",
        "{% for p in people %}Hi {{ p.name }}{% if not loop.last %}, {% endif %}{% endfor %}\n",
    );
    let yaml = write(dir.path(), "data.yaml", "people:\n  - name: Ada\n  - name: Alan\n");
    let json = write(dir.path(), "data.json", r#"{"people": [{"name": "Ada"}, {"name": "Alan"}]}"#);

    let from_yaml = render_files(&yaml, &template, DataFormat::Yaml, true).unwrap();
    let from_json = render_files(&json, &template, DataFormat::Json, true).unwrap();
    assert_eq!(from_yaml, "Hi Ada, Hi Alan\n");
    assert_eq!(from_yaml, from_json);
}

#[test]
fn missing_variables_fail_unless_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(dir.path(), "t.j2", "{{ a }}{{ b }}{{ c }}");
    let data = write(dir.path(), "d.yaml", "b: 2\n");

    let err = render_files(&data, &template, DataFormat::Yaml, true).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.to_string(), "Missing variables in data file: a, c");

    assert_eq!(
        render_files(&data, &template, DataFormat::Yaml, false).unwrap(),
        "2"
    );
}

#[test]
fn unused_variables_are_reported() {
    let data = Value::Map(
        [("z", Value::Int(1)), ("used", Value::Int(2)), ("extra", Value::Int(3))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    );
    assert_eq!(validate("{{ used }}", &data).unwrap(), vec!["extra", "z"]);
}

#[test]
fn missing_template_for_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "d.yaml", "a: 1\n");
    let template = dir.path().join("nope.j2");
    let err = render_files(&data, &template, DataFormat::Yaml, true).unwrap_err();
    assert!(matches!(err, Error::TemplateFile(_)));
    assert!(matches!(load_template(&template), Err(Error::TemplateFile(_))));
}

#[test]
fn missing_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let template = write(dir.path(), "t.j2", "x");
    let data = dir.path().join("nope.yaml");
    let err = render_files(&data, &template, DataFormat::Yaml, true).unwrap_err();
    assert_eq!(err.to_string(), format!("Data file not found: {}", data.display()));
}

#[test]
fn output_into_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = write_output("x", &dir.path().join("no/such/dir/out.txt")).unwrap_err();
    assert!(matches!(err, Error::OutputFile(_)));
}
