use indoc::indoc;
use jinjacraft::{analyze, emit, generate_model, Emission, Model, ModelFormat, Shape};

fn annotated(source: &str) -> String {
    emit(&analyze(source).unwrap(), Emission::Annotated).unwrap()
}

#[test]
fn annotated_document() {
    let template = indoc! {"
        {{ site.title }}
        {% if show_footer %}{{ footer }}{% endif %}
        {% for task in tasks %}{% if task.done %}{{ task.name }}{% endif %}{% endfor %}
        {% for x in unused %}-{% endfor %}
    "};
    similar_asserts::assert_eq!(
        annotated(template),
        indoc! {r#"
            site:  # object
              title: "<title>"  # string
            show_footer: "<show_footer>"  # truthy value (boolean, string, number)
            footer: "<footer>"  # string
            tasks:  # list
              - done: "<done>"  # truthy value (boolean, string, number)
                name: "<name>"  # string
            unused: []  # list
        "#}
    );
}

#[test]
fn list_items_keep_nested_indentation() {
    let model = Model::from([(
        "servers".to_string(),
        Shape::List(vec![Shape::object([
            ("host", Shape::placeholder("host")),
            ("tls", Shape::object([("cert", Shape::placeholder("cert"))])),
            ("enabled", Shape::Bool(true)),
        ])]),
    )]);
    similar_asserts::assert_eq!(
        emit(&model, Emission::Annotated).unwrap(),
        indoc! {r#"
            servers:  # list
              - host: "<host>"  # string
                tls:  # object
                  cert: "<cert>"  # string
                enabled: true  # boolean
        "#}
    );
}

#[test]
fn annotated_output_is_valid_yaml() {
    let template = "{{ a.b }}{% for i in items %}{{ i.x }}{% endfor %}{% if flag %}{% endif %}";
    let yaml: serde_yaml::Value = serde_yaml::from_str(&annotated(template)).unwrap();
    let expected: serde_yaml::Value = serde_yaml::from_str(indoc! {"
        a: {b: <b>}
        items: [{x: <x>}]
        flag: <flag>
    "})
    .unwrap();
    similar_asserts::assert_eq!(yaml, expected);
}

#[test]
fn plain_document() {
    let json = generate_model(
        "{% for task in tasks %}{% if task.done %}{{ task.name }}{% endif %}{% endfor %}{{ owner }}",
        ModelFormat::Json,
    )
    .unwrap();
    similar_asserts::assert_eq!(
        json,
        indoc! {r#"
            {
              "tasks": [
                {
                  "done": "<done>",
                  "name": "<name>"
                }
              ],
              "owner": "<owner>"
            }
        "#}
    );
}

#[test]
fn placeholders_are_quoted() {
    let model = Model::from([("note".to_string(), Shape::placeholder("say \"hi\""))]);
    assert_eq!(
        emit(&model, Emission::Annotated).unwrap(),
        "note: \"<say \\\"hi\\\">\"  # string\n"
    );
}
