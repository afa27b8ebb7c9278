use indoc::indoc;
use jinjacraft::data::parse_data;
use jinjacraft::{render, DataFormat, Error, Value};

fn data(yaml: &str) -> Value {
    parse_data(yaml, DataFormat::Yaml).unwrap()
}

fn render_with(template: &str, yaml: &str) -> String {
    render(template, &data(yaml)).unwrap()
}

#[test]
fn empty_list_produces_empty_output() {
    let template = "{% for host in hosts %}{{ host.name }}{% endfor %}";
    assert_eq!(render_with(template, "hosts: []"), "");
}

#[test]
fn plain_text_template_no_tags() {
    assert_eq!(render("Hello, world!\n", &Value::None).unwrap(), "Hello, world!\n");
}

#[test]
fn top_level_variables() {
    let template = "{{ prefix }}BODY{{ suffix }}";
    assert_eq!(render_with(template, "prefix: '<s>'\nsuffix: '</s>'"), "<s>BODY</s>");
}

#[test]
fn dot_access_and_bracket_access_equivalent() {
    let yaml = "hosts: [{name: web}]";
    let a = render_with("{% for h in hosts %}{{ h.name }}{% endfor %}", yaml);
    let b = render_with("{% for h in hosts %}{{ h['name'] }}{% endfor %}", yaml);
    assert_eq!(a, b);
    assert_eq!(a, "web");
}

#[test]
fn loop_first_and_last_single_item() {
    let template = "{% for x in xs %}{% if loop.first %}F{% endif %}{% if loop.last %}L{% endif %}{% endfor %}";
    assert_eq!(render_with(template, "xs: [1]"), "FL");
}

#[test]
fn loop_first_and_last_multiple_items() {
    let template =
        "{% for x in xs %}{% if loop.first %}[{% endif %}{{ x }}{% if loop.last %}]{% endif %}{% endfor %}";
    assert_eq!(render_with(template, "xs: [a, b, c]"), "[abc]");
}

#[test]
fn loop_counters() {
    let template = "{% for x in xs %}{{ loop.index }}/{{ loop.length }}:{{ loop.index0 }} {% endfor %}";
    assert_eq!(render_with(template, "xs: [a, b]"), "1/2:0 2/2:1 ");
}

#[test]
fn or_operator_in_condition() {
    let template = "{% for u in users %}{% if u.role == 'admin' or u.role == 'owner' %}Y{% else %}N{% endif %}{% endfor %}";
    let yaml = "users: [{role: guest}, {role: admin}, {role: owner}]";
    assert_eq!(render_with(template, yaml), "NYY");
}

#[test]
fn string_concat_multiple_parts() {
    let template = "{{ 'A' + 'B' + 'C' + name + 'D' }}";
    assert_eq!(render_with(template, "name: x"), "ABCxD");
}

#[test]
fn elif_chain_inside_for() {
    let template = "{% for u in users %}{% if u.role == 'user' %}U{% elif u.role == 'system' %}S{% else %}O{% endif %}{% endfor %}";
    let yaml = "users: [{role: user}, {role: system}, {role: tool}]";
    assert_eq!(render_with(template, yaml), "USO");
}

#[test]
fn special_characters_are_not_escaped() {
    let template = "{{ text }}";
    assert_eq!(
        render_with(template, r#"text: 'Hello <world> & "friends"'"#),
        "Hello <world> & \"friends\""
    );
}

#[test]
fn unicode_content() {
    assert_eq!(render_with("{{ greeting }}", "greeting: こんにちは 🌍"), "こんにちは 🌍");
}

#[test]
fn missing_flag_is_falsy() {
    let template = "{% for x in xs %}{{ x }}{% if loop.last and extra %}!{% endif %}{% endfor %}";
    assert_eq!(render_with(template, "xs: [a]"), "a");
}

#[test]
fn nested_loops_over_mappings() {
    let template = indoc! {"
        {%- for svc in services %}
        [{{ svc.name }}]
        {%- for key, value in svc.env.items() %}
        {{ key }}={{ value }}
        {%- endfor %}
        {% endfor -%}
    "};
    let yaml = indoc! {"
        services:
          - name: api
            env:
              PORT: 8080
              DEBUG: false
          - name: worker
            env: {}
    "};
    assert_eq!(
        render_with(template, yaml),
        "\n[api]\nPORT=8080\nDEBUG=False\n\n[worker]\n"
    );
}

#[test]
fn config_file_template() {
    let template = indoc! {r#"
        # {{ title | upper }}
        {% for server in servers if server.enabled -%}
        server {{ server.host }}:{{ server.port | default(80) }}{{ ' backup' if server.backup }}
        {% else -%}
        # no servers
        {% endfor -%}
        timeout {{ timeout * 2 }}
    "#};
    let yaml = indoc! {"
        title: upstream
        timeout: 15
        servers:
          - {host: a.local, port: 8080, enabled: true}
          - {host: b.local, enabled: true, backup: true}
          - {host: c.local, enabled: false}
    "};
    similar_asserts::assert_eq!(
        render_with(template, yaml),
        indoc! {"
            # UPSTREAM
            server a.local:8080
            server b.local:80 backup
            timeout 30
        "}
    );
}

#[test]
fn empty_loop_uses_else_branch() {
    let template = "{% for s in servers %}{{ s }}{% else %}none{% endfor %}";
    assert_eq!(render_with(template, "servers: []"), "none");
}

#[test]
fn trailing_newlines_are_preserved() {
    assert_eq!(render_with("{{ a }}\n\n", "a: 1"), "1\n\n");
}

#[test]
fn attribute_of_undefined_is_an_error() {
    let err = render("{{ user.name }}", &data("other: 1")).unwrap_err();
    assert!(matches!(err, Error::TemplateRender(_)), "{err:?}");
}

#[test]
fn syntax_errors_are_reported_with_a_line() {
    let err = render("line one\n{% if %}", &Value::None).unwrap_err();
    let Error::TemplateSyntax(parse) = &err else {
        panic!("expected syntax error, got {err:?}");
    };
    assert_eq!(parse.line, 2);
}
