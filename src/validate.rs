//! Check a data document against the variables a template reads.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::ast::{Expr, Stmt, Template};
use crate::error::{Error, Result};
use crate::eval;
use crate::parser;
use crate::value::Value;

/// Free variables of `template`: every name read before the template binds
/// it. Loop targets and `loop` are bound inside their loop body, `set`
/// targets from the statement onwards in the enclosing body.
pub fn undeclared_variables(template: &Template) -> BTreeSet<String> {
    let mut free = BTreeSet::new();
    let mut bound: BTreeSet<String> = eval::GLOBALS.iter().map(|name| name.to_string()).collect();
    collect_body(template, &mut bound, &mut free);
    free
}

/// Validate `data` for template `source`.
///
/// Fails when a variable the template reads is missing from the top-level
/// keys of `data`. Otherwise returns the keys the template never reads,
/// sorted, after logging a warning for each.
pub fn validate(source: &str, data: &Value) -> Result<Vec<String>> {
    let template = parser::parse(source)?;
    let required = undeclared_variables(&template);
    let provided: BTreeSet<&str> = data.keys().into_iter().collect();
    debug!(?required, ?provided, "validating data");

    let missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|name| !provided.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "Missing variables in data file: {}",
            missing.join(", ")
        )));
    }

    let unused: Vec<String> = provided
        .into_iter()
        .filter(|name| !required.contains(*name))
        .map(str::to_string)
        .collect();
    for name in &unused {
        warn!("Unused variable in data file: {name}");
    }
    Ok(unused)
}

fn collect_body(body: &[Stmt], bound: &mut BTreeSet<String>, free: &mut BTreeSet<String>) {
    for stmt in body {
        collect_stmt(stmt, bound, free);
    }
}

fn collect_stmt(stmt: &Stmt, bound: &mut BTreeSet<String>, free: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Text(_) => {}
        Stmt::Output(exprs) => {
            for expr in exprs {
                collect_expr(expr, bound, free);
            }
        }
        Stmt::For {
            targets,
            iter,
            filter,
            body,
            else_body,
        } => {
            collect_expr(iter, bound, free);
            let mut inner = bound.clone();
            inner.extend(targets.iter().cloned());
            inner.insert("loop".to_string());
            if let Some(filter) = filter {
                collect_expr(filter, &inner, free);
            }
            collect_body(body, &mut inner, free);
            collect_body(else_body, &mut bound.clone(), free);
        }
        Stmt::If {
            test,
            body,
            elifs,
            else_body,
        } => {
            collect_expr(test, bound, free);
            collect_body(body, &mut bound.clone(), free);
            for (test, body) in elifs {
                collect_expr(test, bound, free);
                collect_body(body, &mut bound.clone(), free);
            }
            collect_body(else_body, &mut bound.clone(), free);
        }
        Stmt::Set { target, value } => {
            collect_expr(value, bound, free);
            bound.insert(target.clone());
        }
        Stmt::Block { body, .. } => collect_body(body, &mut bound.clone(), free),
    }
}

fn collect_expr(expr: &Expr, bound: &BTreeSet<String>, free: &mut BTreeSet<String>) {
    match expr {
        Expr::Name(name) => {
            if !bound.contains(name) {
                free.insert(name.clone());
            }
            return;
        }
        // The index is read at render time even though it is not data shape.
        Expr::Getitem { arg, .. } => collect_expr(arg, bound, free),
        _ => {}
    }
    for (_, child) in expr.fields() {
        collect_expr(child, bound, free);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free(source: &str) -> Vec<String> {
        let template = parser::parse(source).unwrap();
        undeclared_variables(&template).into_iter().collect()
    }

    #[test]
    fn loop_bindings_are_not_free() {
        assert_eq!(
            free("{% for u in users if u.active %}{{ loop.index }} {{ u.name }} {{ title }}{% endfor %}"),
            vec!["title", "users"]
        );
    }

    #[test]
    fn loop_else_sees_outer_scope() {
        assert_eq!(free("{% for u in users %}{% else %}{{ u }}{% endfor %}"), vec!["u", "users"]);
    }

    #[test]
    fn set_binds_from_its_statement_onwards() {
        assert_eq!(free("{{ total }}{% set total = price * 2 %}{{ total }}"), vec!["price", "total"]);
        assert_eq!(free("{% set total = price %}{{ total }}"), vec!["price"]);
    }

    #[test]
    fn range_is_a_global() {
        assert_eq!(free("{% for i in range(n) %}{{ i }}{% endfor %}"), vec!["n"]);
    }

    #[test]
    fn filter_and_call_arguments_are_scanned() {
        assert_eq!(
            free("{{ name | default(fallback) }}{{ items.get(key) }}{{ rows[idx] }}"),
            vec!["fallback", "idx", "items", "key", "name", "rows"]
        );
    }
}
