//! Static analysis of a template: infer the shape of the data it expects.
//!
//! The analyzer walks the syntax tree once, depth first, threading the set
//! of names shadowed by enclosing loops. References to unshadowed names are
//! merged into the [`Model`]; attribute accesses on a loop's target become
//! keys of the iterated list's item object. Conditions are only *recorded*
//! during the walk and applied to the finished model in a last pass, so the
//! result does not depend on whether an `if` test is seen before or after
//! the value it tests.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::ast::{Expr, Field, Stmt, Template};
use crate::error::{Error, Result};
use crate::eval;
use crate::parser;
use crate::shape::{self, Model, Shape};

/// A path observed as the test of an `if`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConditionKey {
    /// Full attribute path from a top-level name.
    TopLevel(Vec<String>),
    /// `list.__item__.attr`: an attribute of the items of a loop-discovered list.
    LoopItem { list: String, attr: String },
}

/// Infer the shape model of template `source`.
pub fn analyze(source: &str) -> Result<Model> {
    let template = parser::parse(source)
        .map_err(|err| Error::ModelGeneration(format!("Invalid template syntax: {err}")))?;
    Ok(analyze_template(&template))
}

/// Infer the shape model of an already parsed template.
pub fn analyze_template(template: &Template) -> Model {
    let mut analyzer = Analyzer::default();
    analyzer.walk_body(template, &Scope::default());
    analyzer.finish()
}

/// Names hidden from the model by enclosing loops.
#[derive(Debug, Clone, Default)]
struct Scope {
    shadowed: BTreeSet<String>,
}

impl Scope {
    fn shadows(&self, name: &str) -> bool {
        self.shadowed.contains(name)
    }

    fn with<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Scope {
        let mut shadowed = self.shadowed.clone();
        shadowed.extend(names.into_iter().map(str::to_string));
        Scope { shadowed }
    }
}

/// The innermost loop while walking its body.
#[derive(Debug, Clone, Copy)]
struct LoopFrame<'t> {
    /// Top-level name of the iterable, unless that name is itself shadowed.
    list: Option<&'t str>,
    /// The loop target, when the loop binds a single name.
    target: Option<&'t str>,
}

impl LoopFrame<'_> {
    /// `attr` when `expr` is `<target>.attr`.
    fn item_attribute<'e>(&self, expr: &'e Expr) -> Option<&'e str> {
        let Expr::Getattr { node, attr } = expr else {
            return None;
        };
        match &**node {
            Expr::Name(base) if Some(base.as_str()) == self.target => Some(attr),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Analyzer {
    model: Model,
    loop_discovered: BTreeSet<String>,
    conditions: BTreeSet<ConditionKey>,
}

impl Analyzer {
    fn walk_body(&mut self, body: &[Stmt], scope: &Scope) {
        for stmt in body {
            self.walk_stmt(stmt, scope);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: &Scope) {
        match stmt {
            Stmt::Text(_) => {}
            Stmt::Output(exprs) => {
                for expr in exprs {
                    self.walk_expr(expr, scope);
                }
            }
            Stmt::For { .. } => self.walk_for(stmt, scope),
            Stmt::If {
                test,
                body,
                elifs,
                else_body,
            } => {
                self.mark_conditions(test, scope);
                self.walk_expr(test, scope);
                self.walk_body(body, scope);
                for (test, body) in elifs {
                    self.mark_conditions(test, scope);
                    self.walk_expr(test, scope);
                    self.walk_body(body, scope);
                }
                self.walk_body(else_body, scope);
            }
            Stmt::Set { value, .. } => self.walk_expr(value, scope),
            Stmt::Block { body, .. } => self.walk_body(body, scope),
        }
    }

    fn walk_expr(&mut self, expr: &Expr, scope: &Scope) {
        match expr {
            Expr::Name(name) => {
                if !scope.shadows(name) && !eval::GLOBALS.contains(&name.as_str()) {
                    shape::merge_entry(&mut self.model, name.clone(), Shape::placeholder(name.clone()));
                }
            }
            Expr::Getattr { .. } | Expr::Getitem { .. } => match attribute_path(expr) {
                // The whole chain is consumed here.
                Some(path) => {
                    if !scope.shadows(&path[0]) {
                        if let Some((key, shape)) = Shape::from_path(&path) {
                            trace!(path = %path.join("."), "attribute reference");
                            shape::merge_entry(&mut self.model, key, shape);
                        }
                    }
                    self.walk_subscripts(expr, scope);
                }
                None => {
                    for (_, child) in expr.fields() {
                        self.walk_expr(child, scope);
                    }
                    if let Expr::Getitem { arg, .. } = expr {
                        self.walk_expr(arg, scope);
                    }
                }
            },
            _ => {
                for (_, child) in expr.fields() {
                    self.walk_expr(child, scope);
                }
            }
        }
    }

    /// Walk the indexes of a subscripted chain; `rows[idx]` reads `idx`.
    fn walk_subscripts(&mut self, expr: &Expr, scope: &Scope) {
        match expr {
            Expr::Getattr { node, .. } => self.walk_subscripts(node, scope),
            Expr::Getitem { node, arg } => {
                self.walk_expr(arg, scope);
                self.walk_subscripts(node, scope);
            }
            _ => {}
        }
    }

    fn walk_for(&mut self, stmt: &Stmt, scope: &Scope) {
        let Stmt::For {
            targets,
            iter,
            filter,
            body,
            else_body,
        } = stmt
        else {
            return;
        };

        let path = attribute_path(iter);
        let list = path
            .as_ref()
            .map(|path| path[0].as_str())
            .filter(|head| !scope.shadows(head));
        match (&path, list) {
            (_, Some(list)) => {
                debug!(list, "loop iterable discovered");
                self.loop_discovered.insert(list.to_string());
            }
            (None, None) => self.walk_expr(iter, scope),
            (Some(_), None) => {}
        }

        let frame = LoopFrame {
            list,
            target: match targets.as_slice() {
                [target] => Some(target.as_str()),
                _ => None,
            },
        };
        let inner = scope.with(targets.iter().map(String::as_str).chain(["loop"]));

        if let Some(filter) = filter {
            self.mark_loop_conditions(filter, &frame);
            self.walk_loop_expr(filter, &frame, &inner);
        }
        for stmt in body {
            self.walk_loop_stmt(stmt, &frame, &inner);
        }
        self.walk_body(else_body, scope);
    }

    fn walk_loop_stmt(&mut self, stmt: &Stmt, frame: &LoopFrame<'_>, scope: &Scope) {
        match stmt {
            Stmt::Output(exprs) => {
                for expr in exprs {
                    self.walk_loop_expr(expr, frame, scope);
                }
            }
            // Nested loops do not relate their items to the outer loop.
            Stmt::For { .. } => self.walk_for(stmt, scope),
            Stmt::If {
                test,
                body,
                elifs,
                else_body,
            } => {
                self.mark_loop_conditions(test, frame);
                self.walk_loop_expr(test, frame, scope);
                for stmt in body {
                    self.walk_loop_stmt(stmt, frame, scope);
                }
                for (test, body) in elifs {
                    self.mark_loop_conditions(test, frame);
                    self.walk_loop_expr(test, frame, scope);
                    for stmt in body {
                        self.walk_loop_stmt(stmt, frame, scope);
                    }
                }
                for stmt in else_body {
                    self.walk_loop_stmt(stmt, frame, scope);
                }
            }
            _ => self.walk_stmt(stmt, scope),
        }
    }

    fn walk_loop_expr(&mut self, expr: &Expr, frame: &LoopFrame<'_>, scope: &Scope) {
        if let Some(attr) = frame.item_attribute(expr) {
            if let Some(list) = frame.list {
                self.insert_loop_item(list, attr);
            }
            return;
        }
        match expr {
            Expr::Name(_) | Expr::Getattr { .. } | Expr::Getitem { .. } => {
                self.walk_expr(expr, scope)
            }
            // `item.title | upper` still describes the item.
            _ => {
                for (_, child) in expr.fields() {
                    self.walk_loop_expr(child, frame, scope);
                }
            }
        }
    }

    fn insert_loop_item(&mut self, list: &str, attr: &str) {
        let key = ConditionKey::LoopItem {
            list: list.to_string(),
            attr: attr.to_string(),
        };
        let leaf = if self.conditions.contains(&key) {
            Shape::condition(attr)
        } else {
            Shape::placeholder(attr)
        };
        trace!(list, attr, "loop item attribute");
        let item = Shape::Object([(attr.to_string(), leaf)].into_iter().collect());
        shape::merge_entry(&mut self.model, list.to_string(), Shape::List(vec![item]));
    }

    /// Record every path tested for truthiness by `expr`.
    fn mark_conditions(&mut self, expr: &Expr, scope: &Scope) {
        if let Expr::Name(_) | Expr::Getattr { .. } = expr {
            if let Some(path) = attribute_path(expr) {
                if !scope.shadows(&path[0]) {
                    self.conditions.insert(ConditionKey::TopLevel(path));
                }
            }
        }
        for (_, child) in condition_operands(expr) {
            self.mark_conditions(child, scope);
        }
    }

    /// Record every loop-item attribute tested for truthiness by `expr`.
    fn mark_loop_conditions(&mut self, expr: &Expr, frame: &LoopFrame<'_>) {
        if let (Some(attr), Some(list)) = (frame.item_attribute(expr), frame.list) {
            self.conditions.insert(ConditionKey::LoopItem {
                list: list.to_string(),
                attr: attr.to_string(),
            });
        }
        for (_, child) in condition_operands(expr) {
            self.mark_loop_conditions(child, frame);
        }
    }

    fn finish(mut self) -> Model {
        // Loop discovery is sticky: once iterated, a name is a list.
        for name in &self.loop_discovered {
            match self.model.get_mut(name) {
                Some(Shape::List(_)) => {}
                Some(shape) => *shape = Shape::List(Vec::new()),
                None => {
                    self.model.insert(name.clone(), Shape::List(Vec::new()));
                }
            }
        }

        let mut path = Vec::new();
        for (name, shape) in self.model.iter_mut() {
            path.push(name.clone());
            if let Shape::List(items) = shape {
                for item in items {
                    mark_loop_items(item, name, &self.conditions);
                }
            } else {
                mark_leaves(shape, &mut path, &self.conditions);
            }
            path.pop();
        }
        debug!(variables = self.model.len(), "template analyzed");
        self.model
    }
}

/// Children reached when scanning a test: operands of boolean connectives,
/// and the subject of comparisons, filters and tests.
fn condition_operands(expr: &Expr) -> impl Iterator<Item = (Field, &Expr)> {
    expr.fields().into_iter().filter(|(field, _)| {
        matches!(field, Field::Node | Field::Expr | Field::Left | Field::Right)
    })
}

/// The attribute chain of `expr`; subscripts pass through to their base.
///
/// `None` when the chain does not start at a plain name.
pub fn attribute_path(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Name(name) => Some(vec![name.clone()]),
        Expr::Getattr { node, attr } => {
            let mut path = attribute_path(node)?;
            path.push(attr.clone());
            Some(path)
        }
        Expr::Getitem { node, .. } => attribute_path(node),
        _ => None,
    }
}

fn mark_leaves(shape: &mut Shape, path: &mut Vec<String>, conditions: &BTreeSet<ConditionKey>) {
    match shape {
        Shape::Placeholder(placeholder) => {
            if conditions.contains(&ConditionKey::TopLevel(path.clone())) {
                placeholder.condition = true;
            }
        }
        Shape::Object(fields) => {
            for (key, child) in fields.iter_mut() {
                path.push(key.clone());
                mark_leaves(child, path, conditions);
                path.pop();
            }
        }
        Shape::Bool(_) | Shape::List(_) => {}
    }
}

fn mark_loop_items(item: &mut Shape, list: &str, conditions: &BTreeSet<ConditionKey>) {
    let Shape::Object(fields) = item else {
        return;
    };
    for (attr, leaf) in fields.iter_mut() {
        let Shape::Placeholder(placeholder) = leaf else {
            continue;
        };
        let key = ConditionKey::LoopItem {
            list: list.to_string(),
            attr: attr.clone(),
        };
        if conditions.contains(&key) {
            placeholder.condition = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(source: &str) -> Model {
        analyze(source).expect("analyze")
    }

    #[test]
    fn getitem_is_transparent() {
        let template = parser::parse("{{ a[0].b['c'].d }}").unwrap();
        let [Stmt::Output(exprs)] = template.as_slice() else {
            panic!("expected a single output");
        };
        assert_eq!(
            attribute_path(&exprs[0]),
            Some(vec!["a".to_string(), "b".to_string(), "d".to_string()])
        );
    }

    #[test]
    fn call_result_attribute_has_no_path() {
        let m = model("{{ lookup(key).value }}");
        assert_eq!(
            m,
            Model::from([
                ("lookup".to_string(), Shape::placeholder("lookup")),
                ("key".to_string(), Shape::placeholder("key")),
            ])
        );
    }

    #[test]
    fn condition_on_nested_path() {
        let m = model("{% if user.active %}{{ user.name }}{% endif %}");
        assert_eq!(
            m["user"],
            Shape::object([
                ("active", Shape::condition("active")),
                ("name", Shape::placeholder("name")),
            ])
        );
    }

    #[test]
    fn loop_target_shadowing_ends_with_the_loop() {
        let m = model("{% for item in items %}{{ item.id }}{% endfor %}{{ item }}");
        assert_eq!(m["item"], Shape::placeholder("item"));
        assert!(matches!(m["items"], Shape::List(_)));
    }

    #[test]
    fn loop_else_uses_outer_scope() {
        let m = model("{% for x in xs %}{{ x.a }}{% else %}{{ x }}{% endfor %}");
        assert_eq!(m["x"], Shape::placeholder("x"));
    }

    #[test]
    fn shadowed_iterable_adds_nothing() {
        let m = model(
            "{% for group in groups %}{% for member in group.members %}{{ member.name }}{% endfor %}{% endfor %}",
        );
        assert_eq!(m, Model::from([("groups".to_string(), Shape::List(Vec::new()))]));
    }

    #[test]
    fn loop_without_item_access_is_an_empty_list() {
        let m = model("{% for x in items %}static{% endfor %}{{ title }}");
        assert_eq!(
            m,
            Model::from([
                ("title".to_string(), Shape::placeholder("title")),
                ("items".to_string(), Shape::List(Vec::new())),
            ])
        );
    }

    #[test]
    fn computed_iterable_is_walked() {
        let m = model("{% for i in range(count) %}{{ i }}{% endfor %}");
        assert_eq!(m, Model::from([("count".to_string(), Shape::placeholder("count"))]));
    }

    #[test]
    fn loop_variable_is_never_a_key() {
        let m = model("{% for row in rows %}{{ loop.index }}: {{ row.title }}{% endfor %}");
        assert_eq!(
            m,
            Model::from([(
                "rows".to_string(),
                Shape::List(vec![Shape::object([("title", Shape::placeholder("title"))])])
            )])
        );
    }
}
