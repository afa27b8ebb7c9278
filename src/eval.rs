use crate::ast::*;
use crate::error::{Error, Result};
use crate::parser;
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Render template `source` against `data`.
///
/// `data` is normally the parsed data document; a non-mapping document
/// provides no variables.
pub fn render(source: &str, data: &Value) -> Result<String> {
    let template = parser::parse(source)?;
    let context = match data {
        Value::Map(m) => m.clone(),
        _ => IndexMap::new(),
    };
    Evaluator::new(context).render(&template)
}

/// Names the renderer provides when the data does not.
pub const GLOBALS: &[&str] = &["range"];

fn render_error(message: impl Into<String>) -> Error {
    Error::TemplateRender(message.into())
}

pub struct Evaluator {
    // Innermost scope last; loops push a scope per iteration.
    scopes: Vec<IndexMap<String, Value>>,
}

impl Evaluator {
    pub fn new(context: IndexMap<String, Value>) -> Self {
        Self {
            scopes: vec![context],
        }
    }

    fn get_var(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .unwrap_or_default()
    }

    fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn set_local(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    pub fn render(&mut self, template: &[Stmt]) -> Result<String> {
        let mut output = String::new();
        for node in template {
            self.render_stmt(node, &mut output)?;
        }
        Ok(output)
    }

    fn render_stmt(&mut self, node: &Stmt, output: &mut String) -> Result<()> {
        match node {
            Stmt::Text(s) => output.push_str(s),
            Stmt::Output(exprs) => {
                for expr in exprs {
                    let val = self.eval_expr(expr)?;
                    output.push_str(&val.to_string());
                }
            }
            Stmt::For {
                targets,
                iter,
                filter,
                body,
                else_body,
            } => {
                let items = match self.eval_expr(iter)? {
                    Value::List(items) => items,
                    Value::Map(m) => m.into_keys().map(Value::String).collect(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    // Missing iterable = skip loop (Jinja behavior)
                    Value::Undefined | Value::None => Vec::new(),
                    other => {
                        return Err(render_error(format!(
                            "'{}' object is not iterable",
                            other.type_name()
                        )))
                    }
                };

                let mut selected = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(filter) = filter {
                        self.push_scope();
                        let keep = self
                            .bind_targets(targets, item.clone())
                            .and_then(|()| self.eval_expr(filter));
                        self.pop_scope();
                        if !keep?.is_truthy() {
                            continue;
                        }
                    }
                    selected.push(item);
                }

                if selected.is_empty() {
                    return self.render_body(else_body, output);
                }

                let len = selected.len();
                for (i, item) in selected.into_iter().enumerate() {
                    self.push_scope();
                    let result = self.bind_targets(targets, item).and_then(|()| {
                        self.set_local("loop".to_string(), loop_value(i, len));
                        self.render_body(body, output)
                    });
                    self.pop_scope();
                    result?;
                }
            }
            Stmt::If {
                test,
                body,
                elifs,
                else_body,
            } => {
                let cases = std::iter::once((test, body)).chain(elifs.iter().map(|(t, b)| (t, b)));
                for (cond, body) in cases {
                    if self.eval_expr(cond)?.is_truthy() {
                        return self.render_body(body, output);
                    }
                }
                self.render_body(else_body, output)?;
            }
            Stmt::Set { target, value } => {
                let value = self.eval_expr(value)?;
                self.set_local(target.clone(), value);
            }
            Stmt::Block { body, .. } => self.render_body(body, output)?,
        }
        Ok(())
    }

    fn render_body(&mut self, body: &[Stmt], output: &mut String) -> Result<()> {
        for node in body {
            self.render_stmt(node, output)?;
        }
        Ok(())
    }

    fn bind_targets(&mut self, targets: &[String], item: Value) -> Result<()> {
        if let [target] = targets {
            self.set_local(target.clone(), item);
            return Ok(());
        }
        let values = match item {
            Value::List(values) if values.len() == targets.len() => values,
            other => {
                return Err(render_error(format!(
                    "cannot unpack {} into {} loop variables",
                    other.repr(),
                    targets.len()
                )))
            }
        };
        for (target, value) in targets.iter().zip(values) {
            self.set_local(target.clone(), value);
        }
        Ok(())
    }

    fn eval_expr(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(c) => Ok(match c {
                Const::Str(s) => Value::String(s.clone()),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Bool(b) => Value::Bool(*b),
                Const::None => Value::None,
            }),
            Expr::Name(name) => Ok(self.get_var(name)),
            Expr::Getattr { node, attr } => {
                let val = self.eval_expr(node)?;
                match val {
                    Value::Map(m) => Ok(m.get(attr).cloned().unwrap_or_default()),
                    Value::Undefined => Err(undefined_error(node, attr)),
                    _ => Ok(Value::Undefined),
                }
            }
            Expr::Getitem { node, arg } => {
                let val = self.eval_expr(node)?;
                let idx_val = self.eval_expr(arg)?;
                match (val, idx_val) {
                    (Value::Undefined, _) => Err(undefined_error(node, &item_label(arg))),
                    (Value::Map(m), Value::String(s)) => Ok(m.get(&s).cloned().unwrap_or_default()),
                    (Value::List(a), Value::Int(i)) => Ok(index(&a, i).cloned().unwrap_or_default()),
                    (Value::String(s), Value::Int(i)) => {
                        let chars: Vec<Value> = s.chars().map(|c| Value::String(c.to_string())).collect();
                        Ok(index(&chars, i).cloned().unwrap_or_default())
                    }
                    _ => Ok(Value::Undefined),
                }
            }
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<Result<_>>()?,
            )),
            Expr::Unary { op, node } => {
                let val = self.eval_expr(node)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.is_truthy())),
                    UnaryOp::Neg => match val {
                        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(render_error(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::BinOp { left, op, right } => {
                let l = self.eval_expr(left)?;
                // Short-circuit like Python: the deciding operand is the result.
                match op {
                    BinOp::And if !l.is_truthy() => return Ok(l),
                    BinOp::Or if l.is_truthy() => return Ok(l),
                    BinOp::And | BinOp::Or => return self.eval_expr(right),
                    _ => {}
                }
                let r = self.eval_expr(right)?;
                arithmetic(*op, l, r)
            }
            Expr::Compare { expr, ops } => {
                let mut lhs = self.eval_expr(expr)?;
                for (op, operand) in ops {
                    let rhs = self.eval_expr(operand)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::Filter {
                node,
                name,
                args,
                kwargs,
            } => {
                let val = self.eval_expr(node)?;
                let args = self.eval_args(args)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, v)| Ok::<_, Error>((k.as_str(), self.eval_expr(v)?)))
                    .collect::<Result<Vec<_>>>()?;
                apply_filter(name, val, &args, &kwargs)
            }
            Expr::Test {
                node,
                name,
                args,
                negated,
            } => {
                let val = self.eval_expr(node)?;
                let args = self.eval_args(args)?;
                let result = apply_test(name, &val, &args)?;
                Ok(Value::Bool(result != *negated))
            }
            Expr::Call { node, args, .. } => self.eval_call(node, args),
            Expr::CondExpr { test, expr1, expr2 } => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(expr1)
                } else {
                    match expr2 {
                        Some(expr2) => self.eval_expr(expr2),
                        None => Ok(Value::Undefined),
                    }
                }
            }
        }
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    fn eval_call(&self, node: &Expr, args: &[Expr]) -> Result<Value> {
        let args = self.eval_args(args)?;
        match node {
            Expr::Name(name) if name == "range" && self.get_var(name).is_undefined() => range(&args),
            Expr::Getattr { node, attr } => {
                let receiver = self.eval_expr(node)?;
                match (receiver, attr.as_str()) {
                    (Value::Map(m), "items") => Ok(Value::List(
                        m.into_iter()
                            .map(|(k, v)| Value::List(vec![Value::String(k), v]))
                            .collect(),
                    )),
                    (Value::Map(m), "keys") => Ok(Value::List(m.into_keys().map(Value::String).collect())),
                    (Value::Map(m), "values") => Ok(Value::List(m.into_values().collect())),
                    (Value::String(s), "upper") => Ok(Value::String(s.to_uppercase())),
                    (Value::String(s), "lower") => Ok(Value::String(s.to_lowercase())),
                    (Value::String(s), "strip") => Ok(Value::String(s.trim().to_string())),
                    (receiver, method) => Err(render_error(format!(
                        "'{}' object has no method '{method}'",
                        receiver.type_name()
                    ))),
                }
            }
            _ => Err(render_error("object is not callable")),
        }
    }
}

fn loop_value(i: usize, len: usize) -> Value {
    let int = |n: usize| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));
    let mut loop_map = IndexMap::new();
    loop_map.insert("index".to_string(), int(i + 1));
    loop_map.insert("index0".to_string(), int(i));
    loop_map.insert("revindex".to_string(), int(len - i));
    loop_map.insert("revindex0".to_string(), int(len - i - 1));
    loop_map.insert("first".to_string(), Value::Bool(i == 0));
    loop_map.insert("last".to_string(), Value::Bool(i == len - 1));
    loop_map.insert("length".to_string(), int(len));
    Value::Map(loop_map)
}

fn undefined_error(node: &Expr, attr: &str) -> Error {
    match node {
        Expr::Name(name) => render_error(format!("'{name}' is undefined (accessing '{attr}')")),
        _ => render_error(format!("cannot access '{attr}' of an undefined value")),
    }
}

fn item_label(arg: &Expr) -> String {
    match arg {
        Expr::Const(Const::Str(s)) => s.clone(),
        Expr::Const(Const::Int(i)) => i.to_string(),
        _ => "item".to_string(),
    }
}

fn index(items: &[Value], i: i64) -> Option<&Value> {
    let len = i64::try_from(items.len()).ok()?;
    let i = if i < 0 { len + i } else { i };
    usize::try_from(i).ok().and_then(|i| items.get(i))
}

fn range(args: &[Value]) -> Result<Value> {
    let ints: Vec<i64> = args
        .iter()
        .map(|arg| match arg {
            Value::Int(i) => Ok(*i),
            other => Err(render_error(format!(
                "range() expects integers, got '{}'",
                other.type_name()
            ))),
        })
        .collect::<Result<_>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] if *step != 0 => (*start, *stop, *step),
        _ => return Err(render_error("range() expects 1 to 3 arguments and a non-zero step")),
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::List(out))
}

fn overflow() -> Error {
    render_error("integer overflow")
}

/// Integer division rounding towards negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.checked_rem(b)? != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder taking the sign of the divisor, so `a == b * floor_div(a, b) + r`.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn arithmetic(op: BinOp, l: Value, r: Value) -> Result<Value> {
    use Value::{Float, Int, List, String as Str};
    let unsupported = |l: &Value, r: &Value, symbol: &str| {
        render_error(format!(
            "unsupported operand type(s) for {symbol}: '{}' and '{}'",
            l.type_name(),
            r.type_name()
        ))
    };
    match op {
        BinOp::Concat => Ok(Str(format!("{l}{r}"))),
        BinOp::Add => match (l, r) {
            (Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
            (Str(a), Str(b)) => Ok(Str(a + &b)),
            (List(mut a), List(b)) => {
                a.extend(b);
                Ok(List(a))
            }
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => Ok(Float(a + b)),
                _ => Err(unsupported(&l, &r, "+")),
            },
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => {
            let symbol = match op {
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::FloorDiv => "//",
                _ => "%",
            };
            if let (Int(a), Int(b)) = (&l, &r) {
                let (a, b) = (*a, *b);
                let result = match op {
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::FloorDiv | BinOp::Mod if b == 0 => {
                        return Err(render_error("integer division or modulo by zero"))
                    }
                    BinOp::FloorDiv => floor_div(a, b),
                    BinOp::Mod => floor_mod(a, b),
                    _ => return float_arithmetic(op, a as f64, b as f64),
                };
                return result.map(Int).ok_or_else(overflow);
            }
            if let (Str(s), Int(n)) = (&l, &r) {
                if op == BinOp::Mul {
                    return Ok(Str(s.repeat(usize::try_from(*n).unwrap_or(0))));
                }
            }
            match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => float_arithmetic(op, a, b),
                _ => Err(unsupported(&l, &r, symbol)),
            }
        }
        BinOp::And | BinOp::Or => Err(render_error("boolean operators are evaluated lazily")),
    }
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Result<Value> {
    match op {
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        _ if b == 0.0 => Err(render_error("division by zero")),
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        _ => {
            let r = a % b;
            Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => l.as_f64() == r.as_f64(),
        _ => l == r,
    }
}

fn ordering(l: &Value, r: &Value) -> Result<Ordering> {
    let ord = match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ord.ok_or_else(|| {
        render_error(format!(
            "'{}' and '{}' cannot be compared",
            l.type_name(),
            r.type_name()
        ))
    })
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(l, r),
        CmpOp::Ne => !values_equal(l, r),
        CmpOp::Lt => ordering(l, r)? == Ordering::Less,
        CmpOp::LtEq => ordering(l, r)? != Ordering::Greater,
        CmpOp::Gt => ordering(l, r)? == Ordering::Greater,
        CmpOp::GtEq => ordering(l, r)? != Ordering::Less,
        CmpOp::In => contains(r, l)?,
        CmpOp::NotIn => !contains(r, l)?,
    })
}

fn contains(container: &Value, needle: &Value) -> Result<bool> {
    match (container, needle) {
        (Value::String(s), Value::String(n)) => Ok(s.contains(n.as_str())),
        (Value::List(items), _) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::Map(m), Value::String(k)) => Ok(m.contains_key(k)),
        (Value::Map(_), _) => Ok(false),
        _ => Err(render_error(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

fn str_arg(args: &[Value], i: usize, default: &str) -> String {
    match args.get(i) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => default.to_string(),
    }
}

fn apply_filter(name: &str, val: Value, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value> {
    let kwarg = |key: &str| kwargs.iter().find(|(k, _)| *k == key).map(|(_, v)| v);
    match name {
        "upper" => Ok(Value::String(val.to_string().to_uppercase())),
        "lower" => Ok(Value::String(val.to_string().to_lowercase())),
        "trim" => Ok(Value::String(val.to_string().trim().to_string())),
        "capitalize" => {
            let s = val.to_string();
            let mut chars = s.chars();
            Ok(Value::String(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }))
        }
        "title" => {
            let mut out = String::new();
            let mut boundary = true;
            for c in val.to_string().chars() {
                if boundary {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                boundary = !c.is_alphanumeric();
            }
            Ok(Value::String(out))
        }
        "length" | "count" => {
            let len = match &val {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(m) => m.len(),
                Value::Undefined => 0,
                other => {
                    return Err(render_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        "default" | "d" => {
            let fallback = args.first().cloned().unwrap_or(Value::String(String::new()));
            let boolean = args
                .get(1)
                .or_else(|| kwarg("boolean"))
                .is_some_and(Value::is_truthy);
            let missing = val.is_undefined() || (boolean && !val.is_truthy());
            Ok(if missing { fallback } else { val })
        }
        "join" => {
            let sep = str_arg(args, 0, "");
            match val {
                Value::List(items) => Ok(Value::String(
                    items.iter().map(Value::to_string).collect::<Vec<_>>().join(&sep),
                )),
                other => Ok(Value::String(other.to_string())),
            }
        }
        "first" | "last" => {
            let mut items = match val {
                Value::List(items) => items,
                Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                _ => return Ok(Value::Undefined),
            };
            let picked = if name == "first" {
                (!items.is_empty()).then(|| items.swap_remove(0))
            } else {
                items.pop()
            };
            Ok(picked.unwrap_or_default())
        }
        "string" => Ok(Value::String(val.to_string())),
        "int" => Ok(Value::Int(match &val {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        })),
        "float" => Ok(Value::Float(match &val {
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            other => other.as_f64().unwrap_or(0.0),
        })),
        "replace" => {
            let old = str_arg(args, 0, "");
            let new = str_arg(args, 1, "");
            Ok(Value::String(val.to_string().replace(&old, &new)))
        }
        "list" => match val {
            Value::List(items) => Ok(Value::List(items)),
            Value::Map(m) => Ok(Value::List(m.into_keys().map(Value::String).collect())),
            Value::String(s) => Ok(Value::List(s.chars().map(|c| Value::String(c.to_string())).collect())),
            Value::Undefined => Ok(Value::List(Vec::new())),
            other => Err(render_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        },
        "sort" => match val {
            Value::List(mut items) => {
                let mut failed = None;
                items.sort_by(|a, b| {
                    ordering(a, b).unwrap_or_else(|err| {
                        failed.get_or_insert(err);
                        Ordering::Equal
                    })
                });
                if let Some(err) = failed {
                    return Err(err);
                }
                let reverse = args.first().or_else(|| kwarg("reverse")).is_some_and(Value::is_truthy);
                if reverse {
                    items.reverse();
                }
                Ok(Value::List(items))
            }
            other => Err(render_error(format!("cannot sort '{}'", other.type_name()))),
        },
        "reverse" => match val {
            Value::List(mut items) => {
                items.reverse();
                Ok(Value::List(items))
            }
            other => Ok(Value::String(other.to_string().chars().rev().collect())),
        },
        _ => Err(render_error(format!("No filter named '{name}'."))),
    }
}

fn apply_test(name: &str, val: &Value, args: &[Value]) -> Result<bool> {
    match name {
        "defined" => Ok(!val.is_undefined()),
        "undefined" => Ok(val.is_undefined()),
        "none" => Ok(matches!(val, Value::None)),
        "string" => Ok(matches!(val, Value::String(_))),
        "number" => Ok(matches!(val, Value::Int(_) | Value::Float(_))),
        "even" | "odd" => match val {
            Value::Int(i) => Ok((i.rem_euclid(2) == 0) == (name == "even")),
            other => Err(render_error(format!(
                "test '{name}' expects an integer, got '{}'",
                other.type_name()
            ))),
        },
        "eq" | "equalto" | "sameas" => Ok(args.first().is_some_and(|arg| values_equal(val, arg))),
        _ => Err(render_error(format!("No test named '{name}'."))),
    }
}
