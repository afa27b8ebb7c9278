use crate::ast::*;
use crate::lexer::{Spanned, Token, Tokenizer};
use std::collections::VecDeque;

/// Syntax error reported by the template parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

/// Parse template source into a syntax tree.
pub fn parse(source: &str) -> Result<Template, ParseError> {
    Parser::new(source).parse_template()
}

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<Spanned>,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_lexer(Tokenizer::new(input))
    }

    pub fn with_lexer(lexer: Tokenizer<'a>) -> Self {
        Self {
            lexer,
            buffer: VecDeque::new(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
        }
    }

    fn peek(&mut self, n: usize) -> Result<Option<&Token>, ParseError> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(spanned) => self.buffer.push_back(spanned),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n).map(|(token, _)| token))
    }

    fn consume(&mut self) -> Result<Option<Token>, ParseError> {
        let next = match self.buffer.pop_front() {
            Some(spanned) => Some(spanned),
            None => self.lexer.next_token()?,
        };
        Ok(next.map(|(token, line)| {
            self.line = line;
            token
        }))
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        match self.consume()? {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(self.error(format!("expected {token}, got {t}"))),
            None => Err(self.error(format!("expected {token}, got end of template"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.consume()? {
            Some(Token::Ident(name)) => Ok(name),
            Some(t) => Err(self.error(format!("expected {what}, got {t}"))),
            None => Err(self.error(format!("expected {what}, got end of template"))),
        }
    }

    /// Consume `{% <keyword> %}` closing a block opened by `tag`.
    fn expect_end_tag(&mut self, keyword: Token, tag: &str) -> Result<(), ParseError> {
        match self.consume()? {
            Some(Token::BlockStart) => {}
            Some(t) => return Err(self.error(format!("expected {keyword}, got {t}"))),
            None => {
                return Err(self.error(format!(
                    "unexpected end of template, expected {keyword} to close '{tag}'"
                )))
            }
        }
        self.expect(keyword)
    }

    fn at_block_keyword(&mut self, keywords: &[Token]) -> Result<bool, ParseError> {
        if self.peek(0)? != Some(&Token::BlockStart) {
            return Ok(false);
        }
        Ok(matches!(self.peek(1)?, Some(t) if keywords.contains(t)))
    }

    fn at_block_ident(&mut self, ident: &str) -> Result<bool, ParseError> {
        if self.peek(0)? != Some(&Token::BlockStart) {
            return Ok(false);
        }
        Ok(matches!(self.peek(1)?, Some(Token::Ident(name)) if name == ident))
    }

    /// Parse a complete template; stray block terminators are errors.
    pub fn parse_template(&mut self) -> Result<Template, ParseError> {
        let nodes = self.parse()?;
        match self.consume()? {
            None => Ok(nodes),
            Some(Token::BlockStart) => match self.consume()? {
                Some(t) => Err(self.error(format!("unexpected {t} outside of a block"))),
                None => Err(self.error("unexpected end of template inside tag")),
            },
            Some(t) => Err(self.error(format!("unexpected {t}"))),
        }
    }

    /// Parse statements until a block terminator or the end of input.
    pub fn parse(&mut self) -> Result<Template, ParseError> {
        let mut nodes = Vec::new();
        loop {
            // Lookahead for termination conditions
            if self.at_block_keyword(&[Token::EndFor, Token::EndIf, Token::Else, Token::Elif])?
                || self.at_block_ident("endblock")?
            {
                break;
            }

            match self.peek(0)?.cloned() {
                None => break,
                Some(Token::Text(s)) => {
                    self.consume()?;
                    nodes.push(Stmt::Text(s));
                }
                Some(Token::VarStart) => {
                    self.consume()?; // {{
                    let expr = self.parse_expr()?;
                    self.expect(Token::VarEnd)?;
                    nodes.push(Stmt::Output(vec![expr]));
                }
                Some(Token::BlockStart) => {
                    self.consume()?; // {%
                    let stmt = match self.peek(0)?.cloned() {
                        Some(Token::For) => self.parse_for()?,
                        Some(Token::If) => self.parse_if()?,
                        Some(Token::Ident(tag)) if tag == "set" => self.parse_set()?,
                        Some(Token::Ident(tag)) if tag == "block" => self.parse_block()?,
                        Some(Token::Ident(tag)) => {
                            return Err(self.error(format!("encountered unknown tag '{tag}'")))
                        }
                        Some(t) => return Err(self.error(format!("unexpected {t} inside block"))),
                        None => return Err(self.error("unexpected end of template inside block")),
                    };
                    nodes.push(stmt);
                }
                Some(t) => return Err(self.error(format!("unexpected {t}"))),
            }
        }
        Ok(nodes)
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(Token::For)?;
        let mut targets = vec![self.expect_ident("identifier for loop target")?];
        while self.peek(0)? == Some(&Token::Comma) {
            self.consume()?;
            targets.push(self.expect_ident("identifier for loop target")?);
        }
        self.expect(Token::In)?;
        let iter = self.parse_or()?;
        let filter = if self.peek(0)? == Some(&Token::If) {
            self.consume()?;
            Some(self.parse_or()?)
        } else {
            None
        };
        self.expect(Token::BlockEnd)?;

        let body = self.parse()?; // Recursively parse body

        let mut else_body = Vec::new();
        if self.at_block_keyword(&[Token::Else])? {
            self.consume()?; // {%
            self.consume()?; // else
            self.expect(Token::BlockEnd)?;
            else_body = self.parse()?;
        }

        self.expect_end_tag(Token::EndFor, "for")?;
        self.expect(Token::BlockEnd)?;

        Ok(Stmt::For {
            targets,
            iter,
            filter,
            body,
            else_body,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(Token::If)?;
        let test = self.parse_expr()?;
        self.expect(Token::BlockEnd)?;

        let body = self.parse()?;
        let mut elifs = Vec::new();
        let mut else_body = Vec::new();

        loop {
            // Check what comes next: {% elif ... %} or {% else %} or {% endif %}
            match self.peek(0)? {
                Some(Token::BlockStart) => match self.peek(1)? {
                    Some(Token::Elif) => {
                        self.consume()?; // {%
                        self.consume()?; // elif
                        let cond = self.parse_expr()?;
                        self.expect(Token::BlockEnd)?;
                        let block = self.parse()?;
                        elifs.push((cond, block));
                    }
                    Some(Token::Else) => {
                        self.consume()?; // {%
                        self.consume()?; // else
                        self.expect(Token::BlockEnd)?;
                        else_body = self.parse()?;
                        // After else, we must see endif
                        self.expect_end_tag(Token::EndIf, "if")?;
                        self.expect(Token::BlockEnd)?;
                        break;
                    }
                    Some(Token::EndIf) => {
                        self.consume()?; // {%
                        self.consume()?; // endif
                        self.expect(Token::BlockEnd)?;
                        break;
                    }
                    // An `endfor` here means the `if` is unterminated inside a `for`.
                    Some(t) => {
                        let t = t.to_string();
                        return Err(self.error(format!("expected 'elif', 'else' or 'endif', got {t}")));
                    }
                    None => return Err(self.error("unexpected end of template inside block")),
                },
                None => {
                    return Err(self.error("unexpected end of template, expected 'endif' to close 'if'"))
                }
                Some(t) => {
                    let t = t.to_string();
                    return Err(self.error(format!("expected tag start for control flow, got {t}")));
                }
            }
        }

        Ok(Stmt::If {
            test,
            body,
            elifs,
            else_body,
        })
    }

    fn parse_set(&mut self) -> Result<Stmt, ParseError> {
        self.consume()?; // set
        let target = self.expect_ident("identifier for assignment target")?;
        self.expect(Token::Assign)?;
        let value = self.parse_expr()?;
        self.expect(Token::BlockEnd)?;
        Ok(Stmt::Set { target, value })
    }

    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        self.consume()?; // block
        let name = self.expect_ident("block name")?;
        self.expect(Token::BlockEnd)?;
        let body = self.parse()?;
        match self.consume()? {
            Some(Token::BlockStart) => {}
            _ => {
                return Err(self.error(format!(
                    "unexpected end of template, expected 'endblock' to close block '{name}'"
                )))
            }
        }
        match self.consume()? {
            Some(Token::Ident(tag)) if tag == "endblock" => {}
            Some(t) => return Err(self.error(format!("expected 'endblock', got {t}"))),
            None => return Err(self.error("expected 'endblock', got end of template")),
        }
        // `{% endblock name %}`
        if let Some(Token::Ident(_)) = self.peek(0)? {
            let closing = self.expect_ident("block name")?;
            if closing != name {
                return Err(self.error(format!(
                    "block '{name}' closed by 'endblock {closing}'"
                )));
            }
        }
        self.expect(Token::BlockEnd)?;
        Ok(Stmt::Block { name, body })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        if self.peek(0)? != Some(&Token::If) {
            return Ok(expr);
        }
        self.consume()?; // if
        let test = self.parse_or()?;
        let expr2 = if self.peek(0)? == Some(&Token::Else) {
            self.consume()?;
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::CondExpr {
            test: Box::new(test),
            expr1: Box::new(expr),
            expr2,
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek(0)? == Some(&Token::Or) {
            self.consume()?;
            let rhs = self.parse_and()?;
            lhs = binop(lhs, BinOp::Or, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.peek(0)? == Some(&Token::And) {
            self.consume()?;
            let rhs = self.parse_not()?;
            lhs = binop(lhs, BinOp::And, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek(0)? == Some(&Token::Not) {
            self.consume()?;
            let node = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                node: Box::new(node),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_math1()?;
        let mut ops = Vec::new();
        loop {
            let next = self.peek(0)?.cloned();
            let op = match next {
                Some(Token::EqEq) => CmpOp::Eq,
                Some(Token::NotEq) => CmpOp::Ne,
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::LtEq) => CmpOp::LtEq,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::GtEq) => CmpOp::GtEq,
                Some(Token::In) => CmpOp::In,
                Some(Token::Not) => {
                    if self.peek(1)? != Some(&Token::In) {
                        break;
                    }
                    self.consume()?; // not
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.consume()?;
            ops.push((op, self.parse_math1()?));
        }
        if ops.is_empty() {
            return Ok(expr);
        }
        Ok(Expr::Compare {
            expr: Box::new(expr),
            ops,
        })
    }

    fn parse_math1(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_concat()?;
            lhs = binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_math2()?;
        while self.peek(0)? == Some(&Token::Tilde) {
            self.consume()?;
            let rhs = self.parse_math2()?;
            lhs = binop(lhs, BinOp::Concat, rhs);
        }
        Ok(lhs)
    }

    fn parse_math2(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::FloorDiv) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek(0)? == Some(&Token::Minus) {
            self.consume()?;
            let node = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                node: Box::new(node),
            });
        }
        let primary = self.parse_primary()?;
        self.parse_filters(primary)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = match self.consume()? {
            Some(Token::StringLit(s)) => Expr::Const(Const::Str(s)),
            Some(Token::Int(i)) => Expr::Const(Const::Int(i)),
            Some(Token::Float(f)) => Expr::Const(Const::Float(f)),
            Some(Token::True) => Expr::Const(Const::Bool(true)),
            Some(Token::False) => Expr::Const(Const::Bool(false)),
            Some(Token::None) => Expr::Const(Const::None),
            Some(Token::Ident(s)) => Expr::Name(s),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                e
            }
            Some(Token::LBracket) => Expr::List(self.parse_items(Token::RBracket)?),
            Some(t) => return Err(self.error(format!("expected expression, got {t}"))),
            None => return Err(self.error("expected expression, got end of template")),
        };

        // Handle suffixes: .attr, ['key'], (args)
        loop {
            match self.peek(0)? {
                Some(Token::Dot) => {
                    self.consume()?; // .
                    let attr = self.expect_ident("identifier after '.'")?;
                    expr = Expr::getattr(expr, attr);
                }
                Some(Token::LBracket) => {
                    self.consume()?; // [
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Getitem {
                        node: Box::new(expr),
                        arg: Box::new(idx),
                    };
                }
                Some(Token::LParen) => {
                    self.consume()?; // (
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        node: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// `| filter(args)` and `is [not] test(args)` chains.
    fn parse_filters(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek(0)? {
                Some(Token::Pipe) => {
                    self.consume()?;
                    let name = self.expect_ident("filter name")?;
                    let (args, kwargs) = if self.peek(0)? == Some(&Token::LParen) {
                        self.consume()?;
                        self.parse_call_args()?
                    } else {
                        (Vec::new(), Vec::new())
                    };
                    expr = Expr::Filter {
                        node: Box::new(expr),
                        name,
                        args,
                        kwargs,
                    };
                }
                Some(Token::Is) => {
                    self.consume()?;
                    let negated = self.peek(0)? == Some(&Token::Not);
                    if negated {
                        self.consume()?;
                    }
                    let name = match self.consume()? {
                        Some(Token::Ident(name)) => name,
                        Some(Token::None) => "none".to_string(),
                        Some(Token::True) => "true".to_string(),
                        Some(Token::False) => "false".to_string(),
                        Some(t) => return Err(self.error(format!("expected test name, got {t}"))),
                        None => return Err(self.error("expected test name, got end of template")),
                    };
                    let args = if self.peek(0)? == Some(&Token::LParen) {
                        self.consume()?;
                        self.parse_call_args()?.0
                    } else {
                        Vec::new()
                    };
                    expr = Expr::Test {
                        node: Box::new(expr),
                        name,
                        args,
                        negated,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_items(&mut self, close: Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.peek(0)? == Some(&close) {
                self.consume()?;
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            match self.consume()? {
                Some(Token::Comma) => {}
                Some(t) if t == close => return Ok(items),
                Some(t) => return Err(self.error(format!("expected ',' or {close}, got {t}"))),
                None => return Err(self.error(format!("expected {close}, got end of template"))),
            }
        }
    }

    /// Arguments after an opening `(`, up to and including the `)`.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        loop {
            if self.peek(0)? == Some(&Token::RParen) {
                self.consume()?;
                return Ok((args, kwargs));
            }
            let is_kwarg = matches!(self.peek(0)?, Some(Token::Ident(_)))
                && self.peek(1)? == Some(&Token::Assign);
            if is_kwarg {
                let key = self.expect_ident("argument name")?;
                self.consume()?; // =
                kwargs.push((key, self.parse_expr()?));
            } else {
                args.push(self.parse_expr()?);
            }
            match self.consume()? {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok((args, kwargs)),
                Some(t) => return Err(self.error(format!("expected ',' or ')', got {t}"))),
                None => return Err(self.error("expected ')', got end of template")),
            }
        }
    }
}

fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(source: &str) -> Expr {
        match parse(source).expect("parse").pop() {
            Some(Stmt::Output(mut exprs)) => exprs.remove(0),
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[test]
    fn attribute_chain_with_subscript() {
        assert_eq!(
            output("{{ user['profile'].name }}"),
            Expr::getattr(
                Expr::Getitem {
                    node: Box::new(Expr::name("user")),
                    arg: Box::new(Expr::Const(Const::Str("profile".into()))),
                },
                "name"
            )
        );
    }

    #[test]
    fn filters_bind_tighter_than_operators() {
        let expr = output("{{ a ~ b | upper }}");
        let Expr::BinOp { op, right, .. } = expr else {
            panic!("expected binop");
        };
        assert_eq!(op, BinOp::Concat);
        assert!(matches!(*right, Expr::Filter { ref name, .. } if name == "upper"));
    }

    #[test]
    fn not_in_comparison() {
        let expr = output("{{ x not in items }}");
        assert_eq!(
            expr,
            Expr::Compare {
                expr: Box::new(Expr::name("x")),
                ops: vec![(CmpOp::NotIn, Expr::name("items"))],
            }
        );
    }

    #[test]
    fn for_with_else_and_filter() {
        let template =
            parse("{% for k, v in pairs if v %}{{ k }}{% else %}none{% endfor %}").unwrap();
        let Stmt::For {
            targets,
            filter,
            else_body,
            ..
        } = &template[0]
        else {
            panic!("expected for");
        };
        assert_eq!(targets, &["k".to_string(), "v".to_string()]);
        assert_eq!(filter, &Some(Expr::name("v")));
        assert_eq!(else_body, &vec![Stmt::Text("none".into())]);
    }

    #[test]
    fn if_elif_else() {
        let template = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        let Stmt::If { elifs, else_body, .. } = &template[0] else {
            panic!("expected if");
        };
        assert_eq!(elifs.len(), 1);
        assert_eq!(else_body, &vec![Stmt::Text("3".into())]);
    }

    #[test]
    fn set_and_block() {
        let template = parse("{% set x = y | default('z') %}{% block main %}{{ x }}{% endblock main %}").unwrap();
        assert!(matches!(&template[0], Stmt::Set { target, .. } if target == "x"));
        assert!(matches!(&template[1], Stmt::Block { name, .. } if name == "main"));
    }

    #[test]
    fn missing_loop_iterable_is_an_error() {
        let err = parse("{% for item in %}").unwrap_err();
        assert_eq!(err.message, "expected expression, got '%}'");
    }

    #[test]
    fn unterminated_for_is_an_error() {
        let err = parse("{% for item in items %}\n{{ item }}").unwrap_err();
        assert_eq!(
            err.message,
            "unexpected end of template, expected 'endfor' to close 'for'"
        );
        assert_eq!(err.line, 2);
    }

    #[test]
    fn stray_endif_is_an_error() {
        let err = parse("text{% endif %}").unwrap_err();
        assert_eq!(err.message, "unexpected 'endif' outside of a block");
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = parse("{% macro m() %}{% endmacro %}").unwrap_err();
        assert_eq!(err.message, "encountered unknown tag 'macro'");
    }
}
