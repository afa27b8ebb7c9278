use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    BlockStart, // {%
    BlockEnd,   // %}
    VarStart,   // {{
    VarEnd,     // }}

    // Keywords
    If,
    Elif,
    Else,
    EndIf,
    For,
    In,
    EndFor,
    And,
    Or,
    Not,
    Is,
    True,
    False,
    None,

    // Symbols
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=
    Assign,   // =
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    FloorDiv, // //
    Percent,  // %
    Tilde,    // ~
    Pipe,     // |
    Comma,    // ,
    Dot,      // .
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )

    // Data
    Ident(String),
    StringLit(String),
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Token::Text(_) => "template data",
            Token::BlockStart => "'{%'",
            Token::BlockEnd => "'%}'",
            Token::VarStart => "'{{'",
            Token::VarEnd => "'}}'",
            Token::If => "'if'",
            Token::Elif => "'elif'",
            Token::Else => "'else'",
            Token::EndIf => "'endif'",
            Token::For => "'for'",
            Token::In => "'in'",
            Token::EndFor => "'endfor'",
            Token::And => "'and'",
            Token::Or => "'or'",
            Token::Not => "'not'",
            Token::Is => "'is'",
            Token::True => "'true'",
            Token::False => "'false'",
            Token::None => "'none'",
            Token::EqEq => "'=='",
            Token::NotEq => "'!='",
            Token::Lt => "'<'",
            Token::LtEq => "'<='",
            Token::Gt => "'>'",
            Token::GtEq => "'>='",
            Token::Assign => "'='",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::FloorDiv => "'//'",
            Token::Percent => "'%'",
            Token::Tilde => "'~'",
            Token::Pipe => "'|'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::Ident(name) => return write!(f, "name '{name}'"),
            Token::StringLit(_) => "string literal",
            Token::Int(_) | Token::Float(_) => "number",
        };
        f.write_str(s)
    }
}

/// A token together with the 1-based line it starts on.
pub type Spanned = (Token, usize);

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    in_tag: bool,
    lstrip_next: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            in_tag: false,
            lstrip_next: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.line += self.input[self.cursor..self.cursor + n].matches('\n').count();
        self.cursor += n;
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Spanned>, ParseError> {
        loop {
            let rest = self.remaining();
            if rest.is_empty() {
                if self.in_tag {
                    return Err(self.error("unexpected end of template inside tag"));
                }
                return Ok(None);
            }

            if self.in_tag {
                return self.next_tag_token().map(Some);
            }

            let line = self.line;
            // Find next `{{`, `{%` or `{#`
            let next_tag = ["{%", "{{", "{#"]
                .iter()
                .filter_map(|open| rest.find(open))
                .min();

            match next_tag {
                Some(0) => {
                    let strip_before = rest[2..].starts_with('-');
                    let marker = if strip_before { 3 } else { 2 };
                    if rest.starts_with("{#") {
                        self.skip_comment()?;
                        continue;
                    }
                    let token = if rest.starts_with("{%") {
                        Token::BlockStart
                    } else {
                        Token::VarStart
                    };
                    self.advance(marker);
                    self.in_tag = true;
                    return Ok(Some((token, line)));
                }
                Some(idx) => {
                    let mut text = &rest[..idx];
                    // `{%-` strips whitespace before the tag
                    if rest[idx + 2..].starts_with('-') {
                        text = text.trim_end();
                    }
                    let text = self.take_text(text);
                    self.advance(idx);
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(Some((Token::Text(text), line)));
                }
                None => {
                    let text = self.take_text(rest);
                    self.advance(rest.len());
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(Some((Token::Text(text), line)));
                }
            }
        }
    }

    fn take_text(&mut self, text: &str) -> String {
        if std::mem::take(&mut self.lstrip_next) {
            text.trim_start().to_string()
        } else {
            text.to_string()
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        let rest = self.remaining();
        let Some(end) = rest.find("#}") else {
            return Err(self.error("missing end of comment tag"));
        };
        self.lstrip_next = rest[..end].ends_with('-');
        self.advance(end + 2);
        Ok(())
    }

    fn close_tag(&mut self, marker_len: usize, strip_after: bool) {
        self.advance(marker_len);
        self.in_tag = false;
        self.lstrip_next = strip_after;
    }

    fn next_tag_token(&mut self) -> Result<Spanned, ParseError> {
        // In tag: skip whitespace
        let rest = self.remaining();
        let rest_trimmed = rest.trim_start();
        self.advance(rest.len() - rest_trimmed.len());

        let line = self.line;
        let rest = self.remaining();
        if rest.is_empty() {
            return Err(self.error("unexpected end of template inside tag"));
        }

        // Check tag ends
        for (end, token) in [("%}", Token::BlockEnd), ("}}", Token::VarEnd)] {
            let stripped = rest.starts_with('-') && rest[1..].starts_with(end);
            if !stripped && !rest.starts_with(end) {
                continue;
            }
            self.close_tag(end.len() + usize::from(stripped), stripped);
            return Ok((token, line));
        }

        // Symbols, longest first
        const SYMBOLS: [(&str, Token); 21] = [
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("//", Token::FloorDiv),
            ("<", Token::Lt),
            (">", Token::Gt),
            ("=", Token::Assign),
            ("+", Token::Plus),
            ("-", Token::Minus),
            ("*", Token::Star),
            ("/", Token::Slash),
            ("%", Token::Percent),
            ("~", Token::Tilde),
            ("|", Token::Pipe),
            (",", Token::Comma),
            (".", Token::Dot),
            ("[", Token::LBracket),
            ("]", Token::RBracket),
            ("(", Token::LParen),
            (")", Token::RParen),
        ];

        let Some(first) = rest.chars().next() else {
            return Err(self.error("unexpected end of template inside tag"));
        };

        if first.is_ascii_digit() {
            return self.number(line);
        }

        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok((token, line));
            }
        }

        // Strings
        if first == '\'' || first == '"' {
            return self.string(first, line);
        }

        // Identifiers / Keywords
        if first.is_alphabetic() || first == '_' {
            let len: usize = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .map(char::len_utf8)
                .sum();
            let ident = &rest[..len];
            self.advance(len);

            let token = match ident {
                "if" => Token::If,
                "elif" => Token::Elif,
                "else" => Token::Else,
                "endif" => Token::EndIf,
                "for" => Token::For,
                "in" => Token::In,
                "endfor" => Token::EndFor,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "is" => Token::Is,
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "none" | "None" => Token::None,
                _ => Token::Ident(ident.to_string()),
            };
            return Ok((token, line));
        }

        Err(self.error(format!("unexpected char '{first}'")))
    }

    fn string(&mut self, quote: char, line: usize) -> Result<Spanned, ParseError> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + 1);
                return Ok((Token::StringLit(s), line));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err(self.error("unexpected end of string"))
    }

    fn number(&mut self, line: usize) -> Result<Spanned, ParseError> {
        let rest = self.remaining();
        let int_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'_')
            .count();
        let frac_len = match rest[int_len..].strip_prefix('.') {
            Some(after) if after.starts_with(|c: char| c.is_ascii_digit()) => {
                1 + after.bytes().take_while(u8::is_ascii_digit).count()
            }
            _ => 0,
        };
        let literal = rest[..int_len + frac_len].replace('_', "");
        self.advance(int_len + frac_len);

        let token = if frac_len > 0 {
            literal.parse().map(Token::Float).ok()
        } else {
            literal.parse().map(Token::Int).ok()
        };
        token
            .map(|token| (token, line))
            .ok_or_else(|| self.error(format!("invalid number literal '{literal}'")))
    }
}
