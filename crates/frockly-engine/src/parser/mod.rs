//! Formula lexer and recovering expression parser.
//!
//! Both stages are total. The lexer classifies every character into *some*
//! token (unrecognized input degrades to a one-character operator token), and
//! the parser turns every token sequence into *some* [`Expr`], falling back to
//! verbatim [`Expr::Opaque`] spans where the grammar gives out. Callers
//! therefore never see a lex or parse error; a hopeless formula simply comes
//! back as an opaque tree that regenerates the original text.

use crate::ast::{BinaryOp, Expr, UnaryExpr, UnaryOp};

/// Byte range into the `=`-stripped source.
///
/// Spans are used only to recover verbatim source slices during parsing; they
/// are not part of the public AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier, uppercased (names are case-insensitive).
    Name(String),
    Number(String),
    /// String literal content with quotes stripped and `""` collapsed.
    Str(String),
    /// Cell/range reference text, uppercased.
    Reference(String),
    /// Single-character operator. Also the catch-all for characters no other
    /// rule recognizes, so the parser can route them into recovery.
    Op(char),
    /// Comparison operator (`= <> < <= > >=`).
    Cmp(BinaryOp),
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }
}

/// Tokenize a formula, stripping one leading `=` if present.
///
/// Returns the stripped source (the span base for every token) together with
/// the token sequence. The sequence always terminates with [`TokenKind::Eof`].
pub fn tokenize(formula: &str) -> (&str, Vec<Token>) {
    let src = formula.strip_prefix('=').unwrap_or(formula);
    (src, Lexer::new(src).lex())
}

/// Convenience composition of [`tokenize`] and [`parse`].
#[must_use]
pub fn parse_formula(formula: &str) -> Expr {
    let (src, tokens) = tokenize(formula);
    parse(src, &tokens)
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

fn is_reference_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == ':' || ch == '$'
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token::new(kind, start, self.pos));
    }

    fn lex(mut self) -> Vec<Token> {
        while let Some(ch) = self.peek() {
            let start = self.pos;

            if ch.is_whitespace() {
                self.bump(ch);
                continue;
            }

            if ch == '"' {
                self.read_string(start);
                continue;
            }

            match ch {
                '(' => {
                    self.bump(ch);
                    self.push(TokenKind::LParen, start);
                    continue;
                }
                ')' => {
                    self.bump(ch);
                    self.push(TokenKind::RParen, start);
                    continue;
                }
                ',' => {
                    self.bump(ch);
                    self.push(TokenKind::Comma, start);
                    continue;
                }
                // Two-character comparators win over their one-character
                // prefixes.
                '<' => {
                    self.bump(ch);
                    let op = match self.peek() {
                        Some('=') => {
                            self.bump('=');
                            BinaryOp::Le
                        }
                        Some('>') => {
                            self.bump('>');
                            BinaryOp::Ne
                        }
                        _ => BinaryOp::Lt,
                    };
                    self.push(TokenKind::Cmp(op), start);
                    continue;
                }
                '>' => {
                    self.bump(ch);
                    let op = match self.peek() {
                        Some('=') => {
                            self.bump('=');
                            BinaryOp::Ge
                        }
                        _ => BinaryOp::Gt,
                    };
                    self.push(TokenKind::Cmp(op), start);
                    continue;
                }
                '=' => {
                    self.bump(ch);
                    self.push(TokenKind::Cmp(BinaryOp::Eq), start);
                    continue;
                }
                '+' | '-' | '*' | '/' | '^' | '&' => {
                    self.bump(ch);
                    self.push(TokenKind::Op(ch), start);
                    continue;
                }
                _ => {}
            }

            // References bind before numbers and names so that `A1:B9` and
            // `1:1` come out as one token.
            if is_reference_char(ch) && self.try_read_reference(start) {
                continue;
            }

            if ch.is_ascii_digit() || (ch == '.' && self.peek2().is_some_and(|c| c.is_ascii_digit()))
            {
                self.read_number(start);
                continue;
            }

            if is_name_start(ch) {
                self.read_name(start);
                continue;
            }

            // Anything else: a one-character operator token the parser will
            // sweep into recovery.
            self.bump(ch);
            self.push(TokenKind::Op(ch), start);
        }

        let end = self.src.len();
        self.tokens.push(Token::new(TokenKind::Eof, end, end));
        self.tokens
    }

    /// `"`-delimited string with `""` as the escaped quote. An unterminated
    /// literal consumes to end of input.
    fn read_string(&mut self, start: usize) {
        self.bump('"');
        let mut value = String::new();
        while let Some(ch) = self.peek() {
            self.bump(ch);
            if ch == '"' {
                if self.peek() == Some('"') {
                    self.bump('"');
                    value.push('"');
                    continue;
                }
                break;
            }
            value.push(ch);
        }
        self.push(TokenKind::Str(value), start);
    }

    /// Greedily consume a maximal run of `[A-Za-z0-9:$]`, then test
    /// decreasing-length prefixes against the reference shapes: full range,
    /// column range, row range, single cell. The longest matching prefix wins
    /// (`A1:B9` is never mis-split into `A1` and a dangling `:B9`); no match
    /// at any length leaves the input for the later rules.
    fn try_read_reference(&mut self, start: usize) -> bool {
        let rest = &self.src[start..];
        let run_len = rest
            .find(|c: char| !is_reference_char(c))
            .unwrap_or(rest.len());
        let run = &rest[..run_len];

        for len in (1..=run.len()).rev() {
            let candidate = &run[..len];
            if is_reference(candidate) {
                self.pos = start + len;
                self.push(TokenKind::Reference(candidate.to_ascii_uppercase()), start);
                return true;
            }
        }
        false
    }

    /// Digits with at most one embedded `.`; no exponents and no signs (sign
    /// is a unary operator in the parser). A leading `.` is accepted when a
    /// digit follows.
    fn read_number(&mut self, start: usize) {
        let mut seen_dot = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.bump(ch);
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
                self.bump(ch);
            } else {
                break;
            }
        }
        self.push(TokenKind::Number(self.src[start..self.pos].to_string()), start);
    }

    fn read_name(&mut self, start: usize) {
        if let Some(ch) = self.peek() {
            self.bump(ch);
        }
        while let Some(ch) = self.peek() {
            if !is_name_continue(ch) {
                break;
            }
            self.bump(ch);
        }
        self.push(
            TokenKind::Name(self.src[start..self.pos].to_ascii_uppercase()),
            start,
        );
    }
}

fn is_letters_1_3(s: &str) -> bool {
    (1..=3).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphabetic())
}

fn is_digits_1_7(s: &str) -> bool {
    (1..=7).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

/// `$`-optional column part: `$A`, `AB`, ...
fn is_col_part(s: &str) -> bool {
    is_letters_1_3(s.strip_prefix('$').unwrap_or(s))
}

/// `$`-optional row part: `$1`, `12`, ...
fn is_row_part(s: &str) -> bool {
    is_digits_1_7(s.strip_prefix('$').unwrap_or(s))
}

/// Single cell: `A1`, `$A$1`, `a1`.
fn is_cell(s: &str) -> bool {
    let s = s.strip_prefix('$').unwrap_or(s);
    let letters = s.len() - s.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
    if !is_letters_1_3(&s[..letters]) {
        return false;
    }
    is_row_part(&s[letters..])
}

/// Tests a candidate against, in order: full range (`A1:B9`), column range
/// (`A:A`), row range (`1:1`), single cell (`A1`, `$A$1`).
fn is_reference(s: &str) -> bool {
    if let Some((left, right)) = s.split_once(':') {
        return (is_cell(left) && is_cell(right))
            || (is_col_part(left) && is_col_part(right))
            || (is_row_part(left) && is_row_part(right));
    }
    is_cell(s)
}

/// Binding powers for the precedence-climbing loop. Left-associative rows are
/// realized as `(n, n + 1)` pairs under the strict-less convention; `^` is
/// right-associative via `(70, 69)`.
fn infix_binding_power(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Pow => (70, 69),
        BinaryOp::Mul | BinaryOp::Div => (60, 61),
        BinaryOp::Add | BinaryOp::Sub => (50, 51),
        BinaryOp::Concat => (40, 41),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge => (30, 31),
    }
}

/// Unary minus binds tighter than `*`/`/` but looser than `^`.
const UNARY_MINUS_BP: u8 = 65;

/// Excel caps formula nesting at 64 levels. Past that the rest of the site is
/// kept verbatim instead of recursing further.
const MAX_NESTED_DEPTH: u32 = 64;

fn infix_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Op('^') => Some(BinaryOp::Pow),
        TokenKind::Op('*') => Some(BinaryOp::Mul),
        TokenKind::Op('/') => Some(BinaryOp::Div),
        TokenKind::Op('+') => Some(BinaryOp::Add),
        TokenKind::Op('-') => Some(BinaryOp::Sub),
        TokenKind::Op('&') => Some(BinaryOp::Concat),
        TokenKind::Cmp(op) => Some(*op),
        _ => None,
    }
}

/// Parse a token sequence into an AST. Never fails: unparseable stretches
/// degrade to [`Expr::Opaque`] spans, and a top-level parse that stops before
/// end of input degrades the whole formula to one opaque span so the text
/// survives a round trip verbatim.
#[must_use]
pub fn parse(src: &str, tokens: &[Token]) -> Expr {
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression(0);
    if matches!(parser.peek_kind(), TokenKind::Eof) {
        return expr;
    }

    // Unconsumed trailing tokens (e.g. a sheet-prefixed reference the grammar
    // does not model). Degrading the whole formula keeps the text lossless.
    let start = tokens.first().map_or(0, |t| t.span.start);
    let end = tokens
        .iter()
        .rev()
        .find(|t| !matches!(t.kind, TokenKind::Eof))
        .map_or(start, |t| t.span.end);
    Expr::Opaque(src[start..end].to_string())
}

struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
    depth: u32,
}

impl Parser<'_> {
    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn next(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    /// Consume tokens verbatim up to the next `,`, `)` or end of input and
    /// yield the covered source slice as one opaque node.
    fn recover_raw(&mut self) -> Expr {
        let start = self.tokens[self.pos].span.start;
        let mut end = start;
        loop {
            match self.peek_kind() {
                TokenKind::Eof | TokenKind::Comma | TokenKind::RParen => break,
                _ => {
                    end = self.tokens[self.pos].span.end;
                    self.pos += 1;
                }
            }
        }
        Expr::Opaque(self.src[start..end].to_string())
    }

    /// Parse one expression site that must end at `,`, `)` or end of input
    /// (call arguments, parenthesized groups). If the expression stops short
    /// of its delimiter, rewind to where the attempt started and re-read the
    /// site as a verbatim opaque span instead.
    fn parse_delimited_expression(&mut self) -> Expr {
        let rewind = self.pos;
        let expr = self.parse_expression(0);
        match self.peek_kind() {
            TokenKind::Eof | TokenKind::Comma | TokenKind::RParen => expr,
            _ => {
                self.pos = rewind;
                self.recover_raw()
            }
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Expr {
        if self.depth >= MAX_NESTED_DEPTH {
            return self.recover_raw();
        }
        self.depth += 1;

        let mut lhs = self.parse_primary();

        loop {
            let Some(op) = infix_op(self.peek_kind()) else {
                break;
            };
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.next();
            let rhs = self.parse_expression(r_bp);
            lhs = Expr::binary(op, lhs, rhs);
        }

        self.depth -= 1;
        lhs
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek_kind() {
            TokenKind::Op('-') => {
                self.next();
                let operand = self.parse_expression(UNARY_MINUS_BP);
                Expr::Unary(UnaryExpr {
                    op: UnaryOp::Minus,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Number(text) => {
                let text = text.clone();
                self.next();
                Expr::Number(text)
            }
            TokenKind::Str(text) => {
                let text = text.clone();
                self.next();
                Expr::String(text)
            }
            TokenKind::Reference(text) => {
                let text = text.clone();
                self.next();
                Expr::Reference(text)
            }
            TokenKind::LParen => {
                self.next();
                let inner = if matches!(self.peek_kind(), TokenKind::RParen) {
                    Expr::Opaque(String::new())
                } else {
                    self.parse_delimited_expression()
                };
                // Tolerate a missing `)`.
                if matches!(self.peek_kind(), TokenKind::RParen) {
                    self.next();
                }
                Expr::Paren(Box::new(inner))
            }
            TokenKind::Name(name) => {
                let name = name.clone();
                self.next();
                if matches!(self.peek_kind(), TokenKind::LParen) {
                    self.next();
                    return self.parse_call(name);
                }
                // A bare name with no call target is not modeled as a
                // distinct node.
                Expr::Opaque(name)
            }
            _ => self.recover_raw(),
        }
    }

    /// Arguments of `NAME(`: expressions separated by `,`, ending at `)` or
    /// end of input. An empty argument position (`,` or `)` straight away)
    /// records an empty opaque node, matching the formula language's
    /// tolerance of elided arguments.
    fn parse_call(&mut self, name: String) -> Expr {
        let mut args = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RParen | TokenKind::Eof => break,
                TokenKind::Comma => {
                    args.push(Expr::Opaque(String::new()));
                    self.next();
                    continue;
                }
                _ => {}
            }

            args.push(self.parse_delimited_expression());

            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
            } else {
                break;
            }
        }
        if matches!(self.peek_kind(), TokenKind::RParen) {
            self.next();
        }
        Expr::call(name, args)
    }
}
