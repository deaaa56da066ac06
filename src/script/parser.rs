//! Recursive-descent parser for the emission grammar.
//!
//! The accepted language is exactly what the builder renders (plus arbitrary
//! whitespace): optional `using` lines, one static class, static methods whose
//! bodies use the statement forms of [`crate::ast`]. Unknown type names are
//! rejected here, where source positions are still available, so they come
//! back as positioned diagnostics instead of invoke-time surprises.

use crate::ast::{BinOp, Expr, Stmt};
use crate::bridge::Diagnostic;
use crate::builder::Visibility;
use crate::type_name;
use crate::universe::{TypeRef, TypeUniverse};

// ————————————————————————————————————————————————————————————————————————————
// PARSED SHAPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct ParsedMethod {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub params: Vec<(TypeRef, String)>,
    pub return_type: Option<TypeRef>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub usings: Vec<String>,
    pub class_name: String,
    pub methods: Vec<ParsedMethod>,
}

impl ParsedUnit {
    pub fn method(&self, name: &str) -> Option<&ParsedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LEXER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident(String),
    Int(i64),
    Str(String),
    Sym(&'static str),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokKind,
    line: usize,
    col: usize,
}

fn lex(source: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut toks = Vec::new();
    let mut chars = source.chars().peekable();
    let (mut line, mut col) = (1usize, 1usize);

    macro_rules! bump {
        () => {{
            let c = chars.next();
            if c == Some('\n') {
                line += 1;
                col = 1;
            } else if c.is_some() {
                col += 1;
            }
            c
        }};
    }

    while let Some(&c) = chars.peek() {
        let (tl, tc) = (line, col);
        if c.is_whitespace() {
            bump!();
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    bump!();
                } else {
                    break;
                }
            }
            toks.push(Token { kind: TokKind::Ident(ident), line: tl, col: tc });
            continue;
        }
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    bump!();
                } else {
                    break;
                }
            }
            let value = digits.parse::<i64>().map_err(|_| Diagnostic {
                line: tl,
                col: tc,
                message: format!("integer literal out of range: {digits}"),
            })?;
            toks.push(Token { kind: TokKind::Int(value), line: tl, col: tc });
            continue;
        }
        if c == '"' {
            bump!();
            let mut text = String::new();
            loop {
                match bump!() {
                    Some('"') => break,
                    Some('\\') => match bump!() {
                        Some(esc @ ('"' | '\\')) => text.push(esc),
                        Some(other) => {
                            return Err(Diagnostic {
                                line,
                                col,
                                message: format!("unknown escape: \\{other}"),
                            });
                        }
                        None => {
                            return Err(Diagnostic {
                                line,
                                col,
                                message: "unterminated string literal".to_string(),
                            });
                        }
                    },
                    Some(other) => text.push(other),
                    None => {
                        return Err(Diagnostic {
                            line,
                            col,
                            message: "unterminated string literal".to_string(),
                        });
                    }
                }
            }
            toks.push(Token { kind: TokKind::Str(text), line: tl, col: tc });
            continue;
        }
        // Symbols, longest first.
        bump!();
        let sym: &'static str = match c {
            '=' => {
                if chars.peek() == Some(&'=') {
                    bump!();
                    "=="
                } else {
                    "="
                }
            }
            '!' => {
                if chars.peek() == Some(&'=') {
                    bump!();
                    "!="
                } else {
                    return Err(Diagnostic {
                        line: tl,
                        col: tc,
                        message: "unexpected character: !".to_string(),
                    });
                }
            }
            '+' => {
                if chars.peek() == Some(&'+') {
                    bump!();
                    "++"
                } else {
                    "+"
                }
            }
            '{' => "{",
            '}' => "}",
            '(' => "(",
            ')' => ")",
            '[' => "[",
            ']' => "]",
            ';' => ";",
            ',' => ",",
            '.' => ".",
            '<' => "<",
            '>' => ">",
            other => {
                return Err(Diagnostic {
                    line: tl,
                    col: tc,
                    message: format!("unexpected character: {other}"),
                });
            }
        };
        toks.push(Token { kind: TokKind::Sym(sym), line: tl, col: tc });
    }
    Ok(toks)
}

// ————————————————————————————————————————————————————————————————————————————
// PARSER
// ————————————————————————————————————————————————————————————————————————————

pub fn parse_unit(source: &str, universe: &TypeUniverse) -> Result<ParsedUnit, Diagnostic> {
    let toks = lex(source)?;
    let mut p = Parser { toks, pos: 0, universe };
    p.unit()
}

struct Parser<'a> {
    toks: Vec<Token>,
    pos: usize,
    universe: &'a TypeUniverse,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&TokKind> {
        self.toks.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokKind> {
        self.toks.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> Diagnostic {
        let (line, col) = self
            .toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map(|t| (t.line, t.col))
            .unwrap_or((1, 1));
        Diagnostic { line, col, message: message.into() }
    }

    fn expect_sym(&mut self, sym: &'static str) -> Result<(), Diagnostic> {
        match self.peek() {
            Some(TokKind::Sym(s)) if *s == sym => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(self.err(format!("expected `{sym}`, found {}", describe(other)))),
            None => Err(self.err(format!("expected `{sym}`, found end of input"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, Diagnostic> {
        match self.peek() {
            Some(TokKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(other) => Err(self.err(format!("expected identifier, found {}", describe(other)))),
            None => Err(self.err("expected identifier, found end of input")),
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(TokKind::Ident(name)) if name == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), Diagnostic> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{kw}`")))
        }
    }

    // ———————————————————————————— declarations ————————————————————————————

    fn unit(&mut self) -> Result<ParsedUnit, Diagnostic> {
        let mut usings = Vec::new();
        while self.eat_keyword("using") {
            let name = self.expect_ident()?;
            if !self.universe.contains(&name) {
                return Err(self.err(format!("using references unknown type: {name}")));
            }
            self.expect_sym(";")?;
            usings.push(name);
        }

        self.visibility()?;
        self.eat_keyword("static");
        self.expect_keyword("class")?;
        let class_name = self.expect_ident()?;
        self.expect_sym("{")?;
        let mut methods = Vec::new();
        while !matches!(self.peek(), Some(TokKind::Sym("}")) | None) {
            methods.push(self.method()?);
        }
        self.expect_sym("}")?;
        if self.peek().is_some() {
            return Err(self.err("unexpected trailing tokens after class body"));
        }
        Ok(ParsedUnit { usings, class_name, methods })
    }

    fn visibility(&mut self) -> Result<Visibility, Diagnostic> {
        if self.eat_keyword("public") {
            Ok(Visibility::Public)
        } else if self.eat_keyword("internal") {
            Ok(Visibility::Internal)
        } else if self.eat_keyword("private") {
            Ok(Visibility::Private)
        } else {
            Err(self.err("expected visibility (public/internal/private)"))
        }
    }

    fn method(&mut self) -> Result<ParsedMethod, Diagnostic> {
        let visibility = self.visibility()?;
        let is_static = self.eat_keyword("static");
        let return_type = if self.eat_keyword("void") { None } else { Some(self.parse_type()?) };
        let name = self.expect_ident()?;
        self.expect_sym("(")?;
        let mut params = Vec::new();
        if !matches!(self.peek(), Some(TokKind::Sym(")"))) {
            loop {
                let ty = self.parse_type()?;
                let pname = self.expect_ident()?;
                params.push((ty, pname));
                if !self.eat_sym(",") {
                    break;
                }
            }
        }
        self.expect_sym(")")?;
        let body = self.block()?;
        Ok(ParsedMethod { name, visibility, is_static, params, return_type, body })
    }

    fn eat_sym(&mut self, sym: &'static str) -> bool {
        if matches!(self.peek(), Some(TokKind::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// `bool|int|double|string|Name`, optional `<args>`, optional `[]` suffixes.
    /// Named base types must exist in the universe.
    fn parse_type(&mut self) -> Result<TypeRef, Diagnostic> {
        let name = self.expect_ident()?;
        let mut base = match name.as_str() {
            "bool" => TypeRef::Bool,
            "int" => TypeRef::Int,
            "double" => TypeRef::Float,
            "string" => TypeRef::Str,
            _ => {
                if !self.universe.contains(&name) {
                    return Err(self.err(format!("unknown type: {name}")));
                }
                let mut args = Vec::new();
                if self.eat_sym("<") {
                    loop {
                        args.push(self.parse_type()?);
                        if !self.eat_sym(",") {
                            break;
                        }
                    }
                    self.expect_sym(">")?;
                }
                TypeRef::Named { name, args }
            }
        };
        while self.eat_sym("[") {
            self.expect_sym("]")?;
            base = TypeRef::array(base);
        }
        Ok(base)
    }

    // ————————————————————————————— statements —————————————————————————————

    fn block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect_sym("{")?;
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Some(TokKind::Sym("}")) | None) {
            stmts.push(self.stmt()?);
        }
        self.expect_sym("}")?;
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, Diagnostic> {
        if self.eat_keyword("return") {
            if self.eat_sym(";") {
                return Ok(Stmt::Return(None));
            }
            let expr = self.expr()?;
            self.expect_sym(";")?;
            return Ok(Stmt::Return(Some(expr)));
        }
        if self.eat_keyword("if") {
            self.expect_sym("(")?;
            let cond = self.expr()?;
            self.expect_sym(")")?;
            let then = self.block()?;
            return Ok(Stmt::If { cond, then });
        }
        if self.eat_keyword("for") {
            return self.for_range();
        }
        if self.at_declaration() {
            let ty = self.parse_type()?;
            let name = self.expect_ident()?;
            self.expect_sym("=")?;
            let init = self.expr()?;
            self.expect_sym(";")?;
            return Ok(Stmt::DeclareLocal { ty: type_name::render(&ty), name, init });
        }
        let target = self.expr()?;
        if self.eat_sym("=") {
            let value = self.expr()?;
            self.expect_sym(";")?;
            return Ok(Stmt::Assign { target, value });
        }
        self.expect_sym(";")?;
        Ok(Stmt::Expr(target))
    }

    /// Only the canonical counting loop is accepted:
    /// `for (int i = 0; i < upper; i++) { ... }`
    fn for_range(&mut self) -> Result<Stmt, Diagnostic> {
        self.expect_sym("(")?;
        self.expect_keyword("int")?;
        let var = self.expect_ident()?;
        self.expect_sym("=")?;
        match self.next().map(|t| t.kind) {
            Some(TokKind::Int(0)) => {}
            _ => return Err(self.err("for loop must start at 0")),
        }
        self.expect_sym(";")?;
        let var2 = self.expect_ident()?;
        if var2 != var {
            return Err(self.err("for loop condition must test the loop variable"));
        }
        self.expect_sym("<")?;
        let upper = self.expr()?;
        self.expect_sym(";")?;
        let var3 = self.expect_ident()?;
        if var3 != var {
            return Err(self.err("for loop increment must target the loop variable"));
        }
        self.expect_sym("++")?;
        self.expect_sym(")")?;
        let body = self.block()?;
        Ok(Stmt::ForRange { var, upper, body })
    }

    /// Declaration lookahead: a primitive keyword, `Ident Ident`, or
    /// `Ident [ ] Ident`. Anything else is an expression statement.
    fn at_declaration(&self) -> bool {
        let Some(TokKind::Ident(first)) = self.peek() else {
            return false;
        };
        if matches!(first.as_str(), "bool" | "int" | "double" | "string") {
            return true;
        }
        match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
            (Some(TokKind::Ident(_)), _, _) => true,
            (Some(TokKind::Sym("[")), Some(TokKind::Sym("]")), _) => true,
            _ => false,
        }
    }

    // ————————————————————————————— expressions ————————————————————————————

    fn expr(&mut self) -> Result<Expr, Diagnostic> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(TokKind::Sym("==")) => Some(BinOp::Eq),
            Some(TokKind::Sym("!=")) => Some(BinOp::Ne),
            Some(TokKind::Sym("<")) => Some(BinOp::Lt),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.additive()?;
            return Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.postfix()?;
        while self.eat_sym("+") {
            let rhs = self.postfix()?;
            lhs = Expr::Binary { op: BinOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_sym(".") {
                let name = self.expect_ident()?;
                if matches!(self.peek(), Some(TokKind::Sym("("))) {
                    let Expr::Local(unit) = expr else {
                        return Err(self.err("calls are only supported as Unit.Member(args)"));
                    };
                    self.expect_sym("(")?;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(TokKind::Sym(")"))) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat_sym(",") {
                                break;
                            }
                        }
                    }
                    self.expect_sym(")")?;
                    expr = Expr::Call { unit, member: name, args };
                } else if name == "Length" {
                    expr = Expr::length(expr);
                } else {
                    expr = Expr::Field(Box::new(expr), name);
                }
                continue;
            }
            if self.eat_sym("[") {
                let idx = self.expr()?;
                self.expect_sym("]")?;
                expr = Expr::index(expr, idx);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, Diagnostic> {
        match self.peek().cloned() {
            Some(TokKind::Int(value)) => {
                self.pos += 1;
                Ok(Expr::Int(value))
            }
            Some(TokKind::Str(text)) => {
                self.pos += 1;
                Ok(Expr::Str(text))
            }
            Some(TokKind::Sym("(")) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Some(TokKind::Ident(name)) => match name.as_str() {
                "null" => {
                    self.pos += 1;
                    Ok(Expr::Null)
                }
                "true" => {
                    self.pos += 1;
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.pos += 1;
                    Ok(Expr::Bool(false))
                }
                "new" => {
                    self.pos += 1;
                    self.new_expr()
                }
                _ => {
                    self.pos += 1;
                    Ok(Expr::Local(name))
                }
            },
            Some(other) => Err(self.err(format!("expected expression, found {}", describe(&other)))),
            None => Err(self.err("expected expression, found end of input")),
        }
    }

    /// `new Name()` or `new Elem[len]`.
    fn new_expr(&mut self) -> Result<Expr, Diagnostic> {
        let name = self.expect_ident()?;
        let base = match name.as_str() {
            "bool" => TypeRef::Bool,
            "int" => TypeRef::Int,
            "double" => TypeRef::Float,
            "string" => TypeRef::Str,
            _ => {
                if !self.universe.contains(&name) {
                    return Err(self.err(format!("unknown type: {name}")));
                }
                TypeRef::named(name)
            }
        };
        if self.eat_sym("(") {
            self.expect_sym(")")?;
            let TypeRef::Named { name, .. } = base else {
                return Err(self.err("cannot construct a primitive with new"));
            };
            return Ok(Expr::NewObject(name));
        }
        self.expect_sym("[")?;
        let len = self.expr()?;
        self.expect_sym("]")?;
        Ok(Expr::NewArray { elem: type_name::render(&base), len: Box::new(len) })
    }
}

fn describe(tok: &TokKind) -> String {
    match tok {
        TokKind::Ident(name) => format!("`{name}`"),
        TokKind::Int(value) => format!("`{value}`"),
        TokKind::Str(_) => "string literal".to_string(),
        TokKind::Sym(sym) => format!("`{sym}`"),
    }
}

// ------------------------------- Tests ------------------------------------ //
