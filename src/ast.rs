//! Emission AST.
//!
//! The generator assembles statements instead of concatenating strings; text
//! exists only after [`render_block`]. Rendering is deterministic (4-space
//! indent, Allman braces) and idempotent, which is what makes golden tests on
//! emitted source possible.

use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Eq,
    Ne,
    Lt,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// A local variable or parameter.
    Local(String),
    /// `base.name`
    Field(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `base.Length`
    Length(Box<Expr>),
    /// `Unit.Member(args)` — static call into another generated unit,
    /// resolved by name at invoke time.
    Call {
        unit: String,
        member: String,
        args: Vec<Expr>,
    },
    /// `new Name()`
    NewObject(String),
    /// `new Elem[len]` — `elem` is an already-rendered type name.
    NewArray { elem: String, len: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn field(base: Expr, name: impl Into<String>) -> Self {
        Expr::Field(Box::new(base), name.into())
    }

    pub fn index(base: Expr, idx: Expr) -> Self {
        Expr::Index(Box::new(base), Box::new(idx))
    }

    pub fn length(base: Expr) -> Self {
        Expr::Length(Box::new(base))
    }

    pub fn not_null(subject: Expr) -> Self {
        Expr::Binary {
            op: BinOp::Ne,
            lhs: Box::new(subject),
            rhs: Box::new(Expr::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `Ty name = init;` — `ty` is an already-rendered type name.
    DeclareLocal {
        ty: String,
        name: String,
        init: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
    },
    /// `for (int var = 0; var < upper; var++) { body }`
    ForRange {
        var: String,
        upper: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Expr(Expr),
}

// ————————————————————————————————————————————————————————————————————————————
// RENDERING
// ————————————————————————————————————————————————————————————————————————————

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Null => "null".to_string(),
        Expr::Bool(b) => b.to_string(),
        Expr::Int(i) => i.to_string(),
        Expr::Str(s) => format!("\"{}\"", escape_str(s)),
        Expr::Local(name) => name.clone(),
        Expr::Field(base, name) => format!("{}.{}", render_expr(base), name),
        Expr::Index(base, idx) => format!("{}[{}]", render_expr(base), render_expr(idx)),
        Expr::Length(base) => format!("{}.Length", render_expr(base)),
        Expr::Call { unit, member, args } => {
            let rendered: Vec<String> = args.iter().map(render_expr).collect();
            format!("{}.{}({})", unit, member, rendered.join(", "))
        }
        Expr::NewObject(name) => format!("new {}()", name),
        Expr::NewArray { elem, len } => format!("new {}[{}]", elem, render_expr(len)),
        Expr::Binary { op, lhs, rhs } => {
            format!("{} {} {}", render_expr(lhs), op.symbol(), render_expr(rhs))
        }
    }
}

/// Render a statement list at the given indent depth (4 spaces per level).
pub fn render_block(stmts: &[Stmt], depth: usize) -> String {
    let mut out = String::new();
    for stmt in stmts {
        render_stmt(&mut out, stmt, depth);
    }
    out
}

fn render_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = "    ".repeat(depth);
    match stmt {
        Stmt::DeclareLocal { ty, name, init } => {
            let _ = writeln!(out, "{pad}{ty} {name} = {};", render_expr(init));
        }
        Stmt::Assign { target, value } => {
            let _ = writeln!(out, "{pad}{} = {};", render_expr(target), render_expr(value));
        }
        Stmt::If { cond, then } => {
            let _ = writeln!(out, "{pad}if ({})", render_expr(cond));
            let _ = writeln!(out, "{pad}{{");
            out.push_str(&render_block(then, depth + 1));
            let _ = writeln!(out, "{pad}}}");
        }
        Stmt::ForRange { var, upper, body } => {
            let _ = writeln!(
                out,
                "{pad}for (int {var} = 0; {var} < {}; {var}++)",
                render_expr(upper)
            );
            let _ = writeln!(out, "{pad}{{");
            out.push_str(&render_block(body, depth + 1));
            let _ = writeln!(out, "{pad}}}");
        }
        Stmt::Return(Some(expr)) => {
            let _ = writeln!(out, "{pad}return {};", render_expr(expr));
        }
        Stmt::Return(None) => {
            let _ = writeln!(out, "{pad}return;");
        }
        Stmt::Expr(expr) => {
            let _ = writeln!(out, "{pad}{};", render_expr(expr));
        }
    }
}

fn escape_str(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_idempotent() {
        let stmts = vec![
            Stmt::DeclareLocal {
                ty: "Node".into(),
                name: "newInstance".into(),
                init: Expr::NewObject("Node".into()),
            },
            Stmt::Return(Some(Expr::local("newInstance"))),
        ];
        let a = render_block(&stmts, 2);
        let b = render_block(&stmts, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn null_guard_renders_as_if_block() {
        let stmt = Stmt::If {
            cond: Expr::not_null(Expr::field(Expr::local("oldInstance"), "next")),
            then: vec![Stmt::Assign {
                target: Expr::field(Expr::local("newInstance"), "next"),
                value: Expr::Call {
                    unit: "DeepCloneNode".into(),
                    member: "Clone".into(),
                    args: vec![Expr::field(Expr::local("oldInstance"), "next")],
                },
            }],
        };
        let text = render_block(std::slice::from_ref(&stmt), 0);
        let expected = "\
if (oldInstance.next != null)
{
    newInstance.next = DeepCloneNode.Clone(oldInstance.next);
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn for_range_renders_canonical_header() {
        let stmt = Stmt::ForRange {
            var: "i".into(),
            upper: Expr::length(Expr::field(Expr::local("oldInstance"), "tags")),
            body: vec![Stmt::Assign {
                target: Expr::index(
                    Expr::field(Expr::local("newInstance"), "tags"),
                    Expr::local("i"),
                ),
                value: Expr::index(
                    Expr::field(Expr::local("oldInstance"), "tags"),
                    Expr::local("i"),
                ),
            }],
        };
        let text = render_block(std::slice::from_ref(&stmt), 0);
        assert!(text.starts_with("for (int i = 0; i < oldInstance.tags.Length; i++)\n{\n"));
        assert!(text.contains("    newInstance.tags[i] = oldInstance.tags[i];\n"));
    }

    #[test]
    fn string_literals_are_escaped() {
        let expr = Expr::Str("a\"b\\c".into());
        assert_eq!(render_expr(&expr), "\"a\\\"b\\\\c\"");
    }
}
