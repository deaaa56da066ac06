//! Evaluator for loaded units.
//!
//! Runs a parsed method body over [`Value`]s. Unit-qualified calls resolve
//! through the linker at invoke time, which is what lets a routine reference
//! a partner unit that was declared later in the same synthesis.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::ast::{BinOp, Expr, Stmt};
use crate::error::InvokeError;
use crate::script::parser::{ParsedMethod, ParsedUnit};
use crate::type_name;
use crate::universe::TypeUniverse;
use crate::value::{self, Value};

pub type Linker = DashMap<String, Arc<ParsedUnit>>;

type Env = HashMap<String, Value>;

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interp<'a> {
    pub universe: &'a TypeUniverse,
    pub linker: &'a Linker,
}

/// Invoke `method` with positional `args`. Arity is checked here; the shape
/// was already checked at bind time.
pub fn invoke(
    method: &ParsedMethod,
    args: &[Value],
    universe: &TypeUniverse,
    linker: &Linker,
) -> Result<Value, InvokeError> {
    if args.len() != method.params.len() {
        return Err(InvokeError::ArityMismatch {
            member: method.name.clone(),
            expected: method.params.len(),
            got: args.len(),
        });
    }
    let mut env: Env = method
        .params
        .iter()
        .zip(args)
        .map(|((_, name), value)| (name.clone(), value.clone()))
        .collect();
    let interp = Interp { universe, linker };
    match interp.exec_block(&method.body, &mut env)? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Ok(Value::Null),
    }
}

impl<'a> Interp<'a> {
    fn exec_block(&self, stmts: &[Stmt], env: &mut Env) -> Result<Flow, InvokeError> {
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, env: &mut Env) -> Result<Flow, InvokeError> {
        match stmt {
            Stmt::DeclareLocal { name, init, .. } => {
                let value = self.eval(init, env)?;
                env.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, env)?;
                self.assign(target, value, env)?;
                Ok(Flow::Normal)
            }
            Stmt::If { cond, then } => {
                if self.truthy(cond, env)? {
                    self.exec_block(then, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::ForRange { var, upper, body } => {
                let upper = match self.eval(upper, env)? {
                    Value::Int(n) => n,
                    other => {
                        return Err(InvokeError::TypeMismatch(format!(
                            "loop bound must be int, got {}",
                            kind_of(&other)
                        )));
                    }
                };
                for i in 0..upper {
                    env.insert(var.clone(), Value::Int(i));
                    match self.exec_block(body, env)? {
                        Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(Some(expr)) => Ok(Flow::Return(self.eval(expr, env)?)),
            Stmt::Return(None) => Ok(Flow::Return(Value::Null)),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn truthy(&self, cond: &Expr, env: &mut Env) -> Result<bool, InvokeError> {
        match self.eval(cond, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(InvokeError::TypeMismatch(format!(
                "condition must be bool, got {}",
                kind_of(&other)
            ))),
        }
    }

    fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Value, InvokeError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Local(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| InvokeError::UnknownLocal(name.clone())),
            Expr::Field(base, name) => {
                let base = self.eval(base, env)?;
                match base {
                    Value::Object(o) => o
                        .read()
                        .fields
                        .get(name)
                        .cloned()
                        .ok_or_else(|| InvokeError::UnknownField(name.clone())),
                    Value::Struct(s) => s
                        .fields
                        .get(name)
                        .cloned()
                        .ok_or_else(|| InvokeError::UnknownField(name.clone())),
                    Value::Null => Err(InvokeError::NullDereference(name.clone())),
                    other => Err(InvokeError::TypeMismatch(format!(
                        "field access on {}",
                        kind_of(&other)
                    ))),
                }
            }
            Expr::Index(base, idx) => {
                let idx = self.index_of(idx, env)?;
                match self.eval(base, env)? {
                    Value::Array(items) => items.get(idx as usize).cloned().ok_or(
                        InvokeError::IndexOutOfBounds { index: idx, len: items.len() },
                    ),
                    Value::Null => Err(InvokeError::NullDereference("indexing null".to_string())),
                    other => Err(InvokeError::TypeMismatch(format!(
                        "indexing into {}",
                        kind_of(&other)
                    ))),
                }
            }
            Expr::Length(base) => match self.eval(base, env)? {
                Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                Value::Collection(items) => Ok(Value::Int(items.read().len() as i64)),
                Value::Null => Err(InvokeError::NullDereference("Length of null".to_string())),
                other => Err(InvokeError::TypeMismatch(format!(
                    "Length of {}",
                    kind_of(&other)
                ))),
            },
            Expr::Call { unit, member, args } => {
                let target = self
                    .linker
                    .get(unit)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| InvokeError::UnresolvedUnit(unit.clone()))?;
                let method = target.method(member).ok_or_else(|| InvokeError::UnknownMember {
                    unit: unit.clone(),
                    member: member.clone(),
                })?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg, env)?);
                }
                invoke(method, &evaluated, self.universe, self.linker)
            }
            Expr::NewObject(name) => {
                let base = type_name::parse(name)
                    .and_then(|t| t.base_name().map(str::to_string))
                    .unwrap_or_else(|| name.clone());
                match self.universe.get(&base) {
                    Some(d) if d.is_enumerable => Ok(Value::collection(Vec::new())),
                    Some(_) => Ok(match value::default_for(
                        &crate::universe::TypeRef::named(base.clone()),
                        self.universe,
                    ) {
                        // Classes default to null; `new` means a blank instance.
                        Value::Null => Value::object(value::blank_instance(&base, self.universe)),
                        strukt => strukt,
                    }),
                    None => Err(InvokeError::TypeMismatch(format!("unknown type: {base}"))),
                }
            }
            Expr::NewArray { elem, len } => {
                let len = self.index_of(len, env)?;
                let elem_ty = type_name::parse(elem).ok_or_else(|| {
                    InvokeError::TypeMismatch(format!("unknown element type: {elem}"))
                })?;
                let default = value::default_for(&elem_ty, self.universe);
                Ok(Value::Array(vec![default; len as usize]))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                self.binary(*op, lhs, rhs)
            }
        }
    }

    fn index_of(&self, expr: &Expr, env: &mut Env) -> Result<i64, InvokeError> {
        match self.eval(expr, env)? {
            Value::Int(i) if i >= 0 => Ok(i),
            Value::Int(i) => Err(InvokeError::IndexOutOfBounds { index: i, len: 0 }),
            other => Err(InvokeError::TypeMismatch(format!(
                "index must be int, got {}",
                kind_of(&other)
            ))),
        }
    }

    fn binary(&self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, InvokeError> {
        match op {
            BinOp::Add => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                (Value::Str(a), Value::Int(b)) => Ok(Value::Str(format!("{a}{b}"))),
                (Value::Int(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                (a, b) => Err(InvokeError::TypeMismatch(format!(
                    "cannot add {} and {}",
                    kind_of(&a),
                    kind_of(&b)
                ))),
            },
            BinOp::Eq => Ok(Value::Bool(equal(&lhs, &rhs))),
            BinOp::Ne => Ok(Value::Bool(!equal(&lhs, &rhs))),
            BinOp::Lt => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a < b)),
                (a, b) => Err(InvokeError::TypeMismatch(format!(
                    "cannot order {} and {}",
                    kind_of(&a),
                    kind_of(&b)
                ))),
            },
        }
    }

    // ———————————————————————————— assignment ————————————————————————————

    fn assign(&self, target: &Expr, value: Value, env: &mut Env) -> Result<(), InvokeError> {
        match target {
            Expr::Local(name) => {
                env.insert(name.clone(), value);
                Ok(())
            }
            Expr::Field(base, name) => {
                let base = self.eval(base, env)?;
                match base {
                    Value::Object(o) => {
                        let mut o = o.write();
                        match o.fields.get_mut(name) {
                            Some(slot) => {
                                *slot = value;
                                Ok(())
                            }
                            None => Err(InvokeError::UnknownField(name.clone())),
                        }
                    }
                    Value::Null => Err(InvokeError::NullDereference(name.clone())),
                    other => Err(InvokeError::TypeMismatch(format!(
                        "cannot assign into a field of {}",
                        kind_of(&other)
                    ))),
                }
            }
            Expr::Index(base, idx) => {
                let idx = self.index_of(idx, env)?;
                self.with_array_slot(base, env, |items| {
                    match items.get_mut(idx as usize) {
                        Some(slot) => {
                            *slot = value;
                            Ok(())
                        }
                        None => Err(InvokeError::IndexOutOfBounds { index: idx, len: items.len() }),
                    }
                })
            }
            other => Err(InvokeError::TypeMismatch(format!(
                "invalid assignment target: {}",
                crate::ast::render_expr(other)
            ))),
        }
    }

    /// Resolve the storage of an array-valued lvalue and hand a mutable
    /// reference to `apply`. Arrays are inline, so the owner (local slot or
    /// instance field) must be borrowed mutably rather than copied.
    fn with_array_slot<F>(&self, base: &Expr, env: &mut Env, apply: F) -> Result<(), InvokeError>
    where
        F: FnOnce(&mut Vec<Value>) -> Result<(), InvokeError>,
    {
        match base {
            Expr::Local(name) => {
                match env.get_mut(name) {
                    Some(Value::Array(items)) => apply(items),
                    Some(Value::Null) => Err(InvokeError::NullDereference(name.clone())),
                    Some(other) => Err(InvokeError::TypeMismatch(format!(
                        "indexing into {}",
                        kind_of(other)
                    ))),
                    None => Err(InvokeError::UnknownLocal(name.clone())),
                }
            }
            Expr::Field(owner, field) => {
                let owner = self.eval(owner, env)?;
                match owner {
                    Value::Object(o) => {
                        let mut o = o.write();
                        match o.fields.get_mut(field) {
                            Some(Value::Array(items)) => apply(items),
                            Some(Value::Null) => Err(InvokeError::NullDereference(field.clone())),
                            Some(other) => Err(InvokeError::TypeMismatch(format!(
                                "indexing into {}",
                                kind_of(other)
                            ))),
                            None => Err(InvokeError::UnknownField(field.clone())),
                        }
                    }
                    Value::Null => Err(InvokeError::NullDereference(field.clone())),
                    other => Err(InvokeError::TypeMismatch(format!(
                        "cannot index a field of {}",
                        kind_of(&other)
                    ))),
                }
            }
            other => Err(InvokeError::TypeMismatch(format!(
                "unsupported indexed assignment base: {}",
                crate::ast::render_expr(other)
            ))),
        }
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Object(_), Value::Object(_)) | (Value::Collection(_), Value::Collection(_)) => {
            a.ptr_eq(b)
        }
        _ => a.structurally_eq(b),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "double",
        Value::Str(_) => "string",
        Value::Array(_) => "array",
        Value::Struct(_) => "struct",
        Value::Object(_) => "object",
        Value::Collection(_) => "collection",
    }
}
