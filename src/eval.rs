use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::EvalError;
use crate::expr::{parse_expression, parse_statement, BinOp, Expr, Statement, UnaryOp};
use crate::runtime::Evaluator;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Null,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Null => false,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Null => "null",
        }
    }
}

/// Null renders as nothing; collections render their elements.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Reference [`Evaluator`]: variables in a stack of scopes, expressions in
/// the small language of [`crate::expr`].
#[derive(Debug, Clone)]
pub struct Bindings {
    scopes: Vec<HashMap<String, Value>>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl Bindings {
    pub fn new(context: HashMap<String, Value>) -> Self {
        Self {
            scopes: vec![context],
        }
    }

    /// Declares `name` in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn update(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let slot = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .ok_or_else(|| EvalError::new(format!("variable {name} is not defined")))?;
        *slot = value;
        Ok(())
    }

    pub fn eval_expr(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::StringLit(s) => Ok(Value::String(s.clone())),
            Expr::IntLit(n) => Ok(Value::Int(*n)),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Var(name) => Ok(self.get(name).cloned().unwrap_or(Value::Null)),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval_expr(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Attribute(obj, attr) => {
                let val = self.eval_expr(obj)?;
                match (&val, attr.as_str()) {
                    (Value::Map(m), _) if m.contains_key(attr) => Ok(m[attr].clone()),
                    (Value::Array(a), "len") => Ok(Value::Int(a.len() as i64)),
                    (Value::String(s), "len") => Ok(Value::Int(s.chars().count() as i64)),
                    (Value::Map(m), "len") => Ok(Value::Int(m.len() as i64)),
                    (Value::Map(_), _) => {
                        Err(EvalError::new(format!("attribute {attr} not found")))
                    }
                    _ => Err(EvalError::new(format!(
                        "cannot get attribute {attr} of {}",
                        val.type_name()
                    ))),
                }
            }
            Expr::Index(obj, idx) => {
                let val = self.eval_expr(obj)?;
                let idx_val = self.eval_expr(idx)?;
                match (val, idx_val) {
                    (Value::Map(m), Value::String(s)) => m
                        .get(&s)
                        .cloned()
                        .ok_or_else(|| EvalError::new(format!("key {s} not found"))),
                    (Value::Array(a), Value::Int(i)) => usize::try_from(i)
                        .ok()
                        .and_then(|i| a.get(i))
                        .cloned()
                        .ok_or_else(|| EvalError::new(format!("index {i} out of bounds"))),
                    (val, idx_val) => Err(EvalError::new(format!(
                        "cannot index {} with {}",
                        val.type_name(),
                        idx_val.type_name()
                    ))),
                }
            }
            Expr::Unary(op, operand) => {
                let val = self.eval_expr(operand)?;
                match (op, val) {
                    (UnaryOp::Not, val) => Ok(Value::Bool(!val.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| EvalError::new("integer overflow")),
                    (UnaryOp::Neg, val) => Err(EvalError::new(format!(
                        "cannot negate {}",
                        val.type_name()
                    ))),
                }
            }
            Expr::BinOp(lhs, BinOp::And, rhs) => {
                let truthy = self.eval_expr(lhs)?.is_truthy() && self.eval_expr(rhs)?.is_truthy();
                Ok(Value::Bool(truthy))
            }
            Expr::BinOp(lhs, BinOp::Or, rhs) => {
                let truthy = self.eval_expr(lhs)?.is_truthy() || self.eval_expr(rhs)?.is_truthy();
                Ok(Value::Bool(truthy))
            }
            Expr::BinOp(lhs, op, rhs) => binary(*op, self.eval_expr(lhs)?, self.eval_expr(rhs)?),
        }
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let int = |n: Option<i64>| {
        n.map(Value::Int)
            .ok_or_else(|| EvalError::new("integer overflow"))
    };
    match (op, l, r) {
        (BinOp::Eq, l, r) => Ok(Value::Bool(l == r)),
        (BinOp::Ne, l, r) => Ok(Value::Bool(l != r)),
        (BinOp::Add, Value::Int(a), Value::Int(b)) => int(a.checked_add(b)),
        (BinOp::Add, Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (BinOp::Add, l @ Value::String(_), r) | (BinOp::Add, l, r @ Value::String(_)) => {
            Ok(Value::String(format!("{l}{r}")))
        }
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => int(a.checked_sub(b)),
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => int(a.checked_mul(b)),
        (BinOp::Div | BinOp::Rem, Value::Int(_), Value::Int(0)) => {
            Err(EvalError::new("division by zero"))
        }
        (BinOp::Div, Value::Int(a), Value::Int(b)) => int(a.checked_div(b)),
        (BinOp::Rem, Value::Int(a), Value::Int(b)) => int(a.checked_rem(b)),
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, l, r) => {
            let ordering = match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    return Err(EvalError::new(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        (op, l, r) => Err(EvalError::new(format!(
            "unsupported operands for {op:?}: {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

impl Evaluator for Bindings {
    type Value = Value;

    fn evaluate(&mut self, expression: &str) -> Result<Value, EvalError> {
        self.eval_expr(&parse_expression(expression)?)
    }

    fn is_truthy(&self, value: &Value) -> bool {
        value.is_truthy()
    }

    fn items(&self, value: Value) -> Result<Vec<Value>, EvalError> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Map(map) => Ok(map.into_keys().map(Value::String).collect()),
            // Missing iterable = skip loop
            Value::Null => Ok(Vec::new()),
            other => Err(EvalError::new(format!("cannot iterate over {}", other.type_name()))),
        }
    }

    fn execute(&mut self, statement: &str) -> Result<(), EvalError> {
        match parse_statement(statement)? {
            Statement::Declare { name, value } => {
                let value = self.eval_expr(&value)?;
                self.set(name, value);
                Ok(())
            }
            Statement::Update { name, value } => {
                let value = self.eval_expr(&value)?;
                self.update(&name, value)
            }
        }
    }

    fn bind(&mut self, name: &str, value: Value) {
        self.set(name, value);
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }
}
