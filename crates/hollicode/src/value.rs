//! Runtime values manipulated by the interpreter.
//!
//! Hollicode is dynamically typed; the operand stack holds tagged [`Value`]s.
//! `Nil` is a first-class variant, so "a nil was pushed" and "the stack is
//! empty" are distinct states.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type alias for host functions callable from bytecode.
///
/// A host function receives the call arguments in the order the script
/// supplied them and returns a single value, which the `CALL` handler pushes
/// back onto the operand stack.
pub type HostFn = Arc<dyn Fn(Vec<Value>) -> Value + Send + Sync>;

/// A tagged runtime value.
///
/// Numbers are double-precision floats. `Function` holds a borrowed host
/// handle; the interpreter never owns host code. `Object` is a string-keyed
/// mapping, indexed by the `LOOK` instruction.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Function(HostFn),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Whether this value counts as true in a condition.
    ///
    /// Only `Nil` and `false` are falsy. Everything else is truthy,
    /// including `0` and the empty string.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// The value's type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Object(_) => "object",
        }
    }

    /// Get the value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a bool, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Function(_) => write!(f, "Function(<host>)"),
            Value::Object(fields) => f.debug_tuple("Object").field(fields).finish(),
        }
    }
}

impl fmt::Display for Value {
    /// Render the value the way a front-end would print it: bare strings
    /// unquoted, whole numbers without a trailing `.0`, object fields in
    /// sorted key order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_value(self, f, false)
    }
}

fn fmt_value(value: &Value, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
    match value {
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{}", n),
        Value::String(s) if nested => write!(f, "{:?}", s),
        Value::String(s) => write!(f, "{}", s),
        Value::Function(_) => write!(f, "<function>"),
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            write!(f, "{{")?;
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key)?;
                fmt_value(&fields[*key], f, true)?;
            }
            write!(f, "}}")
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
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

impl From<HashMap<String, Value>> for Value {
    fn from(fields: HashMap<String, Value>) -> Self {
        Value::Object(fields)
    }
}
