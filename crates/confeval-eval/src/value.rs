use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// SCRIPT VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Unit,

    /// Instance of a class loaded from the script classpath.
    Object(Object),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub type_name: String,
    pub properties: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::String(_) => "String",
            Value::Number(_) => "Number",
            Value::Bool(_) => "Boolean",
            Value::Unit => "Unit",
            Value::Object(obj) => &obj.type_name,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    // ========================================================================
    // METHOD CALLS
    // ========================================================================

    /// Calls a zero or one argument method. Object methods are the members
    /// declared by the class on the classpath.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self {
            Value::String(s) => Self::call_string_method(s, name, args),
            Value::Object(obj) => {
                if !args.is_empty() {
                    bail!("{}.{}() expects no arguments, got {}", obj.type_name, name, args.len());
                }
                obj.get(name)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Unresolved reference: {}", name))
            }
            Value::Number(_) | Value::Bool(_) if name == "toString" && args.is_empty() => {
                Ok(Value::String(self.display()))
            }
            _ => bail!("Unresolved reference: {}", name),
        }
    }

    fn call_string_method(s: &str, name: &str, args: &[Value]) -> Result<Value> {
        match (name, args) {
            ("uppercase", []) => Ok(Value::String(s.to_uppercase())),
            ("lowercase", []) => Ok(Value::String(s.to_lowercase())),
            ("trim", []) => Ok(Value::String(s.trim().to_string())),
            ("toString", []) => Ok(Value::String(s.to_string())),
            ("startsWith", [Value::String(prefix)]) => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
            ("endsWith", [Value::String(suffix)]) => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
            ("uppercase" | "lowercase" | "trim" | "toString" | "startsWith" | "endsWith", _) => {
                bail!("Wrong arguments for String.{}()", name)
            }
            _ => bail!("Unresolved reference: {}", name),
        }
    }

    /// Property access such as `"abc".length`.
    pub fn get_property(&self, name: &str) -> Result<Value> {
        match (self, name) {
            (Value::String(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
            (Value::Object(obj), _) => obj
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Unresolved reference: {}", name)),
            _ => bail!("Unresolved reference: {}", name),
        }
    }

    // ========================================================================
    // DISPLAY
    // ========================================================================

    pub fn display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Unit => "kotlin.Unit".to_string(),
            Value::Object(obj) => format!("{}@{}", obj.type_name, obj.properties.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
