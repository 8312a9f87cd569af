//! Where node values come from during preflight.

use std::path::Path;

use filler_types::Result;
use serde_json::Value;

/// Resolves a node's data key to a value. `Ok(None)` means "no value"; an
/// error is recorded against the node as an invalid field.
pub trait DataSource: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Option<Value>>;
}

impl<F> DataSource for F
where
    F: Fn(&str) -> Result<Option<Value>> + Send + Sync,
{
    fn fetch(&self, key: &str) -> Result<Option<Value>> {
        self(key)
    }
}

/// A JSON document addressed by dotted paths: `applicant.name`,
/// `employees.0.email`.
#[derive(Debug, Clone, Default)]
pub struct JsonDataSource {
    root: Value,
}

impl JsonDataSource {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&json)?))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

impl DataSource for JsonDataSource {
    fn fetch(&self, key: &str) -> Result<Option<Value>> {
        Ok(lookup(&self.root, key).cloned())
    }
}

/// Resolve a dotted path. `.` is the value itself. A key present
/// verbatim wins over splitting it on dots.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path == "." {
        return Some(value);
    }
    if let Some(v) = value.as_object().and_then(|m| m.get(path)) {
        return Some(v);
    }
    path.split('.').try_fold(value, |v, segment| match v {
        Value::Object(m) => m.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
