//! Transform registry for named value conversions applied by mapping rules.
//!
//! Every transform is total and fail-soft: when the input's JSON type is not
//! one the transform understands, the input comes back unchanged. Looking up
//! an unknown name is also a no-op, so a typo in a rule never breaks mapping.
//!
//! Each registered transform carries an [`Inverse`] used by
//! [`TransformRegistry::apply_inverse`] when data flows from a platform
//! schema back to the canonical one.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{NaiveDate, SecondsFormat};
use regex::Regex;
use serde_json::{Number, Value};

/// Trait for value conversion functions
pub trait TransformFn: Send + Sync {
    /// Convert `value`, returning it unchanged if it cannot be converted
    fn execute(&self, value: &Value) -> Value;
}

impl<F> TransformFn for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn execute(&self, value: &Value) -> Value {
        self(value)
    }
}

/// How a transform is undone in the reverse direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inverse {
    /// The same transform is applied again
    SelfInverse,
    /// Another registered transform undoes this one
    Named(String),
}

struct Entry {
    func: Box<dyn TransformFn>,
    inverse: Inverse,
}

/// Registry for storing and calling transformation functions
pub struct TransformRegistry {
    transforms: HashMap<String, Entry>,
}

impl TransformRegistry {
    /// Create a new empty transform registry
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in transforms:
    /// `uppercase`, `lowercase`, `cents_to_dollars`, `dollars_to_cents`,
    /// `string`, `int`, `bool`, `date_iso`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("uppercase", Box::new(uppercase), Inverse::SelfInverse);
        registry.register("lowercase", Box::new(lowercase), Inverse::SelfInverse);
        registry.register(
            "cents_to_dollars",
            Box::new(cents_to_dollars),
            Inverse::Named("dollars_to_cents".to_string()),
        );
        registry.register(
            "dollars_to_cents",
            Box::new(dollars_to_cents),
            Inverse::Named("cents_to_dollars".to_string()),
        );
        registry.register("string", Box::new(to_string), Inverse::SelfInverse);
        registry.register("int", Box::new(to_int), Inverse::SelfInverse);
        registry.register("bool", Box::new(to_bool), Inverse::SelfInverse);
        // Reverse application re-parses an ISO timestamp as YYYY-MM-DD, which
        // fails and passes the value through.
        registry.register("date_iso", Box::new(date_iso), Inverse::SelfInverse);
        registry
    }

    /// Register a transformation function. A later registration under the
    /// same name replaces the earlier one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        func: Box<dyn TransformFn>,
        inverse: Inverse,
    ) {
        self.transforms.insert(name.into(), Entry { func, inverse });
    }

    /// Apply the named transform. Unknown names return the value unchanged.
    pub fn apply(&self, name: &str, value: &Value) -> Value {
        match self.transforms.get(name) {
            Some(entry) => entry.func.execute(value),
            None => {
                tracing::debug!("Unknown transform '{}', passing value through", name);
                value.clone()
            }
        }
    }

    /// Apply the inverse of the named transform.
    pub fn apply_inverse(&self, name: &str, value: &Value) -> Value {
        match self.transforms.get(name).map(|entry| &entry.inverse) {
            Some(Inverse::Named(inverse)) => self.apply(inverse, value),
            Some(Inverse::SelfInverse) | None => self.apply(name, value),
        }
    }

    /// Inverse declared for a transform, if it is registered
    pub fn inverse_of(&self, name: &str) -> Option<&Inverse> {
        self.transforms.get(name).map(|entry| &entry.inverse)
    }

    /// Check if a transform is registered
    pub fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Get list of all registered transform names, sorted
    pub fn list_transforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transforms.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// JSON number for an `f64`, using the integer form when the value is whole
/// so that `15.0` serializes as `15`.
pub(crate) fn number_from_f64(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Some(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f).map(Value::Number)
}

fn uppercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        other => other.clone(),
    }
}

fn lowercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

fn cents_to_dollars(value: &Value) -> Value {
    match value.as_f64() {
        Some(cents) => number_from_f64(cents / 100.0).unwrap_or_else(|| value.clone()),
        None => value.clone(),
    }
}

fn dollars_to_cents(value: &Value) -> Value {
    let Value::Number(n) = value else {
        return value.clone();
    };

    if let Some(whole) = n.as_i64() {
        return whole
            .checked_mul(100)
            .map(|cents| Value::Number(cents.into()))
            .unwrap_or_else(|| value.clone());
    }

    let Some(dollars) = n.as_f64() else {
        return value.clone();
    };
    let scaled = dollars * 100.0;
    // Absorb binary representation error (0.29 * 100 = 28.999...) before
    // truncating toward zero.
    let nearest = scaled.round();
    let cents = if (scaled - nearest).abs() < 1e-6 {
        nearest
    } else {
        scaled.trunc()
    };

    if cents < i64::MIN as f64 || cents >= i64::MAX as f64 {
        return value.clone();
    }
    Value::Number((cents as i64).into())
}

fn to_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::String(i.to_string()),
            (None, Some(u), _) => Value::String(u.to_string()),
            (None, None, Some(f)) => Value::String(f.to_string()),
            _ => value.clone(),
        },
        Value::Bool(b) => Value::String(b.to_string()),
        other => other.clone(),
    }
}

fn to_int(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return value.clone();
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Value::Number((f.trunc() as i64).into())
                }
                _ => value.clone(),
            }
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => Value::Number(i.into()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

fn to_bool(value: &Value) -> Value {
    match value {
        Value::Bool(_) => value.clone(),
        Value::String(s) => Value::Bool(matches!(s.as_str(), "true" | "1" | "yes")),
        Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        other => other.clone(),
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"))
}

fn date_iso(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    if !date_pattern().is_match(s) {
        return value.clone();
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| {
            Value::String(midnight.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true))
        })
        .unwrap_or_else(|| value.clone())
}
