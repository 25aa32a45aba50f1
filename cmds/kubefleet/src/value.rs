//! Typed object values with structural comparison.
//!
//! Live objects and declared manifests both arrive as JSON. Comparing them
//! as [`Value`] rather than raw JSON makes numeric equality structural
//! (`2 == 2.0`) and gives drift detection a path-aware diff.

use std::{collections::BTreeMap, fmt};

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	List(Vec<Value>),
	Map(BTreeMap<String, Value>),
}

impl Value {
	pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
		match self {
			Value::Map(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.as_map()?.get(key)
	}

	/// Compare `self` (the expected value) against `observed`, reporting
	/// every difference below `path`.
	///
	/// Keys for which `ignore` returns true are skipped at every depth. Maps
	/// only check the keys `self` declares, and lists of equal length are
	/// compared item by item under the same rule. Lists of different length
	/// and scalars compare as a whole.
	pub fn diff(
		&self,
		observed: &Value,
		path: &str,
		ignore: &dyn Fn(&str) -> bool,
	) -> Vec<Difference> {
		let mut out = Vec::new();
		diff_into(self, observed, path, ignore, &mut out);
		out
	}
}

fn diff_into(
	expected: &Value,
	observed: &Value,
	path: &str,
	ignore: &dyn Fn(&str) -> bool,
	out: &mut Vec<Difference>,
) {
	match (expected, observed) {
		(Value::Map(expected), Value::Map(observed)) => {
			for (key, expected_value) in expected {
				if ignore(key) {
					continue;
				}
				let child = format!("{path}.{key}");
				match observed.get(key) {
					None => out.push(Difference {
						path: child,
						kind: DifferenceKind::Missing,
					}),
					Some(observed_value) => {
						diff_entry(expected_value, observed_value, &child, ignore, out)
					}
				}
			}
		}
		// Items pair up by position; a length change is reported for the whole list
		(Value::List(expected), Value::List(observed)) if expected.len() == observed.len() => {
			for (i, (expected_item, observed_item)) in expected.iter().zip(observed).enumerate() {
				diff_entry(expected_item, observed_item, &format!("{path}[{i}]"), ignore, out);
			}
		}
		_ => {
			if expected != observed {
				out.push(Difference::changed(path, observed.clone(), expected.clone()));
			}
		}
	}
}

fn diff_entry(
	expected: &Value,
	observed: &Value,
	path: &str,
	ignore: &dyn Fn(&str) -> bool,
	out: &mut Vec<Difference>,
) {
	if matches!(expected, Value::Map(_)) && !matches!(observed, Value::Map(_)) {
		out.push(Difference {
			path: path.to_string(),
			kind: DifferenceKind::TypeMismatch,
		});
		return;
	}
	diff_into(expected, observed, path, ignore, out);
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => {
				f.fract() == 0.0 && (*i as f64) == *f
			}
			(Value::String(a), Value::String(b)) => a == b,
			(Value::List(a), Value::List(b)) => a == b,
			(Value::Map(a), Value::Map(b)) => a == b,
			_ => false,
		}
	}
}

impl From<serde_json::Value> for Value {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => Value::Int(i),
				None => n.as_f64().map_or(Value::Null, Value::Float),
			},
			serde_json::Value::String(s) => Value::String(s),
			serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
			serde_json::Value::Object(map) => {
				Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
			}
		}
	}
}

impl From<&Value> for serde_json::Value {
	fn from(value: &Value) -> Self {
		match value {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::Bool(*b),
			Value::Int(i) => serde_json::Value::from(*i),
			// Non-finite floats have no JSON form
			Value::Float(f) => serde_json::Number::from_f64(*f)
				.map_or(serde_json::Value::Null, serde_json::Value::Number),
			Value::String(s) => serde_json::Value::String(s.clone()),
			Value::List(items) => serde_json::Value::Array(items.iter().map(Into::into).collect()),
			Value::Map(map) => serde_json::Value::Object(
				map.iter()
					.map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
					.collect(),
			),
		}
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serde_json::Value::from(self).serialize(serializer)
	}
}

/// Compact JSON, as used in difference messages.
impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", serde_json::Value::from(self))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum DifferenceKind {
	Missing,
	TypeMismatch,
	Changed { observed: Value, expected: Value },
}

/// One field-level difference between an expected and an observed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
	pub path: String,
	pub kind: DifferenceKind,
}

impl Difference {
	pub fn changed(path: &str, observed: Value, expected: Value) -> Self {
		Self {
			path: path.to_string(),
			kind: DifferenceKind::Changed { observed, expected },
		}
	}
}

impl fmt::Display for Difference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.kind {
			DifferenceKind::Missing => write!(f, "{}: missing in cluster", self.path),
			DifferenceKind::TypeMismatch => write!(f, "{}: type mismatch", self.path),
			DifferenceKind::Changed { observed, expected } => {
				write!(f, "{}: {observed} (expected: {expected})", self.path)
			}
		}
	}
}
