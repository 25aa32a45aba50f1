//! YAML rendering for reports.
//!
//! Keys are sorted recursively so output is stable across runs regardless of
//! map iteration order upstream.

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum YamlError {
	#[error("converting report to JSON")]
	Json(#[from] serde_json::Error),

	#[error("serializing report to YAML")]
	Yaml(#[from] serde_saphyr::ser_error::Error),
}

/// Sort all JSON object keys recursively.
pub fn sort_json_keys(value: JsonValue) -> JsonValue {
	match value {
		JsonValue::Object(map) => {
			let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			JsonValue::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k, sort_json_keys(v)))
					.collect(),
			)
		}
		JsonValue::Array(arr) => JsonValue::Array(arr.into_iter().map(sort_json_keys).collect()),
		other => other,
	}
}

/// Serialize any report to a YAML string with sorted keys.
#[instrument(skip_all)]
pub fn to_yaml<T: Serialize>(value: &T) -> Result<String, YamlError> {
	let sorted = sort_json_keys(serde_json::to_value(value)?);

	let options = serde_saphyr::SerializerOptions {
		indent_step: 2,
		indent_array: Some(0),
		prefer_block_scalars: true,
		empty_map_as_braces: true,
		empty_array_as_brackets: true,
		line_width: Some(80),
		quote_ambiguous_keys: true,
		quote_numeric_strings: true,
		..Default::default()
	};

	let mut output = String::new();
	serde_saphyr::to_fmt_writer_with_options(&mut output, &sorted, options)?;
	Ok(output)
}
