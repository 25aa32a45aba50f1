//! Declared objects and their identity.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::value::Value;

#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("document is not a mapping")]
	NotAnObject,

	#[error("document has no kind")]
	MissingKind,

	#[error("{kind} has no metadata.name")]
	MissingName { kind: String },

	#[error("duplicate resource {0} in manifest set")]
	DuplicateKey(ResourceKey),
}

/// Identity of a declared object within one manifest set.
///
/// `namespace` is the effective namespace: `default` for namespaced kinds
/// that do not name one, and always `None` for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
	pub api_version: String,
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	pub name: String,
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(ns) => write!(f, "{}/{}/{}/{}", self.api_version, self.kind, ns, self.name),
			None => write!(f, "{}/{}/{}", self.api_version, self.kind, self.name),
		}
	}
}

fn metadata_str<'a>(metadata: Option<&'a serde_json::Value>, field: &str) -> Option<&'a str> {
	metadata?
		.get(field)?
		.as_str()
		.filter(|value| !value.is_empty())
}

/// String entries of a metadata map; anything else is dropped.
fn metadata_map(metadata: Option<&serde_json::Value>, field: &str) -> BTreeMap<String, String> {
	metadata
		.and_then(|m| m.get(field))
		.and_then(serde_json::Value::as_object)
		.map(|map| {
			map.iter()
				.filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
				.collect()
		})
		.unwrap_or_default()
}

/// A declared object parsed from a manifest document.
#[derive(Debug, Clone)]
pub struct Manifest {
	pub api_version: String,
	pub kind: String,
	pub name: String,
	namespace: Option<String>,
	pub labels: BTreeMap<String, String>,
	pub annotations: BTreeMap<String, String>,
	pub spec: Option<Value>,
	pub data: Option<Value>,
	raw: serde_json::Value,
}

impl Manifest {
	pub fn from_json(raw: serde_json::Value) -> Result<Self, ManifestError> {
		let object = raw.as_object().ok_or(ManifestError::NotAnObject)?;

		let kind = object
			.get("kind")
			.and_then(serde_json::Value::as_str)
			.filter(|kind| !kind.is_empty())
			.ok_or(ManifestError::MissingKind)?
			.to_string();
		let api_version = object
			.get("apiVersion")
			.and_then(serde_json::Value::as_str)
			.unwrap_or_default()
			.to_string();

		let metadata = object.get("metadata");
		let name = metadata_str(metadata, "name")
			.ok_or_else(|| ManifestError::MissingName { kind: kind.clone() })?
			.to_string();

		let payload = |field: &str| {
			object
				.get(field)
				.filter(|v| !v.is_null())
				.cloned()
				.map(Value::from)
		};

		Ok(Self {
			spec: payload("spec"),
			data: payload("data"),
			api_version,
			kind,
			name,
			namespace: metadata_str(metadata, "namespace").map(str::to_string),
			labels: metadata_map(metadata, "labels"),
			annotations: metadata_map(metadata, "annotations"),
			raw,
		})
	}

	pub fn is_cluster_scoped(&self) -> bool {
		k8s::is_cluster_scoped(&self.kind)
	}

	/// Effective namespace.
	pub fn namespace(&self) -> Option<&str> {
		if self.is_cluster_scoped() {
			None
		} else {
			Some(self.namespace.as_deref().unwrap_or(k8s::DEFAULT_NAMESPACE))
		}
	}

	pub fn key(&self) -> ResourceKey {
		ResourceKey {
			api_version: self.api_version.clone(),
			kind: self.kind.clone(),
			namespace: self.namespace().map(str::to_string),
			name: self.name.clone(),
		}
	}

	/// The object as declared, untouched.
	pub fn raw(&self) -> &serde_json::Value {
		&self.raw
	}

	/// The object to send to a cluster: the declared object with its effective
	/// namespace written into metadata.
	pub fn to_object(&self) -> serde_json::Value {
		let mut object = self.raw.clone();
		if let Some(metadata) = object
			.get_mut("metadata")
			.and_then(serde_json::Value::as_object_mut)
		{
			match self.namespace() {
				Some(ns) => {
					metadata.insert("namespace".to_string(), ns.into());
				}
				None => {
					metadata.remove("namespace");
				}
			}
		}
		object
	}

	/// Move a namespaced object into `namespace`. Cluster-scoped objects are
	/// left alone.
	pub fn set_namespace(&mut self, namespace: &str) {
		if !self.is_cluster_scoped() {
			self.namespace = Some(namespace.to_string());
		}
	}
}

/// Split a YAML stream on `---` document markers.
///
/// Splitting happens before any parsing, so a syntax error stays confined to
/// its own document.
fn split_documents(content: &str) -> Vec<String> {
	let mut documents = Vec::new();
	let mut current = String::new();

	for line in content.lines() {
		if let Some(rest) = line.strip_prefix("---") {
			if rest.is_empty() || rest.starts_with([' ', '\t', '#']) {
				documents.push(std::mem::take(&mut current));
				// `--- value` opens a document on the marker line
				let rest = rest.trim_start();
				if !rest.is_empty() && !rest.starts_with('#') {
					current.push_str(rest);
					current.push('\n');
				}
				continue;
			}
		}
		current.push_str(line);
		current.push('\n');
	}
	documents.push(current);
	documents
}

fn is_blank(document: &str) -> bool {
	document.lines().all(|line| {
		let line = line.trim();
		line.is_empty() || line.starts_with('#') || line == "..."
	})
}

/// Parse a multi-document YAML stream.
///
/// Empty, unparsable, non-mapping, kindless and nameless documents are
/// skipped with a warning naming `origin`. Document order is preserved.
pub fn parse_documents(content: &str, origin: &str) -> Vec<Manifest> {
	let mut manifests = Vec::new();

	for (index, document) in split_documents(content).iter().enumerate() {
		if is_blank(document) {
			continue;
		}
		let raw = match serde_yaml::from_str::<serde_json::Value>(document) {
			Ok(raw) => raw,
			Err(err) => {
				warn!(origin, document = index, error = %err, "skipping unparsable document");
				continue;
			}
		};
		if raw.is_null() {
			continue;
		}

		match Manifest::from_json(raw) {
			Ok(manifest) => manifests.push(manifest),
			Err(err) => warn!(origin, document = index, error = %err, "skipping invalid document"),
		}
	}

	manifests
}

/// The declared objects of one run, unique by [`ResourceKey`].
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
	manifests: Vec<Manifest>,
}

impl ManifestSet {
	pub fn new(manifests: Vec<Manifest>) -> Result<Self, ManifestError> {
		let set = Self { manifests };
		set.check_unique()?;
		Ok(set)
	}

	fn check_unique(&self) -> Result<(), ManifestError> {
		let mut seen = std::collections::HashSet::new();
		for manifest in &self.manifests {
			let key = manifest.key();
			if seen.contains(&key) {
				return Err(ManifestError::DuplicateKey(key));
			}
			seen.insert(key);
		}
		Ok(())
	}

	/// Move every namespaced object into `namespace`.
	///
	/// Fails if two objects that differed only by namespace collide.
	pub fn override_namespace(&mut self, namespace: &str) -> Result<(), ManifestError> {
		for manifest in &mut self.manifests {
			manifest.set_namespace(namespace);
		}
		self.check_unique()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Manifest> {
		self.manifests.iter()
	}

	pub fn len(&self) -> usize {
		self.manifests.len()
	}

	pub fn is_empty(&self) -> bool {
		self.manifests.is_empty()
	}
}

impl<'a> IntoIterator for &'a ManifestSet {
	type Item = &'a Manifest;
	type IntoIter = std::slice::Iter<'a, Manifest>;

	fn into_iter(self) -> Self::IntoIter {
		self.manifests.iter()
	}
}
