//! Where declared manifests come from.

use std::{
	fmt, io,
	path::{Component, Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::manifest::{parse_documents, Manifest, ManifestError, ManifestSet};

#[derive(Debug, Error)]
pub enum SourceError {
	#[error("creating scratch directory")]
	ScratchDir(#[source] io::Error),

	#[error("running git")]
	GitSpawn(#[source] io::Error),

	#[error("git clone of {repo} (branch {branch}) failed: {output}")]
	Clone {
		repo: String,
		branch: String,
		output: String,
	},

	#[error("path `{0}` must stay inside the repository")]
	SubpathEscapes(String),

	#[error("manifest path {} does not exist", .0.display())]
	NotFound(PathBuf),

	#[error("walking {}", root.display())]
	Walk {
		root: PathBuf,
		#[source]
		source: walkdir::Error,
	},

	#[error("reading {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error(transparent)]
	Manifest(#[from] ManifestError),
}

/// A tree of manifest files, local or in a git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ManifestSource {
	Git {
		repo: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		path: Option<String>,
		branch: String,
	},
	Local {
		path: PathBuf,
	},
}

impl fmt::Display for ManifestSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ManifestSource::Git { repo, path, branch } => {
				write!(f, "{repo}@{branch}")?;
				if let Some(path) = path {
					write!(f, ":{path}")?;
				}
				Ok(())
			}
			ManifestSource::Local { path } => write!(f, "{}", path.display()),
		}
	}
}

impl ManifestSource {
	/// Read every manifest of the source into a set.
	///
	/// Git sources are shallow-cloned into a scratch directory which is
	/// removed when this returns, whether or not reading succeeded.
	#[instrument(skip_all, fields(source = %self))]
	pub async fn load(&self) -> Result<ManifestSet, SourceError> {
		let manifests = match self {
			ManifestSource::Local { path } => read_tree(path)?,
			ManifestSource::Git { repo, path, branch } => {
				let scratch = tempfile::Builder::new()
					.prefix("kubefleet-")
					.tempdir()
					.map_err(SourceError::ScratchDir)?;
				shallow_clone(repo, branch, scratch.path()).await?;

				let root = match path {
					Some(subpath) => scratch.path().join(checked_subpath(subpath)?),
					None => scratch.path().to_path_buf(),
				};
				read_tree(&root)?
			}
		};

		debug!(count = manifests.len(), "loaded manifests");
		Ok(ManifestSet::new(manifests)?)
	}
}

/// Reject absolute paths and `..` so a subpath cannot leave the checkout.
fn checked_subpath(subpath: &str) -> Result<&Path, SourceError> {
	let path = Path::new(subpath);
	let escapes = path
		.components()
		.any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
	if escapes {
		Err(SourceError::SubpathEscapes(subpath.to_string()))
	} else {
		Ok(path)
	}
}

async fn shallow_clone(repo: &str, branch: &str, into: &Path) -> Result<(), SourceError> {
	let output = Command::new("git")
		.args(["clone", "--depth", "1", "--single-branch", "--branch", branch, "--"])
		.arg(repo)
		.arg(into)
		.env("GIT_TERMINAL_PROMPT", "0")
		.output()
		.await
		.map_err(SourceError::GitSpawn)?;

	if !output.status.success() {
		return Err(SourceError::Clone {
			repo: repo.to_string(),
			branch: branch.to_string(),
			output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
		});
	}
	Ok(())
}

fn is_manifest_file(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Read all `.yaml`/`.yml` files below `root`, in path order.
///
/// `root` may also be a single file.
pub fn read_tree(root: &Path) -> Result<Vec<Manifest>, SourceError> {
	if !root.exists() {
		return Err(SourceError::NotFound(root.to_path_buf()));
	}

	let walker = WalkDir::new(root)
		.sort_by_file_name()
		.into_iter()
		.filter_entry(|entry| entry.file_name() != ".git");

	let mut manifests = Vec::new();
	for entry in walker {
		let entry = entry.map_err(|source| SourceError::Walk {
			root: root.to_path_buf(),
			source,
		})?;
		if !entry.file_type().is_file() || !is_manifest_file(entry.path()) {
			continue;
		}

		let content = std::fs::read_to_string(entry.path()).map_err(|source| SourceError::Read {
			path: entry.path().to_path_buf(),
			source,
		})?;
		let origin = entry.path().display().to_string();
		manifests.extend(parse_documents(&content, &origin));
	}

	Ok(manifests)
}
