//! Configuration file support for kubefleet
//!
//! Supports `.kubefleet.yaml` files that can be placed anywhere in the directory
//! hierarchy. kubefleet searches from the working directory upward to the
//! filesystem root and uses the first file it finds.

use std::{
	collections::BTreeMap,
	fs, io,
	path::{Path, PathBuf},
	time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// The name of the config file kubefleet looks for
pub const CONFIG_FILE_NAME: &str = ".kubefleet.yaml";

/// Field manager used for server-side apply unless configured otherwise.
pub const DEFAULT_FIELD_MANAGER: &str = "kubefleet";

/// Branch cloned when a git source does not name one.
pub const DEFAULT_BRANCH: &str = "main";

const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file: {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse config file: {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},

	#[error("apiTimeoutSeconds must be greater than zero in {}", path.display())]
	ZeroTimeout { path: PathBuf },
}

/// Root configuration structure for .kubefleet.yaml
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetConfig {
	/// Kubeconfig to read clusters from, instead of `$KUBECONFIG`.
	pub kubeconfig: Option<PathBuf>,

	/// Per-request read timeout applied to every cluster client.
	pub api_timeout_seconds: u64,

	/// Field manager name used for server-side apply.
	pub field_manager: String,

	/// Branch used for git sources that do not specify one.
	pub default_branch: String,

	/// Extra per-cluster metadata, keyed by context name.
	pub clusters: BTreeMap<String, ClusterSettings>,
}

impl Default for FleetConfig {
	fn default() -> Self {
		Self {
			kubeconfig: None,
			api_timeout_seconds: DEFAULT_API_TIMEOUT_SECONDS,
			field_manager: DEFAULT_FIELD_MANAGER.to_string(),
			default_branch: DEFAULT_BRANCH.to_string(),
			clusters: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSettings {
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
}

impl FleetConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>, ConfigError> {
		find_config_file(start_dir)
			.map(|path| Self::load_from_file(&path))
			.transpose()
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config: FleetConfig =
			serde_yaml_with_quirks::from_str(&content).map_err(|source| ConfigError::Parse {
				path: path.to_path_buf(),
				source,
			})?;

		if config.api_timeout_seconds == 0 {
			return Err(ConfigError::ZeroTimeout {
				path: path.to_path_buf(),
			});
		}

		// Relative kubeconfig paths are relative to the config file
		if let (Some(kubeconfig), Some(dir)) = (&config.kubeconfig, path.parent()) {
			if kubeconfig.is_relative() {
				config.kubeconfig = Some(dir.join(kubeconfig));
			}
		}

		Ok(config)
	}

	pub fn api_timeout(&self) -> Duration {
		Duration::from_secs(self.api_timeout_seconds)
	}

	/// Labels configured for a cluster, empty when none are.
	pub fn cluster_labels(&self, cluster: &str) -> BTreeMap<String, String> {
		self.clusters
			.get(cluster)
			.map(|settings| settings.labels.clone())
			.unwrap_or_default()
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	start_dir
		.ancestors()
		.map(|dir| dir.join(CONFIG_FILE_NAME))
		.find(|candidate| candidate.is_file())
}
