//! Utilities for command handlers.

use std::{
	io::{self, ErrorKind, Write},
	path::PathBuf,
	sync::Arc,
};

use anyhow::{Context, Result};
use clap::Args;
use tokio::runtime::Runtime;
use tracing::debug;

use super::output::{ColorMode, OutputFormat};
use crate::{
	cluster::{ClusterRegistry, Executor},
	config::FleetConfig,
	gitops::ManifestSource,
};

/// Flags every subcommand accepts.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
	/// Log level (possible values: disabled, fatal, error, warn, info, debug, trace)
	#[arg(long)]
	pub log_level: Option<String>,

	/// Kubeconfig to read clusters from. Overrides the config file and $KUBECONFIG.
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Output format
	#[arg(short, long, default_value = "text", value_enum)]
	pub output: OutputFormat,

	/// Controls color in text output
	#[arg(long, default_value = "auto", value_enum)]
	pub color: ColorMode,
}

/// Where to read manifests from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
	/// Git repository to clone. Without it, --path is a local directory.
	#[arg(long)]
	pub repo: Option<String>,

	/// Branch to clone. Defaults to the configured default branch.
	#[arg(long, requires = "repo")]
	pub branch: Option<String>,

	/// Manifest directory or file; inside the repository when --repo is given
	#[arg(long)]
	pub path: Option<String>,
}

impl SourceArgs {
	pub fn manifest_source(&self, config: &FleetConfig) -> Result<ManifestSource> {
		Ok(match &self.repo {
			Some(repo) => ManifestSource::Git {
				repo: repo.clone(),
				path: self.path.clone(),
				branch: self
					.branch
					.clone()
					.unwrap_or_else(|| config.default_branch.clone()),
			},
			None => ManifestSource::Local {
				path: self
					.path
					.as_deref()
					.map(PathBuf::from)
					.context("either --repo or --path is required")?,
			},
		})
	}
}

/// Configuration and cluster access shared by one command invocation.
pub struct Fleet {
	pub config: FleetConfig,
	pub executor: Executor,
}

impl Fleet {
	/// Load `.kubefleet.yaml` from the working directory upward, then the
	/// kubeconfig it or the flags point at.
	pub fn connect(common: &CommonArgs) -> Result<Self> {
		let cwd = std::env::current_dir().context("getting current directory")?;
		let config = FleetConfig::load_from_directory(&cwd)?.unwrap_or_default();
		Self::with_config(common, config)
	}

	pub fn with_config(common: &CommonArgs, config: FleetConfig) -> Result<Self> {
		let registry = ClusterRegistry::load(common.kubeconfig.as_deref(), &config)
			.context("loading clusters")?;
		debug!(clusters = registry.cluster_names().len(), "loaded cluster registry");
		Ok(Self::from_registry(config, registry))
	}

	pub fn from_registry(config: FleetConfig, registry: ClusterRegistry) -> Self {
		Self {
			config,
			executor: Executor::new(Arc::new(registry)),
		}
	}

	pub fn registry(&self) -> &ClusterRegistry {
		self.executor.registry()
	}
}

pub fn runtime() -> Result<Runtime> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns a broken pipe error (EPIPE), this wrapper
/// converts it to a successful write. This allows commands to exit cleanly when
/// output is piped to a process that closes early (e.g., `kubefleet clusters list | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}
