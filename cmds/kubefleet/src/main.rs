use anyhow::Result;
use clap::{Parser, Subcommand};
use kubefleet::{
	commands::{self, sync::SyncMode, util::BrokenPipeGuard},
	telemetry,
};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "kubefleet")]
#[command(about = "Operate many Kubernetes clusters as one", long_about = None)]
#[command(version = env!("KUBEFLEET_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// List clusters and check their health
	Clusters(commands::clusters::ClustersArgs),

	/// Show node inventory of each cluster
	Capabilities(commands::capabilities::CapabilitiesArgs),

	/// Find clusters able to run a workload
	Find(commands::find::FindArgs),

	/// Differences between the manifests and the clusters
	Drift(commands::drift::DriftArgs),

	/// Create or update manifests in the clusters
	Sync(commands::sync::SyncArgs),

	/// Sync the manifests into the clusters, never as a dry-run
	Reconcile(commands::sync::SyncTargetArgs),

	/// Show what a sync would do without changing anything
	Preview(commands::sync::SyncTargetArgs),

	/// Sync the manifests into the clusters that meet placement requirements
	Deploy(commands::deploy::DeployArgs),
}

/// Extract log level from command
fn get_log_level(cmd: &Commands) -> Option<&str> {
	let common = match cmd {
		Commands::Clusters(args) => args.common(),
		Commands::Capabilities(args) => &args.common,
		Commands::Find(args) => &args.common,
		Commands::Drift(args) => &args.common,
		Commands::Sync(args) => &args.target.common,
		Commands::Reconcile(args) | Commands::Preview(args) => &args.common,
		Commands::Deploy(args) => &args.target.common,
	};
	common.log_level.as_deref()
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(get_log_level(&cli.command).and_then(telemetry::parse_level))?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Clusters(args) => commands::clusters::run(args, stdout),
		Commands::Capabilities(args) => commands::capabilities::run(args, stdout),
		Commands::Find(args) => commands::find::run(args, stdout),
		Commands::Drift(args) => commands::drift::run(args, stdout),
		Commands::Sync(args) => commands::sync::run(args.target, SyncMode::Sync, args.dry_run, stdout),
		Commands::Reconcile(args) => commands::sync::run(args, SyncMode::Reconcile, false, stdout),
		Commands::Preview(args) => commands::sync::run(args, SyncMode::Preview, true, stdout),
		Commands::Deploy(args) => commands::deploy::run(args, stdout),
	}
}
