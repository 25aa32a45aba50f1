//! `find`: clusters able to run a workload.

use std::{collections::BTreeMap, io::Write};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use super::{
	output::write_structured,
	util::{runtime, CommonArgs, Fleet},
};
use crate::cluster::{Selector, Target, WorkloadRequirements};

/// Placement requirements, shared by `find` and `deploy`.
#[derive(Args)]
pub struct RequirementArgs {
	/// Accelerator resource the workload needs, e.g. nvidia.com/gpu
	#[arg(long)]
	pub gpu_type: Option<String>,

	/// Minimum number of accelerators
	#[arg(long, visible_alias = "min-gpus", default_value = "0")]
	pub min_gpu: i64,

	/// Minimum allocatable CPU, as a Kubernetes quantity
	#[arg(long)]
	pub min_cpu: Option<String>,

	/// Minimum allocatable memory, as a Kubernetes quantity
	#[arg(long)]
	pub min_memory: Option<String>,

	/// Node label the cluster must have (Format: key=value)
	#[arg(short, long = "label")]
	pub labels: Vec<String>,
}

impl RequirementArgs {
	pub fn is_set(&self) -> bool {
		self.gpu_type.is_some()
			|| self.min_gpu > 0
			|| self.min_cpu.is_some()
			|| self.min_memory.is_some()
			|| !self.labels.is_empty()
	}

	pub fn to_requirements(&self) -> Result<WorkloadRequirements> {
		let node_labels = self
			.labels
			.iter()
			.map(|label| {
				label
					.split_once('=')
					.map(|(k, v)| (k.to_string(), v.to_string()))
					.with_context(|| format!("invalid label `{label}`, expected key=value"))
			})
			.collect::<Result<BTreeMap<_, _>>>()?;
		Ok(WorkloadRequirements {
			gpu_type: self.gpu_type.clone(),
			min_gpu: self.min_gpu,
			min_cpu: self.min_cpu.clone(),
			min_memory: self.min_memory.clone(),
			node_labels,
		})
	}
}

#[derive(Args)]
pub struct FindArgs {
	#[command(flatten)]
	pub workload: RequirementArgs,

	/// Cluster to consider, may be repeated. All clusters when omitted.
	#[arg(short, long = "cluster")]
	pub clusters: Vec<String>,

	#[command(flatten)]
	pub common: CommonArgs,
}

#[derive(Serialize)]
struct FindReport<'a> {
	requirements: &'a WorkloadRequirements,
	clusters: Vec<String>,
}

pub fn run<W: Write>(args: FindArgs, writer: W) -> Result<()> {
	let fleet = Fleet::connect(&args.common)?;
	runtime()?.block_on(find(&fleet, &args, writer))
}

#[instrument(skip_all)]
pub async fn find<W: Write>(fleet: &Fleet, args: &FindArgs, mut writer: W) -> Result<()> {
	let requirements = args.workload.to_requirements()?;
	let target = Target::from_names(args.clusters.clone());
	let clusters = Selector::new(fleet.executor.clone())
		.find_clusters_for_workload(&target, &requirements)
		.await;

	let report = FindReport {
		requirements: &requirements,
		clusters,
	};
	if write_structured(&mut writer, args.common.output, &report)? {
		return Ok(());
	}

	if report.clusters.is_empty() {
		eprintln!("No cluster satisfies the requirements.");
	}
	for cluster in &report.clusters {
		writeln!(writer, "{cluster}")?;
	}
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[derive(Parser)]
	struct Cli {
		#[command(flatten)]
		find: FindArgs,
	}

	#[test]
	fn test_requirements_from_flags() {
		let cli = Cli::parse_from([
			"find",
			"--gpu-type",
			"nvidia.com/gpu",
			"--min-gpu",
			"2",
			"--min-memory",
			"64Gi",
			"-l",
			"topology.kubernetes.io/zone=eu-1a",
		]);
		let req = cli.find.workload.to_requirements().unwrap();
		assert_eq!(req.gpu_type.as_deref(), Some("nvidia.com/gpu"));
		assert_eq!(req.min_gpu, 2);
		assert_eq!(req.min_memory.as_deref(), Some("64Gi"));
		assert_eq!(req.node_labels["topology.kubernetes.io/zone"], "eu-1a");
	}

	#[test]
	fn test_requirements_unset() {
		let cli = Cli::parse_from(["find"]);
		assert!(!cli.find.workload.is_set());
		let cli = Cli::parse_from(["find", "--min-gpus", "1"]);
		assert!(cli.find.workload.is_set());
		assert_eq!(cli.find.workload.min_gpu, 1);
	}

	#[test]
	fn test_bad_label() {
		let cli = Cli::parse_from(["find", "--label", "zone"]);
		assert!(cli.find.workload.to_requirements().is_err());
	}
}
