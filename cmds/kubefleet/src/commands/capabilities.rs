//! `capabilities`: node inventory per cluster.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use super::{
	output::{cell, paint_error, write_structured, Table},
	util::{runtime, CommonArgs, Fleet},
};
use crate::cluster::{ClusterCapabilities, Selector, Target};

#[derive(Args)]
pub struct CapabilitiesArgs {
	/// Cluster to query, may be repeated. All clusters when omitted.
	#[arg(short, long = "cluster")]
	pub clusters: Vec<String>,

	#[command(flatten)]
	pub common: CommonArgs,
}

pub fn run<W: Write>(args: CapabilitiesArgs, writer: W) -> Result<()> {
	let fleet = Fleet::connect(&args.common)?;
	runtime()?.block_on(capabilities(&fleet, &args, writer))
}

fn gpu_summary(caps: &ClusterCapabilities) -> String {
	caps.gpus
		.iter()
		.map(|(kind, count)| format!("{kind}={count}"))
		.collect::<Vec<_>>()
		.join(",")
}

#[instrument(skip_all)]
pub async fn capabilities<W: Write>(fleet: &Fleet, args: &CapabilitiesArgs, mut writer: W) -> Result<()> {
	let target = Target::from_names(args.clusters.clone());
	let results = Selector::new(fleet.executor.clone())
		.cluster_capabilities(&target)
		.await;

	if write_structured(&mut writer, args.common.output, &results)? {
		return Ok(());
	}

	let colored = args.common.color.should_colorize();
	let mut table = Table::new(
		writer,
		&["CLUSTER", "NODES", "READY", "CPU", "MEMORY", "GPUS"],
	)?;
	for result in &results {
		match (&result.result, &result.error) {
			(Some(caps), _) => table.row(&[
				caps.cluster.clone(),
				caps.node_count.to_string(),
				caps.ready_nodes.to_string(),
				format!("{}/{}", caps.allocatable_cpu, caps.total_cpu),
				format!("{}/{}", caps.allocatable_memory, caps.total_memory),
				cell(&gpu_summary(caps)).to_string(),
			])?,
			(None, error) => table.row(&[
				result.cluster.clone(),
				paint_error(error.as_deref().unwrap_or("no result"), colored),
			])?,
		}
	}
	table.finish()
}
