//! `drift`: compare declared manifests against every target cluster.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use super::{
	output::{paint_error, write_structured, Table},
	util::{runtime, CommonArgs, Fleet, SourceArgs},
};
use crate::gitops::{DriftRequest, Reconciler};

#[derive(Args)]
pub struct DriftArgs {
	#[command(flatten)]
	pub source: SourceArgs,

	/// Cluster to check, may be repeated. All clusters when omitted.
	#[arg(short, long = "cluster")]
	pub clusters: Vec<String>,

	/// Put every namespaced object into this namespace
	#[arg(short, long)]
	pub namespace: Option<String>,

	/// Exit with 0 even when drift is found
	#[arg(short = 'z', long)]
	pub exit_zero: bool,

	#[command(flatten)]
	pub common: CommonArgs,
}

pub fn run<W: Write>(args: DriftArgs, writer: W) -> Result<()> {
	let fleet = Fleet::connect(&args.common)?;
	runtime()?.block_on(drift(&fleet, &args, writer))
}

#[instrument(skip_all)]
pub async fn drift<W: Write>(fleet: &Fleet, args: &DriftArgs, mut writer: W) -> Result<()> {
	let request = DriftRequest::builder()
		.source(args.source.manifest_source(&fleet.config)?)
		.clusters(args.clusters.clone())
		.maybe_namespace(args.namespace.clone())
		.build();
	let report = Reconciler::new(fleet.executor.clone())
		.drift(&request)
		.await?;

	if !write_structured(&mut writer, args.common.output, &report)? {
		let colored = args.common.color.should_colorize();
		if report.drifts.is_empty() {
			writeln!(writer, "No drift across {} cluster(s).", report.cluster_count)?;
		} else {
			let mut table = Table::new(&mut writer, &["CLUSTER", "RESOURCE", "DRIFT", "DIFFERENCE"])?;
			for drift in &report.drifts {
				for (i, difference) in drift.differences.iter().enumerate() {
					let (cluster, key, kind) = if i == 0 {
						(drift.cluster.as_str(), drift.resource_key.as_str(), drift.drift_type.to_string())
					} else {
						("", "", String::new())
					};
					table.row(&[cluster, key, kind.as_str(), difference.as_str()])?;
				}
			}
			table.finish()?;
		}
		for error in &report.errors {
			writeln!(writer, "{}: {}", error.cluster, paint_error(&error.error, colored))?;
		}
		writer.flush()?;
	}

	if !args.exit_zero && (report.total_drifts > 0 || !report.errors.is_empty()) {
		anyhow::bail!(
			"found {} drift(s), {} cluster(s) could not be checked",
			report.total_drifts,
			report.errors.len()
		);
	}
	Ok(())
}
